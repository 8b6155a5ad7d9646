//! Last known state of a connected supply.

use crate::{
    identity::{DeviceIdentity, Model},
    types::{BaudRate, Channel, ControlMode, State, Status, TrackingMode},
    units::{Current, Voltage},
};

/// Setpoints of one channel as last written to or read from the supply.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelSetpoint {
    pub voltage: Voltage,
    pub current: Current,
    /// `voltage` matches the supply.
    pub voltage_confirmed: bool,
    /// `current` matches the supply.
    pub current_confirmed: bool,
}

impl ChannelSetpoint {
    pub fn confirmed_voltage(&self) -> Option<Voltage> {
        self.voltage_confirmed.then_some(self.voltage)
    }

    pub fn confirmed_current(&self) -> Option<Current> {
        self.current_confirmed.then_some(self.current)
    }

    pub(crate) fn confirm_voltage(&mut self, voltage: Voltage) {
        self.voltage = voltage;
        self.voltage_confirmed = true;
    }

    pub(crate) fn confirm_current(&mut self, current: Current) {
        self.current = current;
        self.current_confirmed = true;
    }

    pub(crate) fn invalidate(&mut self) {
        self.voltage_confirmed = false;
        self.current_confirmed = false;
    }
}

/// Everything the driver knows about the supply without asking it.
///
/// Only changed after the supply has accepted a command, so a failed exchange leaves it as it was.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstrumentState {
    pub identity: DeviceIdentity,
    pub model: Model,
    pub tracking: TrackingMode,
    pub output: State,
    pub beep: State,
    /// `None` until `REMOTE` or `LOCAL` has been sent.
    pub remote: Option<bool>,
    /// `None` until `BAUD` has been sent.
    pub baud_rate: Option<BaudRate>,
    /// Regulation mode of channels 1 and 2 at the last status read.
    pub regulation: [ControlMode; 2],
    /// Indexed by [`Channel::index`].
    pub channels: [ChannelSetpoint; 4],
}

impl InstrumentState {
    /// Fresh state after a status read. Setpoints start unconfirmed.
    pub fn new(identity: DeviceIdentity, model: Model, status: Status) -> Self {
        Self {
            identity,
            model,
            tracking: status.tracking,
            output: status.output,
            beep: status.beep,
            remote: None,
            baud_rate: None,
            regulation: status.regulation,
            channels: [ChannelSetpoint::default(); 4],
        }
    }

    pub fn channel(&self, channel: Channel) -> &ChannelSetpoint {
        &self.channels[channel.index()]
    }

    pub(crate) fn channel_mut(&mut self, channel: Channel) -> &mut ChannelSetpoint {
        &mut self.channels[channel.index()]
    }

    pub(crate) fn apply_status(&mut self, status: Status) {
        if status.tracking != self.tracking {
            self.channel_mut(Channel::Two).invalidate();
        }
        self.tracking = status.tracking;
        self.output = status.output;
        self.beep = status.beep;
        self.regulation = status.regulation;
    }

    /// The supply turns its output off and rewires channel 2 on every tracking change.
    pub(crate) fn change_tracking(&mut self, tracking: TrackingMode) {
        if tracking != self.tracking {
            self.channel_mut(Channel::Two).invalidate();
        }
        self.tracking = tracking;
        self.output = State::Off;
    }

    pub(crate) fn invalidate_setpoints(&mut self) {
        self.channels.iter_mut().for_each(ChannelSetpoint::invalidate);
    }
}
