//! Tracking mode rules.
//!
//! A request is validated against the model and tracking mode as a whole, then turned into an
//! ordered list of [`Step`]s. Nothing is written unless the whole request is legal, and steps
//! whose value the supply already holds are left out.
//!
//! In series mode channel 2 follows channel 1, so the requested voltage is split between both
//! and only channel 1 is written. In parallel mode the requested current is split the same way.

use crate::{
    error::PolicyError,
    identity::Model,
    protocol::Command,
    state::InstrumentState,
    types::{Channel, State, TrackingMode},
    units::{Current, Voltage},
};

/// Highest setpoints accepted on a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub voltage: Voltage,
    pub current: Current,
}

const INDEPENDENT: Limits = Limits {
    voltage: Voltage::from_milli(30_000),
    current: Current::from_milli(3_000),
};
const SERIES: Limits = Limits {
    voltage: Voltage::from_milli(60_000),
    current: Current::from_milli(3_000),
};
const PARALLEL: Limits = Limits {
    voltage: Voltage::from_milli(30_000),
    current: Current::from_milli(6_000),
};
const CHANNEL_3: Limits = Limits {
    voltage: Voltage::from_milli(5_000),
    current: Current::from_milli(3_000),
};
const CHANNEL_4: Limits = Limits {
    voltage: Voltage::from_milli(5_000),
    current: Current::from_milli(1_000),
};

/// Channel 2 current while tracking in series.
pub const SERIES_CHANNEL_2_CURRENT: Current = Current::from_milli(3_000);

/// Limits of `channel`, or `None` if it cannot be addressed in `mode`.
pub fn limits(model: Model, mode: TrackingMode, channel: Channel) -> Option<Limits> {
    use TrackingMode as M;
    match (channel, mode) {
        (Channel::One, M::Independent) | (Channel::Two, M::Independent) => Some(INDEPENDENT),
        (Channel::One, M::Series) => Some(SERIES),
        (Channel::One, M::Parallel) => Some(PARALLEL),
        (Channel::Two, _) => None,
        (Channel::Three, _) if model == Model::Gpd4303S => Some(CHANNEL_3),
        (Channel::Four, _) if model == Model::Gpd4303S => Some(CHANNEL_4),
        _ => None,
    }
}

/// Check that `channel` can be addressed in `mode`.
pub fn addressable(
    model: Model,
    mode: TrackingMode,
    channel: Channel,
) -> Result<Limits, PolicyError> {
    limits(model, mode, channel).ok_or(PolicyError::NotAddressable { channel, mode })
}

/// Voltage written to the supply for a requested output voltage.
pub fn wire_voltage(mode: TrackingMode, channel: Channel, requested: Voltage) -> Voltage {
    match (mode, channel) {
        (TrackingMode::Series, Channel::One) => requested / 2.0,
        _ => requested,
    }
}

/// Current written to the supply for a requested output current.
pub fn wire_current(mode: TrackingMode, channel: Channel, requested: Current) -> Current {
    match (mode, channel) {
        (TrackingMode::Parallel, Channel::One) => requested / 2.0,
        _ => requested,
    }
}

/// Output voltage of a channel from its channel-level reading.
pub fn derive_voltage(mode: TrackingMode, channel: Channel, reading: Voltage) -> Voltage {
    match (mode, channel) {
        (TrackingMode::Series, Channel::One) => reading * 2.0,
        _ => reading,
    }
}

/// Output current of a channel from its channel-level reading.
pub fn derive_current(mode: TrackingMode, channel: Channel, reading: Current) -> Current {
    match (mode, channel) {
        (TrackingMode::Parallel, Channel::One) => reading * 2.0,
        _ => reading,
    }
}

/// A combined request. Anything left unset is not touched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    pub tracking: Option<TrackingMode>,
    /// Requested output voltage, indexed by [`Channel::index`].
    pub voltage: [Option<Voltage>; 4],
    /// Requested output current, indexed by [`Channel::index`].
    pub current: [Option<Current>; 4],
    pub output: Option<State>,
    pub beep: Option<State>,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zero every channel addressable in `mode` and switch the output off.
    pub fn zeroed(model: Model, mode: TrackingMode) -> Self {
        let mut settings = Self::new().with_output(State::Off);
        for index in 0..model.programmable_channels() {
            let Ok(channel) = Channel::try_from(index + 1) else {
                continue;
            };
            if limits(model, mode, channel).is_some() {
                settings = settings
                    .with_voltage(channel, Voltage::ZERO)
                    .with_current(channel, Current::ZERO);
            }
        }
        settings
    }

    pub fn with_tracking(mut self, mode: TrackingMode) -> Self {
        self.tracking = Some(mode);
        self
    }

    /// Set the output voltage of a channel. In series mode this is the total of channels 1 and 2.
    pub fn with_voltage(mut self, channel: Channel, voltage: Voltage) -> Self {
        self.voltage[channel.index()] = Some(voltage);
        self
    }

    /// Set the current limit of a channel. In parallel mode this is the total of channels 1 and 2.
    pub fn with_current(mut self, channel: Channel, current: Current) -> Self {
        self.current[channel.index()] = Some(current);
        self
    }

    pub fn with_output(mut self, output: impl Into<State>) -> Self {
        self.output = Some(output.into());
        self
    }

    pub fn with_beep(mut self, beep: impl Into<State>) -> Self {
        self.beep = Some(beep.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.tracking.is_none()
            && self.output.is_none()
            && self.beep.is_none()
            && self.voltage.iter().all(Option::is_none)
            && self.current.iter().all(Option::is_none)
    }

    fn touches(&self, channel: Channel) -> bool {
        self.voltage[channel.index()].is_some() || self.current[channel.index()].is_some()
    }
}

/// One exchange with the supply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Output(State),
    Track(TrackingMode),
    /// `mirror` records the value on channel 2 as well, which follows channel 1 in series.
    Voltage {
        channel: Channel,
        value: Voltage,
        mirror: bool,
    },
    Current {
        channel: Channel,
        value: Current,
    },
    Beep(State),
}

impl Step {
    pub fn command(&self) -> Command {
        match *self {
            Step::Output(state) => Command::Output(state),
            Step::Track(mode) => Command::Track(mode),
            Step::Voltage { channel, value, .. } => Command::SetVoltage(channel, value),
            Step::Current { channel, value } => Command::SetCurrent(channel, value),
            Step::Beep(state) => Command::Beep(state),
        }
    }

    /// Record the effect of this step once the supply has accepted it.
    pub(crate) fn apply(&self, state: &mut InstrumentState) {
        match *self {
            Step::Output(output) => state.output = output,
            Step::Track(mode) => state.change_tracking(mode),
            Step::Voltage {
                channel,
                value,
                mirror,
            } => {
                state.channel_mut(channel).confirm_voltage(value);
                if mirror {
                    state.channel_mut(Channel::Two).confirm_voltage(value);
                }
            }
            Step::Current { channel, value } => state.channel_mut(channel).confirm_current(value),
            Step::Beep(beep) => state.beep = beep,
        }
    }
}

/// Validate `settings` against `state` and order the exchanges needed to apply them.
///
/// The order is: output off, tracking, channel 1, channel 2, channels 3 and 4, output on, beep.
/// An empty plan means the supply already matches.
pub fn plan(state: &InstrumentState, settings: &Settings) -> Result<Vec<Step>, PolicyError> {
    validate(state, settings)?;

    let mode = settings.tracking.unwrap_or(state.tracking);
    let mut projected = state.clone();
    let mut steps = Vec::new();
    let mut push = |step: Step, projected: &mut InstrumentState| {
        step.apply(projected);
        steps.push(step);
    };

    if settings.output == Some(State::Off) && state.output == State::On {
        push(Step::Output(State::Off), &mut projected);
    }
    if settings.tracking.is_some_and(|m| m != state.tracking) {
        push(Step::Track(mode), &mut projected);
    }

    for channel in [Channel::One, Channel::Two] {
        for step in channel_steps(&projected, settings, mode, channel) {
            push(step, &mut projected);
        }
    }

    if mode == TrackingMode::Series
        && (mode != state.tracking
            || settings.touches(Channel::One)
            || settings.touches(Channel::Two))
        && projected.channel(Channel::Two).confirmed_current() != Some(SERIES_CHANNEL_2_CURRENT)
    {
        push(
            Step::Current {
                channel: Channel::Two,
                value: SERIES_CHANNEL_2_CURRENT,
            },
            &mut projected,
        );
    }

    for channel in [Channel::Three, Channel::Four] {
        for step in channel_steps(&projected, settings, mode, channel) {
            push(step, &mut projected);
        }
    }

    if settings.output == Some(State::On) && projected.output == State::Off {
        push(Step::Output(State::On), &mut projected);
    }
    if let Some(beep) = settings.beep.filter(|beep| *beep != state.beep) {
        push(Step::Beep(beep), &mut projected);
    }

    Ok(steps)
}

fn validate(state: &InstrumentState, settings: &Settings) -> Result<(), PolicyError> {
    if settings.is_empty() {
        return Err(PolicyError::MissingQuantity);
    }
    if state.remote == Some(false) {
        return Err(PolicyError::LocalMode);
    }

    let mode = settings.tracking.unwrap_or(state.tracking);
    for channel in [Channel::One, Channel::Two, Channel::Three, Channel::Four] {
        if !settings.touches(channel) {
            continue;
        }
        let limits = addressable(state.model, mode, channel)?;

        if let Some(voltage) = settings.voltage[channel.index()] {
            if voltage.is_negative() {
                return Err(PolicyError::Negative {
                    channel,
                    value: voltage.into(),
                });
            }
            if voltage > limits.voltage {
                return Err(PolicyError::LimitExceeded {
                    value: voltage.into(),
                    ceiling: limits.voltage.into(),
                    mode,
                });
            }
        }
        if let Some(current) = settings.current[channel.index()] {
            if current.is_negative() {
                return Err(PolicyError::Negative {
                    channel,
                    value: current.into(),
                });
            }
            if current > limits.current {
                return Err(PolicyError::LimitExceeded {
                    value: current.into(),
                    ceiling: limits.current.into(),
                    mode,
                });
            }
        }
    }
    Ok(())
}

/// Voltage and current writes for one channel that the supply does not already hold.
fn channel_steps(
    projected: &InstrumentState,
    settings: &Settings,
    mode: TrackingMode,
    channel: Channel,
) -> Vec<Step> {
    let cached = *projected.channel(channel);

    let voltage = settings.voltage[channel.index()]
        .map(|requested| wire_voltage(mode, channel, requested))
        .filter(|value| {
            let held = cached.confirmed_voltage() == Some(*value);
            if held {
                log::trace!("VSET{channel} already {value}");
            }
            !held
        })
        .map(|value| Step::Voltage {
            channel,
            value,
            mirror: mode == TrackingMode::Series && channel == Channel::One,
        });

    let current = settings.current[channel.index()]
        .map(|requested| wire_current(mode, channel, requested))
        .filter(|value| {
            let held = cached.confirmed_current() == Some(*value);
            if held {
                log::trace!("ISET{channel} already {value}");
            }
            !held
        })
        .map(|value| Step::Current { channel, value });

    voltage.into_iter().chain(current).collect()
}
