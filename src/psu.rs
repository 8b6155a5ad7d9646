use crate::{
    error::{Error, Result, TransportError},
    identity::{DeviceIdentity, Model, Probe},
    policy::{self, Settings},
    protocol::{Command, DeviceFault},
    state::InstrumentState,
    transport::{Line, Transport, TransportConfig},
    types::{BaudRate, Channel, ControlMode, MemorySlot, State, Status, TrackingMode},
    units::{Current, Voltage},
};

/// You can create a GpdPsu using any line which implements [`Line`].
///
/// Settings go through the tracking mode rules in [`policy`] before anything is written, and
/// values the supply is known to hold already are not written again. For its methods, "set"
/// means to write a setting, "setpoint" reads a setting back and "read" returns a measured value.
pub struct GpdPsu<S: Line, const L: usize = 64> {
    transport: Transport<S, L>,
    state: InstrumentState,
}

impl<S: Line, const L: usize> GpdPsu<S, L> {
    /// Identify the supply on `line` and read its status.
    pub fn new(line: S, config: TransportConfig) -> Result<Self, S::Error> {
        let mut transport = Transport::new(line, config);
        let reply = query(&mut transport, Command::Identify)?;
        let identity = DeviceIdentity::parse(&reply)?;
        let model = Model::identify(&identity)?;
        Self::connect(transport, identity, model)
    }

    /// Take over a transport that has already been [probed](crate::identity::probe).
    pub fn from_probe(transport: Transport<S, L>, probe: Probe) -> Result<Self, S::Error> {
        Self::connect(transport, probe.identification, probe.model_hint)
    }

    fn connect(
        mut transport: Transport<S, L>,
        identity: DeviceIdentity,
        model: Model,
    ) -> Result<Self, S::Error> {
        let status = Status::parse(&query(&mut transport, Command::Status)?)?;
        log::info!("connected to {identity}, tracking {}", status.tracking);
        Ok(Self {
            transport,
            state: InstrumentState::new(identity, model, status),
        })
    }

    /// Give the line back.
    pub fn release(self) -> S {
        self.transport.release()
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.state.identity
    }

    pub fn model(&self) -> Model {
        self.state.model
    }

    /// Everything known about the supply without asking it.
    pub fn state(&self) -> &InstrumentState {
        &self.state
    }

    pub fn tracking(&self) -> TrackingMode {
        self.state.tracking
    }

    pub fn output(&self) -> State {
        self.state.output
    }

    pub fn beep(&self) -> State {
        self.state.beep
    }

    /// `None` until [`GpdPsu::set_remote`] has been called.
    pub fn remote(&self) -> Option<bool> {
        self.state.remote
    }

    /// `None` until [`GpdPsu::set_baud_rate`] has been called.
    pub fn baud_rate(&self) -> Option<BaudRate> {
        self.state.baud_rate
    }

    /// Regulation mode at the last status read. Only reported for channels 1 and 2.
    pub fn regulation(&self, channel: Channel) -> Option<ControlMode> {
        match channel {
            Channel::One => Some(self.state.regulation[0]),
            Channel::Two => Some(self.state.regulation[1]),
            _ => None,
        }
    }

    /// Apply a combined request. It is rejected as a whole if any part of it is not allowed.
    pub fn configure(&mut self, settings: &Settings) -> Result<(), S::Error> {
        let steps = policy::plan(&self.state, settings)?;
        if steps.is_empty() {
            log::trace!("supply already matches {settings:?}");
        }
        for step in steps {
            self.command(step.command())?;
            step.apply(&mut self.state);
        }
        Ok(())
    }

    /// Change the tracking mode. The supply switches its output off when doing so.
    pub fn set_tracking(&mut self, mode: TrackingMode) -> Result<(), S::Error> {
        self.configure(&Settings::new().with_tracking(mode))
    }

    /// Set the output voltage of a channel. In series mode channel 1 takes the total voltage.
    pub fn set_voltage(&mut self, channel: Channel, voltage: Voltage) -> Result<(), S::Error> {
        self.configure(&Settings::new().with_voltage(channel, voltage))
    }

    /// Set the current limit of a channel. In parallel mode channel 1 takes the total current.
    pub fn set_current(&mut self, channel: Channel, current: Current) -> Result<(), S::Error> {
        self.configure(&Settings::new().with_current(channel, current))
    }

    pub fn set_output(&mut self, state: impl Into<State>) -> Result<(), S::Error> {
        self.configure(&Settings::new().with_output(state))
    }

    pub fn set_beep(&mut self, state: impl Into<State>) -> Result<(), S::Error> {
        self.configure(&Settings::new().with_beep(state))
    }

    /// Switch the output off and zero every channel addressable in the current mode.
    pub fn zero(&mut self) -> Result<(), S::Error> {
        let settings = Settings::zeroed(self.state.model, self.state.tracking);
        self.configure(&settings)
    }

    /// Lock (`true`) or release (`false`) the front panel.
    pub fn set_remote(&mut self, remote: bool) -> Result<(), S::Error> {
        self.command(if remote { Command::Remote } else { Command::Local })?;
        self.state.remote = Some(remote);
        Ok(())
    }

    /// Change the baud rate of the supply, then of the host side of the line.
    pub fn set_baud_rate(&mut self, baud_rate: BaudRate) -> Result<(), S::Error> {
        self.command(Command::Baud(baud_rate))?;
        self.transport
            .line_mut()
            .set_baud_rate(baud_rate.bits_per_second())
            .map_err(TransportError::SerialError)?;
        self.state.baud_rate = Some(baud_rate);
        Ok(())
    }

    /// Read the status word again, e.g. after the front panel has been used.
    pub fn refresh_status(&mut self) -> Result<Status, S::Error> {
        let status = Status::parse(&self.query(Command::Status)?)?;
        self.state.apply_status(status);
        Ok(status)
    }

    /// Read every programmable setpoint back from the supply.
    pub fn refresh_setpoints(&mut self) -> Result<(), S::Error> {
        for number in 1..=self.state.model.programmable_channels() {
            let channel = Channel::try_from(number)?;
            let voltage: Voltage = self.query(Command::VoltageSetpoint(channel))?.parse()?;
            self.state.channel_mut(channel).confirm_voltage(voltage);
            let current: Current = self.query(Command::CurrentSetpoint(channel))?.parse()?;
            self.state.channel_mut(channel).confirm_current(current);
        }
        Ok(())
    }

    /// Measured output voltage. In series mode channel 1 reports the total of both channels.
    pub fn read_voltage(&mut self, channel: Channel) -> Result<Voltage, S::Error> {
        policy::addressable(self.state.model, self.state.tracking, channel)?;
        let reading: Voltage = self.query(Command::OutputVoltage(channel))?.parse()?;
        Ok(policy::derive_voltage(self.state.tracking, channel, reading))
    }

    /// Measured channel 1 voltage against the centre terminal.
    ///
    /// Same as [`GpdPsu::read_voltage`] on channel 1, except in series mode where it is half the
    /// total.
    pub fn read_voltage_common(&mut self) -> Result<Voltage, S::Error> {
        Ok(self.query(Command::OutputVoltage(Channel::One))?.parse()?)
    }

    /// Measured output current. In parallel mode channel 1 reports the total of both channels.
    pub fn read_current(&mut self, channel: Channel) -> Result<Current, S::Error> {
        policy::addressable(self.state.model, self.state.tracking, channel)?;
        let reading: Current = self.query(Command::OutputCurrent(channel))?.parse()?;
        Ok(policy::derive_current(self.state.tracking, channel, reading))
    }

    /// Voltage setting of a channel, asked from the supply only when not already known.
    pub fn voltage_setpoint(&mut self, channel: Channel) -> Result<Voltage, S::Error> {
        policy::addressable(self.state.model, self.state.tracking, channel)?;
        let held = match self.state.channel(channel).confirmed_voltage() {
            Some(voltage) => voltage,
            None => {
                let voltage: Voltage = self.query(Command::VoltageSetpoint(channel))?.parse()?;
                self.state.channel_mut(channel).confirm_voltage(voltage);
                voltage
            }
        };
        Ok(policy::derive_voltage(self.state.tracking, channel, held))
    }

    /// Current setting of a channel, asked from the supply only when not already known.
    pub fn current_setpoint(&mut self, channel: Channel) -> Result<Current, S::Error> {
        policy::addressable(self.state.model, self.state.tracking, channel)?;
        let held = match self.state.channel(channel).confirmed_current() {
            Some(current) => current,
            None => {
                let current: Current = self.query(Command::CurrentSetpoint(channel))?.parse()?;
                self.state.channel_mut(channel).confirm_current(current);
                current
            }
        };
        Ok(policy::derive_current(self.state.tracking, channel, held))
    }

    /// Store the panel settings in a memory slot.
    pub fn save(&mut self, slot: MemorySlot) -> Result<(), S::Error> {
        self.command(Command::Save(slot))
    }

    /// Load the panel settings from a memory slot.
    pub fn recall(&mut self, slot: MemorySlot) -> Result<(), S::Error> {
        self.command(Command::Recall(slot))?;
        self.state.invalidate_setpoints();
        self.refresh_status()?;
        Ok(())
    }

    /// Send a setting. Any reply is the supply rejecting it.
    fn command(&mut self, command: Command) -> Result<(), S::Error> {
        match self.transport.exchange(&command)? {
            None => Ok(()),
            Some(reply) => {
                let fault = DeviceFault::classify(&reply);
                log::warn!("{command} rejected: {fault}");
                Err(Error::Device {
                    command: command.to_string(),
                    fault,
                })
            }
        }
    }

    fn query(&mut self, command: Command) -> Result<String, S::Error> {
        query(&mut self.transport, command)
    }
}

fn query<S: Line, const L: usize>(
    transport: &mut Transport<S, L>,
    command: Command,
) -> Result<String, S::Error> {
    let reply = transport.query(&command)?;
    match DeviceFault::detect(&reply) {
        None => Ok(reply),
        Some(fault) => {
            log::warn!("{command} rejected: {fault}");
            Err(Error::Device {
                command: command.to_string(),
                fault,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::PolicyError, identity::probe, mock_line::MockLine};

    const IDN: &str = "GW INSTEK,GPD-3303S,SN:12345678,V1.02";

    fn connect(status: &str) -> GpdPsu<MockLine> {
        let mut line = MockLine::new();
        line.reply("*IDN?", IDN);
        line.reply("STATUS?", status);
        let mut psu: GpdPsu<MockLine> = GpdPsu::new(line, MockLine::config()).unwrap();
        psu.transport.line_mut().clear_commands();
        psu
    }

    fn line(psu: &mut GpdPsu<MockLine>) -> &mut MockLine {
        psu.transport.line_mut()
    }

    #[test]
    fn test_connect() {
        let mut line = MockLine::new();
        line.reply("*IDN?", IDN);
        line.reply("STATUS?", "0101010");
        let psu: GpdPsu<MockLine> = GpdPsu::new(line, MockLine::config()).unwrap();

        assert_eq!(
            *psu.identity(),
            DeviceIdentity {
                manufacturer: "GW INSTEK".into(),
                model: "GPD-3303S".into(),
                serial: "12345678".into(),
                version: "1.02".into(),
            }
        );
        assert_eq!(psu.model(), Model::Gpd3303S);
        assert_eq!(psu.tracking(), TrackingMode::Independent);
        assert_eq!(psu.output(), State::On);
        assert_eq!(psu.beep(), State::Off);
        assert_eq!(psu.regulation(Channel::One), Some(ControlMode::Cc));
        assert_eq!(psu.regulation(Channel::Two), Some(ControlMode::Cv));
        assert_eq!(psu.regulation(Channel::Three), None);
        assert_eq!(psu.remote(), None);
        assert_eq!(psu.baud_rate(), None);
        assert_eq!(psu.transport.line().commands(), ["*IDN?", "STATUS?"]);
    }

    #[test]
    fn test_connect_other_manufacturer() {
        let mut line = MockLine::new();
        line.reply("*IDN?", "RIGOL TECHNOLOGIES,DP832,DP8A1234,00.01.14");
        let result = GpdPsu::<MockLine, 64>::new(line, MockLine::config());
        assert!(matches!(result, Err(Error::Identification(_))));
    }

    #[test]
    fn test_connect_from_probe() {
        let mut transport = Transport::new(MockLine::gpd_3303s(), MockLine::config());
        let found = probe(&mut transport).unwrap().unwrap();
        let psu: GpdPsu<MockLine> = GpdPsu::from_probe(transport, found).unwrap();
        assert_eq!(psu.transport.line().commands(), ["*IDN?", "STATUS?"]);
        assert_eq!(psu.beep(), State::On);
        assert_eq!(psu.output(), State::Off);
    }

    #[test]
    fn test_limit_rejected_without_writing() {
        let mut psu = connect("0101010");
        let before = *psu.state().channel(Channel::One);

        let result = psu.set_voltage(Channel::One, Voltage::new(31.0));
        assert!(matches!(
            result,
            Err(Error::Policy(PolicyError::LimitExceeded { .. }))
        ));
        assert_eq!(*psu.state().channel(Channel::One), before);
        assert!(line(&mut psu).written_data().is_empty());
    }

    #[test]
    fn test_set_voltage_once() {
        let mut psu = connect("0101010");
        psu.set_voltage(Channel::One, Voltage::new(12.0)).unwrap();
        assert_eq!(line(&mut psu).commands(), ["VSET1:12.000"]);
        assert_eq!(
            psu.state().channel(Channel::One).confirmed_voltage(),
            Some(Voltage::new(12.0))
        );

        line(&mut psu).clear_commands();
        psu.set_voltage(Channel::One, Voltage::new(12.0)).unwrap();
        assert!(line(&mut psu).commands().is_empty());
    }

    #[test]
    fn test_tracking_change_turns_output_off() {
        let mut psu = connect("0101010");
        assert_eq!(psu.output(), State::On);

        psu.set_tracking(TrackingMode::Parallel).unwrap();
        assert_eq!(psu.tracking(), TrackingMode::Parallel);
        assert_eq!(psu.output(), State::Off);
        assert_eq!(line(&mut psu).commands(), ["TRACK2"]);

        line(&mut psu).clear_commands();
        psu.set_tracking(TrackingMode::Series).unwrap();
        assert_eq!(line(&mut psu).commands(), ["TRACK1", "ISET2:3.000"]);
    }

    #[test]
    fn test_series_readings() {
        let mut psu = connect("1111010");
        line(&mut psu).reply("VOUT1?", "15.000V");
        line(&mut psu).reply("IOUT1?", "1.250A");

        assert_eq!(psu.read_voltage(Channel::One).unwrap(), Voltage::new(30.0));
        assert_eq!(psu.read_voltage_common().unwrap(), Voltage::new(15.0));
        assert_eq!(psu.read_current(Channel::One).unwrap(), Current::new(1.25));
        assert!(matches!(
            psu.read_voltage(Channel::Two),
            Err(Error::Policy(PolicyError::NotAddressable { .. }))
        ));
    }

    #[test]
    fn test_parallel_readings() {
        let mut psu = connect("1110110");
        line(&mut psu).reply("IOUT1?", "2.100A");
        assert_eq!(psu.read_current(Channel::One).unwrap(), Current::new(4.2));
    }

    #[test]
    fn test_series_limit_rejected_without_writing() {
        let mut psu = connect("1111100");
        let result = psu.set_voltage(Channel::One, Voltage::new(61.0));
        assert!(matches!(
            result,
            Err(Error::Policy(PolicyError::LimitExceeded {
                mode: TrackingMode::Series,
                ..
            }))
        ));
        assert!(line(&mut psu).written_data().is_empty());

        psu.set_voltage(Channel::One, Voltage::new(60.0)).unwrap();
        assert_eq!(line(&mut psu).commands(), ["VSET1:30.000", "ISET2:3.000"]);
    }

    #[test]
    fn test_serial_error_leaves_state() {
        let mut psu = connect("0101010");
        let before = psu.state().clone();
        line(&mut psu).set_write_error(true);

        let result = psu.configure(
            &Settings::new()
                .with_voltage(Channel::One, Voltage::new(5.0))
                .with_output(State::Off),
        );
        assert!(matches!(
            result,
            Err(Error::Transport(TransportError::SerialError(_)))
        ));
        assert_eq!(*psu.state(), before);
        assert_eq!(psu.output(), State::On);
        assert!(!line(&mut psu).is_open());
    }

    #[test]
    fn test_rejected_step_withholds_output_on() {
        let mut psu = connect("1101100");
        line(&mut psu).reply("ISET1:1.000", "Data out of range");

        let result = psu.configure(
            &Settings::new()
                .with_voltage(Channel::One, Voltage::new(5.0))
                .with_current(Channel::One, Current::new(1.0))
                .with_output(State::On),
        );
        assert!(matches!(
            result,
            Err(Error::Device {
                fault: DeviceFault::DataOutOfRange,
                ..
            })
        ));
        assert_eq!(line(&mut psu).commands(), ["VSET1:5.000", "ISET1:1.000"]);
        assert_eq!(psu.output(), State::Off);
        let channel = psu.state().channel(Channel::One);
        assert_eq!(channel.confirmed_voltage(), Some(Voltage::new(5.0)));
        assert_eq!(channel.confirmed_current(), None);
    }

    #[test]
    fn test_device_fault_leaves_state() {
        let mut psu = connect("0101010");
        line(&mut psu).reply("VSET1:20.000", "Data out of range");

        let result = psu.set_voltage(Channel::One, Voltage::new(20.0));
        assert!(matches!(
            result,
            Err(Error::Device {
                fault: DeviceFault::DataOutOfRange,
                ..
            })
        ));
        assert_eq!(psu.state().channel(Channel::One).confirmed_voltage(), None);
    }

    #[test]
    fn test_unexpected_reply_to_setting() {
        let mut psu = connect("0101010");
        line(&mut psu).reply("BEEP1", "?");
        let result = psu.set_beep(true);
        assert!(matches!(
            result,
            Err(Error::Device {
                fault: DeviceFault::Unexpected(_),
                ..
            })
        ));
        assert_eq!(psu.beep(), State::Off);
    }

    #[test]
    fn test_fault_in_query_reply() {
        let mut psu = connect("0101010");
        line(&mut psu).reply("VOUT2?", "Command not allowed");
        let result = psu.read_voltage(Channel::Two);
        assert!(matches!(
            result,
            Err(Error::Device {
                fault: DeviceFault::CommandNotAllowed,
                ..
            })
        ));
    }

    #[test]
    fn test_silent_query() {
        let mut psu = connect("0101010");
        let result = psu.read_current(Channel::One);
        assert!(matches!(
            result,
            Err(Error::Transport(TransportError::NoResponse { .. }))
        ));
    }

    #[test]
    fn test_local_mode() {
        let mut psu = connect("0101010");
        psu.set_remote(false).unwrap();
        assert_eq!(psu.remote(), Some(false));
        assert!(matches!(
            psu.set_output(false),
            Err(Error::Policy(PolicyError::LocalMode))
        ));

        psu.set_remote(true).unwrap();
        psu.set_output(false).unwrap();
        assert_eq!(line(&mut psu).commands(), ["LOCAL", "REMOTE", "OUT0"]);
    }

    #[test]
    fn test_zero() {
        let mut psu = connect("0101010");
        psu.zero().unwrap();
        assert_eq!(
            line(&mut psu).commands(),
            [
                "OUT0",
                "VSET1:0.000",
                "ISET1:0.000",
                "VSET2:0.000",
                "ISET2:0.000"
            ]
        );
        assert_eq!(psu.output(), State::Off);
    }

    #[test]
    fn test_baud_rate() {
        let mut psu = connect("0101010");
        psu.set_baud_rate(BaudRate::_57600).unwrap();
        assert_eq!(psu.baud_rate(), Some(BaudRate::_57600));
        assert_eq!(line(&mut psu).baud_rate(), Some(57_600));
        assert_eq!(line(&mut psu).commands(), ["BAUD1"]);
    }

    #[test]
    fn test_setpoints_are_cached() {
        let mut psu = connect("1111100");
        line(&mut psu).reply("VSET1?", "10.000");

        assert_eq!(
            psu.voltage_setpoint(Channel::One).unwrap(),
            Voltage::new(20.0)
        );
        assert_eq!(
            psu.voltage_setpoint(Channel::One).unwrap(),
            Voltage::new(20.0)
        );
        assert_eq!(line(&mut psu).commands(), ["VSET1?"]);
    }

    #[test]
    fn test_refresh_setpoints() {
        let mut psu = connect("0101010");
        for (command, reply) in [
            ("VSET1?", "5.000"),
            ("ISET1?", "1.000"),
            ("VSET2?", "12.000"),
            ("ISET2?", "0.100"),
        ] {
            line(&mut psu).reply(command, reply);
        }
        psu.refresh_setpoints().unwrap();
        assert_eq!(
            line(&mut psu).commands(),
            ["VSET1?", "ISET1?", "VSET2?", "ISET2?"]
        );

        line(&mut psu).clear_commands();
        assert_eq!(
            psu.current_setpoint(Channel::Two).unwrap(),
            Current::new(0.1)
        );
        psu.set_voltage(Channel::Two, Voltage::new(12.0)).unwrap();
        assert!(line(&mut psu).commands().is_empty());
    }

    #[test]
    fn test_recall() {
        let mut psu = connect("0101010");
        psu.set_current(Channel::One, Current::new(1.5)).unwrap();
        line(&mut psu).reply("STATUS?", "11100100");
        line(&mut psu).clear_commands();

        psu.recall(MemorySlot::M2).unwrap();
        assert_eq!(line(&mut psu).commands(), ["RCL2", "STATUS?"]);
        assert_eq!(psu.tracking(), TrackingMode::Parallel);
        assert_eq!(psu.state().channel(Channel::One).confirmed_current(), None);
    }

    #[test]
    fn test_save() {
        let mut psu = connect("0101010");
        psu.save(MemorySlot::M4).unwrap();
        assert_eq!(line(&mut psu).commands(), ["SAV4"]);
    }

    #[test]
    fn test_refresh_status() {
        let mut psu = connect("0101010");
        line(&mut psu).reply("STATUS?", "1101100");
        let status = psu.refresh_status().unwrap();
        assert_eq!(status.beep, State::On);
        assert_eq!(psu.output(), State::Off);
        assert_eq!(psu.regulation(Channel::One), Some(ControlMode::Cv));
    }

    #[test]
    fn test_release() {
        let psu = connect("0101010");
        let line = psu.release();
        assert!(!line.is_open());
    }
}
