//! This module is used to define the ASCII command set of the GPD PSUs.
//!
//! Every command is one line terminated by `\n`. Queries end in `?` and always get a reply
//! line. Settings carry their value after a `:` and reply only when the supply rejects them.

use core::fmt;

use crate::{
    types::{BaudRate, Channel, MemorySlot, State, TrackingMode},
    units::{Current, Voltage},
};

/// What the supply sends back after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    /// A reply line always follows. Missing it is an error.
    Required,
    /// A line only follows when the command failed. Silence means success.
    Optional,
    /// Nothing is read back.
    None,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    /// __Q__ - `*IDN?`, e.g. `GW INSTEK,GPD-3303S,SN:12345678,V1.02`.
    Identify,
    /// __Q__ - `STATUS?`, see [`Status`](crate::types::Status).
    Status,
    /// __Q__ - `VSET<n>?`, voltage setting of a channel.
    VoltageSetpoint(Channel),
    /// __Q__ - `ISET<n>?`, current setting of a channel.
    CurrentSetpoint(Channel),
    /// __Q__ - `VOUT<n>?`, measured output voltage.
    OutputVoltage(Channel),
    /// __Q__ - `IOUT<n>?`, measured output current.
    OutputCurrent(Channel),
    /// __W__ - `VSET<n>:<volts>`.
    SetVoltage(Channel, Voltage),
    /// __W__ - `ISET<n>:<amps>`.
    SetCurrent(Channel, Current),
    /// __W__ - `TRACK<0-2>`. The supply switches its output off.
    Track(TrackingMode),
    /// __W__ - `OUT<0|1>`.
    Output(State),
    /// __W__ - `BEEP<0|1>`.
    Beep(State),
    /// __W__ - `REMOTE`, lock the front panel.
    Remote,
    /// __W__ - `LOCAL`, release the front panel.
    Local,
    /// __W__ - `BAUD<0-2>`. Takes effect immediately, so no reply is read.
    Baud(BaudRate),
    /// __W__ - `SAV<1-4>`.
    Save(MemorySlot),
    /// __W__ - `RCL<1-4>`.
    Recall(MemorySlot),
}

impl Command {
    pub const fn reply(&self) -> Reply {
        use Command as C;
        match self {
            C::Identify
            | C::Status
            | C::VoltageSetpoint(_)
            | C::CurrentSetpoint(_)
            | C::OutputVoltage(_)
            | C::OutputCurrent(_) => Reply::Required,
            C::Baud(_) => Reply::None,
            _ => Reply::Optional,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Command as C;
        match self {
            C::Identify => f.write_str("*IDN?"),
            C::Status => f.write_str("STATUS?"),
            C::VoltageSetpoint(ch) => write!(f, "VSET{ch}?"),
            C::CurrentSetpoint(ch) => write!(f, "ISET{ch}?"),
            C::OutputVoltage(ch) => write!(f, "VOUT{ch}?"),
            C::OutputCurrent(ch) => write!(f, "IOUT{ch}?"),
            C::SetVoltage(ch, v) => write!(f, "VSET{ch}:{v}"),
            C::SetCurrent(ch, i) => write!(f, "ISET{ch}:{i}"),
            C::Track(mode) => write!(f, "TRACK{}", mode.code()),
            C::Output(state) => write!(f, "OUT{}", state.code()),
            C::Beep(state) => write!(f, "BEEP{}", state.code()),
            C::Remote => f.write_str("REMOTE"),
            C::Local => f.write_str("LOCAL"),
            C::Baud(baud) => write!(f, "BAUD{}", baud.code()),
            C::Save(slot) => write!(f, "SAV{}", slot.number()),
            C::Recall(slot) => write!(f, "RCL{}", slot.number()),
        }
    }
}

/// Error text reported by the supply in place of a normal reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceFault {
    /// `Data out of range`.
    DataOutOfRange,
    /// `Invalid Character`, also returned for channels the model does not have.
    InvalidCharacter,
    /// `Command not allowed`, e.g. writing channel 2 while tracking.
    CommandNotAllowed,
    /// Any other text where silence was expected.
    Unexpected(String),
}

impl DeviceFault {
    const PHRASES: [(&'static str, DeviceFault); 3] = [
        ("Data out of range", DeviceFault::DataOutOfRange),
        ("Invalid Character", DeviceFault::InvalidCharacter),
        ("Command not allowed", DeviceFault::CommandNotAllowed),
    ];

    /// Look for a known error phrase anywhere in `reply`.
    pub fn detect(reply: &str) -> Option<DeviceFault> {
        Self::PHRASES
            .iter()
            .find(|(phrase, _)| reply.contains(phrase))
            .map(|(_, fault)| fault.clone())
    }

    /// Classify a reply to a command that should have been silent.
    pub fn classify(reply: &str) -> DeviceFault {
        Self::detect(reply).unwrap_or_else(|| DeviceFault::Unexpected(reply.into()))
    }
}

impl fmt::Display for DeviceFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceFault::DataOutOfRange => f.write_str("data out of range"),
            DeviceFault::InvalidCharacter => f.write_str("invalid character"),
            DeviceFault::CommandNotAllowed => f.write_str("command not allowed"),
            DeviceFault::Unexpected(text) => write!(f, "unexpected reply {text:?}"),
        }
    }
}
