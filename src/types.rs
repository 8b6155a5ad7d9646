//! This module contains types shared by the GPD command set and the cached device state.

use core::fmt;

use modular_bitfield::prelude::*;
use strum_macros::{Display, EnumIter};

use crate::error::ParseError;

/// How channels 1 and 2 are wired together inside the supply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, Display)]
#[repr(u8)]
pub enum TrackingMode {
    /// Channels 1 and 2 are set independently.
    Independent = 0,
    /// Channels 1 and 2 in series, summing their voltage. Addressed through channel 1.
    Series = 1,
    /// Channels 1 and 2 in parallel, summing their current. Addressed through channel 1.
    Parallel = 2,
}

impl TrackingMode {
    /// Value used by the `TRACK` command.
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Front panel terminals in use for this mode, left to right.
    ///
    /// `common` applies to series mode, where the centre terminal is the common reference.
    pub const fn terminals(self, common: bool) -> &'static str {
        match self {
            TrackingMode::Independent => "(2-) (2+) (G) (1-) (1+) (3-) (3+)",
            TrackingMode::Series if common => "(1-) ( ) ( ) (C) (1+) (3-) (3+)",
            TrackingMode::Series => "(1-) ( ) ( ) ( ) (1+) (3-) (3+)",
            TrackingMode::Parallel => "( ) ( ) ( ) (1-) (1+) (3-) (3+)",
        }
    }
}

/// Used to be less ambiguous and whether something is on or off.
#[repr(u8)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum State {
    /// Disabled.
    #[default]
    Off = 0x00,
    /// Enabled.
    On = 0x01,
}

impl State {
    /// Digit used by the `OUT` and `BEEP` commands.
    pub const fn code(self) -> u8 {
        self as u8
    }
}

impl From<State> for bool {
    fn from(value: State) -> Self {
        match value {
            State::Off => false,
            State::On => true,
        }
    }
}

impl From<bool> for State {
    fn from(value: bool) -> Self {
        match value {
            true => State::On,
            false => State::Off,
        }
    }
}

/// Represents the two possible regulation modes of a channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ControlMode {
    /// Constant current regulation mode.
    Cc,
    /// Constant voltage regulation mode.
    #[default]
    Cv,
}

impl From<bool> for ControlMode {
    /// The status word reports `1` for constant voltage.
    fn from(cv: bool) -> Self {
        if cv { ControlMode::Cv } else { ControlMode::Cc }
    }
}

/// Baud rates selectable with the `BAUD` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter)]
#[repr(u8)]
pub enum BaudRate {
    _115200 = 0,
    _57600 = 1,
    /// This is the default PSU baud rate.
    _9600 = 2,
}

impl BaudRate {
    /// Value used by the `BAUD` command.
    pub const fn code(self) -> u8 {
        self as u8
    }

    pub const fn bits_per_second(self) -> u32 {
        match self {
            BaudRate::_115200 => 115_200,
            BaudRate::_57600 => 57_600,
            BaudRate::_9600 => 9_600,
        }
    }
}

impl TryFrom<u32> for BaudRate {
    type Error = ParseError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            115_200 => Ok(BaudRate::_115200),
            57_600 => Ok(BaudRate::_57600),
            9_600 => Ok(BaudRate::_9600),
            other => Err(ParseError::BaudRate(other)),
        }
    }
}

/// Output channel, numbered as on the front panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, EnumIter)]
#[repr(u8)]
pub enum Channel {
    One = 1,
    Two = 2,
    Three = 3,
    Four = 4,
}

impl Channel {
    pub const fn number(self) -> u8 {
        self as u8
    }

    /// Zero based index, for per-channel storage.
    pub const fn index(self) -> usize {
        self as usize - 1
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.number())
    }
}

impl TryFrom<u8> for Channel {
    type Error = ParseError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Channel::One),
            2 => Ok(Channel::Two),
            3 => Ok(Channel::Three),
            4 => Ok(Channel::Four),
            other => Err(ParseError::Channel(other)),
        }
    }
}

/// Panel memory used by `SAV` and `RCL`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter)]
#[repr(u8)]
pub enum MemorySlot {
    M1 = 1,
    M2 = 2,
    M3 = 3,
    M4 = 4,
}

impl MemorySlot {
    pub const fn number(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for MemorySlot {
    type Error = ParseError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(MemorySlot::M1),
            2 => Ok(MemorySlot::M2),
            3 => Ok(MemorySlot::M3),
            4 => Ok(MemorySlot::M4),
            other => Err(ParseError::MemorySlot(other)),
        }
    }
}

/// `STATUS?` digits packed one per bit, digit 0 in the least significant bit.
///
/// Digits 6 and 7 (baud rate) are not reliable and are never decoded.
#[bitfield]
#[derive(Debug, Clone, Copy)]
struct StatusRegister {
    ch1_cv: bool,
    ch2_cv: bool,
    tracking: B2,
    beep: bool,
    output: bool,
    #[skip]
    __: B2,
}

/// Number of leading status digits we decode.
const STATUS_DIGITS: usize = 6;

/// Decoded `STATUS?` response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status {
    /// Regulation mode of channels 1 and 2.
    pub regulation: [ControlMode; 2],
    pub tracking: TrackingMode,
    pub beep: State,
    pub output: State,
}

impl Status {
    /// Parse the status response, e.g. `"0101010"`.
    pub fn parse(response: &str) -> Result<Self, ParseError> {
        let text = response.trim();
        let malformed = || ParseError::Status { text: text.into() };

        let digits = text.as_bytes();
        if digits.len() < STATUS_DIGITS {
            return Err(malformed());
        }
        let mut packed = 0u8;
        for (bit, digit) in digits[..STATUS_DIGITS].iter().enumerate() {
            match digit {
                b'0' => {}
                b'1' => packed |= 1 << bit,
                _ => return Err(malformed()),
            }
        }
        let register = StatusRegister::from_bytes([packed]);

        // Digit 2 is the low bit: "01" => 0b10.
        let tracking = match register.tracking() {
            0b10 => TrackingMode::Independent,
            0b11 => TrackingMode::Series,
            0b01 => TrackingMode::Parallel,
            _ => {
                return Err(ParseError::Tracking {
                    bits: text[2..4].into(),
                });
            }
        };

        Ok(Status {
            regulation: [register.ch1_cv().into(), register.ch2_cv().into()],
            tracking,
            beep: register.beep().into(),
            output: register.output().into(),
        })
    }
}
