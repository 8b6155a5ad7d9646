//! Our error types for the GPD PSUs.

use thiserror::Error;

use crate::{
    protocol::DeviceFault,
    types::{Channel, TrackingMode},
    units::{Dimension, Operation, Quantity},
};

pub type Result<T, I> = core::result::Result<T, Error<I>>;

/// Custom error type for Instek GPD PSU communications.
#[derive(Error, Debug)]
pub enum Error<I: embedded_io::Error> {
    #[error("Transport error: {0}")]
    Transport(TransportError<I>),
    #[error("Device rejected {command:?}: {fault}")]
    Device { command: String, fault: DeviceFault },
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),
    #[error("Policy error: {0}")]
    Policy(#[from] PolicyError),
    #[error("Identification error: {0}")]
    Identification(#[from] IdentificationError),
}

impl<I: embedded_io::Error> From<TransportError<I>> for Error<I> {
    fn from(err: TransportError<I>) -> Self {
        Error::Transport(err)
    }
}

/// Failures of a single command/response exchange.
#[derive(Error, Debug)]
pub enum TransportError<I: embedded_io::Error> {
    #[error("Serial communication error: {0:?}")]
    SerialError(I),
    #[error("No response to {command:?}")]
    NoResponse { command: String },
    #[error("Garbled response to {command:?}")]
    Garbled { command: String },
    #[error("Line still closed after {attempts} open attempts")]
    LineUnavailable { attempts: u32 },
    #[error("Frame does not fit the line buffer")]
    BufferOverflow,
}

/// A device response that could not be interpreted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Invalid {dimension} value {text:?}")]
    Number { dimension: Dimension, text: String },
    #[error("Malformed status response {text:?}")]
    Status { text: String },
    #[error("Unknown tracking bits {bits:?}")]
    Tracking { bits: String },
    #[error("Malformed identification response {text:?}")]
    Identification { text: String },
    #[error("Channel {0} does not exist")]
    Channel(u8),
    #[error("Memory slot {0} does not exist")]
    MemorySlot(u8),
    #[error("Unsupported baud rate {0}")]
    BaudRate(u32),
}

/// Requests that the tracking mode, limits or remote state forbid.
///
/// Always raised before any command is written, so nothing is partially applied.
#[derive(Error, Debug, Clone)]
pub enum PolicyError {
    #[error("channel {channel} not addressable in mode {mode}")]
    NotAddressable { channel: Channel, mode: TrackingMode },
    #[error("limit exceeded: {value} > {ceiling} in mode {mode}")]
    LimitExceeded {
        value: Quantity,
        ceiling: Quantity,
        mode: TrackingMode,
    },
    #[error("negative setpoint {value} on channel {channel}")]
    Negative { channel: Channel, value: Quantity },
    #[error("missing required Quantity: specify Current, Voltage, or Mode")]
    MissingQuantity,
    #[error("supply is in local mode")]
    LocalMode,
}

/// The identification response does not belong to a supported supply.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentificationError {
    #[error("Unexpected manufacturer {0:?}")]
    Manufacturer(String),
    #[error("Unsupported model {0:?}")]
    UnsupportedModel(String),
}

/// Arithmetic between two quantities whose dimensions do not combine.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("cannot {operation} {lhs} and {rhs}")]
pub struct DimensionError {
    pub operation: Operation,
    pub lhs: Dimension,
    pub rhs: Dimension,
}

/// Errors from the dynamic [`Quantity`] operations.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitError {
    #[error(transparent)]
    Dimension(#[from] DimensionError),
    #[error("cannot divide {0} by zero")]
    DivideByZero(Dimension),
}
