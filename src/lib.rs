//! This crate provides an interface for communicating with and controlling the GW Instek GPD series
//! of programmable bench power supplies.
//!
//! Supported PSU models:
//! * GPD-2303S (two channels)
//! * GPD-3303S (two channels and a fixed 2.5/3.3/5 V output)
//! * GPD-4303S (four channels)
//!
//! It uses the line based ASCII command set over the USB virtual serial port. Settings are checked
//! against the tracking mode (independent, series or parallel) before anything is sent, and the
//! last known setpoints are cached so unchanged values are not written again.
//!
//! The serial port used for PSU comms should be configured like so:
//! * Default baud rate: 9600
//! * Data bits: 8
//! * Stop bits: 1
//! * Parity: None
//!
//! | Mode        | Channel 1        | Channel 2     |
//! |-------------|------------------|---------------|
//! | Independent | 30 V, 3 A        | 30 V, 3 A     |
//! | Series      | 60 V, 3 A        | follows ch. 1 |
//! | Parallel    | 30 V, 6 A        | follows ch. 1 |
//!
//! Channels 3 and 4 of the GPD-4303S are independent in every mode: 5 V, 3 A and 5 V, 1 A.

pub mod error;
pub mod identity;
pub mod policy;
pub mod protocol;
pub mod psu;
pub mod state;
pub mod transport;
pub mod types;
pub mod units;

#[cfg(test)]
mod mock_line;

pub use error::{Error, Result};
pub use identity::{DeviceIdentity, Model, Probe, probe};
pub use policy::Settings;
pub use psu::GpdPsu;
pub use transport::{Line, Transport, TransportConfig};
pub use types::{BaudRate, Channel, ControlMode, MemorySlot, State, TrackingMode};
pub use units::{Current, Power, Quantity, Resistance, Voltage};
