//! One command, one reply, over a line that is only held open for the exchange.

use core::fmt::Write as _;

use embedded_io::{Error as _, ErrorKind};
use fugit::MillisDurationU32;

use crate::{
    error::TransportError,
    protocol::{Command, Reply},
};

/// The physical connection to a supply.
///
/// Byte transfer comes from [`embedded_io::Read`] and [`embedded_io::Write`]; reads are expected
/// to fail with [`ErrorKind::TimedOut`] once the supply has nothing more to send.
pub trait Line: embedded_io::Read + embedded_io::Write {
    /// Try to open the port. Success is judged by [`Line::is_open`] afterwards.
    fn open(&mut self) -> Result<(), Self::Error>;

    fn is_open(&self) -> bool;

    fn close(&mut self);

    /// Switch the host side to a new baud rate.
    fn set_baud_rate(&mut self, baud: u32) -> Result<(), Self::Error> {
        let _ = baud;
        Ok(())
    }
}

/// Timing of the exchange discipline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportConfig {
    /// Wait between attempts to open the line.
    pub open_backoff: MillisDurationU32,
    /// Wait after a setting command before the next exchange.
    pub settle: MillisDurationU32,
    /// Give up after this many open attempts. `None` waits until the line opens.
    pub open_attempts: Option<u32>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            open_backoff: MillisDurationU32::millis(10),
            settle: MillisDurationU32::millis(70),
            open_attempts: None,
        }
    }
}

impl TransportConfig {
    pub fn with_open_backoff(mut self, backoff: MillisDurationU32) -> Self {
        self.open_backoff = backoff;
        self
    }

    pub fn with_settle(mut self, settle: MillisDurationU32) -> Self {
        self.settle = settle;
        self
    }

    pub fn with_open_attempts(mut self, attempts: u32) -> Self {
        self.open_attempts = Some(attempts);
        self
    }
}

fn pause(duration: MillisDurationU32) {
    let millis = duration.to_millis();
    if millis > 0 {
        std::thread::sleep(std::time::Duration::from_millis(millis.into()));
    }
}

/// Strict request/response over a [`Line`]. `L` bounds the length of a command or reply line.
pub struct Transport<S: Line, const L: usize = 64> {
    line: S,
    config: TransportConfig,
}

type TransportResult<T, S> =
    core::result::Result<T, TransportError<<S as embedded_io::ErrorType>::Error>>;

impl<S: Line, const L: usize> Transport<S, L> {
    pub fn new(line: S, config: TransportConfig) -> Self {
        Self { line, config }
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    pub fn line(&self) -> &S {
        &self.line
    }

    pub fn line_mut(&mut self) -> &mut S {
        &mut self.line
    }

    /// Give the line back, e.g. to probe it for a different device.
    pub fn release(self) -> S {
        self.line
    }

    /// Send a query and return its reply line.
    pub fn query(&mut self, command: &Command) -> TransportResult<String, S> {
        self.exchange(command)?
            .ok_or_else(|| TransportError::NoResponse {
                command: command.to_string(),
            })
    }

    /// Send one command and read back whatever its [`Reply`] kind calls for.
    ///
    /// `Ok(None)` is only returned for commands that do not require a reply, where it means
    /// the supply accepted the command.
    pub fn exchange(&mut self, command: &Command) -> TransportResult<Option<String>, S> {
        let mut frame: heapless::String<L> = heapless::String::new();
        writeln!(frame, "{command}").map_err(|_| TransportError::BufferOverflow)?;

        self.acquire()?;
        log::debug!("-> {command}");
        let result = self.transfer(frame.as_bytes(), command);
        self.line.close();

        match &result {
            Ok(reply) => {
                log::debug!("<- {reply:?}");
                if command.reply() != Reply::Required {
                    pause(self.config.settle);
                }
            }
            Err(err) => log::debug!("<- {err}"),
        }
        result
    }

    /// Block until the line reports open.
    fn acquire(&mut self) -> TransportResult<(), S> {
        let mut attempts = 0u32;
        while !self.line.is_open() {
            if self.config.open_attempts.is_some_and(|max| attempts >= max) {
                return Err(TransportError::LineUnavailable { attempts });
            }
            attempts += 1;
            if let Err(err) = self.line.open() {
                log::trace!("open attempt {attempts} failed: {err:?}");
            }
            if !self.line.is_open() {
                pause(self.config.open_backoff);
            }
        }
        Ok(())
    }

    fn transfer(
        &mut self,
        frame: &[u8],
        command: &Command,
    ) -> TransportResult<Option<String>, S> {
        self.line
            .write_all(frame)
            .map_err(TransportError::SerialError)?;
        self.line.flush().map_err(TransportError::SerialError)?;

        match command.reply() {
            Reply::None => Ok(None),
            Reply::Optional => self.read_line(command),
            Reply::Required => match self.read_line(command)? {
                Some(reply) => Ok(Some(reply)),
                None => Err(TransportError::NoResponse {
                    command: command.to_string(),
                }),
            },
        }
    }

    /// Read up to the first `\n`, or until the supply goes quiet.
    fn read_line(&mut self, command: &Command) -> TransportResult<Option<String>, S> {
        let mut buff: heapless::Vec<u8, L> = heapless::Vec::new();
        let mut temp_buf = [0u8; 16];
        loop {
            match self.line.read(&mut temp_buf) {
                Ok(0) => break,
                Ok(bytes_read) => {
                    let chunk = &temp_buf[..bytes_read];
                    let end = chunk.iter().position(|&b| b == b'\n');
                    let data = &chunk[..end.unwrap_or(chunk.len())];
                    if buff.extend_from_slice(data).is_err() {
                        return Err(TransportError::BufferOverflow);
                    }
                    if end.is_some() {
                        break;
                    }
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == ErrorKind::TimedOut => break,
                Err(e) => return Err(TransportError::SerialError(e)),
            }
        }

        if !buff.is_ascii() {
            return Err(TransportError::Garbled {
                command: command.to_string(),
            });
        }
        let text = core::str::from_utf8(&buff)
            .map_err(|_| TransportError::Garbled {
                command: command.to_string(),
            })?
            .trim();
        Ok((!text.is_empty()).then(|| text.into()))
    }
}
