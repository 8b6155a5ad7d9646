//! We use this mocking module in unit tests to emulate a GPD supply on the other end of a line.

use std::collections::HashMap;

use fugit::MillisDurationU32;
use thiserror::Error;

use crate::transport::{Line, TransportConfig};

/// Our mock type used to emulate a supply behind a serial port.
///
/// Every complete line written is recorded as a command. If a reply has been scripted for that
/// command it becomes readable, otherwise reads time out like a silent supply.
pub struct MockLine {
    open: bool,
    /// Number of upcoming `open` calls that should fail.
    failing_opens: u32,
    open_calls: u32,
    close_calls: u32,
    /// Bytes of the command currently being written.
    partial: heapless::Vec<u8, 256>,
    /// Every byte written to this mock.
    write_buffer: Vec<u8>,
    commands: Vec<String>,
    replies: HashMap<String, String>,
    read_buffer: heapless::Vec<u8, 256>,
    read_position: usize,
    baud_rate: Option<u32>,
    should_error_on_write: bool,
    should_error_on_read: bool,
}

#[derive(Debug, Error)]
pub enum MockLineError {
    /// Nothing more to read.
    #[error("timed out")]
    Timeout,
    #[error("buffer overflow")]
    BufferOverflow,
    #[error("line is closed")]
    NotConnected,
    #[error("port busy")]
    Busy,
    /// Generic simulated error for testing
    #[error("simulated error")]
    SimulatedError,
}

impl embedded_io::Error for MockLineError {
    fn kind(&self) -> embedded_io::ErrorKind {
        match self {
            MockLineError::Timeout => embedded_io::ErrorKind::TimedOut,
            MockLineError::BufferOverflow => embedded_io::ErrorKind::OutOfMemory,
            MockLineError::NotConnected => embedded_io::ErrorKind::NotConnected,
            MockLineError::Busy => embedded_io::ErrorKind::AddrInUse,
            MockLineError::SimulatedError => embedded_io::ErrorKind::Other,
        }
    }
}

impl embedded_io::ErrorType for MockLine {
    type Error = MockLineError;
}

impl embedded_io::Write for MockLine {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        if self.should_error_on_write {
            return Err(MockLineError::SimulatedError);
        }
        if !self.open {
            return Err(MockLineError::NotConnected);
        }

        for &byte in buf {
            self.write_buffer.push(byte);
            if byte == b'\n' {
                let command = String::from_utf8_lossy(&self.partial).into_owned();
                self.partial.clear();
                self.load_reply(&command)?;
                self.commands.push(command);
            } else {
                self.partial
                    .push(byte)
                    .map_err(|_| MockLineError::BufferOverflow)?;
            }
        }

        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        if self.should_error_on_write {
            return Err(MockLineError::SimulatedError);
        }
        Ok(())
    }
}

impl embedded_io::Read for MockLine {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        if self.should_error_on_read {
            return Err(MockLineError::SimulatedError);
        }
        if !self.open {
            return Err(MockLineError::NotConnected);
        }
        if self.read_position >= self.read_buffer.len() {
            return Err(MockLineError::Timeout);
        }

        let available = &self.read_buffer[self.read_position..];
        let bytes_to_read = core::cmp::min(buf.len(), available.len());
        buf[..bytes_to_read].copy_from_slice(&available[..bytes_to_read]);
        self.read_position += bytes_to_read;
        Ok(bytes_to_read)
    }
}

impl Line for MockLine {
    fn open(&mut self) -> Result<(), Self::Error> {
        self.open_calls += 1;
        if self.failing_opens > 0 {
            self.failing_opens -= 1;
            return Err(MockLineError::Busy);
        }
        self.open = true;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn close(&mut self) {
        self.close_calls += 1;
        self.open = false;
        // Unread bytes are lost with the port.
        self.read_buffer.clear();
        self.read_position = 0;
    }

    fn set_baud_rate(&mut self, baud: u32) -> Result<(), Self::Error> {
        self.baud_rate = Some(baud);
        Ok(())
    }
}

impl MockLine {
    /// Create a new, closed, MockLine with no scripted replies.
    pub fn new() -> Self {
        Self {
            open: false,
            failing_opens: 0,
            open_calls: 0,
            close_calls: 0,
            partial: heapless::Vec::new(),
            write_buffer: Vec::new(),
            commands: Vec::new(),
            replies: HashMap::new(),
            read_buffer: heapless::Vec::new(),
            read_position: 0,
            baud_rate: None,
            should_error_on_write: false,
            should_error_on_read: false,
        }
    }

    /// Transport timing without any waiting.
    pub fn config() -> TransportConfig {
        TransportConfig::default()
            .with_open_backoff(MillisDurationU32::millis(0))
            .with_settle(MillisDurationU32::millis(0))
    }

    /// A mock answering identification and status like a GPD-3303S in independent mode,
    /// output off and beep on.
    pub fn gpd_3303s() -> Self {
        let mut line = Self::new();
        line.reply("*IDN?", "GW INSTEK,GPD-3303S,SN:12345678,V1.02");
        line.reply("STATUS?", "11011000");
        line
    }

    /// Reply with `response` every time `command` is written.
    pub fn reply(&mut self, command: &str, response: &str) {
        self.replies.insert(command.into(), response.into());
    }

    /// Make the next `count` calls to `open` fail.
    pub fn fail_opens(&mut self, count: u32) {
        self.failing_opens = count;
    }

    /// Every command written so far, without line terminators.
    pub fn commands(&self) -> &[String] {
        &self.commands
    }

    /// Forget the recorded commands and written bytes.
    pub fn clear_commands(&mut self) {
        self.commands.clear();
        self.write_buffer.clear();
    }

    /// Get a reference to the data that was written to this mock line.
    pub fn written_data(&self) -> &[u8] {
        &self.write_buffer
    }

    pub fn open_calls(&self) -> u32 {
        self.open_calls
    }

    pub fn close_calls(&self) -> u32 {
        self.close_calls
    }

    pub fn baud_rate(&self) -> Option<u32> {
        self.baud_rate
    }

    /// Configure whether write operations should fail with an error
    pub fn set_write_error(&mut self, should_error: bool) {
        self.should_error_on_write = should_error;
    }

    /// Configure whether read operations should fail with an error
    pub fn set_read_error(&mut self, should_error: bool) {
        self.should_error_on_read = should_error;
    }

    fn load_reply(&mut self, command: &str) -> Result<(), MockLineError> {
        self.read_buffer.clear();
        self.read_position = 0;
        if let Some(reply) = self.replies.get(command) {
            for &byte in reply.as_bytes().iter().chain(b"\n") {
                self.read_buffer
                    .push(byte)
                    .map_err(|_| MockLineError::BufferOverflow)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_io::{Error, Read, Write};

    #[test]
    fn test_new_mock_line() {
        let mock = MockLine::new();
        assert!(mock.written_data().is_empty());
        assert!(!mock.is_open());
        assert_eq!(mock.open_calls(), 0);
    }

    #[test]
    fn test_write_requires_open() {
        let mut mock = MockLine::new();
        let result = mock.write(b"OUT1\n");
        assert!(matches!(result, Err(MockLineError::NotConnected)));
    }

    #[test]
    fn test_commands_split_on_newline() {
        let mut mock = MockLine::new();
        mock.open().unwrap();
        mock.write(b"VSET1:").unwrap();
        mock.write(b"1.000\nOUT1\n").unwrap();
        assert_eq!(mock.commands(), ["VSET1:1.000", "OUT1"]);
        assert_eq!(mock.written_data(), b"VSET1:1.000\nOUT1\n");
    }

    #[test]
    fn test_scripted_reply() {
        let mut mock = MockLine::new();
        mock.reply("VOUT1?", "5.000V");
        mock.open().unwrap();
        mock.write(b"VOUT1?\n").unwrap();

        let mut buffer = [0u8; 4];
        assert_eq!(mock.read(&mut buffer).unwrap(), 4);
        assert_eq!(&buffer, b"5.00");
        assert_eq!(mock.read(&mut buffer).unwrap(), 3);
        assert_eq!(&buffer[..3], b"0V\n");
        assert!(matches!(mock.read(&mut buffer), Err(MockLineError::Timeout)));
    }

    #[test]
    fn test_unscripted_command_times_out() {
        let mut mock = MockLine::new();
        mock.open().unwrap();
        mock.write(b"OUT1\n").unwrap();

        let mut buffer = [0u8; 8];
        let err = mock.read(&mut buffer).unwrap_err();
        assert!(matches!(err.kind(), embedded_io::ErrorKind::TimedOut));
    }

    #[test]
    fn test_close_drops_unread_reply() {
        let mut mock = MockLine::new();
        mock.reply("STATUS?", "0101010");
        mock.open().unwrap();
        mock.write(b"STATUS?\n").unwrap();
        mock.close();
        mock.open().unwrap();

        let mut buffer = [0u8; 8];
        assert!(mock.read(&mut buffer).is_err());
        assert_eq!(mock.close_calls(), 1);
    }

    #[test]
    fn test_failing_opens() {
        let mut mock = MockLine::new();
        mock.fail_opens(2);
        assert!(mock.open().is_err());
        assert!(mock.open().is_err());
        assert!(mock.open().is_ok());
        assert!(mock.is_open());
        assert_eq!(mock.open_calls(), 3);
    }

    #[test]
    fn test_error_flags_toggle() {
        let mut mock = MockLine::new();
        mock.open().unwrap();

        mock.set_write_error(true);
        assert!(mock.write(b"test\n").is_err());
        assert!(mock.flush().is_err());

        mock.set_write_error(false);
        assert!(mock.write(b"test\n").is_ok());

        mock.set_read_error(true);
        let mut buffer = [0u8; 10];
        assert!(matches!(
            mock.read(&mut buffer),
            Err(MockLineError::SimulatedError)
        ));
    }

    #[test]
    fn test_error_kinds() {
        assert!(matches!(
            MockLineError::Timeout.kind(),
            embedded_io::ErrorKind::TimedOut
        ));
        assert!(matches!(
            MockLineError::BufferOverflow.kind(),
            embedded_io::ErrorKind::OutOfMemory
        ));
        assert!(matches!(
            MockLineError::SimulatedError.kind(),
            embedded_io::ErrorKind::Other
        ));
    }
}
