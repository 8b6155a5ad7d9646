use std::env;

use inquire::Select;
use instek_gpd::{Channel, Current, GpdPsu, Line, Settings, TrackingMode, TransportConfig, Voltage};
use serialport::SerialPort;

// Configuration constants - adjust these for your setup
const BAUD_RATE: u32 = 9600;
// The PSU only answers errors to settings, so every setting waits out this time out.
const SERIAL_TIMEOUT_MS: u64 = 100;
const OUTPUT_VOLTAGE: f64 = 5.5;
const CURRENT_LIMIT: f64 = 0.1;
const SERIES_VOLTAGE: f64 = 48.0;
const STABILIZATION_DELAY_MS: u64 = 1000;

/// Serial port that is only held open for one exchange at a time.
pub struct PortWrapper {
    name: String,
    baud_rate: u32,
    port: Option<Box<dyn SerialPort>>,
}

impl PortWrapper {
    pub fn new(name: String, baud_rate: u32) -> Self {
        Self {
            name,
            baud_rate,
            port: None,
        }
    }

    fn port(&mut self) -> Result<&mut Box<dyn SerialPort>, IoError> {
        self.port
            .as_mut()
            .ok_or_else(|| IoError(std::io::ErrorKind::NotConnected.into()))
    }
}

#[derive(Debug)]
pub struct IoError(std::io::Error);

impl core::fmt::Display for IoError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for IoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.0)
    }
}

impl From<serialport::Error> for IoError {
    fn from(err: serialport::Error) -> Self {
        IoError(err.into())
    }
}

impl embedded_io::Error for IoError {
    fn kind(&self) -> embedded_io::ErrorKind {
        match self.0.kind() {
            std::io::ErrorKind::NotFound => embedded_io::ErrorKind::NotFound,
            std::io::ErrorKind::PermissionDenied => embedded_io::ErrorKind::PermissionDenied,
            std::io::ErrorKind::NotConnected => embedded_io::ErrorKind::NotConnected,
            std::io::ErrorKind::AddrInUse => embedded_io::ErrorKind::AddrInUse,
            std::io::ErrorKind::BrokenPipe => embedded_io::ErrorKind::BrokenPipe,
            std::io::ErrorKind::InvalidInput => embedded_io::ErrorKind::InvalidInput,
            std::io::ErrorKind::InvalidData => embedded_io::ErrorKind::InvalidData,
            std::io::ErrorKind::TimedOut => embedded_io::ErrorKind::TimedOut,
            std::io::ErrorKind::Interrupted => embedded_io::ErrorKind::Interrupted,
            std::io::ErrorKind::Unsupported => embedded_io::ErrorKind::Unsupported,
            std::io::ErrorKind::OutOfMemory => embedded_io::ErrorKind::OutOfMemory,
            _ => embedded_io::ErrorKind::Other,
        }
    }
}

impl embedded_io::ErrorType for PortWrapper {
    type Error = IoError;
}

impl embedded_io::Read for PortWrapper {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        std::io::Read::read(self.port()?, buf).map_err(IoError)
    }
}

impl embedded_io::Write for PortWrapper {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        std::io::Write::write(self.port()?, buf).map_err(IoError)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        std::io::Write::flush(self.port()?).map_err(IoError)
    }
}

impl Line for PortWrapper {
    fn open(&mut self) -> Result<(), Self::Error> {
        let port = serialport::new(&self.name, self.baud_rate)
            .timeout(std::time::Duration::from_millis(SERIAL_TIMEOUT_MS))
            .open()?;
        self.port = Some(port);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn close(&mut self) {
        self.port = None;
    }

    fn set_baud_rate(&mut self, baud: u32) -> Result<(), Self::Error> {
        self.baud_rate = baud;
        Ok(())
    }
}

fn main() {
    env_logger::init();

    // Get serial port from command line arg or interactive selection
    let port_name = env::args().nth(1).unwrap_or_else(|| {
        // List available serial ports
        let ports = serialport::available_ports().expect("Failed to enumerate serial ports");

        if ports.is_empty() {
            eprintln!("No serial ports found!");
            std::process::exit(1);
        }

        let port_names: Vec<String> = ports.iter().map(|p| p.port_name.clone()).collect();

        // Interactive selection
        Select::new("Select a serial port:", port_names)
            .prompt()
            .expect("Failed to select port")
    });

    println!("Using port: {}", port_name);

    let port = PortWrapper::new(port_name, BAUD_RATE);
    let config = TransportConfig::default().with_open_attempts(100);

    // Create a PSU object, this identifies the supply and reads its status
    let mut psu: GpdPsu<PortWrapper> = GpdPsu::new(port, config).expect("Failed to connect");
    println!("Connected to {}", psu.identity());
    println!("Tracking mode: {}", psu.tracking());

    // Set channel 1 and enable the output in one go
    psu.configure(
        &Settings::new()
            .with_tracking(TrackingMode::Independent)
            .with_voltage(Channel::One, Voltage::new(OUTPUT_VOLTAGE))
            .with_current(Channel::One, Current::new(CURRENT_LIMIT))
            .with_output(true),
    )
    .unwrap();
    println!("Set channel 1 to {OUTPUT_VOLTAGE}V, {CURRENT_LIMIT}A and enabled the output");

    // Wait for output to stabilize
    std::thread::sleep(std::time::Duration::from_millis(STABILIZATION_DELAY_MS));

    let voltage = psu.read_voltage(Channel::One).unwrap();
    let current = psu.read_current(Channel::One).unwrap();
    println!("Measured: {voltage}V, {current}A, {}W", voltage * current);

    // Out of range requests are refused before anything is sent
    if let Err(err) = psu.set_voltage(Channel::One, Voltage::new(31.0)) {
        println!("Refused: {err}");
    }

    // Series mode, channel 1 now takes the total voltage
    psu.set_tracking(TrackingMode::Series).unwrap();
    println!("Terminals: {}", TrackingMode::Series.terminals(true));
    psu.set_voltage(Channel::One, Voltage::new(SERIES_VOLTAGE)).unwrap();
    psu.set_output(true).unwrap();
    std::thread::sleep(std::time::Duration::from_millis(STABILIZATION_DELAY_MS));
    println!(
        "Series output: {}V ({}V to common)",
        psu.read_voltage(Channel::One).unwrap(),
        psu.read_voltage_common().unwrap()
    );

    psu.zero().unwrap();
    psu.set_tracking(TrackingMode::Independent).unwrap();
    println!("Output disabled and zeroed");
}
