//! Identification of the supply on the other end of a line.

use core::fmt;

use crate::{
    error::{IdentificationError, ParseError, TransportError},
    protocol::Command,
    transport::{Line, Transport},
};

/// The four fields of an `*IDN?` response, e.g. `GW INSTEK,GPD-3303S,SN:12345678,V1.02`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub manufacturer: String,
    pub model: String,
    /// Serial number without the `SN:` prefix.
    pub serial: String,
    /// Firmware version without the leading `V`.
    pub version: String,
}

impl DeviceIdentity {
    pub fn parse(response: &str) -> Result<Self, ParseError> {
        let malformed = || ParseError::Identification {
            text: response.trim().into(),
        };

        let fields: Vec<&str> = response.trim().split(',').map(str::trim).collect();
        let [manufacturer, model, serial, version] = fields[..] else {
            return Err(malformed());
        };
        if manufacturer.is_empty() || model.is_empty() {
            return Err(malformed());
        }

        let serial = serial.split_once(':').map_or(serial, |(_, id)| id).trim();
        let version = version
            .strip_prefix(['V', 'v'])
            .unwrap_or(version)
            .trim();

        Ok(Self {
            manufacturer: manufacturer.into(),
            model: model.into(),
            serial: serial.into(),
            version: version.into(),
        })
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} (SN {}, firmware {})",
            self.manufacturer, self.model, self.serial, self.version
        )
    }
}

/// Supported supplies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Model {
    /// Two programmable channels.
    Gpd2303S,
    /// Two programmable channels and a fixed-voltage third output.
    Gpd3303S,
    /// Four programmable channels.
    Gpd4303S,
}

impl Model {
    /// Pick the model from a model string or hint such as `GPD-3303S`.
    pub fn from_hint(hint: &str) -> Option<Model> {
        let normalized: String = hint
            .chars()
            .filter(|c| *c != '-')
            .map(|c| c.to_ascii_uppercase())
            .collect();
        // 4303S before 3303S before 2303S, none is a substring of another.
        [
            ("GPD4303S", Model::Gpd4303S),
            ("GPD3303S", Model::Gpd3303S),
            ("GPD2303S", Model::Gpd2303S),
        ]
        .into_iter()
        .find(|(name, _)| normalized.contains(name))
        .map(|(_, model)| model)
    }

    /// Check the manufacturer and resolve the model of an identified supply.
    pub fn identify(identity: &DeviceIdentity) -> Result<Model, IdentificationError> {
        if !identity.manufacturer.to_ascii_lowercase().contains("instek") {
            return Err(IdentificationError::Manufacturer(
                identity.manufacturer.clone(),
            ));
        }
        Model::from_hint(&identity.model)
            .ok_or_else(|| IdentificationError::UnsupportedModel(identity.model.clone()))
    }

    /// Physical outputs on the front panel.
    pub const fn channel_count(self) -> u8 {
        match self {
            Model::Gpd2303S => 2,
            Model::Gpd3303S => 3,
            Model::Gpd4303S => 4,
        }
    }

    /// Outputs that accept `VSET`/`ISET`.
    pub const fn programmable_channels(self) -> u8 {
        match self {
            Model::Gpd2303S | Model::Gpd3303S => 2,
            Model::Gpd4303S => 4,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Model::Gpd2303S => "GPD-2303S",
            Model::Gpd3303S => "GPD-3303S",
            Model::Gpd4303S => "GPD-4303S",
        }
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Result of a successful [`probe`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Probe {
    pub model_hint: Model,
    pub identification: DeviceIdentity,
}

/// Ask whatever is on the line to identify itself.
///
/// Returns `Ok(None)` when it answers but is not a supported Instek supply. Transport failures,
/// including silence, are errors.
pub fn probe<S: Line, const L: usize>(
    transport: &mut Transport<S, L>,
) -> Result<Option<Probe>, TransportError<S::Error>> {
    let reply = transport.query(&Command::Identify)?;
    let Ok(identification) = DeviceIdentity::parse(&reply) else {
        log::debug!("not an identification response: {reply:?}");
        return Ok(None);
    };
    match Model::identify(&identification) {
        Ok(model_hint) => Ok(Some(Probe {
            model_hint,
            identification,
        })),
        Err(err) => {
            log::debug!("{err}");
            Ok(None)
        }
    }
}
