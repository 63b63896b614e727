//! A BLE motor-control hub, identified by name and hardware address.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::drive::DriveCommand;
use crate::error::ValidationError;

/// 48-bit BLE hardware address, displayed as lowercase `xx:xx:xx:xx:xx:xx`.
///
/// Parsing accepts either case, so `00:07:80:D0:47:43` and
/// `00:07:80:d0:47:43` are the same hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HubAddress([u8; 6]);

impl HubAddress {
    /// Wrap raw address bytes (most significant byte first).
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    /// Access the raw address bytes.
    #[must_use]
    pub const fn into_bytes(self) -> [u8; 6] {
        self.0
    }
}

impl fmt::Display for HubAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

impl FromStr for HubAddress {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ValidationError::InvalidAddress(s.to_string());

        let mut bytes = [0u8; 6];
        let mut parts = s.split(':');
        for byte in &mut bytes {
            let part = parts.next().ok_or_else(invalid)?;
            if part.len() != 2 || !part.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(invalid());
            }
            *byte = u8::from_str_radix(part, 16).map_err(|_| invalid())?;
        }
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(Self(bytes))
    }
}

impl TryFrom<String> for HubAddress {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<HubAddress> for String {
    fn from(address: HubAddress) -> Self {
        address.to_string()
    }
}

/// Lifecycle state of a hub connection.
///
/// The machine cycles forever: `Idle → Discovering → Discovered →
/// Connecting → Connected → Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HubState {
    #[default]
    Idle,
    Discovering,
    Discovered,
    Connecting,
    Connected,
}

impl fmt::Display for HubState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Discovering => f.write_str("discovering"),
            Self::Discovered => f.write_str("discovered"),
            Self::Connecting => f.write_str("connecting"),
            Self::Connected => f.write_str("connected"),
        }
    }
}

/// Static description of a hub, built once from configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubSpec {
    pub name: String,
    pub address: HubAddress,
    /// Drive applied as soon as the hub connects, if any.
    pub initial_drive: Option<DriveCommand>,
}

impl HubSpec {
    /// Create a builder for constructing a [`HubSpec`].
    #[must_use]
    pub fn builder() -> HubSpecBuilder {
        HubSpecBuilder::default()
    }

    /// Whether an advertisement with the given address and name belongs to
    /// this hub. The address is authoritative; the advertised name is a
    /// fallback for platforms that hide the real address.
    #[must_use]
    pub fn matches(&self, address: HubAddress, name: Option<&str>) -> bool {
        address == self.address || name.is_some_and(|name| name == self.name)
    }

    /// Check domain invariants.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyHubName`] when `name` is blank.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyHubName);
        }
        Ok(())
    }
}

/// Step-by-step builder for [`HubSpec`].
#[derive(Debug, Default)]
pub struct HubSpecBuilder {
    name: Option<String>,
    address: Option<String>,
    initial_drive: Option<DriveCommand>,
}

impl HubSpecBuilder {
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    #[must_use]
    pub fn initial_drive(mut self, drive: DriveCommand) -> Self {
        self.initial_drive = Some(drive);
        self
    }

    /// Consume the builder, validate, and return a [`HubSpec`].
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] if the name is missing or blank, or the
    /// address is missing or malformed.
    pub fn build(self) -> Result<HubSpec, ValidationError> {
        let address = self.address.unwrap_or_default().parse()?;
        let spec = HubSpec {
            name: self.name.unwrap_or_default(),
            address,
            initial_drive: self.initial_drive,
        };
        spec.validate()?;
        Ok(spec)
    }
}

/// Check that no two hubs share an address.
///
/// # Errors
///
/// Returns [`ValidationError::DuplicateHub`] naming the first repeated
/// address.
pub fn ensure_unique(specs: &[HubSpec]) -> Result<(), ValidationError> {
    for (index, spec) in specs.iter().enumerate() {
        if specs[..index].iter().any(|other| other.address == spec.address) {
            return Err(ValidationError::DuplicateHub(spec.address));
        }
    }
    Ok(())
}
