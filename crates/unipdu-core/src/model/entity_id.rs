// ── Core identity types ──
//
// MacAddress keys devices in the store; OutletId is the composite
// `{device-mac}_{outlet-index}` key every outlet entity is built around.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

// ── MacAddress ──────────────────────────────────────────────────────

/// MAC address, normalized to lowercase colon-separated format (aa:bb:cc:dd:ee:ff).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MacAddress(String);

impl MacAddress {
    /// Create a normalized MAC address from any common format.
    /// Accepts colon-separated or dash-separated hex.
    pub fn new(raw: impl AsRef<str>) -> Self {
        let normalized = raw.as_ref().trim().to_lowercase().replace('-', ":");
        Self(normalized)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MacAddress {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

/// The device MAC an object id refers to: the id itself for devices, the
/// part before the first `_` for composite outlet ids.
pub fn device_mac_of(object_id: &str) -> MacAddress {
    MacAddress::new(object_id.split_once('_').map_or(object_id, |(mac, _)| mac))
}

// ── OutletId ────────────────────────────────────────────────────────

/// Composite outlet identifier: `{device-mac}_{outlet-index}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutletId {
    pub mac: MacAddress,
    pub index: u32,
}

impl OutletId {
    pub fn new(mac: MacAddress, index: u32) -> Self {
        Self { mac, index }
    }

    /// Host-facing unique id: `{mac}-outlet-{index}`.
    pub fn unique_id(&self) -> String {
        format!("{}-outlet-{}", self.mac, self.index)
    }
}

impl fmt::Display for OutletId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.mac, self.index)
    }
}

impl FromStr for OutletId {
    type Err = CoreError;

    /// Split on the first `_`: everything before is the MAC, everything
    /// after is the outlet index.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CoreError::ValidationFailed {
            message: format!("invalid outlet id {s:?} (expected <mac>_<index>)"),
        };
        let (mac, index) = s.split_once('_').ok_or_else(invalid)?;
        if mac.is_empty() {
            return Err(invalid());
        }
        let index = index.parse().map_err(|_| invalid())?;
        Ok(Self::new(MacAddress::new(mac), index))
    }
}
