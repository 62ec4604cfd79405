// ── Host-visible entities ──
//
// The registrar turns store objects into entities; the switch adapter
// exposes each outlet as an on/off switch.

pub mod registrar;
pub mod switch;

use serde::Serialize;

use crate::model::MacAddress;

pub use registrar::{AddEntities, register_platform_add_entities};
pub use switch::{SwitchDescriptor, SwitchEntity, SwitchState, descriptors};

/// Manufacturer reported for every SmartPower device.
pub const MANUFACTURER: &str = "Ubiquiti Networks";

/// Emitted whenever an entity's cached state should be written to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityStateChanged {
    pub unique_id: String,
    pub object_id: String,
    pub is_on: bool,
    pub available: bool,
}

/// Device registry information for the device an entity belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub mac: MacAddress,
    pub name: String,
    pub model: Option<String>,
    pub manufacturer: &'static str,
    pub firmware_version: Option<String>,
}
