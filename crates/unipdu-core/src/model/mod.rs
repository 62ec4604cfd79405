// ── Domain model ──

pub mod device;
pub mod entity_id;
pub mod event;

pub use device::{DeviceState, Outlet, PduDevice};
pub use entity_id::{MacAddress, OutletId, device_mac_of};
pub use event::Event;
