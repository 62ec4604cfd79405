//! Session management and switch entities for UniFi SmartPower PDUs.
//!
//! This crate sits between `unipdu-api` and a host (the `unipdu` CLI, or
//! anything else that manages entity lifecycles):
//!
//! - **[`Session`]**: one live controller connection. Logs in, resolves
//!   the site, loads devices into the [`DataStore`], relays the push-event
//!   stream, sweeps stale heartbeats and reconnects on a fixed delay.
//!
//! - **[`DataStore`]**: reactive per-kind collections (`DashMap` + `watch`
//!   snapshot + `broadcast` item events) for devices and outlets.
//!
//! - **Entities** ([`entity`]): a [`SwitchDescriptor`] table describes how
//!   store objects become switches; [`register_platform_add_entities`]
//!   creates exactly one [`SwitchEntity`] per eligible object.
//!
//! - **[`Integration`]**: host lifecycle glue. `setup` → `update_options`
//!   → `unload`.
//!
//! - **[`ControllerClient`]**: the seam to the controller. The real
//!   implementation is [`LegacyControllerClient`].

pub mod client;
pub mod config;
pub mod convert;
pub mod dispatch;
pub mod entity;
pub mod error;
pub mod integration;
pub mod model;
pub mod session;
pub mod store;

// ── Primary re-exports ──────────────────────────────────────────────
pub use client::{ControllerClient, DeviceRequest, EventStream, LegacyControllerClient};
pub use config::{
    ConfigEntry, DEFAULT_SITE, EntryData, EntryOptions, SessionConfig, TlsVerification,
};
pub use dispatch::{Dispatcher, Signal};
pub use entity::{
    AddEntities, DeviceInfo, EntityStateChanged, SwitchDescriptor, SwitchEntity, SwitchState,
    descriptors, register_platform_add_entities,
};
pub use error::{CoreError, SetupError};
pub use integration::Integration;
pub use session::{ConnectionState, Session, SiteInfo};
pub use store::{DataStore, ItemAction, ItemEvent, ObjectKind};

pub use model::{DeviceState, Event, MacAddress, Outlet, OutletId, PduDevice};
