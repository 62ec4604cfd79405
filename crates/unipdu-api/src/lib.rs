// unipdu-api: Async Rust client for the UniFi controller endpoints a PDU session needs

pub mod auth;
pub mod error;
pub mod legacy;
pub mod transport;
pub mod websocket;

pub use auth::ControllerPlatform;
pub use error::Error;
pub use legacy::LegacyClient;
pub use transport::{TlsMode, TransportConfig};
pub use websocket::{StreamState, UnifiEvent, WebSocketHandle};
