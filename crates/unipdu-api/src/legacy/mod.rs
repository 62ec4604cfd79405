// Legacy API client modules
//
// Hand-written client for the UniFi controller's legacy (non-OpenAPI) endpoints
// a PDU session needs: login, sites, site self-description, device listing,
// and the outlet relay override. Responses use the standard
// `{ meta: { rc, msg }, data: [...] }` envelope.

pub mod auth;
pub mod client;
pub mod devices;
pub mod models;
pub mod sites;

pub use client::LegacyClient;
