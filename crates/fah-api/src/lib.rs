// fah-api: Async Rust client for the free@home System Access Point local API (fhapi/v1)

pub mod error;
pub mod models;
pub mod rest;
pub mod transport;
pub mod websocket;

pub use error::Error;

/// Well-known identifier of the local System Access Point. The local API
/// always reports the gateway itself under the nil UUID.
pub const SYSAP_ID: &str = "00000000-0000-0000-0000-000000000000";
