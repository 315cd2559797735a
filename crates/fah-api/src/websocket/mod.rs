//! Persistent websocket event stream.
//!
//! The gateway pushes state changes over a websocket at
//! `/fhapi/v1/api/ws`. [`EventStream`] keeps that connection alive:
//! it dials with Basic auth, pings on idle, reconnects with bounded
//! exponential backoff, and fans decoded [`DatapointUpdate`]s out to
//! any number of subscribers.
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use fah_api::transport::GatewayConfig;
//! use fah_api::websocket::EventStream;
//! use secrecy::SecretString;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn demo() -> Result<(), fah_api::Error> {
//! let config = GatewayConfig::new("192.168.2.1", "installer", SecretString::from("secret"));
//! let stream = EventStream::new(config);
//! let mut updates = stream.subscribe();
//!
//! tokio::spawn(async move {
//!     while let Ok(update) = updates.recv().await {
//!         println!("{}/{} = {}", update.device, update.channel, update.value);
//!     }
//! });
//!
//! stream.run(Duration::from_secs(30), CancellationToken::new()).await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use crate::error::Error;

mod backoff;
mod dispatch;
mod keepalive;
mod session;
mod supervisor;

pub use dispatch::{DatapointUpdate, InboundEnvelope, SysApUpdate};
pub use session::{Dial, SysApDialer};
pub use supervisor::EventStream;

/// Hook fired for every reported failure: dial errors, read errors,
/// keepalive write failures, payload decode failures. Runs on the hot
/// path and must not block.
pub type ErrorHook = Arc<dyn Fn(&Error) + Send + Sync>;

/// Hook fired once per inbound payload after it has been handled,
/// whether dispatch succeeded or not.
pub type MessageHandledHook = Arc<dyn Fn() + Send + Sync>;
