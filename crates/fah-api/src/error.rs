use thiserror::Error;

/// Top-level error type for the `fah-api` crate.
///
/// Covers every failure mode across both API surfaces: the REST wrappers
/// and the persistent websocket event stream. The event-stream errors are
/// grouped by how the connection supervisor reacts to them: dial failures
/// are retried with backoff, session failures end the current session and
/// trigger a re-dial, and the two terminal variants are the only values
/// [`EventStream::run`](crate::websocket::EventStream::run) ever returns.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// The gateway rejected the Basic-Auth credentials.
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    // ── Transport (REST) ────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// TLS configuration or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    /// Non-success response from the gateway REST API.
    #[error("Gateway API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    // ── Event stream: retryable (dial-level) ────────────────────────
    /// The websocket dial failed (DNS, TCP, TLS, or upgrade).
    /// Retried by the supervisor per the backoff policy.
    #[error("WebSocket connection failed: {0}")]
    Dial(String),

    // ── Event stream: session-fatal ─────────────────────────────────
    /// A websocket read failed; the session ends and the supervisor
    /// re-dials.
    #[error("WebSocket read failed: {0}")]
    Read(String),

    /// A keepalive PING could not be written within its deadline; the
    /// session ends and the supervisor re-dials.
    #[error("Keepalive write failed: {0}")]
    KeepaliveWrite(String),

    // ── Message-local (non-fatal) ───────────────────────────────────
    /// One inbound payload failed to decode. Reported and skipped; the
    /// session continues with the next payload.
    #[error("Payload decode failed: {message}")]
    Decode { message: String, payload: String },

    /// JSON deserialization of a REST response failed, with the raw body
    /// for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    // ── Terminal ────────────────────────────────────────────────────
    /// The reconnection budget is exhausted. Returned by the supervisor
    /// as an operational failure.
    #[error("maximum reconnection attempts exceeded ({attempts}/{max})")]
    ReconnectLimit { attempts: u32, max: u32 },

    /// The caller cancelled the event stream. Returned by the supervisor
    /// but not an operational failure.
    #[error("event stream cancelled")]
    Cancelled,
}

impl Error {
    /// Returns `true` for the graceful-shutdown terminal condition.
    ///
    /// Callers of [`EventStream::run`](crate::websocket::EventStream::run)
    /// must treat a cancelled result as expected; any other error is an
    /// operational failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::Dial(_) | Self::Read(_) | Self::KeepaliveWrite(_) => true,
            _ => false,
        }
    }
}
