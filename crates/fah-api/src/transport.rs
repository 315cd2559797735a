// Shared transport configuration for one System Access Point.
//
// The REST client and the websocket event stream both derive their
// endpoints, TLS behavior, and Basic-Auth header from a `GatewayConfig`,
// so connection parameters live in exactly one place.

use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use url::Url;

use crate::error::Error;

/// Connection parameters for a System Access Point.
///
/// Immutable per connection attempt; owned by the caller and cloned into
/// the clients that need it. Nothing in this crate reads process-wide
/// state -- every component receives its configuration explicitly.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Hostname or IP of the gateway (no scheme, e.g. `192.168.2.1`).
    pub host: String,

    /// Use TLS (`https`/`wss`) when talking to the gateway.
    pub tls: bool,

    /// Skip TLS certificate verification. Only honored when `tls` is
    /// enabled; logged as an explicit warning wherever it takes effect.
    pub insecure: bool,

    /// Basic-Auth username.
    pub username: String,

    /// Basic-Auth password.
    pub password: SecretString,

    /// Request timeout for REST calls.
    pub timeout: Duration,
}

impl GatewayConfig {
    /// Create a config with default transport settings (no TLS, 30s timeout).
    ///
    /// Local gateways commonly serve plain HTTP on the LAN; enable `tls`
    /// explicitly for units behind a TLS-terminating front.
    pub fn new(
        host: impl Into<String>,
        username: impl Into<String>,
        password: SecretString,
    ) -> Self {
        Self {
            host: host.into(),
            tls: false,
            insecure: false,
            username: username.into(),
            password,
            timeout: Duration::from_secs(30),
        }
    }

    /// Enable or disable TLS.
    pub fn with_tls(mut self, tls: bool) -> Self {
        self.tls = tls;
        self
    }

    /// Skip TLS certificate verification (self-signed gateways).
    pub fn with_insecure(mut self, insecure: bool) -> Self {
        self.insecure = insecure;
        self
    }

    /// Override the REST request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    // ── Endpoint construction ────────────────────────────────────────

    /// Base URL for REST calls: `{http|https}://{host}/fhapi/v1/api/rest/`.
    pub fn rest_base_url(&self) -> Result<Url, Error> {
        let scheme = if self.tls { "https" } else { "http" };
        Ok(Url::parse(&format!("{scheme}://{}/fhapi/v1/api/rest/", self.host))?)
    }

    /// Websocket endpoint: `{ws|wss}://{host}/fhapi/v1/api/ws`.
    pub fn ws_url(&self) -> Result<Url, Error> {
        let scheme = if self.tls { "wss" } else { "ws" };
        Ok(Url::parse(&format!("{scheme}://{}/fhapi/v1/api/ws", self.host))?)
    }

    /// `Authorization: Basic base64(username:password)` header value.
    ///
    /// Sent on every REST request and on the websocket upgrade request.
    pub fn basic_auth_header(&self) -> String {
        let raw = format!("{}:{}", self.username, self.password.expose_secret());
        format!("Basic {}", BASE64.encode(raw))
    }

    // ── HTTP client construction ─────────────────────────────────────

    /// Build a `reqwest::Client` carrying the Basic-Auth header as a
    /// default header, honoring the TLS settings.
    pub fn build_http_client(&self) -> Result<reqwest::Client, Error> {
        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&self.basic_auth_header())
            .map_err(|e| Error::Authentication { message: e.to_string() })?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let mut builder = reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(concat!("fah-api/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers);

        if self.tls && self.insecure {
            tracing::warn!(
                host = %self.host,
                "TLS certificate verification disabled -- not recommended"
            );
            builder = builder.danger_accept_invalid_certs(true);
        }

        builder
            .build()
            .map_err(|e| Error::Tls(format!("failed to build HTTP client: {e}")))
    }
}
