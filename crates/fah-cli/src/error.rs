//! CLI error types with miette diagnostics.
//!
//! Maps `fah_api::Error` and `fah_config::ConfigError` into user-facing
//! errors with actionable help text.

use miette::Diagnostic;
use thiserror::Error;

/// Exit codes for process termination.
pub mod exit_code {
    pub const SUCCESS: i32 = 0;
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────

    #[error("Could not reach the gateway at {host}")]
    #[diagnostic(
        code(fahctl::connection_failed),
        help(
            "Check that the System Access Point is powered and on the network.\n\
             Host: {host}\n\
             Try: fahctl devices list -H {host} -k"
        )
    )]
    ConnectionFailed {
        host: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("TLS setup failed: {reason}")]
    #[diagnostic(
        code(fahctl::tls_error),
        help(
            "The gateway typically uses a self-signed certificate.\n\
             Use --insecure (-k) together with --tls to accept it."
        )
    )]
    TlsError { reason: String },

    // ── Authentication ───────────────────────────────────────────────

    #[error("Authentication failed")]
    #[diagnostic(
        code(fahctl::auth_failed),
        help(
            "The gateway rejected the credentials.\n\
             Check the username and password for the local API\n\
             (enable local API access in the free@home app under\n\
             'free@home settings > Local API')."
        )
    )]
    AuthFailed,

    #[error("No credentials configured for profile '{profile}'")]
    #[diagnostic(
        code(fahctl::no_credentials),
        help(
            "Set the FAH_PASSWORD environment variable, pass --password,\n\
             or store one with: fahctl config init"
        )
    )]
    NoCredentials { profile: String },

    // ── Resources ────────────────────────────────────────────────────

    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(fahctl::not_found),
        help("Run: fahctl {list_command} to see available {resource_type}s")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    // ── API ──────────────────────────────────────────────────────────

    #[error("Gateway API error ({status}): {message}")]
    #[diagnostic(code(fahctl::api_error))]
    ApiError { status: u16, message: String },

    #[error("Event stream ended: {reason}")]
    #[diagnostic(
        code(fahctl::stream_failed),
        help("Raise --max-attempts or check gateway connectivity, then rerun fahctl monitor.")
    )]
    StreamFailed { reason: String },

    // ── Validation ───────────────────────────────────────────────────

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(fahctl::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────

    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(fahctl::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: fahctl config init"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("Configuration file not found")]
    #[diagnostic(
        code(fahctl::no_config),
        help(
            "Create one with: fahctl config init --host <IP> --username <USER>\n\
             Expected at: {path}"
        )
    )]
    NoConfig { path: String },

    #[error("Configuration error: {0}")]
    #[diagnostic(code(fahctl::config))]
    Config(String),

    // ── Timeout ──────────────────────────────────────────────────────

    #[error("Request timed out after {seconds}s")]
    #[diagnostic(help("Increase timeout with --timeout or check gateway responsiveness."))]
    Timeout { seconds: u64 },

    // ── IO / Serialization ───────────────────────────────────────────

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON payload: {0}")]
    #[diagnostic(code(fahctl::json))]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::TlsError { .. } | Self::StreamFailed { .. } => {
                exit_code::CONNECTION
            }
            Self::AuthFailed | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::NotFound { .. } | Self::ProfileNotFound { .. } => exit_code::NOT_FOUND,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── fah_api::Error → CliError mapping ────────────────────────────────

impl From<fah_api::Error> for CliError {
    fn from(err: fah_api::Error) -> Self {
        use fah_api::Error;

        match err {
            Error::Authentication { .. } => CliError::AuthFailed,

            Error::Transport(e) => {
                if e.is_timeout() {
                    CliError::Timeout { seconds: 0 }
                } else {
                    CliError::ConnectionFailed {
                        host: e
                            .url()
                            .and_then(|u| u.host_str())
                            .unwrap_or("(unknown)")
                            .to_owned(),
                        source: e.into(),
                    }
                }
            }

            Error::Tls(reason) => CliError::TlsError { reason },

            Error::Api { status, message } => CliError::ApiError { status, message },

            Error::InvalidUrl(e) => CliError::Validation {
                field: "host".into(),
                reason: e.to_string(),
            },

            Error::Deserialization { message, .. } | Error::Decode { message, .. } => {
                CliError::ApiError {
                    status: 0,
                    message: format!("unexpected gateway response: {message}"),
                }
            }

            e @ (Error::Dial(_)
            | Error::Read(_)
            | Error::KeepaliveWrite(_)
            | Error::ReconnectLimit { .. }
            | Error::Cancelled) => CliError::StreamFailed {
                reason: e.to_string(),
            },
        }
    }
}

// ── fah_config::ConfigError → CliError mapping ───────────────────────

impl From<fah_config::ConfigError> for CliError {
    fn from(err: fah_config::ConfigError) -> Self {
        use fah_config::ConfigError;

        match err {
            ConfigError::UnknownProfile { profile } => CliError::ProfileNotFound {
                name: profile,
                available: String::new(),
            },
            ConfigError::NoCredentials { profile } => CliError::NoCredentials { profile },
            ConfigError::Io(e) => CliError::Io(e),
            e @ (ConfigError::Serialization(_) | ConfigError::Figment(_)) => {
                CliError::Config(e.to_string())
            }
        }
    }
}
