//! Clap derive structures for the `fahctl` CLI.
//!
//! Defines the complete command tree, global flags, and shared types.

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// fahctl -- CLI for free@home System Access Points
#[derive(Debug, Parser)]
#[command(
    name = "fahctl",
    version,
    about = "Manage a free@home smart-home gateway from the command line",
    long_about = "A CLI for Busch-Jaeger free@home System Access Points.\n\n\
        Talks the local API (fhapi/v1): device inventory, datapoint\n\
        reads and writes, virtual devices, and a live event stream.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Gateway profile to use
    #[arg(long, short = 'p', env = "FAH_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Gateway hostname or IP (overrides profile)
    #[arg(long, short = 'H', env = "FAH_HOST", global = true)]
    pub host: Option<String>,

    /// Basic-Auth username (overrides profile)
    #[arg(long, short = 'u', env = "FAH_USERNAME", global = true)]
    pub username: Option<String>,

    /// Basic-Auth password
    #[arg(long, env = "FAH_PASSWORD", global = true, hide_env = true)]
    pub password: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "FAH_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Talk https/wss to the gateway
    #[arg(long, env = "FAH_TLS", global = true)]
    pub tls: bool,

    /// Accept self-signed TLS certificates
    #[arg(long, short = 'k', env = "FAH_INSECURE", global = true)]
    pub insecure: bool,

    /// Request timeout in seconds
    #[arg(long, env = "FAH_TIMEOUT", default_value = "30", global = true)]
    pub timeout: u64,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Inspect devices known to the gateway
    #[command(alias = "dev", alias = "d")]
    Devices(DevicesArgs),

    /// Read and write datapoints
    #[command(alias = "dp")]
    Datapoint(DatapointArgs),

    /// Stream live datapoint updates from the gateway
    #[command(alias = "watch")]
    Monitor(MonitorArgs),

    /// Manage virtual devices
    #[command(alias = "vdev")]
    VirtualDevice(VirtualDeviceArgs),

    /// Trigger proxy-device actions
    Proxy(ProxyArgs),

    /// Manage CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  DEVICES
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct DevicesArgs {
    #[command(subcommand)]
    pub command: DevicesCommand,
}

#[derive(Debug, Subcommand)]
pub enum DevicesCommand {
    /// List all device serials
    #[command(alias = "ls")]
    List,

    /// Show one device with its channels and datapoints
    Show {
        /// Device serial (e.g. ABB700000001)
        serial: String,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  DATAPOINT
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct DatapointArgs {
    #[command(subcommand)]
    pub command: DatapointCommand,
}

#[derive(Debug, Subcommand)]
pub enum DatapointCommand {
    /// Read the current value of a datapoint
    Get {
        /// Device serial
        serial: String,

        /// Channel identifier (e.g. ch0000)
        channel: String,

        /// Datapoint identifier (e.g. odp0000)
        datapoint: String,
    },

    /// Write a value to a datapoint
    Set {
        /// Device serial
        serial: String,

        /// Channel identifier (e.g. ch0000)
        channel: String,

        /// Datapoint identifier (e.g. idp0000)
        datapoint: String,

        /// Value to write, verbatim (e.g. "1")
        value: String,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  MONITOR
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct MonitorArgs {
    /// Keepalive ping interval in seconds
    #[arg(long, default_value = "30")]
    pub keepalive: u64,

    /// Give up after this many consecutive failed connection attempts
    #[arg(long, default_value = "10")]
    pub max_attempts: u32,

    /// Retry immediately instead of backing off exponentially
    #[arg(long)]
    pub no_backoff: bool,

    /// Only show updates for these device serials (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub devices: Option<Vec<String>>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  VIRTUAL DEVICE
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct VirtualDeviceArgs {
    #[command(subcommand)]
    pub command: VirtualDeviceCommand,
}

#[derive(Debug, Subcommand)]
pub enum VirtualDeviceCommand {
    /// Create (or refresh) a virtual device
    Create {
        /// Caller-chosen serial for the virtual device
        serial: String,

        /// Virtual device type (e.g. SwitchingActuator)
        #[arg(long, required = true)]
        device_type: String,

        /// Time-to-live in seconds; -1 keeps the device until removed
        #[arg(long, default_value = "180", allow_hyphen_values = true)]
        ttl: String,

        /// Display name shown in the free@home app
        #[arg(long)]
        displayname: Option<String>,

        /// Device flavor
        #[arg(long)]
        flavor: Option<String>,

        /// Capability IDs (comma-separated)
        #[arg(long, value_delimiter = ',')]
        capabilities: Option<Vec<u32>>,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  PROXY
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct ProxyArgs {
    #[command(subcommand)]
    pub command: ProxyCommand,
}

#[derive(Debug, Subcommand)]
pub enum ProxyCommand {
    /// Trigger an action on a proxy device
    Action {
        /// Device class (e.g. switch, dimmer)
        class: String,

        /// Proxy device serial
        serial: String,

        /// Action name (e.g. shortpress)
        action: String,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  CONFIG
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Create or update a profile in the config file
    Init {
        /// Profile name
        #[arg(long, default_value = "default")]
        profile: String,

        /// Gateway hostname or IP
        #[arg(long, required = true)]
        host: String,

        /// Basic-Auth username
        #[arg(long, required = true)]
        username: String,

        /// Store the password in plaintext (prefer FAH_PASSWORD)
        #[arg(long)]
        password: Option<String>,

        /// Talk https/wss to this gateway
        #[arg(long)]
        tls: bool,

        /// Accept self-signed TLS certificates
        #[arg(long)]
        insecure: bool,
    },

    /// Display the current resolved configuration
    Show,

    /// Print the config file path
    Path,

    /// List configured profiles
    Profiles,

    /// Set the default profile
    Use {
        /// Profile name to set as default
        name: String,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  COMPLETIONS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
