//! Command dispatch: bridges CLI args -> API calls -> output formatting.

pub mod config_cmd;
pub mod datapoint;
pub mod devices;
pub mod monitor;
pub mod proxy;
pub mod virtual_device;

use fah_api::transport::GatewayConfig;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a gateway-bound command to the appropriate handler.
pub async fn dispatch(
    cmd: Command,
    gateway: &GatewayConfig,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match cmd {
        Command::Devices(args) => devices::handle(gateway, args, global).await,
        Command::Datapoint(args) => datapoint::handle(gateway, args, global).await,
        Command::Monitor(args) => monitor::handle(gateway, args, global).await,
        Command::VirtualDevice(args) => virtual_device::handle(gateway, args, global).await,
        Command::Proxy(args) => proxy::handle(gateway, args, global).await,
        // Config and Completions are handled before dispatch
        Command::Config(_) | Command::Completions(_) => unreachable!(),
    }
}
