//! Proxy-device command handlers.

use fah_api::rest::SysApClient;
use fah_api::transport::GatewayConfig;

use crate::cli::{GlobalOpts, ProxyArgs, ProxyCommand};
use crate::error::CliError;
use crate::output;

pub async fn handle(
    gateway: &GatewayConfig,
    args: ProxyArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let client = SysApClient::new(gateway)?;

    match args.command {
        ProxyCommand::Action {
            class,
            serial,
            action,
        } => {
            client.proxy_device_action(&class, &serial, &action).await?;
            output::print_output(&format!("{class}/{serial}: {action} sent"), global.quiet);
        }
    }

    Ok(())
}
