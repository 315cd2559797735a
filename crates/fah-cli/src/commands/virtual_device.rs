//! Virtual-device command handlers.

use serde::Serialize;

use fah_api::models::{VirtualDeviceProperties, VirtualDeviceRequest};
use fah_api::rest::SysApClient;
use fah_api::transport::GatewayConfig;

use crate::cli::{GlobalOpts, VirtualDeviceArgs, VirtualDeviceCommand};
use crate::error::CliError;
use crate::output;

#[derive(Serialize)]
struct CreatedView {
    serial: String,
    native_serial: String,
}

pub async fn handle(
    gateway: &GatewayConfig,
    args: VirtualDeviceArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let client = SysApClient::new(gateway)?;

    match args.command {
        VirtualDeviceCommand::Create {
            serial,
            device_type,
            ttl,
            displayname,
            flavor,
            capabilities,
        } => {
            let request = VirtualDeviceRequest {
                device_type,
                properties: VirtualDeviceProperties {
                    ttl: Some(ttl),
                    displayname,
                    flavor,
                    capabilities,
                },
            };

            let native_serial = client.create_virtual_device(&serial, &request).await?;
            let view = CreatedView {
                serial,
                native_serial,
            };
            let rendered = output::render_single(
                &global.output,
                &view,
                |v| format!("Created virtual device {} -> {}", v.serial, v.native_serial),
                |v| v.native_serial.clone(),
            );
            output::print_output(&rendered, global.quiet);
        }
    }

    Ok(())
}
