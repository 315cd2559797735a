//! Datapoint read/write handlers.

use serde::Serialize;

use fah_api::rest::SysApClient;
use fah_api::transport::GatewayConfig;

use crate::cli::{DatapointArgs, DatapointCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;

#[derive(Serialize)]
struct DatapointView {
    serial: String,
    channel: String,
    datapoint: String,
    values: Vec<String>,
}

pub async fn handle(
    gateway: &GatewayConfig,
    args: DatapointArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let client = SysApClient::new(gateway)?;

    match args.command {
        DatapointCommand::Get {
            serial,
            channel,
            datapoint,
        } => {
            let values = client.get_datapoint(&serial, &channel, &datapoint).await?;
            if values.is_empty() {
                return Err(CliError::NotFound {
                    resource_type: "datapoint".into(),
                    identifier: format!("{serial}.{channel}.{datapoint}"),
                    list_command: format!("devices show {serial}"),
                });
            }

            let view = DatapointView {
                serial,
                channel,
                datapoint,
                values,
            };
            let rendered = output::render_single(
                &global.output,
                &view,
                |v| {
                    v.values
                        .iter()
                        .map(|value| {
                            format!("{}/{}/{} = {value}", v.serial, v.channel, v.datapoint)
                        })
                        .collect::<Vec<_>>()
                        .join("\n")
                },
                |v| v.values.join("\n"),
            );
            output::print_output(&rendered, global.quiet);
        }

        DatapointCommand::Set {
            serial,
            channel,
            datapoint,
            value,
        } => {
            client
                .set_datapoint(&serial, &channel, &datapoint, &value)
                .await?;
            output::print_output(
                &format!("{serial}/{channel}/{datapoint} <- {value}"),
                global.quiet,
            );
        }
    }

    Ok(())
}
