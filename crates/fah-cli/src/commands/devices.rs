//! Device command handlers.

use serde::Serialize;
use tabled::Tabled;

use fah_api::models::{Channel, Device};
use fah_api::rest::SysApClient;
use fah_api::transport::GatewayConfig;

use crate::cli::{DevicesArgs, DevicesCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;

// ── Table rows ──────────────────────────────────────────────────────

#[derive(Tabled)]
struct SerialRow {
    #[tabled(rename = "Serial")]
    serial: String,
}

#[derive(Serialize)]
struct DeviceView {
    serial: String,
    #[serde(flatten)]
    device: Device,
}

fn channel_summary(id: &str, channel: &Channel) -> String {
    let name = channel.display_name.as_deref().unwrap_or("-");
    let function = channel.function_id.as_deref().unwrap_or("-");
    let outputs: Vec<String> = channel
        .outputs
        .iter()
        .map(|(dp, v)| format!("{dp}={}", v.value.as_deref().unwrap_or("-")))
        .collect();
    format!("  {id}  {name} (function {function})  [{}]", outputs.join(", "))
}

fn detail(view: &DeviceView) -> String {
    let d = &view.device;
    let mut lines = vec![
        format!("Serial:    {}", view.serial),
        format!("Name:      {}", d.display_name.as_deref().unwrap_or("-")),
        format!("Interface: {}", d.interface.as_deref().unwrap_or("-")),
        format!("Room:      {}", d.room.as_deref().unwrap_or("-")),
        format!("Floor:     {}", d.floor.as_deref().unwrap_or("-")),
        format!("Channels:  {}", d.channels.len()),
    ];
    for (id, channel) in &d.channels {
        lines.push(channel_summary(id, channel));
    }
    lines.join("\n")
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(
    gateway: &GatewayConfig,
    args: DevicesArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let client = SysApClient::new(gateway)?;

    match args.command {
        DevicesCommand::List => {
            let serials = client.device_list().await?;
            let rendered = output::render_list(
                &global.output,
                &serials,
                |s| SerialRow { serial: s.clone() },
                Clone::clone,
            );
            output::print_output(&rendered, global.quiet);
        }

        DevicesCommand::Show { serial } => {
            let device = client.device(&serial).await?;
            let view = DeviceView { serial, device };
            let rendered =
                output::render_single(&global.output, &view, detail, |v| v.serial.clone());
            output::print_output(&rendered, global.quiet);
        }
    }

    Ok(())
}
