//! Live event-stream monitor.
//!
//! Runs the persistent websocket session and prints every datapoint
//! update until Ctrl-C. The stream itself reconnects on failure; only an
//! exhausted retry budget ends the command with an error.

use std::sync::Arc;
use std::time::Duration;

use owo_colors::OwoColorize;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use fah_api::Error;
use fah_api::transport::GatewayConfig;
use fah_api::websocket::{DatapointUpdate, EventStream};

use crate::cli::{GlobalOpts, MonitorArgs, OutputFormat};
use crate::error::CliError;
use crate::output;

pub async fn handle(
    gateway: &GatewayConfig,
    args: MonitorArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let stream = EventStream::new(gateway.clone());
    stream.set_max_reconnection_attempts(args.max_attempts);
    stream.set_exponential_backoff_enabled(!args.no_backoff);

    let updates = stream.subscribe();
    let cancel = CancellationToken::new();

    let printer = tokio::spawn(print_updates(
        updates,
        global.output.clone(),
        output::should_color(&global.color),
        global.quiet,
        args.devices.clone(),
    ));

    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("interrupt received, closing event stream");
                cancel.cancel();
            }
        }
    });

    if !global.quiet {
        eprintln!("Monitoring {} (Ctrl-C to stop)...", gateway.host);
    }

    let result = stream
        .run(Duration::from_secs(args.keepalive), cancel.clone())
        .await;

    // The printer exits once the stream (the only sender) is dropped.
    drop(stream);
    let _ = printer.await;

    match result {
        // Ctrl-C is a clean exit, not a failure.
        Err(Error::Cancelled) => Ok(()),
        Err(e) => Err(e.into()),
        Ok(()) => Ok(()),
    }
}

/// Drain the update feed and print each entry in the selected format.
async fn print_updates(
    mut updates: broadcast::Receiver<Arc<DatapointUpdate>>,
    format: OutputFormat,
    color: bool,
    quiet: bool,
    devices: Option<Vec<String>>,
) {
    loop {
        let update = match updates.recv().await {
            Ok(update) => update,
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                tracing::warn!(missed, "update feed lagged, some updates were dropped");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => return,
        };

        if let Some(ref serials) = devices {
            if !serials.iter().any(|s| s == &update.device) {
                continue;
            }
        }
        if quiet {
            continue;
        }

        println!("{}", format_update(&update, &format, color));
    }
}

fn format_update(update: &DatapointUpdate, format: &OutputFormat, color: bool) -> String {
    match format {
        OutputFormat::Json => output::render_json_pretty(update),
        OutputFormat::JsonCompact => output::render_json_compact(update),
        OutputFormat::Table | OutputFormat::Plain => {
            let address = format!("{}/{}/{}", update.device, update.channel, update.datapoint);
            if color {
                format!("{} = {}", address.cyan(), update.value.green())
            } else {
                format!("{address} = {}", update.value)
            }
        }
    }
}
