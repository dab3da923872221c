//! Notification monitor - prints every C2SIM notification to the console.
//!
//! This demo shows:
//! - Loading a `ClientConfig` from JSON
//! - Registering display subscribers through a `DisplayGate`
//! - Connecting over TCP and waiting for the receive loop to end
//!
//! # Running
//!
//! ```text
//! cargo run --example notify_monitor -- localhost:61613 [config.json]
//! ```
//!
//! Logs go to stderr; notifications go to stdout.

use c2sim_client::session::{display_handlers, DisplayGate};
use c2sim_client::{ClientConfig, NotificationClient};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let mut args = std::env::args().skip(1);
    let addr = args.next().unwrap_or_else(|| "localhost:61613".to_string());
    let config = match args.next() {
        Some(path) => ClientConfig::load(path)?,
        None => ClientConfig::default(),
    };

    let gate = DisplayGate::stdout();
    let client = display_handlers(NotificationClient::builder().config(config), &gate)
        .on_unrecognized({
            let gate = gate.clone();
            move |frame| {
                gate.write_line(&format!(
                    "Unclassified notification ({}): {}",
                    frame.selector(),
                    frame.body()
                ))?;
                Ok(())
            }
        })
        .build()?;

    gate.write_line(&format!("Connecting to {}...", addr))?;
    client.connect_tcp(addr.as_str()).await?;
    gate.write_line(&format!(
        "Subscribed to {}, press Ctrl-C to exit",
        client.config().destination
    ))?;

    tokio::select! {
        _ = client.wait_for_shutdown() => {
            gate.write_line("Connection ended")?;
        }
        _ = tokio::signal::ctrl_c() => {
            client.disconnect().await?;
        }
    }

    Ok(())
}
