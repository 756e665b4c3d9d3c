//! Pulse Watch
//!
//! Command-line subscriber for a Pulse event stream. Prints a status line
//! for every change and reconnects on its own after connection failures.
//!
//! While running, type `r` + Enter to reconnect or `q` + Enter to quit.

use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use pulse_client::{subscribe, HttpTransport, StatusPrinter};
use pulse_core::config::defaults;
use pulse_core::ClientConfig;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

/// Pulse Watch - follow a Pulse event stream
#[derive(Parser, Debug)]
#[command(name = "pulse-watch")]
#[command(version, about, long_about = None)]
struct Args {
    /// URL of the event stream endpoint
    #[arg(short, long, env = "PULSE_URL", default_value = defaults::DEFAULT_ENDPOINT)]
    url: String,

    /// Delay before reconnecting after a failure, in milliseconds
    #[arg(short, long, env = "PULSE_RETRY_DELAY_MS", default_value_t = defaults::DEFAULT_RETRY_DELAY_MS)]
    retry_delay_ms: u64,

    /// Output format: text or json
    #[arg(short, long, default_value = "text")]
    format: OutputFormat,
}

#[derive(Debug, Clone, clap::ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging; stdout is reserved for status lines
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = ClientConfig::new()
        .with_endpoint(args.url)
        .with_retry_delay(Duration::from_millis(args.retry_delay_ms));
    let printer = StatusPrinter::new(matches!(args.format, OutputFormat::Json));

    match run(config, printer).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: ClientConfig, printer: StatusPrinter) -> pulse_core::Result<()> {
    tracing::info!("Subscribing to {}", config.endpoint);

    let subscription = subscribe(HttpTransport::new()?, config)?;
    let mut status = subscription.watch();
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    printer.print(&subscription.status());

    loop {
        tokio::select! {
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = status.borrow_and_update().clone();
                printer.print(&snapshot);
            }
            line = stdin.next_line(), if stdin_open => {
                match line {
                    Ok(Some(line)) => match line.trim() {
                        "r" => subscription.request_reconnect(),
                        "q" => break,
                        "" => {}
                        other => eprintln!("Unknown command '{other}' (r = reconnect, q = quit)"),
                    },
                    Ok(None) => stdin_open = false,
                    Err(e) => {
                        tracing::warn!("Error reading stdin: {}", e);
                        stdin_open = false;
                    }
                }
            }
            _ = &mut ctrl_c => {
                tracing::info!("Interrupted");
                break;
            }
        }
    }

    subscription.stop().await;
    Ok(())
}
