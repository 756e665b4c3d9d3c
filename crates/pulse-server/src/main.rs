//! Pulse Server
//!
//! Command-line entry point for the Pulse event stream server.
//! Every client connected to the events endpoint receives one event
//! immediately and one per interval until it disconnects.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use pulse_core::config::defaults;
use pulse_core::{RandomProducer, ServerConfig};
use tracing_subscriber::EnvFilter;

/// Pulse - periodic updates over Server-Sent Events
#[derive(Parser, Debug)]
#[command(name = "pulse-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Interface to bind
    #[arg(long, env = "PULSE_HOST", default_value = defaults::DEFAULT_BIND_HOST)]
    host: String,

    /// Port to listen on
    #[arg(short, long, env = "PULSE_PORT", default_value_t = defaults::DEFAULT_PORT)]
    port: u16,

    /// Path of the event stream endpoint
    #[arg(long, env = "PULSE_EVENTS_PATH", default_value = defaults::DEFAULT_EVENTS_PATH)]
    events_path: String,

    /// Delay between events on one connection, in milliseconds
    #[arg(short, long, env = "PULSE_INTERVAL_MS", default_value_t = defaults::DEFAULT_SEND_INTERVAL_MS)]
    interval_ms: u64,

    /// Frames buffered per connection
    #[arg(long, env = "PULSE_CHANNEL_CAPACITY", default_value_t = defaults::DEFAULT_CHANNEL_CAPACITY)]
    channel_capacity: usize,
}

impl Args {
    fn into_config(self) -> ServerConfig {
        ServerConfig::new()
            .with_host(self.host)
            .with_port(self.port)
            .with_events_path(self.events_path)
            .with_send_interval(Duration::from_millis(self.interval_ms))
            .with_channel_capacity(self.channel_capacity)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = Args::parse().into_config();

    tracing::info!("Starting Pulse server on {}", config.bind_addr());

    match pulse_server::run_server(config, Arc::new(RandomProducer::new())).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
