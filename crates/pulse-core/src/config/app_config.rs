use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::defaults;
use crate::error::{PulseError, Result};

/// Server configuration
///
/// Provides centralized configuration management with:
/// - Serde support for loading from files/env
/// - Builder pattern for customization
/// - Defaults matching the documented wire contract
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind
    pub host: String,

    /// Port to bind (0 picks an ephemeral port)
    pub port: u16,

    /// Path of the event stream endpoint
    pub events_path: String,

    /// Delay between sends on one connection (milliseconds)
    pub send_interval_ms: u64,

    /// Frames buffered between a push loop and its response body
    pub channel_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: defaults::DEFAULT_BIND_HOST.to_string(),
            port: defaults::DEFAULT_PORT,
            events_path: defaults::DEFAULT_EVENTS_PATH.to_string(),
            send_interval_ms: defaults::DEFAULT_SEND_INTERVAL_MS,
            channel_capacity: defaults::DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl ServerConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_events_path(mut self, path: impl Into<String>) -> Self {
        self.events_path = path.into();
        self
    }

    pub fn with_send_interval(mut self, interval: Duration) -> Self {
        self.send_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// Address to bind, as `host:port`
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn send_interval(&self) -> Duration {
        Duration::from_millis(self.send_interval_ms)
    }

    /// Reject settings the push loop cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.send_interval_ms == 0 {
            return Err(PulseError::Config(
                "send interval must be non-zero".to_string(),
            ));
        }
        if self.channel_capacity == 0 {
            return Err(PulseError::Config(
                "channel capacity must be non-zero".to_string(),
            ));
        }
        if !self.events_path.starts_with('/') {
            return Err(PulseError::Config(format!(
                "events path must start with '/': {}",
                self.events_path
            )));
        }
        Ok(())
    }
}

/// Subscriber configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Full URL of the event stream endpoint
    pub endpoint: String,

    /// Delay before reconnecting after a transport error (milliseconds)
    pub retry_delay_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: defaults::DEFAULT_ENDPOINT.to_string(),
            retry_delay_ms: defaults::DEFAULT_RETRY_DELAY_MS,
        }
    }
}

impl ClientConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Reject settings the controller cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.retry_delay_ms == 0 {
            return Err(PulseError::Config(
                "retry delay must be non-zero".to_string(),
            ));
        }
        if !(self.endpoint.starts_with("http://") || self.endpoint.starts_with("https://")) {
            return Err(PulseError::Config(format!(
                "endpoint must be an http(s) URL: {}",
                self.endpoint
            )));
        }
        Ok(())
    }
}
