//! Subscription status as seen by the display layer

use pulse_core::Event;
use serde::Serialize;

/// `lastError` after a transport failure
pub const CONNECTION_ERROR: &str = "Connection error";

/// `lastError` after a payload that is not a valid event
pub const PARSE_ERROR: &str = "Failed to parse data";

/// Everything the display layer needs about one subscription
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionStatus {
    /// A transport connection is open
    pub is_connected: bool,
    /// Events successfully received over the subscription's lifetime
    pub event_count: u64,
    /// Most recently received event
    pub latest_event: Option<Event>,
    /// Last soft or hard error, cleared when a connection opens
    pub last_error: Option<String>,
    /// The subscription was stopped; nothing reconnects any more
    pub stopped: bool,
}

/// The situations a display has to tell apart
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayPhase {
    /// No connection yet, or a fresh attempt in progress
    AwaitingConnection,
    /// Connected, data flowing
    Streaming,
    /// Connected, last payload malformed
    MalformedPayload,
    /// Disconnected, retry scheduled
    Retrying,
    /// Stopped for good
    Stopped,
}

impl SubscriptionStatus {
    pub fn phase(&self) -> DisplayPhase {
        if self.stopped {
            return DisplayPhase::Stopped;
        }
        match (self.is_connected, self.last_error.is_some()) {
            (false, false) => DisplayPhase::AwaitingConnection,
            (true, false) => DisplayPhase::Streaming,
            (true, true) => DisplayPhase::MalformedPayload,
            (false, true) => DisplayPhase::Retrying,
        }
    }
}
