//! Status printer for CLI mode - prints subscription status to the console

use pulse_core::Event;

use crate::status::{DisplayPhase, SubscriptionStatus};

/// Renders status snapshots as text or JSON lines
#[derive(Debug, Default, Clone)]
pub struct StatusPrinter {
    /// Whether to print in JSON format
    pub json_output: bool,
}

impl StatusPrinter {
    pub fn new(json_output: bool) -> Self {
        Self { json_output }
    }

    /// Render one status snapshot as a single line
    pub fn render(&self, status: &SubscriptionStatus) -> String {
        if self.json_output {
            return serde_json::to_string(status).unwrap_or_default();
        }

        let phase = status.phase();
        let indicator = match phase {
            DisplayPhase::Streaming | DisplayPhase::MalformedPayload => "● Connected",
            DisplayPhase::AwaitingConnection => "○ Disconnected",
            DisplayPhase::Retrying => "○ Disconnected (retrying)",
            DisplayPhase::Stopped => "■ Stopped",
        };

        let mut line = format!("{indicator} | events: {}", status.event_count);

        match &status.latest_event {
            Some(Event::Update(update)) => line.push_str(&format!(
                " | [{}] value: {} | {}",
                format_time(&update.timestamp),
                update.value,
                update.message
            )),
            Some(Event::Error { error }) => line.push_str(&format!(" | server error: {error}")),
            None => {}
        }

        if let Some(error) = &status.last_error {
            line.push_str(&format!(" | error: {error}"));
        }

        line
    }

    pub fn print(&self, status: &SubscriptionStatus) {
        println!("{}", self.render(status));
    }
}

/// Time-of-day part of an ISO-8601 timestamp, `HH:MM:SS`
fn format_time(timestamp: &str) -> &str {
    timestamp
        .split_once('T')
        .and_then(|(_, time)| time.get(..8))
        .unwrap_or(timestamp)
}
