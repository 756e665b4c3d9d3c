//! Event Types
//!
//! The unit of data pushed from server to subscriber.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Message carried by the error event written when the producer fails
pub const PRODUCER_FAILURE_MESSAGE: &str = "Failed to fetch data";

/// Exclusive upper bound of update values
pub const VALUE_LIMIT: u32 = 100;

/// Received data that is not a valid event
#[derive(Debug, thiserror::Error)]
pub enum EventParseError {
    #[error("Invalid event JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Value {0} is out of range")]
    ValueOutOfRange(u32),
}

/// One pushed update
///
/// Serialized untagged, so the JSON is either
/// `{"timestamp":..,"value":..,"message":..}` or `{"error":..}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Event {
    /// A value produced for this tick
    Update(Update),
    /// The producer failed for this tick
    Error {
        /// Human-readable failure description
        error: String,
    },
}

/// Payload of a successful tick
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Update {
    /// ISO-8601 UTC timestamp with millisecond precision
    pub timestamp: String,
    /// Value in `[0, 100)`
    pub value: u32,
    /// Human-readable description of the value
    pub message: String,
}

impl Event {
    /// Create an update event stamped with the current time
    pub fn update(value: u32, message: impl Into<String>) -> Self {
        Self::update_at(Utc::now(), value, message)
    }

    /// Create an update event with an explicit timestamp
    pub fn update_at(at: DateTime<Utc>, value: u32, message: impl Into<String>) -> Self {
        Event::Update(Update {
            timestamp: at.to_rfc3339_opts(SecondsFormat::Millis, true),
            value,
            message: message.into(),
        })
    }

    /// Parse the data of one received event
    ///
    /// Update values outside `[0, VALUE_LIMIT)` are rejected.
    pub fn from_data(data: &str) -> Result<Self, EventParseError> {
        let event: Event = serde_json::from_str(data)?;
        if let Event::Update(update) = &event {
            if update.value >= VALUE_LIMIT {
                return Err(EventParseError::ValueOutOfRange(update.value));
            }
        }
        Ok(event)
    }

    /// Create an error event
    pub fn error(message: impl Into<String>) -> Self {
        Event::Error {
            error: message.into(),
        }
    }

    /// Whether this event reports a producer failure
    pub fn is_error(&self) -> bool {
        matches!(self, Event::Error { .. })
    }

    /// The update payload, if this is not an error event
    pub fn as_update(&self) -> Option<&Update> {
        match self {
            Event::Update(update) => Some(update),
            Event::Error { .. } => None,
        }
    }
}
