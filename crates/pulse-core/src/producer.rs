//! Event Producer Trait
//!
//! This module provides the EventProducer trait for decoupling the push loop
//! from wherever the data comes from. The push loop asks for one event per
//! tick and never looks inside it.

use async_trait::async_trait;
use rand::Rng;

use crate::event::{Event, VALUE_LIMIT};

/// Failure to produce an event for a tick
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Producer failed: {0}")]
pub struct ProducerError(pub String);

/// Source of events for the push loop
///
/// Implementations must be cheap relative to the send interval; the push
/// loop awaits `produce` once per tick.
#[async_trait]
pub trait EventProducer: Send + Sync {
    /// Produce the event for the current tick
    async fn produce(&self) -> Result<Event, ProducerError>;
}

/// Producer of random values in `[0, 100)`
#[derive(Debug, Default, Clone)]
pub struct RandomProducer;

impl RandomProducer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EventProducer for RandomProducer {
    async fn produce(&self) -> Result<Event, ProducerError> {
        let value = rand::thread_rng().gen_range(0..VALUE_LIMIT);
        Ok(Event::update(value, format!("Random update: {value}")))
    }
}
