//! Pulse Core Library
//!
//! Core types shared by the Pulse event stream server and subscriber.
//! This crate has no HTTP stack of its own; both sides agree only on what
//! is defined here.
//!
//! # Modules
//!
//! - [`event`] - The pushed event payload
//! - [`wire`] - `text/event-stream` header values
//! - [`producer`] - Event producer trait and the random producer
//! - [`config`] - Server and client configuration
//! - [`error`] - Error types

pub mod config;
pub mod error;
pub mod event;
pub mod producer;
pub mod wire;

// Re-export commonly used types
pub use config::{ClientConfig, ServerConfig};
pub use error::{PulseError, Result};
pub use event::{Event, EventParseError, Update, PRODUCER_FAILURE_MESSAGE, VALUE_LIMIT};
pub use producer::{EventProducer, ProducerError, RandomProducer};
