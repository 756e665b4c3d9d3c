//! Pulse Server Library
//!
//! Pushes a fresh event to every connected client on a fixed interval over
//! Server-Sent Events.
//!
//! # Modules
//!
//! - [`server`] - Router, handlers and server bootstrap
//! - [`push_loop`] - Per-connection send loop and its cleanup
//! - [`stream`] - Writer/body pair backing one streaming response

pub mod push_loop;
pub mod server;
pub mod stream;

pub use push_loop::{CloseTrigger, ConnectionState, PushLoop};
pub use server::{router, run_server, serve, ServerState};
pub use stream::{event_stream, EventBody, EventStream, EventWriter, WriteError};
