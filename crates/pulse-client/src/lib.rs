//! Pulse Client Library
//!
//! Subscribes to a Pulse event stream and keeps the subscription alive
//! across failures.
//!
//! # Modules
//!
//! - [`controller`] - Reconnect state machine and the subscription handle
//! - [`transport`] - Transport trait and the HTTP transport
//! - [`status`] - Status exposed to the display layer
//! - [`printer`] - Console rendering of the status

pub mod controller;
pub mod printer;
pub mod status;
pub mod transport;

pub use controller::{subscribe, Command, ControllerState, ReconnectController, Subscription};
pub use printer::StatusPrinter;
pub use status::{DisplayPhase, SubscriptionStatus};
pub use transport::{
    ConnectionId, HttpTransport, Transport, TransportConnection, TransportError, TransportEvent,
    TransportSignal,
};
