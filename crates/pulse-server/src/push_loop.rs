//! Push loop
//!
//! Drives one accepted event stream: one event immediately, then one event
//! per send interval, until the client goes away or a write fails. Every way
//! a connection can end converges on [`PushLoop::cleanup`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use pulse_core::{Event, EventProducer, PRODUCER_FAILURE_MESSAGE};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::stream::{Cancellation, EventStream, EventWriter, WriteError};

/// Lifecycle of one server-side connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Accepted, first send not attempted yet
    Pending,
    /// Tick timer scheduled
    Open,
    /// Cleaned up; nothing more is written
    Closed,
}

/// What ended a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseTrigger {
    /// The client dropped the response
    PeerAbort,
    /// The HTTP layer cancelled the body stream
    StreamCancelled,
    /// A write found the stream already closed
    WriteFailed,
}

impl fmt::Display for CloseTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseTrigger::PeerAbort => write!(f, "peer-abort"),
            CloseTrigger::StreamCancelled => write!(f, "stream-cancelled"),
            CloseTrigger::WriteFailed => write!(f, "write-failed"),
        }
    }
}

/// Periodic send schedule of one connection
///
/// Owning the value owns the schedule: once released, no further tick can
/// fire for the connection.
#[derive(Debug)]
pub struct TickTimer {
    interval: Interval,
}

impl TickTimer {
    /// Schedule ticks every `period`, the first one `period` from now
    fn schedule(period: Duration) -> Self {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval }
    }

    async fn tick(&mut self) {
        self.interval.tick().await;
    }

    fn release(self) {
        drop(self.interval);
    }
}

enum Wake {
    Tick,
    Close(CloseTrigger),
}

/// Push loop for one connection
pub struct PushLoop<P: ?Sized> {
    id: String,
    producer: Arc<P>,
    writer: EventWriter,
    cancellation: Cancellation,
    period: Duration,
    state: ConnectionState,
    timer: Option<TickTimer>,
    closed_by: Option<CloseTrigger>,
    sent: u64,
}

impl<P: EventProducer + ?Sized> PushLoop<P> {
    pub fn new(id: impl Into<String>, producer: Arc<P>, stream: EventStream, period: Duration) -> Self {
        Self {
            id: id.into(),
            producer,
            writer: stream.writer,
            cancellation: stream.cancellation,
            period,
            state: ConnectionState::Pending,
            timer: None,
            closed_by: None,
            sent: 0,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// The trigger that closed the connection, if it is closed
    pub fn closed_by(&self) -> Option<CloseTrigger> {
        self.closed_by
    }

    pub fn is_closed(&self) -> bool {
        self.state == ConnectionState::Closed
    }

    /// Whether the tick timer is currently held
    pub fn has_timer(&self) -> bool {
        self.timer.is_some()
    }

    /// Number of frames written so far
    pub fn sent(&self) -> u64 {
        self.sent
    }

    /// Run until the connection closes, returning what closed it
    pub async fn run(mut self) -> Option<CloseTrigger> {
        self.start().await;

        loop {
            let wake = {
                let Some(timer) = self.timer.as_mut() else {
                    break;
                };
                // Close signals win over a tick, in the same order send_tick checks them
                tokio::select! {
                    biased;
                    _ = self.cancellation.cancelled() => Wake::Close(CloseTrigger::StreamCancelled),
                    _ = self.writer.closed() => Wake::Close(CloseTrigger::PeerAbort),
                    _ = timer.tick() => Wake::Tick,
                }
            };

            match wake {
                Wake::Tick => self.send_tick().await,
                Wake::Close(trigger) => {
                    self.cleanup(trigger);
                }
            }
        }

        debug!(connection = %self.id, "Push loop finished");
        self.closed_by
    }

    /// Send the first event, then schedule the tick timer
    ///
    /// The timer is only scheduled if the connection survived the first send.
    pub async fn start(&mut self) {
        if self.state != ConnectionState::Pending {
            return;
        }

        self.send_tick().await;
        if self.is_closed() {
            return;
        }

        self.timer = Some(TickTimer::schedule(self.period));
        self.state = ConnectionState::Open;
        debug!(connection = %self.id, period_ms = self.period.as_millis() as u64, "Tick timer scheduled");
    }

    /// One send attempt
    ///
    /// Producer failures are written as an error event and the stream stays
    /// open. A write that finds the stream closed ends the connection.
    pub async fn send_tick(&mut self) {
        if self.is_closed() {
            self.cleanup(CloseTrigger::PeerAbort);
            return;
        }
        if self.cancellation.is_cancelled() {
            self.cleanup(CloseTrigger::StreamCancelled);
            return;
        }
        if self.writer.is_closed() {
            self.cleanup(CloseTrigger::PeerAbort);
            return;
        }

        let event = match self.producer.produce().await {
            Ok(event) => event,
            Err(e) => {
                warn!(connection = %self.id, "Error producing event: {}", e);
                Event::error(PRODUCER_FAILURE_MESSAGE)
            }
        };

        match self.writer.write_event(&event).await {
            Ok(()) => {
                self.sent += 1;
                debug!(connection = %self.id, sent = self.sent, "Event sent");
            }
            Err(WriteError::Closed) => {
                debug!(connection = %self.id, "Write failed, stream already closed");
                self.cleanup(CloseTrigger::WriteFailed);
            }
            Err(e @ WriteError::Encode(_)) => {
                error!(connection = %self.id, "{}", e);
            }
        }
    }

    /// Release the tick timer and mark the connection closed
    ///
    /// Returns `true` for the invocation that actually closed the
    /// connection; every later call is a no-op returning `false`.
    pub fn cleanup(&mut self, trigger: CloseTrigger) -> bool {
        if self.state == ConnectionState::Closed {
            return false;
        }
        self.state = ConnectionState::Closed;
        self.closed_by = Some(trigger);

        if let Some(timer) = self.timer.take() {
            timer.release();
        }

        info!(
            connection = %self.id,
            trigger = %trigger,
            sent = self.sent,
            "Event stream closed and resources cleaned up"
        );
        true
    }
}
