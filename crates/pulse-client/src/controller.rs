//! Reconnect controller
//!
//! Owns one logical subscription to the event stream. The controller keeps
//! at most one transport connection alive at any time, turns transport
//! signals into [`SubscriptionStatus`] updates, and reconnects after a fixed
//! delay whenever the connection fails.
//!
//! State machine:
//!
//! ```text
//! Disconnected --connect--> Connecting --open--> Connected
//!      ^                        |                    |
//!      +-------- error ---------+-------- error -----+   (one retry scheduled)
//!
//! any state --stop--> Terminated (absorbing)
//! ```

use std::pin::Pin;

use pulse_core::{ClientConfig, Event, Result};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Sleep;
use tracing::{debug, info, warn};

use crate::status::{SubscriptionStatus, CONNECTION_ERROR, PARSE_ERROR};
use crate::transport::{
    ConnectionId, SignalSender, Transport, TransportConnection, TransportError, TransportEvent,
    TransportSignal,
};

/// Lifecycle of the subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    /// No live connection (initial, or waiting for a retry)
    Disconnected,
    /// Connection requested, not open yet
    Connecting,
    /// Connection open
    Connected,
    /// Stopped for good
    Terminated,
}

/// Requests from the subscription handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Tear down the current connection and connect again right away
    Reconnect,
    /// Stop the subscription
    Stop,
}

struct ActiveConnection {
    id: ConnectionId,
    handle: Box<dyn TransportConnection>,
}

enum Wake {
    Command(Option<Command>),
    Signal(TransportSignal),
    Retry,
}

/// Reconnect state machine for one subscription
pub struct ReconnectController<T> {
    transport: T,
    config: ClientConfig,
    state: ControllerState,
    status: watch::Sender<SubscriptionStatus>,
    active: Option<ActiveConnection>,
    pending_retry: Option<Pin<Box<Sleep>>>,
    signals_tx: SignalSender,
    signals_rx: mpsc::UnboundedReceiver<TransportSignal>,
    next_connection: u64,
}

impl<T: Transport> ReconnectController<T> {
    pub fn new(transport: T, config: ClientConfig) -> Self {
        let (status, _) = watch::channel(SubscriptionStatus::default());
        let (signals_tx, signals_rx) = mpsc::unbounded_channel();
        Self {
            transport,
            config,
            state: ControllerState::Disconnected,
            status,
            active: None,
            pending_retry: None,
            signals_tx,
            signals_rx,
            next_connection: 0,
        }
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    /// Snapshot of the current status
    pub fn status(&self) -> SubscriptionStatus {
        self.status.borrow().clone()
    }

    /// Receiver notified on every status change
    pub fn watch(&self) -> watch::Receiver<SubscriptionStatus> {
        self.status.subscribe()
    }

    /// Id of the live transport connection, if any
    pub fn active_connection(&self) -> Option<ConnectionId> {
        self.active.as_ref().map(|active| active.id)
    }

    pub fn has_pending_retry(&self) -> bool {
        self.pending_retry.is_some()
    }

    /// Open a new transport connection, closing any existing one first
    pub fn connect(&mut self) {
        if self.state == ControllerState::Terminated {
            debug!("Connect ignored, subscription is stopped");
            return;
        }

        self.close_active();
        self.pending_retry = None;
        self.status.send_modify(|status| {
            status.last_error = None;
            status.is_connected = false;
        });

        let id = ConnectionId(self.next_connection);
        self.next_connection += 1;

        info!(connection = %id, endpoint = %self.config.endpoint, "Connecting to event stream");
        let handle = self
            .transport
            .open(&self.config.endpoint, id, self.signals_tx.clone());
        self.active = Some(ActiveConnection { id, handle });
        self.state = ControllerState::Connecting;
    }

    /// Apply one transport signal
    ///
    /// Signals from any connection other than the live one are dropped, so a
    /// late callback from a closed connection cannot change the status.
    pub fn handle_signal(&mut self, signal: TransportSignal) {
        if self.active_connection() != Some(signal.connection) {
            debug!(connection = %signal.connection, "Ignoring signal from stale connection");
            return;
        }

        match signal.event {
            TransportEvent::Opened => self.on_open(),
            TransportEvent::Message(raw) => self.on_message(&raw),
            TransportEvent::Failed(error) => self.on_error(error),
        }
    }

    fn on_open(&mut self) {
        if self.state != ControllerState::Connecting {
            return;
        }
        self.state = ControllerState::Connected;
        self.status.send_modify(|status| {
            status.is_connected = true;
            status.last_error = None;
        });
        info!("Event stream connection opened");
    }

    fn on_message(&mut self, raw: &str) {
        match Event::from_data(raw) {
            Ok(event) => {
                self.status.send_modify(|status| {
                    status.latest_event = Some(event);
                    status.event_count += 1;
                });
            }
            Err(e) => {
                warn!("Error parsing event data: {}", e);
                self.status.send_modify(|status| {
                    status.last_error = Some(PARSE_ERROR.to_string());
                });
            }
        }
    }

    fn on_error(&mut self, error: TransportError) {
        warn!("Event stream connection error: {}", error);
        self.status.send_modify(|status| {
            status.is_connected = false;
            status.last_error = Some(CONNECTION_ERROR.to_string());
        });
        self.close_active();
        self.state = ControllerState::Disconnected;
        self.schedule_retry();
    }

    fn schedule_retry(&mut self) {
        if self.pending_retry.is_some() {
            debug!("Retry already pending");
            return;
        }
        let delay = self.config.retry_delay();
        info!(delay_ms = delay.as_millis() as u64, "Reconnecting after delay");
        self.pending_retry = Some(Box::pin(tokio::time::sleep(delay)));
    }

    /// The pending retry delay has elapsed
    pub fn retry_elapsed(&mut self) {
        if self.pending_retry.take().is_none() {
            return;
        }
        self.connect();
    }

    /// Close the connection and reconnect immediately
    pub fn request_reconnect(&mut self) {
        if self.state == ControllerState::Terminated {
            return;
        }
        info!("Reconnect requested");
        self.connect();
    }

    /// Stop the subscription; no connection is ever opened again
    pub fn stop(&mut self) {
        if self.state == ControllerState::Terminated {
            return;
        }
        self.state = ControllerState::Terminated;
        self.pending_retry = None;
        self.close_active();
        self.status.send_modify(|status| {
            status.is_connected = false;
            status.stopped = true;
        });
        info!("Subscription stopped");
    }

    fn close_active(&mut self) {
        if let Some(mut active) = self.active.take() {
            active.handle.close();
            debug!(connection = %active.id, "Transport connection closed");
        }
    }

    /// Drive the controller until it is stopped
    ///
    /// Dropping the command sender stops the subscription.
    pub async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        self.connect();

        while self.state != ControllerState::Terminated {
            let wake = tokio::select! {
                command = commands.recv() => Wake::Command(command),
                Some(signal) = self.signals_rx.recv() => Wake::Signal(signal),
                _ = wait_retry(&mut self.pending_retry) => Wake::Retry,
            };

            match wake {
                Wake::Command(Some(Command::Reconnect)) => self.request_reconnect(),
                Wake::Command(Some(Command::Stop)) | Wake::Command(None) => self.stop(),
                Wake::Signal(signal) => self.handle_signal(signal),
                Wake::Retry => self.retry_elapsed(),
            }
        }
    }
}

async fn wait_retry(slot: &mut Option<Pin<Box<Sleep>>>) {
    match slot {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}

/// Handle to a running subscription
pub struct Subscription {
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<SubscriptionStatus>,
    task: JoinHandle<()>,
}

/// Start a subscription on its own task
pub fn subscribe<T: Transport>(transport: T, config: ClientConfig) -> Result<Subscription> {
    config.validate()?;

    let controller = ReconnectController::new(transport, config);
    let status = controller.watch();
    let (commands, rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(controller.run(rx));

    Ok(Subscription {
        commands,
        status,
        task,
    })
}

impl Subscription {
    /// Snapshot of the current status
    pub fn status(&self) -> SubscriptionStatus {
        self.status.borrow().clone()
    }

    /// Receiver notified on every status change
    pub fn watch(&self) -> watch::Receiver<SubscriptionStatus> {
        self.status.clone()
    }

    pub fn request_reconnect(&self) {
        let _ = self.commands.send(Command::Reconnect);
    }

    /// Stop the subscription and wait for its task to finish
    pub async fn stop(self) {
        let _ = self.commands.send(Command::Stop);
        let _ = self.task.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::DisplayPhase;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::time::Instant;

    const RETRY: Duration = Duration::from_millis(5000);

    #[derive(Default)]
    struct Ledger {
        opened: Vec<(ConnectionId, SignalSender)>,
        live: usize,
        max_live: usize,
        closes: usize,
    }

    #[derive(Clone, Default)]
    struct FakeTransport {
        ledger: Arc<Mutex<Ledger>>,
    }

    impl FakeTransport {
        fn opened(&self) -> usize {
            self.ledger.lock().unwrap().opened.len()
        }

        fn live(&self) -> usize {
            self.ledger.lock().unwrap().live
        }

        fn max_live(&self) -> usize {
            self.ledger.lock().unwrap().max_live
        }

        fn sender(&self, index: usize) -> (ConnectionId, SignalSender) {
            self.ledger.lock().unwrap().opened[index].clone()
        }
    }

    struct FakeConnection {
        ledger: Arc<Mutex<Ledger>>,
        closed: bool,
    }

    impl Transport for FakeTransport {
        fn open(
            &mut self,
            _endpoint: &str,
            connection: ConnectionId,
            signals: SignalSender,
        ) -> Box<dyn TransportConnection> {
            let mut ledger = self.ledger.lock().unwrap();
            ledger.opened.push((connection, signals));
            ledger.live += 1;
            ledger.max_live = ledger.max_live.max(ledger.live);
            Box::new(FakeConnection {
                ledger: self.ledger.clone(),
                closed: false,
            })
        }
    }

    impl TransportConnection for FakeConnection {
        fn close(&mut self) {
            if !self.closed {
                self.closed = true;
                let mut ledger = self.ledger.lock().unwrap();
                ledger.live -= 1;
                ledger.closes += 1;
            }
        }
    }

    fn controller() -> (ReconnectController<FakeTransport>, FakeTransport) {
        let transport = FakeTransport::default();
        let config = ClientConfig::new().with_retry_delay(RETRY);
        (ReconnectController::new(transport.clone(), config), transport)
    }

    fn signal(id: ConnectionId, event: TransportEvent) -> TransportSignal {
        TransportSignal::new(id, event)
    }

    fn event_json(value: u32) -> String {
        format!(
            r#"{{"timestamp":"2024-01-01T00:00:00.000Z","value":{value},"message":"Random update: {value}"}}"#
        )
    }

    fn connected(controller: &mut ReconnectController<FakeTransport>) -> ConnectionId {
        controller.connect();
        let id = controller.active_connection().unwrap();
        controller.handle_signal(signal(id, TransportEvent::Opened));
        id
    }

    #[test]
    fn test_initial_state() {
        let (controller, transport) = controller();
        assert_eq!(controller.state(), ControllerState::Disconnected);
        assert_eq!(controller.status(), SubscriptionStatus::default());
        assert_eq!(controller.status().phase(), DisplayPhase::AwaitingConnection);
        assert_eq!(transport.opened(), 0);
    }

    #[test]
    fn test_connect_opens_one_connection() {
        let (mut controller, transport) = controller();
        controller.connect();

        assert_eq!(controller.state(), ControllerState::Connecting);
        assert_eq!(transport.opened(), 1);
        assert_eq!(transport.live(), 1);
        assert!(!controller.status().is_connected);
    }

    #[test]
    fn test_first_event_received() {
        let (mut controller, _transport) = controller();
        let id = connected(&mut controller);
        controller.handle_signal(signal(id, TransportEvent::Message(event_json(42))));

        let status = controller.status();
        assert_eq!(controller.state(), ControllerState::Connected);
        assert!(status.is_connected);
        assert_eq!(status.event_count, 1);
        assert_eq!(status.latest_event.unwrap().as_update().unwrap().value, 42);
        assert_eq!(status.last_error, None);
    }

    #[test]
    fn test_malformed_payload_is_soft_error() {
        let (mut controller, transport) = controller();
        let id = connected(&mut controller);
        controller.handle_signal(signal(id, TransportEvent::Message(event_json(1))));
        controller.handle_signal(signal(id, TransportEvent::Message("not json".to_string())));

        let status = controller.status();
        assert!(status.is_connected);
        assert_eq!(status.event_count, 1);
        assert_eq!(status.last_error.as_deref(), Some(PARSE_ERROR));
        assert_eq!(status.phase(), DisplayPhase::MalformedPayload);
        assert_eq!(controller.state(), ControllerState::Connected);
        assert_eq!(transport.live(), 1);
        assert!(!controller.has_pending_retry());

        controller.handle_signal(signal(id, TransportEvent::Message(event_json(2))));
        assert_eq!(controller.status().event_count, 2);
    }

    #[test]
    fn test_out_of_range_value_is_soft_error() {
        let (mut controller, _transport) = controller();
        let id = connected(&mut controller);
        controller.handle_signal(signal(id, TransportEvent::Message(event_json(150))));

        let status = controller.status();
        assert!(status.is_connected);
        assert_eq!(status.event_count, 0);
        assert_eq!(status.latest_event, None);
        assert_eq!(status.last_error.as_deref(), Some(PARSE_ERROR));
    }

    #[tokio::test]
    async fn test_error_while_connected_schedules_one_retry() {
        let (mut controller, transport) = controller();
        let id = connected(&mut controller);

        controller.handle_signal(signal(id, TransportEvent::Failed(TransportError::Ended)));

        let status = controller.status();
        assert!(!status.is_connected);
        assert_eq!(status.last_error.as_deref(), Some(CONNECTION_ERROR));
        assert_eq!(status.phase(), DisplayPhase::Retrying);
        assert_eq!(controller.state(), ControllerState::Disconnected);
        assert!(controller.has_pending_retry());
        assert_eq!(transport.live(), 0);

        // A second error from the same connection does not compound
        controller.handle_signal(signal(
            id,
            TransportEvent::Failed(TransportError::Stream("reset".to_string())),
        ));
        assert!(controller.has_pending_retry());

        controller.retry_elapsed();
        assert_eq!(controller.state(), ControllerState::Connecting);
        assert_eq!(transport.opened(), 2);
        assert!(!controller.has_pending_retry());
        assert_eq!(controller.status().last_error, None);

        let retry_id = controller.active_connection().unwrap();
        controller.handle_signal(signal(retry_id, TransportEvent::Opened));
        assert!(controller.status().is_connected);

        // No duplicate retry fires
        controller.retry_elapsed();
        assert_eq!(transport.opened(), 2);
        assert_eq!(controller.state(), ControllerState::Connected);
    }

    #[tokio::test]
    async fn test_error_before_open_schedules_retry() {
        let (mut controller, transport) = controller();
        controller.connect();
        let id = controller.active_connection().unwrap();

        controller.handle_signal(signal(id, TransportEvent::Failed(TransportError::Status(502))));

        assert_eq!(controller.state(), ControllerState::Disconnected);
        assert!(controller.has_pending_retry());
        assert_eq!(transport.live(), 0);
        assert_eq!(controller.active_connection(), None);
    }

    #[test]
    fn test_stop_while_connecting_ignores_late_open() {
        let (mut controller, transport) = controller();
        controller.connect();
        let id = controller.active_connection().unwrap();

        controller.stop();
        assert_eq!(controller.state(), ControllerState::Terminated);
        assert_eq!(transport.live(), 0);

        controller.handle_signal(signal(id, TransportEvent::Opened));
        controller.handle_signal(signal(id, TransportEvent::Message(event_json(5))));
        assert!(!controller.status().is_connected);
        assert_eq!(controller.status().event_count, 0);
        assert_eq!(controller.state(), ControllerState::Terminated);

        controller.connect();
        controller.request_reconnect();
        assert_eq!(transport.opened(), 1);
        assert_eq!(controller.state(), ControllerState::Terminated);
    }

    #[tokio::test]
    async fn test_stop_cancels_pending_retry() {
        let (mut controller, transport) = controller();
        let id = connected(&mut controller);
        controller.handle_signal(signal(id, TransportEvent::Failed(TransportError::Ended)));
        assert!(controller.has_pending_retry());

        controller.stop();
        assert!(!controller.has_pending_retry());
        let status = controller.status();
        assert!(status.stopped);
        assert_eq!(status.phase(), DisplayPhase::Stopped);
        assert_ne!(status.phase(), DisplayPhase::Retrying);

        controller.retry_elapsed();
        assert_eq!(transport.opened(), 1);
        assert_eq!(controller.state(), ControllerState::Terminated);
    }

    #[tokio::test]
    async fn test_request_reconnect_replaces_connection() {
        let (mut controller, transport) = controller();
        let first = connected(&mut controller);
        controller.handle_signal(signal(first, TransportEvent::Message(event_json(9))));

        controller.request_reconnect();
        assert_eq!(controller.state(), ControllerState::Connecting);
        assert_eq!(transport.opened(), 2);
        assert_eq!(transport.live(), 1);
        assert!(!controller.status().is_connected);
        // Event history survives a resubscription
        assert_eq!(controller.status().event_count, 1);

        // Callbacks from the replaced connection are stale
        controller.handle_signal(signal(first, TransportEvent::Failed(TransportError::Ended)));
        assert_eq!(controller.state(), ControllerState::Connecting);
        assert!(!controller.has_pending_retry());
    }

    #[tokio::test]
    async fn test_at_most_one_live_connection_under_churn() {
        let (mut controller, transport) = controller();

        for round in 0..50u32 {
            match round % 5 {
                0 => controller.connect(),
                1 => {
                    if let Some(id) = controller.active_connection() {
                        controller.handle_signal(signal(id, TransportEvent::Opened));
                        controller.handle_signal(signal(
                            id,
                            TransportEvent::Failed(TransportError::Ended),
                        ));
                    }
                }
                2 => controller.request_reconnect(),
                3 => controller.retry_elapsed(),
                _ => {
                    controller.connect();
                    controller.connect();
                }
            }
            assert!(transport.live() <= 1);
            assert!(controller.active_connection().is_some() == (transport.live() == 1));
        }

        controller.stop();
        assert_eq!(transport.live(), 0);
        assert_eq!(transport.max_live(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscription_reconnects_after_delay() {
        let transport = FakeTransport::default();
        let config = ClientConfig::new().with_retry_delay(RETRY);
        let subscription = subscribe(transport.clone(), config).unwrap();
        let mut watch = subscription.watch();

        while transport.opened() < 1 {
            tokio::task::yield_now().await;
        }
        let (first, signals) = transport.sender(0);
        signals.send(signal(first, TransportEvent::Opened)).unwrap();
        signals
            .send(signal(first, TransportEvent::Message(event_json(42))))
            .unwrap();
        watch.wait_for(|s| s.event_count == 1).await.unwrap();
        assert!(subscription.status().is_connected);

        let failed_at = Instant::now();
        signals
            .send(signal(first, TransportEvent::Failed(TransportError::Ended)))
            .unwrap();
        watch.wait_for(|s| !s.is_connected).await.unwrap();

        while transport.opened() < 2 {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert!(failed_at.elapsed() >= RETRY);

        let (second, signals) = transport.sender(1);
        signals.send(signal(second, TransportEvent::Opened)).unwrap();
        watch.wait_for(|s| s.is_connected).await.unwrap();

        tokio::time::sleep(RETRY * 3).await;
        assert_eq!(transport.opened(), 2);

        subscription.stop().await;
        assert_eq!(transport.live(), 0);
    }

    #[tokio::test]
    async fn test_dropping_handle_stops_subscription() {
        let transport = FakeTransport::default();
        let subscription = subscribe(transport.clone(), ClientConfig::new()).unwrap();
        let Subscription { commands, task, .. } = subscription;

        drop(commands);
        task.await.unwrap();
        assert_eq!(transport.live(), 0);
    }

    #[test]
    fn test_subscribe_rejects_invalid_config() {
        let config = ClientConfig::new().with_retry_delay(Duration::ZERO);
        assert!(subscribe(FakeTransport::default(), config).is_err());
    }
}
