//! Transport types for the subscriber
//!
//! A transport opens one connection to the event stream endpoint and reports
//! what happens on it as [`TransportSignal`]s. The controller never touches
//! the network itself, which keeps its state machine testable without a
//! server.

use std::fmt;

use eventsource_stream::Eventsource;
use futures::{Stream, StreamExt};
use pulse_core::wire::EVENT_STREAM_CONTENT_TYPE;
use pulse_core::PulseError;
use reqwest::header::{ACCEPT, CACHE_CONTROL, CONTENT_TYPE};
use reqwest::Client;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Identifies one transport connection within a controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-conn-{}", self.0)
    }
}

/// Errors that end a transport connection
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("Unexpected status: {0}")]
    Status(u16),

    #[error("Unexpected content type: {0:?}")]
    ContentType(String),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Stream ended by server")]
    Ended,
}

/// What happened on a connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The stream is open
    Opened,
    /// Data of one received event, not yet parsed
    Message(String),
    /// The connection failed or ended; nothing follows
    Failed(TransportError),
}

/// A [`TransportEvent`] tagged with the connection it came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportSignal {
    pub connection: ConnectionId,
    pub event: TransportEvent,
}

impl TransportSignal {
    pub fn new(connection: ConnectionId, event: TransportEvent) -> Self {
        Self { connection, event }
    }
}

/// Channel transports report on
pub type SignalSender = mpsc::UnboundedSender<TransportSignal>;

/// Opens connections to the event stream endpoint
pub trait Transport: Send + 'static {
    /// Start connecting; the outcome arrives on `signals`
    fn open(
        &mut self,
        endpoint: &str,
        connection: ConnectionId,
        signals: SignalSender,
    ) -> Box<dyn TransportConnection>;
}

/// A live connection that can be force-closed
pub trait TransportConnection: Send {
    /// Close the connection; no signals are delivered afterwards.
    /// Calling it more than once has no further effect.
    fn close(&mut self);
}

/// Transport over HTTP using reqwest
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, PulseError> {
        let client = Client::builder()
            .build()
            .map_err(|e| PulseError::Client(e.to_string()))?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

impl Transport for HttpTransport {
    fn open(
        &mut self,
        endpoint: &str,
        connection: ConnectionId,
        signals: SignalSender,
    ) -> Box<dyn TransportConnection> {
        let task = tokio::spawn(stream_events(
            self.client.clone(),
            endpoint.to_string(),
            connection,
            signals,
        ));
        Box::new(HttpConnection { task: Some(task) })
    }
}

/// Connection backed by a reader task; closing aborts the task, which drops
/// the response and with it the socket
struct HttpConnection {
    task: Option<JoinHandle<()>>,
}

impl TransportConnection for HttpConnection {
    fn close(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for HttpConnection {
    fn drop(&mut self) {
        self.close();
    }
}

async fn stream_events(
    client: Client,
    endpoint: String,
    connection: ConnectionId,
    signals: SignalSender,
) {
    let error = match read_stream(&client, &endpoint, connection, &signals).await {
        Ok(()) => TransportError::Ended,
        Err(e) => e,
    };
    debug!(%connection, "Transport connection ended: {}", error);
    let _ = signals.send(TransportSignal::new(connection, TransportEvent::Failed(error)));
}

async fn read_stream(
    client: &Client,
    endpoint: &str,
    connection: ConnectionId,
    signals: &SignalSender,
) -> Result<(), TransportError> {
    let response = client
        .get(endpoint)
        .header(ACCEPT, EVENT_STREAM_CONTENT_TYPE)
        .header(CACHE_CONTROL, "no-cache")
        .send()
        .await
        .map_err(|e| TransportError::Request(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(TransportError::Status(status.as_u16()));
    }

    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if !content_type.starts_with(EVENT_STREAM_CONTENT_TYPE) {
        return Err(TransportError::ContentType(content_type.to_string()));
    }

    let send = |event| signals.send(TransportSignal::new(connection, event)).is_ok();
    if !send(TransportEvent::Opened) {
        return Ok(());
    }

    let events = event_data(response.bytes_stream());
    tokio::pin!(events);
    while let Some(data) = events.next().await {
        if !send(TransportEvent::Message(data?)) {
            return Ok(());
        }
    }

    Ok(())
}

/// Data of every event in a `text/event-stream` body
///
/// Events without data (comments, bare `id:` or `retry:` blocks) are skipped.
fn event_data<S, B, E>(body: S) -> impl Stream<Item = Result<String, TransportError>>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: fmt::Display,
{
    body.eventsource().filter_map(|event| async move {
        match event {
            Ok(event) if event.data.is_empty() => None,
            Ok(event) => Some(Ok(event.data)),
            Err(e) => Some(Err(TransportError::Stream(e.to_string()))),
        }
    })
}
