//! Event stream response
//!
//! Splits one streaming response into the half the push loop writes to and
//! the half axum sends to the client. The two halves are joined by a bounded
//! channel; dropping the body (client went away, server shutting the
//! connection down) is observable from the writer side in two ways: the
//! channel closes and a cancellation signal fires.

use std::convert::Infallible;

use axum::http::{header, HeaderValue};
use axum::response::sse::{Event as SseEvent, Sse};
use axum::response::{IntoResponse, Response};
use futures::stream::{self, BoxStream, StreamExt};
use pulse_core::wire::EVENT_STREAM_CACHE_CONTROL;
use pulse_core::Event;
use tokio::sync::{mpsc, oneshot};

/// Failure to write one event to the stream
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    /// The response body is gone
    #[error("Event stream closed by peer")]
    Closed,

    /// The event could not be serialized
    #[error("Failed to encode event: {0}")]
    Encode(#[from] axum::Error),
}

/// Writer half of an accepted event stream
#[derive(Debug)]
pub struct EventWriter {
    tx: mpsc::Sender<SseEvent>,
}

impl EventWriter {
    /// Serialize `event` and queue it as one `data:` frame
    pub async fn write_event(&self, event: &Event) -> Result<(), WriteError> {
        let frame = SseEvent::default().json_data(event)?;
        self.tx.send(frame).await.map_err(|_| WriteError::Closed)
    }

    /// Whether the body half has been dropped
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Resolves once the body half has been dropped
    pub async fn closed(&self) {
        self.tx.closed().await
    }
}

/// Cancellation signal fired when the response body is dropped
#[derive(Debug)]
pub struct Cancellation {
    rx: oneshot::Receiver<()>,
    fired: bool,
}

impl Cancellation {
    /// Resolves once the body has been dropped; never resolves again after that
    pub async fn cancelled(&mut self) {
        if self.fired {
            return std::future::pending().await;
        }
        // Sent or sender dropped: either way the body is gone
        let _ = (&mut self.rx).await;
        self.fired = true;
    }

    /// Non-blocking check of the signal
    pub fn is_cancelled(&mut self) -> bool {
        if !self.fired && !matches!(self.rx.try_recv(), Err(oneshot::error::TryRecvError::Empty)) {
            self.fired = true;
        }
        self.fired
    }
}

/// The push loop's side of an accepted connection
#[derive(Debug)]
pub struct EventStream {
    pub writer: EventWriter,
    pub cancellation: Cancellation,
}

/// Body half of an accepted event stream
pub struct EventBody {
    events: BoxStream<'static, Result<SseEvent, Infallible>>,
}

/// Fires the cancellation signal when the body stream is dropped
struct CancelOnDrop(Option<oneshot::Sender<()>>);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if let Some(tx) = self.0.take() {
            let _ = tx.send(());
        }
    }
}

/// Accept a connection: create the writer/body pair for one event stream
///
/// Nothing here can fail; a client that is already gone shows up as a
/// failed write later.
pub fn event_stream(capacity: usize) -> (EventStream, EventBody) {
    let (tx, rx) = mpsc::channel::<SseEvent>(capacity.max(1));
    let (cancel_tx, cancel_rx) = oneshot::channel();
    let guard = CancelOnDrop(Some(cancel_tx));

    let events = stream::unfold((rx, guard), |(mut rx, guard)| async move {
        let event = rx.recv().await?;
        Some((Ok(event), (rx, guard)))
    })
    .boxed();

    let stream = EventStream {
        writer: EventWriter { tx },
        cancellation: Cancellation {
            rx: cancel_rx,
            fired: false,
        },
    };

    (stream, EventBody { events })
}

impl EventBody {
    /// Raw frames of the response body, one per written event
    #[cfg(test)]
    pub(crate) fn into_frames(self) -> axum::body::BodyDataStream {
        self.into_response().into_body().into_data_stream()
    }
}

impl IntoResponse for EventBody {
    fn into_response(self) -> Response {
        // Sse sets the content type; these replace its default cache policy
        (
            [
                (
                    header::CACHE_CONTROL,
                    HeaderValue::from_static(EVENT_STREAM_CACHE_CONTROL),
                ),
                (header::CONNECTION, HeaderValue::from_static("keep-alive")),
            ],
            Sse::new(self.events),
        )
            .into_response()
    }
}

/// Data of one raw `data: <json>\n\n` frame
#[cfg(test)]
pub(crate) fn frame_data(frame: &[u8]) -> String {
    let frame = std::str::from_utf8(frame).unwrap();
    frame
        .strip_prefix("data: ")
        .and_then(|rest| rest.strip_suffix("\n\n"))
        .unwrap_or_else(|| panic!("not a single data frame: {frame:?}"))
        .to_string()
}
