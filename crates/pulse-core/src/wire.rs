//! SSE Wire Constants
//!
//! Every event travels as one `text/event-stream` frame:
//!
//!   data: <event json>
//!   <blank line>
//!
//! Framing is done by axum's `Sse` response on the server and by
//! `eventsource-stream` on the subscriber; both sides share only these
//! header values and the [`Event`](crate::Event) JSON shape.

/// Content type of an event stream response
pub const EVENT_STREAM_CONTENT_TYPE: &str = "text/event-stream";

/// Cache-Control value sent with every event stream
pub const EVENT_STREAM_CACHE_CONTROL: &str = "no-cache, no-transform";
