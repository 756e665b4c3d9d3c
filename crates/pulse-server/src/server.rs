//! HTTP server
//!
//! Serves the event stream endpoint and a health check. Each request to the
//! event stream endpoint gets its own push loop task; connections share
//! nothing but the producer.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::{
    extract::State,
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use pulse_core::{EventProducer, PulseError, Result, ServerConfig};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::{debug, info};

use crate::push_loop::PushLoop;
use crate::stream::event_stream;

/// Global connection counter for generating connection IDs
static CONNECTION_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a unique connection ID
fn generate_connection_id() -> String {
    let count = CONNECTION_COUNTER.fetch_add(1, Ordering::SeqCst);
    format!("conn-{}", count)
}

/// State shared across handlers
#[derive(Clone)]
pub struct ServerState {
    /// Source of events for every connection
    pub producer: Arc<dyn EventProducer>,
    /// Server settings
    pub config: Arc<ServerConfig>,
}

impl ServerState {
    pub fn new(producer: Arc<dyn EventProducer>, config: ServerConfig) -> Self {
        Self {
            producer,
            config: Arc::new(config),
        }
    }
}

/// Build the router
pub fn router(state: ServerState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers(tower_http::cors::Any);

    let events_path = state.config.events_path.clone();

    Router::new()
        .route("/health", get(health_handler))
        .route(&events_path, get(events_handler))
        .with_state(state)
        .layer(cors)
}

/// Bind the configured address and serve until the server fails
pub async fn run_server(config: ServerConfig, producer: Arc<dyn EventProducer>) -> Result<()> {
    config.validate()?;

    let addr = config.bind_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|source| PulseError::Bind {
            addr: addr.clone(),
            source,
        })?;

    serve(listener, ServerState::new(producer, config)).await
}

/// Serve on an already bound listener
pub async fn serve(listener: TcpListener, state: ServerState) -> Result<()> {
    let local_addr = listener.local_addr()?;
    info!(
        "Event stream available at http://{}{} (every {} ms)",
        local_addr, state.config.events_path, state.config.send_interval_ms
    );

    axum::serve(listener, router(state))
        .await
        .map_err(|e| PulseError::Server(e.to_string()))
}

/// Health check endpoint
async fn health_handler() -> (StatusCode, &'static str) {
    (StatusCode::OK, "Pulse server is healthy")
}

/// Event stream endpoint - one push loop per request
async fn events_handler(State(state): State<ServerState>) -> Response {
    let id = generate_connection_id();
    let (stream, body) = event_stream(state.config.channel_capacity);
    let push = PushLoop::new(
        id.clone(),
        state.producer.clone(),
        stream,
        state.config.send_interval(),
    );

    info!(connection = %id, "Client connected");
    tokio::spawn(push.run());
    debug!(connection = %id, "Push loop spawned");

    body.into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request};
    use futures::StreamExt;
    use crate::stream::frame_data;
    use pulse_core::{Event, RandomProducer};
    use tower::ServiceExt;

    fn test_state() -> ServerState {
        ServerState::new(Arc::new(RandomProducer::new()), ServerConfig::new())
    }

    #[test]
    fn test_generate_connection_id() {
        let first = generate_connection_id();
        let second = generate_connection_id();
        assert!(first.starts_with("conn-"));
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn test_health() {
        let response = router(test_state())
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_events_endpoint_streams_first_event() {
        let response = router(test_state())
            .oneshot(Request::get("/api/sse").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/event-stream");
        assert_eq!(
            response.headers()[header::CACHE_CONTROL],
            "no-cache, no-transform"
        );

        let mut frames = response.into_body().into_data_stream();
        let frame = frames.next().await.unwrap().unwrap();
        let event = Event::from_data(&frame_data(&frame)).unwrap();
        assert!(event.as_update().unwrap().value < 100);
    }

    #[tokio::test]
    async fn test_custom_events_path() {
        let state = ServerState::new(
            Arc::new(RandomProducer::new()),
            ServerConfig::new().with_events_path("/stream"),
        );
        let app = router(state);

        let response = app
            .clone()
            .oneshot(Request::get("/stream").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(Request::get("/api/sse").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_run_server_rejects_invalid_config() {
        let config = ServerConfig::new().with_channel_capacity(0);
        let result = run_server(config, Arc::new(RandomProducer::new())).await;
        assert!(matches!(result, Err(PulseError::Config(_))));
    }
}
