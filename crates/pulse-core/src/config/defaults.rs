/// Default interface the server binds to
pub const DEFAULT_BIND_HOST: &str = "127.0.0.1";

/// Default server port
pub const DEFAULT_PORT: u16 = 3000;

/// Default path of the event stream endpoint
pub const DEFAULT_EVENTS_PATH: &str = "/api/sse";

/// Default delay between sends on one connection (milliseconds)
pub const DEFAULT_SEND_INTERVAL_MS: u64 = 5000;

/// Default number of frames buffered between the push loop and the response body
pub const DEFAULT_CHANNEL_CAPACITY: usize = 16;

/// Default endpoint the subscriber connects to
pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:3000/api/sse";

/// Default delay before reconnecting after a transport error (milliseconds)
pub const DEFAULT_RETRY_DELAY_MS: u64 = 5000;
