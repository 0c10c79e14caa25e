//! Teamforge - live session client for an AI agent team
//!
//! Connects to the generation server over a single reconnecting WebSocket and
//! keeps a consistent view of a generation run:
//! - which project is active vs. which one is displayed
//! - the ordered conversation timeline, grouped into rounds
//! - the clarification question (if any) blocking normal input
//! - live progress and the agent roster

pub mod api;
pub mod app;
pub mod commands;
pub mod config;
pub mod dispatcher;
pub mod protocol;
pub mod render;
pub mod router;
pub mod session;
pub mod transport;

pub use dispatcher::{CommandSink, DispatchError, Dispatcher};
pub use protocol::{InboundEvent, OutboundCommand};
pub use router::Effect;
pub use session::Session;
pub use transport::{Transport, TransportEvent, TransportHandle};

use std::time::Duration;

/// Default WebSocket base URL of the generation server
pub const DEFAULT_SERVER_URL: &str = "ws://localhost:8000";

/// Default REST base URL of the generation server
pub const DEFAULT_API_URL: &str = "http://localhost:8000/api";

/// Configuration for Teamforge
#[derive(Debug, Clone)]
pub struct TeamforgeConfig {
    /// WebSocket base URL (`/ws/chat/{client_id}` is appended)
    pub server_url: String,

    /// REST base URL for project/history lookups
    pub api_url: String,

    /// Optional bearer token, sent as `?token=` on the socket and as a header on REST calls
    pub auth_token: Option<String>,

    /// Fixed delay between reconnect attempts
    pub reconnect_delay: Duration,

    /// Keepalive ping interval
    pub ping_interval: Duration,

    /// Project names derived from a message are cut to this many characters
    pub name_max_chars: usize,

    /// Timeout for REST calls
    pub request_timeout: Duration,
}

impl Default for TeamforgeConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            auth_token: None,
            reconnect_delay: Duration::from_secs(3),
            ping_interval: Duration::from_secs(30),
            name_max_chars: 30,
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl TeamforgeConfig {
    pub fn new(server_url: impl Into<String>, api_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            api_url: api_url.into(),
            ..Default::default()
        }
    }

    pub fn with_auth_token(mut self, token: Option<String>) -> Self {
        self.auth_token = token.filter(|t| !t.trim().is_empty());
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn with_ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    pub fn with_name_max_chars(mut self, max: usize) -> Self {
        self.name_max_chars = max;
        self
    }
}

/// Result type for Teamforge operations
pub type Result<T> = std::result::Result<T, TeamforgeError>;

/// Errors that can occur in Teamforge
#[derive(Debug, thiserror::Error)]
pub enum TeamforgeError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}
