use crate::core::types::ChannelKind;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExchangeError {
    /// Transport-level HTTP failure: DNS, TLS, connect, timeout or body read.
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Authentication error: {0}")]
    AuthError(String),

    #[error("Authentication required but no credentials configured")]
    AuthenticationRequired,

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Connection timeout: {0}")]
    ConnectionTimeout(String),

    #[error("Component not started: {0}")]
    NotStarted(String),

    #[error("Component already started: {0}")]
    AlreadyStarted(String),

    #[error("{channel} channel not ready for outbound messages")]
    NotReady { channel: ChannelKind },

    #[error("{channel} channel reconnected before the message could be sent")]
    StaleConnection { channel: ChannelKind },

    #[error("Background task failed: {0}")]
    TaskFailed(String),

    #[error("Event stream closed")]
    StreamClosed,

    #[error("{channel} channel gave up after {attempts} reconnect attempts")]
    ReconnectExhausted { channel: ChannelKind, attempts: u32 },

    #[error("Configuration error: {0}")]
    ConfigError(#[from] crate::core::config::ConfigError),
}
