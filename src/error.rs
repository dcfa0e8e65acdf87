//! Error taxonomy shared by every layer of the client.
//!
//! Stale solver results are deliberately absent: they are classified by
//! [`crate::session::Receipt`] and dropped without ever reaching the user.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type VizResult<T> = Result<T, VizError>;

#[derive(Debug, Error)]
pub enum VizError {
    /// Bad user input, caught before any network call.
    #[error("{0}")]
    Validation(String),

    /// Transport-level failure or non-2xx status on a synchronous call.
    #[error("Network error: {0}")]
    Network(String),

    /// A response arrived but does not fit the expected shape.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// The broker connection is down or could not be established.
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Render error: {0}")]
    Render(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl VizError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedResponse(message.into())
    }

    /// Whether the message makes sense to the user on its own.
    ///
    /// Connection trouble is handled by the reconnect loop. It reaches the
    /// user through `ChannelEvent::Unreachable`, or with added context when
    /// it fails a user action.
    pub fn is_user_facing(&self) -> bool {
        !matches!(self, Self::Connection(_))
    }
}

impl From<serde_json::Error> for VizError {
    fn from(err: serde_json::Error) -> Self {
        Self::MalformedResponse(err.to_string())
    }
}
