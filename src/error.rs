//! Error types for the timeslicer sync client.

/// Top-level error type for state loading, saving, and import.
#[derive(Debug, thiserror::Error)]
pub enum TimeslicerError {
    /// Network-level failure talking to the remote store.
    #[error("transport error: {0}")]
    Transport(String),

    /// Remote store answered with a non-success status.
    #[error("remote store returned HTTP {0}")]
    Status(u16),

    /// Request did not complete within the transport timeout.
    #[error("request timed out: {0}")]
    Timeout(String),

    /// Remote payload could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// Import text was malformed or carried the wrong version.
    #[error("import error: {0}")]
    Import(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Local state store error.
    #[error("store error: {0}")]
    Store(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TimeslicerError {
    /// Returns `true` for failures of the transport itself (network error,
    /// non-2xx status, timeout) as opposed to local or payload problems.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Status(_) | Self::Timeout(_)
        )
    }
}

impl From<reqwest::Error> for TimeslicerError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, TimeslicerError>;
