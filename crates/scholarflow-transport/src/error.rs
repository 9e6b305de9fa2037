//! Transport errors.

/// Push channel error.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Connect failed: {0}")]
    Connect(String),
    #[error("WebSocket error: {0}")]
    WebSocket(String),
    #[error("Channel closed")]
    ChannelClosed,
}

/// Research server HTTP error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// The server answered with a non-success status.
    #[error("Server returned status {0}")]
    Status(u16),
    /// The request never got an answer.
    #[error("Network error: {0}")]
    Network(String),
    /// The server answered 2xx with a body we could not decode.
    #[error("Malformed response: {0}")]
    Decode(String),
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl ApiError {
    /// 404 and 5xx mean the session is gone for good.
    #[must_use]
    pub fn is_session_lost(&self) -> bool {
        matches!(self, Self::Status(code) if *code == 404 || *code >= 500)
    }
}
