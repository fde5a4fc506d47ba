use thiserror::Error;

/// Errors surfaced by the chat client.
///
/// Background paths (polling, presence) log these and carry on; user actions
/// (send, gift order) return them so the caller can alert.
#[derive(Error, Debug)]
pub enum ChatError {
    /// WebSocket construction or protocol failure
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// Request never produced a response (DNS, refused, aborted, ...)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Server answered with a non-2xx status
    #[error("request failed with status {status}: {body}")]
    Status { status: u16, body: String },

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Malformed base URL
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// Table number outside the accepted range
    #[error("invalid table number: {0:?}")]
    InvalidTable(String),

    /// Operation needs the session's own table id
    #[error("table id is not set")]
    NoTable,

    /// Gift order without a recipient or without items
    #[error("gift order is incomplete: {0}")]
    IncompleteOrder(&'static str),
}

/// Convenience type alias for `Result<T, ChatError>`.
pub type Result<T> = std::result::Result<T, ChatError>;
