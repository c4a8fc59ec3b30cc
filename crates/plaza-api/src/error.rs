use thiserror::Error;

/// Failures of a single REST call. All of them are recoverable from the
/// caller's point of view.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("server returned {status}: {msg}")]
    Status { status: u16, msg: String },

    /// The envelope came back with `success=false`.
    #[error("{0}")]
    Rejected(String),

    #[error("malformed response: {0}")]
    Decode(String),
}

impl ApiError {
    /// Text suitable for a transient notice. Only server-authored messages are
    /// shown verbatim; transport details stay in the logs.
    pub fn user_message(&self, fallback: &str) -> String {
        match self {
            Self::Rejected(msg) | Self::Status { msg, .. } if !msg.trim().is_empty() => msg.clone(),
            _ => fallback.to_string(),
        }
    }
}
