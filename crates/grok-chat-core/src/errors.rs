/// Top-level error type for the public client API.
///
/// These are raised only before an exchange stream exists. Once bytes are
/// flowing, every failure is folded into the finalized message instead.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChatError {
    /// Invalid client configuration.
    #[error("config error: {0}")]
    Config(String),
    /// Invalid caller input (empty prompt, no user turn, ...).
    #[error("validation error: {0}")]
    Validation(String),
    /// The API answered with a non-success status.
    #[error("api error ({status}): {message}")]
    Api {
        status: u16,
        message: String,
        /// Set for 401/403 so callers can drop a stale key.
        auth_rejected: bool,
    },
    /// The request could not be sent or the response could not be read.
    #[error("transport error: {0}")]
    Transport(String),
    /// The response was readable but not shaped as expected.
    #[error("protocol error: {0}")]
    Protocol(String),
    /// Loading or saving a conversation transcript failed.
    #[error(transparent)]
    Transcript(#[from] TranscriptError),
}

impl ChatError {
    /// Builds an API error, flagging authentication rejections.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
            auth_rejected: matches!(status, 401 | 403),
        }
    }

    /// Returns true if the server rejected the bearer token.
    pub fn is_auth_rejected(&self) -> bool {
        matches!(
            self,
            Self::Api {
                auth_rejected: true,
                ..
            }
        )
    }
}

/// Terminal cause recorded on an exchange that ended abnormally.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, serde::Serialize, serde::Deserialize)]
pub enum StreamFailure {
    /// The chunk source itself failed mid-stream.
    #[error("transport failure: {message}")]
    Transport { message: String },
    /// The caller aborted the exchange.
    #[error("exchange cancelled")]
    Cancelled,
}

impl StreamFailure {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }
}

/// Errors raised while importing or exporting a conversation transcript.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TranscriptError {
    #[error("invalid transcript JSON: {0}")]
    Json(String),
    /// The JSON was valid but neither an export object nor a message array.
    #[error("unrecognized transcript format")]
    UnrecognizedFormat,
    #[error("transcript contains no valid messages")]
    NoMessages,
    #[error("transcript i/o error: {0}")]
    Io(String),
}

impl From<serde_json::Error> for TranscriptError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

impl From<std::io::Error> for TranscriptError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
