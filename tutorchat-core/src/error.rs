use thiserror::Error;

/// Core error type for tutorchat.
/// Internally, modules can use `anyhow::Result<T>` for convenience,
/// but public boundaries should expose `CoreResult<T>` with this error.
#[derive(Debug, Error)]
pub enum TutorChatError {
    #[error("validation failed: {0}")]
    Validation(String),

    /// Network failure or a non-2xx status without a structured body.
    #[error("{message}")]
    Transport { message: String },

    /// 429 with a structured `{error}` body; the message is shown verbatim.
    #[error("{message}")]
    RateLimited { message: String },

    /// 402 with a structured `{error}` body; the message is shown verbatim.
    #[error("{message}")]
    QuotaExceeded { message: String },

    /// The backend embedded an `error` field mid-stream; the turn is abandoned.
    #[error("{message}")]
    Stream { message: String },

    /// The stream completed without producing any assistant text.
    #[error("the AI didn't send any content")]
    EmptyContent,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TutorChatError {
    pub(crate) fn send_failed() -> Self {
        Self::Transport {
            message: "failed to send message".to_string(),
        }
    }

    pub(crate) fn stream_start_failed() -> Self {
        Self::Transport {
            message: "failed to start stream".to_string(),
        }
    }

    /// Short stable label for telemetry and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Transport { .. } => "transport",
            Self::RateLimited { .. } => "rate_limited",
            Self::QuotaExceeded { .. } => "quota_exceeded",
            Self::Stream { .. } => "stream",
            Self::EmptyContent => "empty_content",
            Self::Io(_) => "io",
            Self::Other(_) => "other",
        }
    }
}

pub type CoreResult<T> = std::result::Result<T, TutorChatError>;
