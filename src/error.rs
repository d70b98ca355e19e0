use std::fmt;

use serde::Serialize;

/// Convenience result type used at the library boundary.
pub type Result<T> = std::result::Result<T, ChatReelError>;

/// Error taxonomy for a render job.
///
/// Asset degradation (missing fonts, sounds, undecodable avatars) is not part of
/// this enum: those conditions are handled by the caller choosing a fallback.
#[derive(thiserror::Error, Debug)]
pub enum ChatReelError {
    /// Malformed or empty conversation, unresolved character ids, bad colors.
    #[error("invalid conversation: {0}")]
    Validation(String),

    /// Codec or container failure while producing the video. Terminal for the job.
    #[error("encoding failed: {0}")]
    Encoding(String),

    /// Filesystem failure with the operation that triggered it.
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ChatReelError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn encoding(msg: impl Into<String>) -> Self {
        Self::Encoding(msg.into())
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Stable machine-readable code for the CLI error envelope.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Validation(_) => ErrorCode::InvalidConversation,
            Self::Encoding(_) => ErrorCode::EncodeFailed,
            Self::Io { .. } => ErrorCode::IoError,
            Self::Other(_) => ErrorCode::Internal,
        }
    }

    pub fn envelope(&self) -> ErrorEnvelope {
        ErrorEnvelope {
            ok: false,
            error: ErrorEnvelopeBody {
                code: self.code(),
                message: self.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidConversation,
    EncodeFailed,
    IoError,
    Internal,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self {
            Self::InvalidConversation => "INVALID_CONVERSATION",
            Self::EncodeFailed => "ENCODE_FAILED",
            Self::IoError => "IO_ERROR",
            Self::Internal => "INTERNAL",
        };
        f.write_str(code)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorEnvelope {
    pub ok: bool,
    pub error: ErrorEnvelopeBody,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorEnvelopeBody {
    pub code: ErrorCode,
    pub message: String,
}

/// Find a [`ChatReelError`] anywhere in an `anyhow` chain.
pub fn find_chatreel_error(error: &anyhow::Error) -> Option<&ChatReelError> {
    error
        .chain()
        .find_map(|cause| cause.downcast_ref::<ChatReelError>())
}
