use std::path::PathBuf;

/// Error taxonomy for the TTS client.
///
/// Validation and file errors are terminal; only backend failures are
/// candidates for retry.
#[derive(Debug, thiserror::Error)]
pub enum TtsError {
    #[error("invalid {field}: {message}")]
    Validation { field: &'static str, message: String },

    #[error("backend error: {message}")]
    Backend {
        message: String,
        /// HTTP status of the remote rejection, when one was received.
        status: Option<u16>,
    },

    #[error("file error for {path:?}: {message}")]
    File { path: PathBuf, message: String },

    #[error("internal error: {0}")]
    Internal(String),
}

impl TtsError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }

    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
            status: None,
        }
    }

    /// Whether the retry policy may re-attempt after this error.
    ///
    /// Validation never reaches the backend and re-running it cannot change
    /// the result; file errors happen after a successful synthesis and
    /// re-calling the backend would bill the caller twice.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Backend { .. })
    }
}
