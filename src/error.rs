//! Error types for the Lara voice-command pipeline.

/// Top-level error type for the assistant.
#[derive(Debug, thiserror::Error)]
pub enum AssistantError {
    /// Speech capture primitive error (microphone busy, engine failure).
    #[error("capture error: {0}")]
    Capture(String),

    /// Microphone permission was denied. Fatal until the user grants access.
    #[error("microphone permission denied")]
    PermissionDenied,

    /// The wake-word detector gave up after too many consecutive errors.
    #[error("wake word detector stopped after {errors} consecutive errors")]
    WakeWordExhausted {
        /// Number of consecutive errors observed.
        errors: u32,
    },

    /// A command session was requested while another one is active.
    #[error("a command session is already active")]
    SessionBusy,

    /// Persistence collaborator error.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Media collaborator error.
    #[error("media error: {0}")]
    Media(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AssistantError {
    /// Whether this error must stop the assistant and be shown to the user.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::PermissionDenied | Self::WakeWordExhausted { .. } | Self::Capture(_)
        )
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, AssistantError>;
