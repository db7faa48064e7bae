//! Speech capture primitive.
//!
//! Wraps a continuous speech-recognition engine behind [`SpeechCapture`]:
//! `start` acquires the microphone and yields a stream of [`CaptureEvent`]s,
//! `stop` ends the run gracefully and `abort` ends it hard. Both are
//! synchronous, idempotent, and release the microphone before returning.
//!
//! Every run ends with exactly one [`CaptureEvent::End`].

pub mod channel;

pub use channel::{ChannelCapture, MicFeed, MicInput};

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::time::Duration;

/// A recognised piece of speech.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcript {
    /// The recognised text.
    pub text: String,
    /// Whether the engine has finalised this hypothesis.
    pub is_final: bool,
    /// When the engine produced the hypothesis.
    pub captured_at: DateTime<Utc>,
}

impl Transcript {
    /// A finalised transcript captured now.
    pub fn final_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: true,
            captured_at: Utc::now(),
        }
    }

    /// An interim hypothesis captured now.
    pub fn interim(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: false,
            captured_at: Utc::now(),
        }
    }
}

/// Per-run capture configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureConfig {
    /// Keep listening after a final transcript (wake listening) or stop
    /// after the first one (one-shot command capture).
    pub continuous: bool,
    /// Deliver non-final hypotheses.
    pub interim_results: bool,
    /// Recognition language.
    pub language: String,
    /// End the run with [`CaptureErrorCode::NoSpeech`] if nothing final is
    /// heard for this long.
    pub silence_timeout: Option<Duration>,
}

impl CaptureConfig {
    /// Continuous configuration used by the wake-word detector.
    pub fn continuous(language: impl Into<String>) -> Self {
        Self {
            continuous: true,
            interim_results: false,
            language: language.into(),
            silence_timeout: None,
        }
    }

    /// One-shot configuration used by command sessions.
    pub fn one_shot(language: impl Into<String>, silence_timeout: Option<Duration>) -> Self {
        Self {
            continuous: false,
            interim_results: false,
            language: language.into(),
            silence_timeout,
        }
    }

    /// Enable or disable interim results.
    pub fn with_interim_results(mut self, enabled: bool) -> Self {
        self.interim_results = enabled;
        self
    }
}

/// Error codes surfaced by the recognition engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CaptureErrorCode {
    /// Nothing was said before the engine gave up.
    NoSpeech,
    /// Microphone permission denied.
    NotAllowed,
    /// Recognition service unreachable.
    Network,
    /// The run was ended by an intentional `abort()`.
    Aborted,
    /// The audio device failed.
    AudioCapture,
    /// Anything else the engine reports.
    Other(String),
}

impl CaptureErrorCode {
    /// Expected conditions that never reach the user.
    pub fn is_benign(&self) -> bool {
        matches!(self, Self::NoSpeech | Self::Aborted)
    }

    /// Conditions that cannot be recovered from without user action.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::NotAllowed)
    }

    /// Conditions worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network)
    }
}

impl std::fmt::Display for CaptureErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoSpeech => f.write_str("no-speech"),
            Self::NotAllowed => f.write_str("not-allowed"),
            Self::Network => f.write_str("network"),
            Self::Aborted => f.write_str("aborted"),
            Self::AudioCapture => f.write_str("audio-capture"),
            Self::Other(code) => f.write_str(code),
        }
    }
}

/// Events produced by one capture run.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureEvent {
    /// Interim or final transcript.
    Transcript(Transcript),
    /// Engine error. Always followed by [`CaptureEvent::End`].
    Error(CaptureErrorCode),
    /// The run is over and the microphone has been released.
    End,
}

/// A boxed stream of capture events for one run.
pub type CaptureStream = Pin<Box<dyn Stream<Item = CaptureEvent> + Send>>;

/// Platform speech-recognition capability.
#[async_trait]
pub trait SpeechCapture: Send + Sync {
    /// Acquire the microphone and begin recognising.
    ///
    /// # Errors
    ///
    /// Returns [`AssistantError::Capture`](crate::error::AssistantError::Capture)
    /// if a run is already active.
    async fn start(&self, config: CaptureConfig) -> Result<CaptureStream>;

    /// End the active run gracefully. No-op when idle.
    fn stop(&self);

    /// End the active run immediately; the stream reports
    /// [`CaptureErrorCode::Aborted`]. No-op when idle.
    fn abort(&self);

    /// Whether a run currently holds the microphone.
    fn is_active(&self) -> bool;
}
