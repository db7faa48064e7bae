//! Intent classification.
//!
//! A transcript is classified into one [`Intent`] by a [`ClassifierChain`]:
//! a network classifier ([`PrimaryClassifier`]) answers when it can, and the
//! deterministic [`PatternClassifier`] answers when it cannot. The chain
//! itself never fails; the worst case is a low-confidence
//! [`Intent::GeneralQuery`] carrying the raw text.

pub mod chain;
pub mod json;
pub mod pattern;
pub mod primary;

pub use chain::{ClassifierChain, TierHealth};
pub use pattern::{PatternClassifier, route_for};
pub use primary::PrimaryClassifier;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Confidence below which an intent is a best guess rather than a parse.
pub const LOW_CONFIDENCE_THRESHOLD: f32 = 0.3;

/// One supported command family.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "intent", rename_all = "snake_case")]
pub enum Intent {
    /// Search for and play music.
    PlayMusic {
        /// Free-text search query. May be empty when nothing followed "play".
        query: String,
    },
    /// Create a task.
    AddTask {
        /// Task text.
        text: String,
        /// Due date phrase as spoken ("tomorrow", "on friday").
        #[serde(default, skip_serializing_if = "Option::is_none")]
        due_date: Option<String>,
    },
    /// Show the task list.
    ShowTasks,
    /// Create a reminder.
    AddReminder {
        /// Reminder text.
        text: String,
        /// Time phrase as spoken ("at 6", "in 10 minutes").
        #[serde(default, skip_serializing_if = "Option::is_none")]
        time: Option<String>,
    },
    /// Show the reminder list.
    ShowReminders,
    /// Go to a page.
    Navigate {
        /// Application path, e.g. `/reminders`.
        target: String,
    },
    /// Anything not otherwise actionable.
    GeneralQuery {
        /// The raw transcript.
        text: String,
    },
}

impl Intent {
    /// Wire tag of this intent (`play_music`, `add_task`, ...).
    pub fn tag(&self) -> &'static str {
        match self {
            Self::PlayMusic { .. } => "play_music",
            Self::AddTask { .. } => "add_task",
            Self::ShowTasks => "show_tasks",
            Self::AddReminder { .. } => "add_reminder",
            Self::ShowReminders => "show_reminders",
            Self::Navigate { .. } => "navigate",
            Self::GeneralQuery { .. } => "general_query",
        }
    }
}

/// Which classifier produced an intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentSource {
    /// The network classifier.
    Primary,
    /// The local pattern matcher.
    Fallback,
}

/// An intent plus how sure the classifier was and who produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedIntent {
    /// The classified intent.
    #[serde(flatten)]
    pub intent: Intent,
    /// Confidence in `[0, 1]`.
    pub confidence: f32,
    /// Producing classifier.
    pub source: IntentSource,
}

impl ClassifiedIntent {
    /// Build a classified intent, clamping confidence into `[0, 1]`.
    pub fn new(intent: Intent, confidence: f32, source: IntentSource) -> Self {
        Self {
            intent,
            confidence: confidence.clamp(0.0, 1.0),
            source,
        }
    }

    /// Whether the confidence reaches [`LOW_CONFIDENCE_THRESHOLD`].
    pub fn is_confident(&self) -> bool {
        self.confidence >= LOW_CONFIDENCE_THRESHOLD
    }
}

/// Stable error codes for classifier failures.
pub mod error_codes {
    /// The call exceeded its hard timeout.
    pub const TIMEOUT: &str = "CLASSIFIER_TIMEOUT";
    /// Non-2xx response.
    pub const HTTP: &str = "CLASSIFIER_HTTP";
    /// Connection or body read failure.
    pub const TRANSPORT: &str = "CLASSIFIER_TRANSPORT";
    /// Response was not parseable JSON.
    pub const MALFORMED: &str = "CLASSIFIER_MALFORMED";
    /// JSON did not match the intent schema.
    pub const SCHEMA: &str = "CLASSIFIER_SCHEMA";
    /// The classifier is switched off or not configured.
    pub const DISABLED: &str = "CLASSIFIER_DISABLED";
}

/// Why a classifier could not produce an intent.
///
/// Every variant is recoverable: the chain falls through to the next tier.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ClassifyError {
    /// The call exceeded its hard timeout.
    #[error("[{}] no response within {}ms", error_codes::TIMEOUT, .0.as_millis())]
    Timeout(Duration),

    /// The service answered with a non-2xx status.
    #[error("[{}] HTTP {status}: {message}", error_codes::HTTP)]
    Http {
        /// Response status code.
        status: u16,
        /// Error message extracted from the body.
        message: String,
    },

    /// The request could not be sent or the body could not be read.
    #[error("[{}] {}", error_codes::TRANSPORT, .0)]
    Transport(String),

    /// The response did not contain a JSON object.
    #[error("[{}] {}", error_codes::MALFORMED, .0)]
    Malformed(String),

    /// The JSON object did not match the intent schema.
    #[error("[{}] {}", error_codes::SCHEMA, .0)]
    Schema(String),

    /// The classifier is disabled.
    #[error("[{}] {}", error_codes::DISABLED, .0)]
    Disabled(String),
}

impl ClassifyError {
    /// Stable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Timeout(_) => error_codes::TIMEOUT,
            Self::Http { .. } => error_codes::HTTP,
            Self::Transport(_) => error_codes::TRANSPORT,
            Self::Malformed(_) => error_codes::MALFORMED,
            Self::Schema(_) => error_codes::SCHEMA,
            Self::Disabled(_) => error_codes::DISABLED,
        }
    }

    /// Failures that will not go away by asking again: disabled tiers and
    /// rejected credentials.
    pub fn is_permanent(&self) -> bool {
        match self {
            Self::Disabled(_) => true,
            Self::Http { status, .. } => matches!(status, 401 | 403),
            _ => false,
        }
    }
}

/// A classifier tier.
#[async_trait]
pub trait IntentClassifier: Send + Sync {
    /// Tier name for logs.
    fn name(&self) -> &str;

    /// Classify one transcript.
    async fn classify(&self, transcript: &str) -> Result<ClassifiedIntent, ClassifyError>;
}
