//! External collaborators invoked by the router and the orchestrator.
//!
//! Persistence, media playback, UI navigation, and speech output are owned
//! by the host application. The assistant only sees these traits; the
//! [`memory`] module provides in-process implementations for the CLI and
//! tests.

pub mod memory;

pub use memory::{InMemoryMediaLibrary, InMemoryTaskStore, RecordingNavigator, SilentSpeech};

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Fields for a new task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
    /// Task text.
    pub text: String,
    /// Due date as spoken.
    pub due_date: Option<String>,
}

/// A stored task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: Uuid,
    pub user_id: String,
    pub text: String,
    pub due_date: Option<String>,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
}

/// Fields for a new reminder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewReminder {
    /// Reminder text.
    pub text: String,
    /// Time as spoken.
    pub time: Option<String>,
}

/// A stored reminder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reminder {
    pub id: Uuid,
    pub user_id: String,
    pub text: String,
    pub time: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A playable track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    pub name: String,
    pub artist: String,
}

/// Task and reminder persistence.
///
/// Calls may be issued more than once for the same command; implementations
/// should tolerate duplicates.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Create a task for `user_id`.
    async fn create_task(&self, user_id: &str, task: NewTask) -> Result<Task>;

    /// Create a reminder for `user_id`.
    async fn create_reminder(&self, user_id: &str, reminder: NewReminder) -> Result<Reminder>;
}

/// Music search and playback.
#[async_trait]
pub trait MediaService: Send + Sync {
    /// Tracks matching `query`, best first.
    async fn search(&self, query: &str) -> Result<Vec<Track>>;

    /// Start playing `track_id`. `false` if playback could not start.
    async fn play(&self, track_id: &str) -> Result<bool>;
}

/// The UI's page routing capability.
#[async_trait]
pub trait Navigator: Send + Sync {
    /// Show the page at `path`.
    async fn navigate(&self, path: &str);
}

/// Spoken confirmations.
#[async_trait]
pub trait SpeechOutput: Send + Sync {
    /// Speak `text`, resolving when done or cancelled.
    async fn speak(&self, text: &str);

    /// Cut off any utterance in progress. No-op when silent.
    fn cancel(&self);
}
