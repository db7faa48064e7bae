//! In-process collaborators.

use super::{MediaService, Navigator, NewReminder, NewTask, Reminder, SpeechOutput, Task, TaskStore, Track};
use crate::error::{AssistantError, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, info};
use uuid::Uuid;

/// Task store backed by vectors.
#[derive(Debug, Default)]
pub struct InMemoryTaskStore {
    tasks: Mutex<Vec<Task>>,
    reminders: Mutex<Vec<Reminder>>,
    failing: AtomicBool,
    latency: Option<Duration>,
}

impl InMemoryTaskStore {
    /// An empty, healthy store.
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose writes always fail.
    pub fn failing() -> Self {
        let store = Self::default();
        store.failing.store(true, Ordering::SeqCst);
        store
    }

    /// Delay every write by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Toggle failure injection.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Stored tasks.
    pub fn tasks(&self) -> Vec<Task> {
        self.tasks.lock().map(|t| t.clone()).unwrap_or_default()
    }

    /// Stored reminders.
    pub fn reminders(&self) -> Vec<Reminder> {
        self.reminders.lock().map(|r| r.clone()).unwrap_or_default()
    }

    async fn write_gate(&self) -> Result<()> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(AssistantError::Persistence("store unavailable".to_owned()));
        }
        Ok(())
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn create_task(&self, user_id: &str, task: NewTask) -> Result<Task> {
        self.write_gate().await?;
        let task = Task {
            id: Uuid::new_v4(),
            user_id: user_id.to_owned(),
            text: task.text,
            due_date: task.due_date,
            completed: false,
            created_at: Utc::now(),
        };
        self.tasks
            .lock()
            .map_err(|_| AssistantError::Persistence("task table poisoned".to_owned()))?
            .push(task.clone());
        Ok(task)
    }

    async fn create_reminder(&self, user_id: &str, reminder: NewReminder) -> Result<Reminder> {
        self.write_gate().await?;
        let reminder = Reminder {
            id: Uuid::new_v4(),
            user_id: user_id.to_owned(),
            text: reminder.text,
            time: reminder.time,
            created_at: Utc::now(),
        };
        self.reminders
            .lock()
            .map_err(|_| AssistantError::Persistence("reminder table poisoned".to_owned()))?
            .push(reminder.clone());
        Ok(reminder)
    }
}

/// A fixed track list with substring search.
#[derive(Debug, Default)]
pub struct InMemoryMediaLibrary {
    tracks: Vec<Track>,
    playing: Mutex<Option<String>>,
}

impl InMemoryMediaLibrary {
    /// Library over `tracks`.
    pub fn new(tracks: Vec<Track>) -> Self {
        Self {
            tracks,
            playing: Mutex::new(None),
        }
    }

    /// A small built-in catalogue.
    pub fn demo() -> Self {
        let track = |id: &str, name: &str, artist: &str| Track {
            id: id.to_owned(),
            name: name.to_owned(),
            artist: artist.to_owned(),
        };
        Self::new(vec![
            track("tel-001", "Telugu Songs Mix: Butta Bomma", "Armaan Malik"),
            track("tel-002", "Samajavaragamana (Telugu songs)", "Sid Sriram"),
            track("jaz-001", "So What", "Miles Davis"),
            track("jaz-002", "Take Five (jazz)", "Dave Brubeck Quartet"),
            track("pop-001", "Blinding Lights", "The Weeknd"),
        ])
    }

    /// Id of the track last started.
    pub fn now_playing(&self) -> Option<String> {
        self.playing.lock().ok().and_then(|p| p.clone())
    }
}

#[async_trait]
impl MediaService for InMemoryMediaLibrary {
    async fn search(&self, query: &str) -> Result<Vec<Track>> {
        let needle = query.trim().to_lowercase();
        let words: Vec<&str> = needle.split_whitespace().collect();
        let hits = self
            .tracks
            .iter()
            .filter(|t| {
                let hay = format!("{} {}", t.name, t.artist).to_lowercase();
                !words.is_empty() && words.iter().all(|w| hay.contains(w))
            })
            .cloned()
            .collect();
        Ok(hits)
    }

    async fn play(&self, track_id: &str) -> Result<bool> {
        if !self.tracks.iter().any(|t| t.id == track_id) {
            return Ok(false);
        }
        let mut playing = self
            .playing
            .lock()
            .map_err(|_| AssistantError::Media("player state poisoned".to_owned()))?;
        *playing = Some(track_id.to_owned());
        info!(track_id, "playback started");
        Ok(true)
    }
}

/// Records every navigation.
#[derive(Debug, Default)]
pub struct RecordingNavigator {
    visited: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    /// An empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every path navigated to, oldest first.
    pub fn visited(&self) -> Vec<String> {
        self.visited.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Navigator for RecordingNavigator {
    async fn navigate(&self, path: &str) {
        info!(path, "navigate");
        if let Ok(mut visited) = self.visited.lock() {
            visited.push(path.to_owned());
        }
    }
}

/// Speech output that logs instead of speaking.
///
/// With a speaking time set, `speak` holds for that long unless cancelled.
#[derive(Debug, Default)]
pub struct SilentSpeech {
    spoken: Mutex<Vec<String>>,
    cancels: AtomicU32,
    speaking_time: Option<Duration>,
    cancelled: Arc<Notify>,
}

impl SilentSpeech {
    /// Instant, silent output.
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate each utterance taking `duration`.
    pub fn with_speaking_time(mut self, duration: Duration) -> Self {
        self.speaking_time = Some(duration);
        self
    }

    /// Everything passed to `speak`, oldest first.
    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// How many times `cancel` was called.
    pub fn cancel_count(&self) -> u32 {
        self.cancels.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeechOutput for SilentSpeech {
    async fn speak(&self, text: &str) {
        debug!(text, "speak");
        if let Ok(mut spoken) = self.spoken.lock() {
            spoken.push(text.to_owned());
        }
        if let Some(duration) = self.speaking_time {
            tokio::select! {
                () = tokio::time::sleep(duration) => {}
                () = self.cancelled.notified() => debug!("speech cancelled"),
            }
        }
    }

    fn cancel(&self) {
        self.cancels.fetch_add(1, Ordering::SeqCst);
        self.cancelled.notify_waiters();
    }
}
