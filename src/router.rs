//! Intent → action dispatch.
//!
//! Every handler returns an [`ActionResult`]; nothing fails past
//! [`ActionRouter::route`]. The router never navigates itself. Handlers that
//! need a page change put the path in `data.navigationTarget` and the
//! orchestrator acts on it.
//!
//! Task and reminder creation is optimistic: success is reported as soon as
//! the write is issued. The write runs on a tracked background task and its
//! outcome is published as [`AssistantEvent::BackgroundWriteCompleted`] or
//! [`AssistantEvent::BackgroundFailure`].

use crate::intent::{ClassifiedIntent, Intent};
use crate::runtime::{AssistantEvent, EventSink, WriteKind};
use crate::services::{MediaService, NewReminder, NewTask, TaskStore};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::sync::Arc;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

/// Key in [`ActionResult::data`] carrying a required page transition.
pub const NAVIGATION_TARGET: &str = "navigationTarget";

/// Uniform handler result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResult {
    pub success: bool,
    /// User-facing message, spoken as confirmation.
    pub message: String,
    /// Intent tag that produced this result.
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Map<String, Value>>,
}

impl ActionResult {
    fn ok(action: &str, message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            action: action.to_owned(),
            data: None,
        }
    }

    fn failed(action: &str, message: impl Into<String>) -> Self {
        Self {
            success: false,
            ..Self::ok(action, message)
        }
    }

    fn with_data(mut self, data: Value) -> Self {
        if let Value::Object(map) = data {
            self.data = Some(map);
        }
        self
    }

    /// The page the UI should show, if any.
    pub fn navigation_target(&self) -> Option<&str> {
        self.data.as_ref()?.get(NAVIGATION_TARGET)?.as_str()
    }
}

/// Page an intent leads to, if it leads anywhere.
pub fn navigation_target_for(intent: &Intent) -> Option<&str> {
    match intent {
        Intent::ShowTasks => Some("/tasks"),
        Intent::ShowReminders => Some("/reminders"),
        Intent::Navigate { target } => Some(target.as_str()),
        _ => None,
    }
}

/// Dispatches classified intents to their handlers.
pub struct ActionRouter {
    tasks: Arc<dyn TaskStore>,
    media: Arc<dyn MediaService>,
    user_id: String,
    events: EventSink,
    background: TaskTracker,
}

impl ActionRouter {
    /// Router writing on behalf of `user_id`.
    pub fn new(
        tasks: Arc<dyn TaskStore>,
        media: Arc<dyn MediaService>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            tasks,
            media,
            user_id: user_id.into(),
            events: EventSink::default(),
            background: TaskTracker::new(),
        }
    }

    /// Publish background outcomes on `events`.
    pub fn with_events(mut self, events: EventSink) -> Self {
        self.set_events(events);
        self
    }

    pub(crate) fn set_events(&mut self, events: EventSink) {
        self.events = events;
    }

    /// Number of background writes still running.
    pub fn pending_writes(&self) -> usize {
        self.background.len()
    }

    /// Wait for every background write issued so far.
    pub async fn flush(&self) {
        self.background.close();
        self.background.wait().await;
        self.background.reopen();
    }

    /// Handle one intent. Never fails.
    pub async fn route(&self, classified: &ClassifiedIntent) -> ActionResult {
        let action = classified.intent.tag();
        let result = match &classified.intent {
            Intent::PlayMusic { query } => self.play_music(action, query).await,
            Intent::AddTask { text, due_date } => self.add_task(action, text, due_date.clone()),
            Intent::AddReminder { text, time } => self.add_reminder(action, text, time.clone()),
            Intent::ShowTasks => ActionResult::ok(action, "Here are your tasks."),
            Intent::ShowReminders => ActionResult::ok(action, "Here are your reminders."),
            Intent::Navigate { target } => ActionResult::ok(action, format!("Opening {target}.")),
            Intent::GeneralQuery { text } => general_query(action, text),
        };
        let result = match navigation_target_for(&classified.intent) {
            Some(target) => result.with_data(json!({ NAVIGATION_TARGET: target })),
            None => result,
        };

        info!(
            action,
            success = result.success,
            confidence = classified.confidence,
            "action routed"
        );
        result
    }

    async fn play_music(&self, action: &str, query: &str) -> ActionResult {
        let query = query.trim();
        if query.is_empty() {
            return ActionResult::failed(action, "What would you like me to play?");
        }

        let tracks = match self.media.search(query).await {
            Ok(tracks) => tracks,
            Err(e) => {
                warn!(query, error = %e, "media search failed");
                return ActionResult::failed(action, "I couldn't reach the music service.");
            }
        };
        let Some(track) = tracks.into_iter().next() else {
            return ActionResult::failed(action, format!("I couldn't find any music for \"{query}\"."));
        };

        match self.media.play(&track.id).await {
            Ok(true) => ActionResult::ok(action, format!("Playing {} by {}.", track.name, track.artist))
                .with_data(json!({
                    "query": query,
                    "trackId": track.id,
                    "trackName": track.name,
                })),
            Ok(false) => ActionResult::failed(action, format!("I couldn't play {}.", track.name)),
            Err(e) => {
                warn!(track_id = track.id.as_str(), error = %e, "media playback failed");
                ActionResult::failed(action, format!("I couldn't play {}.", track.name))
            }
        }
    }

    fn add_task(&self, action: &str, text: &str, due_date: Option<String>) -> ActionResult {
        let text = text.trim().to_owned();
        if text.is_empty() {
            return ActionResult::failed(action, "What should the task say?");
        }
        let message = match &due_date {
            Some(due) => format!("Added \"{text}\" to your tasks, due {due}."),
            None => format!("Added \"{text}\" to your tasks."),
        };
        let data = json!({ "text": text, "dueDate": due_date });

        let store = Arc::clone(&self.tasks);
        let user_id = self.user_id.clone();
        let events = self.events.clone();
        let task = NewTask { text, due_date };
        self.background.spawn(async move {
            let text = task.text.clone();
            match store.create_task(&user_id, task).await {
                Ok(created) => events.emit(AssistantEvent::BackgroundWriteCompleted {
                    kind: WriteKind::Task,
                    id: created.id,
                }),
                Err(e) => report_background_failure(&events, WriteKind::Task, text, &e),
            }
        });

        ActionResult::ok(action, message).with_data(data)
    }

    fn add_reminder(&self, action: &str, text: &str, time: Option<String>) -> ActionResult {
        let text = text.trim().to_owned();
        if text.is_empty() {
            return ActionResult::failed(action, "What should I remind you about?");
        }
        let message = match &time {
            Some(time) => format!("I'll remind you to {text} {time}."),
            None => format!("I'll remind you to {text}."),
        };
        let data = json!({ "text": text, "time": time });

        let store = Arc::clone(&self.tasks);
        let user_id = self.user_id.clone();
        let events = self.events.clone();
        let reminder = NewReminder { text, time };
        self.background.spawn(async move {
            let text = reminder.text.clone();
            match store.create_reminder(&user_id, reminder).await {
                Ok(created) => events.emit(AssistantEvent::BackgroundWriteCompleted {
                    kind: WriteKind::Reminder,
                    id: created.id,
                }),
                Err(e) => report_background_failure(&events, WriteKind::Reminder, text, &e),
            }
        });

        ActionResult::ok(action, message).with_data(data)
    }
}

fn general_query(action: &str, text: &str) -> ActionResult {
    let text = text.trim();
    if text.is_empty() {
        return ActionResult::failed(action, "Sorry, I didn't catch that.");
    }
    ActionResult::ok(action, format!("You said: {text}")).with_data(json!({ "query": text }))
}

fn report_background_failure(
    events: &EventSink,
    kind: WriteKind,
    text: String,
    err: &crate::error::AssistantError,
) {
    error!(%kind, text = text.as_str(), error = %err, "background write failed after optimistic success");
    events.emit(AssistantEvent::BackgroundFailure {
        kind,
        text,
        error: err.to_string(),
    });
}
