//! Runtime events emitted by the assistant for UI and observability.
//!
//! Payloads are small and cloned into a `tokio::sync::broadcast` channel.
//! Slow subscribers lag; the assistant never waits on them.

use crate::intent::ClassifiedIntent;
use crate::router::ActionResult;
use serde::Serialize;
use std::fmt;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Default capacity of the event channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Where the orchestrator is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AssistantState {
    Stopped,
    WakeListening,
    CommandListening,
    Classifying,
    Routing,
    Navigating,
}

impl fmt::Display for AssistantState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Stopped => "stopped",
            Self::WakeListening => "wake_listening",
            Self::CommandListening => "command_listening",
            Self::Classifying => "classifying",
            Self::Routing => "routing",
            Self::Navigating => "navigating",
        };
        f.write_str(name)
    }
}

/// Which background write an event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteKind {
    Task,
    Reminder,
}

impl fmt::Display for WriteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Task => f.write_str("task"),
            Self::Reminder => f.write_str("reminder"),
        }
    }
}

/// Events that describe what the assistant is doing "right now".
#[derive(Debug, Clone)]
pub enum AssistantEvent {
    /// Lifecycle state changed.
    StateChanged {
        from: AssistantState,
        to: AssistantState,
    },
    /// The wake phrase was heard (or a manual activation fired).
    WakeDetected {
        /// Transcript that contained the wake phrase; `None` for manual wakes.
        transcript: Option<String>,
    },
    /// A command session captured text.
    CommandCaptured { session: Uuid, text: String },
    /// A command session ended without speech.
    NoSpeechCaptured { session: Uuid },
    /// The classifier produced an intent.
    IntentClassified(ClassifiedIntent),
    /// The router finished handling an intent.
    ActionCompleted(ActionResult),
    /// The orchestrator asked the UI to show a page.
    Navigated { path: String },
    /// An optimistic write completed.
    BackgroundWriteCompleted { kind: WriteKind, id: Uuid },
    /// An optimistic write failed after success was already reported.
    BackgroundFailure { kind: WriteKind, text: String, error: String },
    /// The assistant stopped on an unrecoverable error.
    Fatal { message: String },
}

/// Sending half of the event channel. Cheap to clone.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: broadcast::Sender<AssistantEvent>,
}

impl EventSink {
    /// A new channel with `capacity` buffered events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish `event`. Dropped silently when nobody is subscribed.
    pub fn emit(&self, event: AssistantEvent) {
        let _ = self.tx.send(event);
    }

    /// A new subscriber seeing events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<AssistantEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventSink {
    fn default() -> Self {
        Self::new(EVENT_CHANNEL_CAPACITY)
    }
}
