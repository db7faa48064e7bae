//! Shared helpers for integration tests.

use async_trait::async_trait;
use lara::capture::{ChannelCapture, MicFeed};
use lara::intent::{ClassifiedIntent, ClassifyError, IntentClassifier};
use lara::services::{InMemoryMediaLibrary, InMemoryTaskStore, RecordingNavigator, SilentSpeech};
use lara::{Assistant, AssistantEvent, AssistantState, ClassifierChain, Collaborators, LaraConfig};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::sync::broadcast;

/// Upper bound for any single wait in these tests.
pub(crate) const WAIT: Duration = Duration::from_secs(10);

/// An assistant wired to in-memory collaborators, plus handles to inspect them.
pub(crate) struct Harness {
    pub assistant: Arc<Assistant>,
    pub feed: MicFeed,
    pub events: broadcast::Receiver<AssistantEvent>,
    pub tasks: Arc<InMemoryTaskStore>,
    pub media: Arc<InMemoryMediaLibrary>,
    pub navigator: Arc<RecordingNavigator>,
    pub speech: Arc<SilentSpeech>,
}

/// Configuration with the network classifier switched off.
pub(crate) fn offline_config() -> LaraConfig {
    let mut config = LaraConfig::default();
    config.classifier.primary_enabled = false;
    config
}

/// Harness with default offline configuration.
pub(crate) fn harness() -> Harness {
    HarnessBuilder::new().build()
}

pub(crate) struct HarnessBuilder {
    config: LaraConfig,
    tasks: InMemoryTaskStore,
    speech: SilentSpeech,
    classifier: Option<ClassifierChain>,
}

impl HarnessBuilder {
    pub(crate) fn new() -> Self {
        Self {
            config: offline_config(),
            tasks: InMemoryTaskStore::new(),
            speech: SilentSpeech::new(),
            classifier: None,
        }
    }

    pub(crate) fn config(mut self, f: impl FnOnce(&mut LaraConfig)) -> Self {
        f(&mut self.config);
        self
    }

    pub(crate) fn tasks(mut self, tasks: InMemoryTaskStore) -> Self {
        self.tasks = tasks;
        self
    }

    pub(crate) fn speech(mut self, speech: SilentSpeech) -> Self {
        self.speech = speech;
        self
    }

    pub(crate) fn classifier(mut self, classifier: ClassifierChain) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub(crate) fn build(self) -> Harness {
        let (capture, feed) = ChannelCapture::new();
        let tasks = Arc::new(self.tasks);
        let media = Arc::new(InMemoryMediaLibrary::demo());
        let navigator = Arc::new(RecordingNavigator::new());
        let speech = Arc::new(self.speech);

        let collaborators = Collaborators {
            capture: Arc::new(capture),
            tasks: tasks.clone(),
            media: media.clone(),
            navigator: navigator.clone(),
            speech: speech.clone(),
        };
        let mut assistant = Assistant::new(self.config, collaborators);
        if let Some(classifier) = self.classifier {
            assistant = assistant.with_classifier(classifier);
        }
        let events = assistant.subscribe();

        Harness {
            assistant: Arc::new(assistant),
            feed,
            events,
            tasks,
            media,
            navigator,
            speech,
        }
    }
}

impl Harness {
    /// Wait for the first event matching `pred`, skipping the rest.
    pub(crate) async fn next_matching(
        &mut self,
        mut pred: impl FnMut(&AssistantEvent) -> bool,
    ) -> AssistantEvent {
        tokio::time::timeout(WAIT, async {
            loop {
                match self.events.recv().await {
                    Ok(event) if pred(&event) => return event,
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => panic!("event channel closed"),
                }
            }
        })
        .await
        .expect("timed out waiting for event")
    }

    /// Wait until the assistant reports `state`.
    pub(crate) async fn wait_for_state(&self, state: AssistantState) {
        let mut rx = self.assistant.watch_state();
        tokio::time::timeout(WAIT, rx.wait_for(|s| *s == state))
            .await
            .expect("timed out waiting for state")
            .expect("state channel closed");
    }

    /// Everything emitted so far that nobody has consumed yet.
    pub(crate) fn drain(&mut self) -> Vec<AssistantEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }

    /// Say the wake phrase followed by `command`.
    pub(crate) fn speak_command(&self, command: &str) {
        self.feed.say("hey lara");
        self.feed.say(command);
    }
}

/// Classifier tier that never answers, for stopping mid-classification.
pub(crate) struct Stalled {
    calls: AtomicU32,
}

impl Stalled {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicU32::new(0),
        })
    }

    pub(crate) fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IntentClassifier for Stalled {
    fn name(&self) -> &str {
        "stalled"
    }

    async fn classify(&self, _transcript: &str) -> Result<ClassifiedIntent, ClassifyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::future::pending().await
    }
}
