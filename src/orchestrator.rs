//! The assistant's top-level state machine.
//!
//! ```text
//! Stopped → WakeListening → CommandListening → Classifying → Routing → (Navigating)
//!              ↑                                                            │
//!              └──────────────────── continuous ────────────────────────────┤
//!                                                     one-shot → Stopped ───┘
//! ```
//!
//! One lifecycle runs as a spawned task. The run flag, the current state, and
//! the lifecycle generation are only changed under one lock, so a transition
//! issued by a lifecycle that has already been stopped is discarded instead
//! of overwriting `Stopped`.
//!
//! [`Assistant::stop`] is synchronous and safe to call from any number of
//! places, in any state, any number of times.

use crate::capture::{CaptureConfig, SpeechCapture};
use crate::config::LaraConfig;
use crate::error::{AssistantError, Result};
use crate::intent::ClassifierChain;
use crate::router::ActionRouter;
use crate::run_state::RunController;
use crate::runtime::{AssistantEvent, AssistantState, EventSink};
use crate::services::{MediaService, Navigator, SpeechOutput, TaskStore};
use crate::session::{CommandSession, SessionGate, SessionOutcome};
use crate::wakeword::{ListenOutcome, WakeTrigger, WakeWordDetector};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// External capabilities the assistant drives.
#[derive(Clone)]
pub struct Collaborators {
    pub capture: Arc<dyn SpeechCapture>,
    pub tasks: Arc<dyn TaskStore>,
    pub media: Arc<dyn MediaService>,
    pub navigator: Arc<dyn Navigator>,
    pub speech: Arc<dyn SpeechOutput>,
}

/// Where a lifecycle begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Entry {
    /// Passive wake listening first.
    Wake,
    /// Straight into a command session (manual activation while stopped).
    Command,
}

#[derive(Debug, Default)]
struct Lifecycle {
    generation: u64,
    task: Option<JoinHandle<()>>,
}

struct Inner {
    config: LaraConfig,
    capture: Arc<dyn SpeechCapture>,
    navigator: Arc<dyn Navigator>,
    speech: Arc<dyn SpeechOutput>,
    detector: WakeWordDetector,
    classifier: ClassifierChain,
    router: ActionRouter,
    sessions: SessionGate,
    events: EventSink,
    run: RunController,
    lifecycle: Mutex<Lifecycle>,
    state: watch::Sender<AssistantState>,
}

/// The voice assistant.
///
/// Share it behind an `Arc` to call [`stop`](Self::stop) from several UI
/// triggers.
pub struct Assistant {
    inner: Arc<Inner>,
}

impl Assistant {
    /// Wire an assistant from configuration and collaborators.
    pub fn new(config: LaraConfig, collaborators: Collaborators) -> Self {
        let run = RunController::new();
        let events = EventSink::default();
        let detector = WakeWordDetector::from_config(
            Arc::clone(&collaborators.capture),
            &config.wakeword,
            &config.capture,
            run.signal(),
        );
        let router = ActionRouter::new(
            collaborators.tasks,
            collaborators.media,
            config.router.user_id.clone(),
        )
        .with_events(events.clone());
        let (state, _) = watch::channel(AssistantState::Stopped);

        Self {
            inner: Arc::new(Inner {
                classifier: ClassifierChain::from_config(&config.classifier),
                config,
                capture: collaborators.capture,
                navigator: collaborators.navigator,
                speech: collaborators.speech,
                detector,
                router,
                sessions: SessionGate::new(),
                events,
                run,
                lifecycle: Mutex::new(Lifecycle::default()),
                state,
            }),
        }
    }

    /// Publish events on `events` instead of a private channel.
    ///
    /// Only effective before the first [`start`](Self::start).
    pub fn with_events(mut self, events: EventSink) -> Self {
        match Arc::get_mut(&mut self.inner) {
            Some(inner) => {
                inner.router.set_events(events.clone());
                inner.events = events;
            }
            None => warn!("with_events ignored: assistant already started"),
        }
        self
    }

    /// Replace the classifier chain built from configuration.
    ///
    /// Only effective before the first [`start`](Self::start).
    pub fn with_classifier(mut self, classifier: ClassifierChain) -> Self {
        match Arc::get_mut(&mut self.inner) {
            Some(inner) => inner.classifier = classifier,
            None => warn!("with_classifier ignored: assistant already started"),
        }
        self
    }

    /// Begin listening for the wake phrase. No-op if already running.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) -> bool {
        self.inner.launch(Entry::Wake)
    }

    /// Hard stop. Effective from any state, idempotent.
    pub fn stop(&self) {
        self.inner.hard_stop();
    }

    /// Stop, wait for the microphone to be released, start again.
    pub async fn restart(&self) -> bool {
        self.stop();
        tokio::time::sleep(self.inner.config.orchestrator.restart_delay()).await;
        self.start()
    }

    /// Manual activation.
    ///
    /// While wake listening this acts as if the wake phrase was heard. While
    /// stopped it runs a single command cycle and stops again. Ignored while
    /// a command is already being handled.
    pub fn activate(&self) -> bool {
        match self.state() {
            AssistantState::Stopped => self.inner.launch(Entry::Command),
            AssistantState::WakeListening => {
                self.inner.detector.trigger();
                true
            }
            busy => {
                debug!(state = %busy, "activation ignored while handling a command");
                false
            }
        }
    }

    /// Current state.
    pub fn state(&self) -> AssistantState {
        *self.inner.state.borrow()
    }

    /// Whether the run flag is set.
    pub fn is_running(&self) -> bool {
        self.inner.run.is_running()
    }

    /// Subscribe to runtime events.
    pub fn subscribe(&self) -> broadcast::Receiver<AssistantEvent> {
        self.inner.events.subscribe()
    }

    /// Watch state changes.
    pub fn watch_state(&self) -> watch::Receiver<AssistantState> {
        self.inner.state.subscribe()
    }

    /// Resolve once the assistant is stopped.
    pub async fn wait_stopped(&self) {
        let mut rx = self.inner.state.subscribe();
        let _ = rx.wait_for(|s| *s == AssistantState::Stopped).await;
    }

    /// The router, for flushing background writes.
    pub fn router(&self) -> &ActionRouter {
        &self.inner.router
    }
}

impl Drop for Assistant {
    fn drop(&mut self) {
        self.inner.hard_stop();
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Lifecycle> {
        match self.lifecycle.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn set_state(&self, to: AssistantState) {
        let from = self.state.send_replace(to);
        if from != to {
            debug!(%from, %to, "state changed");
            self.events.emit(AssistantEvent::StateChanged { from, to });
        }
    }

    fn launch(self: &Arc<Self>, entry: Entry) -> bool {
        let mut lifecycle = self.lock();
        if !self.run.set_running(true) {
            debug!("start ignored: already running");
            return false;
        }
        lifecycle.generation += 1;
        let generation = lifecycle.generation;

        self.detector.enable();
        self.set_state(match entry {
            Entry::Wake => AssistantState::WakeListening,
            Entry::Command => AssistantState::CommandListening,
        });
        info!(generation, ?entry, "assistant started");

        let inner = Arc::clone(self);
        lifecycle.task = Some(tokio::spawn(async move {
            inner.run_lifecycle(generation, entry).await;
        }));
        true
    }

    /// Transition on behalf of lifecycle `generation`. Refused once that
    /// lifecycle has been stopped.
    fn transition(&self, generation: u64, to: AssistantState) -> bool {
        let lifecycle = self.lock();
        if lifecycle.generation != generation || !self.run.is_running() {
            return false;
        }
        self.set_state(to);
        true
    }

    fn hard_stop(&self) {
        let task = {
            let mut lifecycle = self.lock();
            // The flag goes first so nothing re-arms listening after this.
            let was_running = self.run.set_running(false);
            lifecycle.generation += 1;
            self.capture.abort();
            self.speech.cancel();
            self.detector.reset();
            self.set_state(AssistantState::Stopped);
            if was_running {
                info!("assistant stopped");
            }
            lifecycle.task.take()
        };
        if let Some(task) = task {
            task.abort();
        }
    }

    /// Stop from inside the lifecycle task itself. The task handle is
    /// detached rather than aborted.
    fn finish(&self, generation: u64) {
        let mut lifecycle = self.lock();
        if lifecycle.generation != generation {
            return;
        }
        self.run.set_running(false);
        lifecycle.generation += 1;
        self.capture.abort();
        self.detector.reset();
        self.set_state(AssistantState::Stopped);
        lifecycle.task.take();
    }

    fn fatal(&self, generation: u64, err: &AssistantError) {
        error!(error = %err, "assistant stopping on fatal error");
        self.events.emit(AssistantEvent::Fatal {
            message: err.to_string(),
        });
        self.speech.cancel();
        self.finish(generation);
    }

    async fn run_lifecycle(self: Arc<Self>, generation: u64, entry: Entry) {
        let one_shot = entry == Entry::Command || self.config.orchestrator.one_shot;
        let mut rearm = false;

        loop {
            let mut carried = None;
            if entry == Entry::Wake {
                if !self.transition(generation, AssistantState::WakeListening) {
                    return;
                }
                let heard = if rearm {
                    self.detector.restart().await
                } else {
                    self.detector.listen().await
                };
                rearm = true;

                match heard {
                    Ok(ListenOutcome::Wake(event)) => {
                        let transcript = event.transcript.map(|t| t.text);
                        if event.trigger == WakeTrigger::Manual {
                            info!("manual wake");
                        }
                        carried = transcript
                            .as_deref()
                            .and_then(|t| self.detector.matcher().command_after_wake(t));
                        self.events.emit(AssistantEvent::WakeDetected { transcript });
                    }
                    Ok(ListenOutcome::Stopped) => return,
                    Err(e) => {
                        self.fatal(generation, &e);
                        return;
                    }
                }
            }

            match self.command_cycle(generation, carried).await {
                Ok(()) => {}
                Err(e) if e.is_fatal() => {
                    self.fatal(generation, &e);
                    return;
                }
                Err(e) => warn!(error = %e, "command cycle failed"),
            }

            if one_shot {
                info!("one-shot cycle complete");
                self.finish(generation);
                return;
            }
        }
    }

    /// Capture → classify → route → navigate/confirm. Holds the session gate
    /// for the whole cycle.
    ///
    /// `carried` is a command spoken in the same utterance as the wake
    /// phrase; when present no capture session is started.
    async fn command_cycle(&self, generation: u64, carried: Option<String>) -> Result<()> {
        if !self.transition(generation, AssistantState::CommandListening) {
            return Ok(());
        }
        let guard = self.sessions.try_begin().ok_or(AssistantError::SessionBusy)?;
        let signal = self.run.signal();

        let outcome = match carried {
            Some(text) => {
                debug!(command = text.as_str(), "command carried in wake utterance");
                SessionOutcome::Command(text)
            }
            None => {
                let capture_config = CaptureConfig::one_shot(
                    self.config.capture.language.clone(),
                    self.config.session.silence_timeout(),
                )
                .with_interim_results(self.config.capture.interim_results);
                CommandSession::new(&guard, Arc::clone(&self.capture), capture_config, signal.clone())
                    .with_wake_phrase(self.detector.matcher())
                    .run()
                    .await?
            }
        };

        let text = match outcome {
            SessionOutcome::Command(text) => {
                self.events.emit(AssistantEvent::CommandCaptured {
                    session: guard.id(),
                    text: text.clone(),
                });
                text
            }
            SessionOutcome::NoSpeech => {
                self.events.emit(AssistantEvent::NoSpeechCaptured { session: guard.id() });
                return Ok(());
            }
            SessionOutcome::Cancelled => return Ok(()),
        };

        if !self.transition(generation, AssistantState::Classifying) {
            return Ok(());
        }
        let classified = tokio::select! {
            biased;
            () = signal.stopped() => return Ok(()),
            classified = self.classifier.classify(&text) => classified,
        };
        info!(
            intent = classified.intent.tag(),
            confidence = classified.confidence,
            source = ?classified.source,
            "intent classified"
        );
        self.events.emit(AssistantEvent::IntentClassified(classified.clone()));

        if !self.transition(generation, AssistantState::Routing) {
            return Ok(());
        }
        let result = tokio::select! {
            biased;
            () = signal.stopped() => return Ok(()),
            result = self.router.route(&classified) => result,
        };
        self.events.emit(AssistantEvent::ActionCompleted(result.clone()));

        if let Some(path) = result.navigation_target() {
            if !self.transition(generation, AssistantState::Navigating) {
                return Ok(());
            }
            self.navigator.navigate(path).await;
            self.events.emit(AssistantEvent::Navigated {
                path: path.to_owned(),
            });
        }

        if self.config.orchestrator.speak_confirmations && signal.is_running() {
            tokio::select! {
                biased;
                () = signal.stopped() => {}
                () = self.speech.speak(&result.message) => {}
            }
        }
        Ok(())
    }
}
