//! One-shot command capture after a wake event.

use crate::capture::{CaptureConfig, CaptureEvent, SpeechCapture};
use crate::error::{AssistantError, Result};
use crate::run_state::RunSignal;
use crate::wakeword::WakePhraseMatcher;
use futures_util::StreamExt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// How a command session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Non-empty command text, wake phrase stripped.
    Command(String),
    /// The capture ended without any usable speech.
    NoSpeech,
    /// The run signal cleared while capturing.
    Cancelled,
}

/// Enforces at most one active command session.
#[derive(Debug, Clone, Default)]
pub struct SessionGate {
    busy: Arc<AtomicBool>,
}

impl SessionGate {
    /// Create an open gate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the gate. `None` while another session holds it.
    pub fn try_begin(&self) -> Option<SessionGuard> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SessionGuard {
                busy: Arc::clone(&self.busy),
                id: Uuid::new_v4(),
            })
    }

    /// Whether a session currently holds the gate.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Proof of an active session; releases the gate on drop.
#[derive(Debug)]
pub struct SessionGuard {
    busy: Arc<AtomicBool>,
    id: Uuid,
}

impl SessionGuard {
    /// Session identifier for logs and events.
    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

/// A single command capture. Lives exactly as long as one capture run.
pub struct CommandSession<'a> {
    guard: &'a SessionGuard,
    capture: Arc<dyn SpeechCapture>,
    config: CaptureConfig,
    matcher: Option<&'a WakePhraseMatcher>,
    run: RunSignal,
}

impl<'a> CommandSession<'a> {
    /// Prepare a session under `guard`.
    pub fn new(
        guard: &'a SessionGuard,
        capture: Arc<dyn SpeechCapture>,
        config: CaptureConfig,
        run: RunSignal,
    ) -> Self {
        Self {
            guard,
            capture,
            config,
            matcher: None,
            run,
        }
    }

    /// Strip a leading wake phrase from the captured command.
    pub fn with_wake_phrase(mut self, matcher: &'a WakePhraseMatcher) -> Self {
        self.matcher = Some(matcher);
        self
    }

    /// Capture one command.
    ///
    /// # Errors
    ///
    /// [`AssistantError::PermissionDenied`] if the microphone is refused, or
    /// [`AssistantError::Capture`] if the capture cannot start.
    pub async fn run(self) -> Result<SessionOutcome> {
        let session = self.guard.id();
        if !self.run.is_running() {
            return Ok(SessionOutcome::Cancelled);
        }

        let mut stream = self.capture.start(self.config.clone()).await?;
        debug!(%session, "command session listening");

        let mut fragments: Vec<String> = Vec::new();
        loop {
            let event = tokio::select! {
                biased;
                () = self.run.stopped() => {
                    self.capture.abort();
                    info!(%session, "command session cancelled");
                    return Ok(SessionOutcome::Cancelled);
                }
                event = stream.next() => event,
            };

            match event {
                Some(CaptureEvent::Transcript(t)) if t.is_final => {
                    let text = t.text.trim();
                    if !text.is_empty() {
                        fragments.push(text.to_owned());
                    }
                }
                Some(CaptureEvent::Transcript(t)) => {
                    debug!(%session, interim = t.text.as_str(), "interim command transcript");
                }
                Some(CaptureEvent::Error(code)) if code.is_fatal() => {
                    self.capture.abort();
                    warn!(%session, code = %code, "command capture refused");
                    return Err(AssistantError::PermissionDenied);
                }
                Some(CaptureEvent::Error(code)) if code.is_benign() => {
                    debug!(%session, code = %code, "command capture ended quietly");
                }
                Some(CaptureEvent::Error(code)) => {
                    warn!(%session, code = %code, "command capture error");
                }
                Some(CaptureEvent::End) | None => break,
            }
        }

        let joined = fragments.join(" ");
        let command = match self.matcher {
            Some(matcher) => matcher.strip_wake_phrase(&joined),
            None => joined.trim().to_owned(),
        };

        if command.is_empty() {
            info!(%session, "no speech captured");
            Ok(SessionOutcome::NoSpeech)
        } else {
            info!(%session, command = command.as_str(), "command captured");
            Ok(SessionOutcome::Command(command))
        }
    }
}
