//! Transcript-based wake phrase detector.
//!
//! Runs the capture primitive in continuous mode and watches every final
//! transcript for the wake phrase (or one of its phonetic variants, since
//! recognisers spell "Lara" several ways). On a match the detector stops the
//! capture, freeing the microphone for the command session, and resolves
//! [`WakeWordDetector::listen`] with a single [`WakeEvent`].
//!
//! Recognition engines end sessions on their own (silence limits, internal
//! caps). The detector supervises its capture runs with a [`RestartPolicy`]:
//! benign endings restart silently, other errors count towards a bounded
//! threshold after which the detector gives up with a fatal error.

use crate::capture::{CaptureConfig, CaptureErrorCode, CaptureEvent, CaptureStream, SpeechCapture, Transcript};
use crate::config::{CaptureSettings, WakewordConfig};
use crate::error::{AssistantError, Result};
use crate::run_state::RunSignal;
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

/// Greetings recognisers commonly produce for "hey".
const GREETING_VARIANTS: &[&str] = &["hey", "hay", "hei", "hi", "hai", "hello"];

/// Spellings recognisers commonly produce for "lara".
const LARA_VARIANTS: &[&str] = &["lara", "laura", "lora", "lera", "larra", "lahra", "larah"];

// ── Phrase matching ──────────────────────────────────────────────────

/// Matches transcripts against the wake phrase and its variants.
///
/// Matching is done on normalised word tokens (lower case, punctuation
/// stripped), so "Hey, Lara!" matches "hey lara" while "clara" never
/// matches "lara".
#[derive(Debug, Clone)]
pub struct WakePhraseMatcher {
    /// Token sequences, longest first.
    variants: Vec<Vec<String>>,
}

impl WakePhraseMatcher {
    /// Build a matcher for `phrase` plus any `extra` spellings.
    pub fn new(phrase: &str, extra: &[String]) -> Self {
        let phrase_tokens = tokenize(phrase);
        let mut variants: Vec<Vec<String>> = vec![phrase_tokens.clone()];

        if let [greeting, name] = phrase_tokens.as_slice() {
            let greetings: Vec<&str> = if GREETING_VARIANTS.contains(&greeting.as_str()) {
                GREETING_VARIANTS.to_vec()
            } else {
                vec![greeting.as_str()]
            };
            let names: Vec<&str> = if LARA_VARIANTS.contains(&name.as_str()) {
                LARA_VARIANTS.to_vec()
            } else {
                vec![name.as_str()]
            };
            for g in &greetings {
                for n in &names {
                    variants.push(vec![(*g).to_owned(), (*n).to_owned()]);
                }
            }
        } else if let [name] = phrase_tokens.as_slice()
            && LARA_VARIANTS.contains(&name.as_str())
        {
            variants.extend(LARA_VARIANTS.iter().map(|n| vec![(*n).to_owned()]));
        }

        variants.extend(extra.iter().map(|e| tokenize(e)));
        variants.retain(|v| !v.is_empty());
        variants.sort_by_key(|v| std::cmp::Reverse(v.len()));
        variants.dedup();

        Self { variants }
    }

    /// Build a matcher from configuration.
    pub fn from_config(config: &WakewordConfig) -> Self {
        Self::new(&config.phrase, &config.extra_variations)
    }

    /// Number of accepted variants.
    pub fn variant_count(&self) -> usize {
        self.variants.len()
    }

    /// Whether `text` contains the wake phrase anywhere.
    pub fn matches(&self, text: &str) -> bool {
        self.find(&tokenize(text)).is_some()
    }

    /// Remove a leading wake phrase, preserving the rest of the original text.
    ///
    /// "Hey Lara, play telugu songs" becomes "play telugu songs". Text that
    /// does not start with the wake phrase is returned trimmed.
    pub fn strip_wake_phrase(&self, text: &str) -> String {
        let spans = token_spans(text);
        match self.find(&span_tokens(&spans)) {
            Some((0, len)) => remainder(text, spans[len - 1].1),
            _ => text.trim().to_owned(),
        }
    }

    /// Text following the first wake phrase in `text`, if any.
    ///
    /// "hey lara play telugu songs" yields "play telugu songs"; a bare
    /// "Hey, Lara!" yields `None`.
    pub fn command_after_wake(&self, text: &str) -> Option<String> {
        let spans = token_spans(text);
        let (start, len) = self.find(&span_tokens(&spans))?;
        let rest = remainder(text, spans[start + len - 1].1);
        (!rest.is_empty()).then_some(rest)
    }

    /// Earliest occurrence of any variant as `(token index, token count)`,
    /// preferring the longer variant at the same position.
    fn find(&self, tokens: &[String]) -> Option<(usize, usize)> {
        self.variants
            .iter()
            .filter_map(|v| {
                tokens
                    .windows(v.len())
                    .position(|w| w == v.as_slice())
                    .map(|start| (start, v.len()))
            })
            .min_by_key(|&(start, len)| (start, std::cmp::Reverse(len)))
    }
}

/// Word boundary shared by matching and stripping.
fn is_separator(c: char) -> bool {
    c.is_whitespace() || (c.is_ascii_punctuation() && c != '\'')
}

fn normalise_token(word: &str) -> String {
    word.chars()
        .filter(|c| c.is_alphanumeric() || *c == '\'')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Normalised tokens, each with the byte offset just past it in `text`.
fn token_spans(text: &str) -> Vec<(String, usize)> {
    let mut spans = Vec::new();
    let mut push = |word: &str, end: usize| {
        let token = normalise_token(word);
        if !token.is_empty() {
            spans.push((token, end));
        }
    };

    let mut start = None;
    for (i, c) in text.char_indices() {
        if is_separator(c) {
            if let Some(s) = start.take() {
                push(&text[s..i], i);
            }
        } else if start.is_none() {
            start = Some(i);
        }
    }
    if let Some(s) = start {
        push(&text[s..], text.len());
    }
    spans
}

fn span_tokens(spans: &[(String, usize)]) -> Vec<String> {
    spans.iter().map(|(t, _)| t.clone()).collect()
}

fn tokenize(text: &str) -> Vec<String> {
    token_spans(text).into_iter().map(|(t, _)| t).collect()
}

fn remainder(text: &str, end: usize) -> String {
    text[end..].trim_start_matches(is_separator).trim().to_owned()
}

// ── State ────────────────────────────────────────────────────────────

/// Mutable detector state. Owned by the detector; read via snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WakeWordState {
    /// A continuous capture run is active.
    pub listening: bool,
    /// A wake event fired and the command cycle has not finished yet.
    pub processing: bool,
    /// When the last wake event fired.
    pub last_detected_at: Option<DateTime<Utc>>,
    /// Non-benign capture errors since the last healthy transcript.
    pub consecutive_error_count: u32,
}

/// Coarse detector status derived from [`WakeWordState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WakeStatus {
    /// Not listening, nothing in flight.
    Idle,
    /// Passively listening for the wake phrase.
    Listening,
    /// Wake event fired; the command cycle owns the microphone.
    Processing,
    /// Explicitly disabled; will not restart.
    Disabled,
}

/// How a wake event was triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WakeTrigger {
    /// The wake phrase was heard.
    Phrase,
    /// The user activated the assistant from the UI.
    Manual,
}

/// A single wake detection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WakeEvent {
    /// What triggered it.
    pub trigger: WakeTrigger,
    /// The transcript that contained the wake phrase, if any.
    pub transcript: Option<Transcript>,
    /// When it fired.
    pub detected_at: DateTime<Utc>,
}

/// Result of one [`WakeWordDetector::listen`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenOutcome {
    /// Wake event fired; the microphone has been released.
    Wake(WakeEvent),
    /// The run signal cleared or the detector was disabled.
    Stopped,
}

// ── Restart supervision ──────────────────────────────────────────────

/// Supervisor decision after a capture error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartDecision {
    /// Restart listening after the debounce delay.
    Restart,
    /// Stop and surface a fatal error.
    GiveUp,
}

/// Bounded restart policy for the continuous capture run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartPolicy {
    /// Consecutive errors tolerated; exceeding this gives up.
    pub max_consecutive_errors: u32,
    /// Debounce before re-acquiring the microphone.
    pub restart_delay: Duration,
}

impl RestartPolicy {
    /// Build from configuration.
    pub fn from_config(config: &WakewordConfig) -> Self {
        Self {
            max_consecutive_errors: config.max_consecutive_errors,
            restart_delay: config.restart_delay(),
        }
    }

    /// Decide what to do given the consecutive error count so far.
    pub fn decide(&self, consecutive_errors: u32) -> RestartDecision {
        if consecutive_errors > self.max_consecutive_errors {
            RestartDecision::GiveUp
        } else {
            RestartDecision::Restart
        }
    }
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self::from_config(&WakewordConfig::default())
    }
}

// ── Detector ─────────────────────────────────────────────────────────

/// How one capture run ended.
enum RunEnd {
    Wake(WakeEvent),
    Stopped,
    Ended,
    Fatal(AssistantError),
}

/// Wake-word detector supervising a continuous capture run.
pub struct WakeWordDetector {
    capture: Arc<dyn SpeechCapture>,
    matcher: WakePhraseMatcher,
    policy: RestartPolicy,
    capture_config: CaptureConfig,
    run: RunSignal,
    state: Mutex<WakeWordState>,
    disabled: AtomicBool,
    /// A manual wake is pending. Cleared by [`reset`](Self::reset), so a
    /// leftover `manual_wake` permit from before a stop is ignored.
    manual_pending: AtomicBool,
    manual_wake: Notify,
}

impl WakeWordDetector {
    /// Create a detector.
    pub fn new(
        capture: Arc<dyn SpeechCapture>,
        matcher: WakePhraseMatcher,
        policy: RestartPolicy,
        capture_config: CaptureConfig,
        run: RunSignal,
    ) -> Self {
        Self {
            capture,
            matcher,
            policy,
            capture_config,
            run,
            state: Mutex::new(WakeWordState::default()),
            disabled: AtomicBool::new(false),
            manual_pending: AtomicBool::new(false),
            manual_wake: Notify::new(),
        }
    }

    /// Create a detector from configuration.
    pub fn from_config(
        capture: Arc<dyn SpeechCapture>,
        wakeword: &WakewordConfig,
        capture_settings: &CaptureSettings,
        run: RunSignal,
    ) -> Self {
        Self::new(
            capture,
            WakePhraseMatcher::from_config(wakeword),
            RestartPolicy::from_config(wakeword),
            CaptureConfig::continuous(capture_settings.language.clone()),
            run,
        )
    }

    /// The phrase matcher (shared with the command session for stripping).
    pub fn matcher(&self) -> &WakePhraseMatcher {
        &self.matcher
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> WakeWordState {
        self.with_state(|s| s.clone())
    }

    /// Coarse status.
    pub fn status(&self) -> WakeStatus {
        if self.disabled.load(Ordering::Acquire) {
            return WakeStatus::Disabled;
        }
        let state = self.state();
        if state.processing {
            WakeStatus::Processing
        } else if state.listening {
            WakeStatus::Listening
        } else {
            WakeStatus::Idle
        }
    }

    /// Listen until the wake phrase is heard, a manual trigger arrives, the
    /// run signal clears, or the restart policy gives up.
    ///
    /// When this returns [`ListenOutcome::Wake`], the capture has already
    /// been stopped and `processing` is set.
    ///
    /// # Errors
    ///
    /// [`AssistantError::PermissionDenied`] when the microphone is refused,
    /// [`AssistantError::WakeWordExhausted`] when too many consecutive errors
    /// occur.
    pub async fn listen(&self) -> Result<ListenOutcome> {
        loop {
            if !self.run.is_running() || self.disabled.load(Ordering::Acquire) {
                self.mark_idle();
                return Ok(ListenOutcome::Stopped);
            }

            let mut stream = match self.capture.start(self.capture_config.clone()).await {
                Ok(stream) => stream,
                Err(e) => {
                    let errors = self.bump_errors();
                    warn!(error = %e, errors, "wake word capture failed to start");
                    if self.policy.decide(errors) == RestartDecision::GiveUp {
                        self.mark_idle();
                        return Err(AssistantError::WakeWordExhausted { errors });
                    }
                    if !self.run.sleep_while_running(self.policy.restart_delay).await {
                        self.mark_idle();
                        return Ok(ListenOutcome::Stopped);
                    }
                    continue;
                }
            };

            self.with_state(|s| s.listening = true);
            debug!("wake word detector listening");

            match self.watch(&mut stream).await {
                RunEnd::Wake(event) => return Ok(ListenOutcome::Wake(event)),
                RunEnd::Stopped => {
                    self.capture.abort();
                    self.mark_idle();
                    return Ok(ListenOutcome::Stopped);
                }
                RunEnd::Fatal(err) => {
                    self.capture.abort();
                    self.mark_idle();
                    return Err(err);
                }
                RunEnd::Ended => {
                    self.with_state(|s| s.listening = false);
                    debug!("capture run ended, restarting wake word listening");
                    if !self.run.sleep_while_running(self.policy.restart_delay).await {
                        self.mark_idle();
                        return Ok(ListenOutcome::Stopped);
                    }
                }
            }
        }
    }

    /// Debounced re-arm after a command cycle: clear `processing`, wait for
    /// the command session's microphone release, then [`listen`](Self::listen).
    ///
    /// # Errors
    ///
    /// Same as [`listen`](Self::listen).
    pub async fn restart(&self) -> Result<ListenOutcome> {
        self.with_state(|s| s.processing = false);
        if !self.run.sleep_while_running(self.policy.restart_delay).await {
            self.mark_idle();
            return Ok(ListenOutcome::Stopped);
        }
        self.listen().await
    }

    /// Request a manual wake. Resolves a pending or the next `listen()`.
    pub fn trigger(&self) {
        if self.manual_pending.swap(true, Ordering::AcqRel) {
            debug!("manual wake already pending");
            return;
        }
        self.manual_wake.notify_one();
    }

    /// Stop listening and refuse to restart until [`enable`](Self::enable).
    pub fn disable(&self) {
        if !self.disabled.swap(true, Ordering::AcqRel) {
            info!("wake word detector disabled");
        }
        if self.state().listening {
            self.capture.stop();
        }
        self.mark_idle();
    }

    /// Allow listening again after [`disable`](Self::disable).
    pub fn enable(&self) {
        if self.disabled.swap(false, Ordering::AcqRel) {
            info!("wake word detector enabled");
        }
    }

    /// Reconcile flags after an external teardown, clear the error count,
    /// and drop any stale manual trigger.
    pub fn reset(&self) {
        self.with_state(|s| {
            s.listening = false;
            s.processing = false;
            s.consecutive_error_count = 0;
        });
        if self.manual_pending.swap(false, Ordering::AcqRel) {
            debug!("dropped pending manual wake");
        }
    }

    async fn watch(&self, stream: &mut CaptureStream) -> RunEnd {
        loop {
            tokio::select! {
                biased;
                () = self.run.stopped() => return RunEnd::Stopped,
                () = self.manual_wake.notified() => {
                    if self.manual_pending.swap(false, Ordering::AcqRel) {
                        info!("manual activation");
                        return RunEnd::Wake(self.detected(WakeTrigger::Manual, None));
                    }
                    debug!("stale manual wake ignored");
                }
                event = stream.next() => match event {
                    None | Some(CaptureEvent::End) => return RunEnd::Ended,
                    Some(CaptureEvent::Transcript(t)) if t.is_final => {
                        self.with_state(|s| s.consecutive_error_count = 0);
                        if self.matcher.matches(&t.text) {
                            info!(transcript = t.text.as_str(), "wake phrase detected");
                            return RunEnd::Wake(self.detected(WakeTrigger::Phrase, Some(t)));
                        }
                        debug!(transcript = t.text.as_str(), "no wake phrase");
                    }
                    Some(CaptureEvent::Transcript(_)) => {}
                    Some(CaptureEvent::Error(code)) => {
                        if let Some(end) = self.on_error(code) {
                            return end;
                        }
                    }
                },
            }
        }
    }

    fn on_error(&self, code: CaptureErrorCode) -> Option<RunEnd> {
        if code.is_benign() {
            debug!(code = %code, "benign capture error");
            return None;
        }
        if code.is_fatal() {
            warn!(code = %code, "microphone permission denied");
            return Some(RunEnd::Fatal(AssistantError::PermissionDenied));
        }
        let errors = self.bump_errors();
        warn!(code = %code, errors, "wake word capture error");
        match self.policy.decide(errors) {
            RestartDecision::Restart => None,
            RestartDecision::GiveUp => Some(RunEnd::Fatal(AssistantError::WakeWordExhausted { errors })),
        }
    }

    fn detected(&self, trigger: WakeTrigger, transcript: Option<Transcript>) -> WakeEvent {
        // Release the microphone before anyone hears about the wake event.
        self.capture.stop();
        let detected_at = Utc::now();
        self.with_state(|s| {
            s.listening = false;
            s.processing = true;
            s.last_detected_at = Some(detected_at);
            s.consecutive_error_count = 0;
        });
        WakeEvent {
            trigger,
            transcript,
            detected_at,
        }
    }

    fn bump_errors(&self) -> u32 {
        self.with_state(|s| {
            s.consecutive_error_count += 1;
            s.consecutive_error_count
        })
    }

    fn mark_idle(&self) {
        self.with_state(|s| {
            s.listening = false;
            s.processing = false;
        });
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut WakeWordState) -> T) -> T {
        match self.state.lock() {
            Ok(mut guard) => f(&mut guard),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }
}
