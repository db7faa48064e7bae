//! Channel-fed capture primitive.
//!
//! [`ChannelCapture`] behaves like a browser-style recognition engine whose
//! "microphone" is a [`MicFeed`]: whoever holds the feed pushes utterances,
//! interim hypotheses, silence and engine faults. The CLI feeds it from
//! stdin; tests script it directly.
//!
//! The feed is read lazily as the consumer polls the stream, so input that
//! arrives after a consumer decides to `stop()` stays queued for the next run.

use super::{CaptureConfig, CaptureErrorCode, CaptureEvent, CaptureStream, SpeechCapture, Transcript};
use crate::error::{AssistantError, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{OwnedMutexGuard, mpsc};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Something the virtual microphone "hears".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MicInput {
    /// A finalised utterance.
    Speech(String),
    /// A non-final hypothesis.
    Interim(String),
    /// The engine timed out waiting for speech (`no-speech` + end).
    Silence,
    /// The engine failed with the given code (error + end).
    EngineError(CaptureErrorCode),
    /// The engine ended the session on its own.
    EngineEnd,
}

/// Producer side of the virtual microphone.
#[derive(Debug, Clone)]
pub struct MicFeed {
    tx: mpsc::UnboundedSender<MicInput>,
}

impl MicFeed {
    /// Push raw input. Returns `false` once the capture has been dropped.
    pub fn push(&self, input: MicInput) -> bool {
        self.tx.send(input).is_ok()
    }

    /// Push a finalised utterance.
    pub fn say(&self, text: impl Into<String>) -> bool {
        self.push(MicInput::Speech(text.into()))
    }

    /// Push an interim hypothesis.
    pub fn interim(&self, text: impl Into<String>) -> bool {
        self.push(MicInput::Interim(text.into()))
    }

    /// Simulate the engine's silence timeout.
    pub fn silence(&self) -> bool {
        self.push(MicInput::Silence)
    }

    /// Simulate an engine error.
    pub fn fail(&self, code: CaptureErrorCode) -> bool {
        self.push(MicInput::EngineError(code))
    }

    /// Simulate the engine ending the session unilaterally.
    pub fn end_session(&self) -> bool {
        self.push(MicInput::EngineEnd)
    }
}

type FeedReceiver = mpsc::UnboundedReceiver<MicInput>;

#[derive(Debug)]
struct ActiveRun {
    id: u64,
    cancel: CancellationToken,
    aborted: Arc<AtomicBool>,
}

/// Capture primitive backed by a [`MicFeed`].
pub struct ChannelCapture {
    feed: Arc<tokio::sync::Mutex<FeedReceiver>>,
    active: Arc<Mutex<Option<ActiveRun>>>,
    next_run_id: AtomicU64,
    runs_started: AtomicU64,
}

impl ChannelCapture {
    /// Create a capture and the feed that drives it.
    pub fn new() -> (Self, MicFeed) {
        let (tx, rx) = mpsc::unbounded_channel();
        let capture = Self {
            feed: Arc::new(tokio::sync::Mutex::new(rx)),
            active: Arc::new(Mutex::new(None)),
            next_run_id: AtomicU64::new(1),
            runs_started: AtomicU64::new(0),
        };
        (capture, MicFeed { tx })
    }

    /// Number of runs started so far.
    pub fn runs_started(&self) -> u64 {
        self.runs_started.load(Ordering::Relaxed)
    }

    fn end_active(&self, abort: bool) {
        let run = match self.active.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(run) = run {
            debug!(run = run.id, abort, "capture run released");
            run.aborted.store(abort, Ordering::Relaxed);
            run.cancel.cancel();
        }
    }
}

#[async_trait]
impl SpeechCapture for ChannelCapture {
    async fn start(&self, config: CaptureConfig) -> Result<CaptureStream> {
        let id = self.next_run_id.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        let aborted = Arc::new(AtomicBool::new(false));
        {
            let mut slot = self
                .active
                .lock()
                .map_err(|_| AssistantError::Capture("capture state poisoned".into()))?;
            if let Some(current) = slot.as_ref() {
                return Err(AssistantError::Capture(format!(
                    "microphone busy (run {} active)",
                    current.id
                )));
            }
            *slot = Some(ActiveRun {
                id,
                cancel: cancel.clone(),
                aborted: Arc::clone(&aborted),
            });
        }
        self.runs_started.fetch_add(1, Ordering::Relaxed);
        debug!(
            run = id,
            continuous = config.continuous,
            language = config.language.as_str(),
            "capture run started"
        );

        let deadline = config.silence_timeout.map(|d| Instant::now() + d);
        let run = RunStream {
            id,
            config,
            source: Arc::clone(&self.feed),
            feed: None,
            slot: Arc::clone(&self.active),
            cancel,
            aborted,
            pending: VecDeque::new(),
            finished: false,
            deadline,
        };

        let stream = futures_util::stream::unfold(run, |mut run| async move {
            let event = run.next_event().await?;
            Some((event, run))
        });
        Ok(Box::pin(stream))
    }

    fn stop(&self) {
        self.end_active(false);
    }

    fn abort(&self) {
        self.end_active(true);
    }

    fn is_active(&self) -> bool {
        self.active.lock().map(|s| s.is_some()).unwrap_or(false)
    }
}

enum Polled {
    Input(Option<MicInput>),
    Cancelled,
    Silence,
}

/// State of one run, driven by the consumer's polling.
struct RunStream {
    id: u64,
    config: CaptureConfig,
    source: Arc<tokio::sync::Mutex<FeedReceiver>>,
    feed: Option<OwnedMutexGuard<FeedReceiver>>,
    slot: Arc<Mutex<Option<ActiveRun>>>,
    cancel: CancellationToken,
    aborted: Arc<AtomicBool>,
    pending: VecDeque<CaptureEvent>,
    finished: bool,
    deadline: Option<Instant>,
}

impl RunStream {
    async fn next_event(&mut self) -> Option<CaptureEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }
            if self.finished {
                return None;
            }
            self.step().await;
        }
    }

    async fn step(&mut self) {
        if self.feed.is_none() {
            let source = Arc::clone(&self.source);
            let cancel = self.cancel.clone();
            let guard = tokio::select! {
                biased;
                () = cancel.cancelled() => None,
                guard = source.lock_owned() => Some(guard),
            };
            match guard {
                Some(guard) => self.feed = Some(guard),
                None => {
                    self.finish();
                    return;
                }
            }
        }

        let deadline = self.deadline;
        let silence = async move {
            match deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending().await,
            }
        };

        let cancel = self.cancel.clone();
        let polled = match self.feed.as_mut() {
            Some(feed) => tokio::select! {
                biased;
                () = cancel.cancelled() => Polled::Cancelled,
                input = feed.recv() => Polled::Input(input),
                () = silence => Polled::Silence,
            },
            None => Polled::Cancelled,
        };

        let input = match polled {
            Polled::Input(input) => input,
            Polled::Cancelled => {
                self.finish();
                return;
            }
            Polled::Silence => {
                self.pending
                    .push_back(CaptureEvent::Error(CaptureErrorCode::NoSpeech));
                self.finish();
                return;
            }
        };

        match input {
            Some(MicInput::Speech(text)) => {
                self.pending
                    .push_back(CaptureEvent::Transcript(Transcript::final_text(text)));
                if self.config.continuous {
                    self.deadline = self.config.silence_timeout.map(|d| Instant::now() + d);
                } else {
                    self.finish();
                }
            }
            Some(MicInput::Interim(text)) => {
                if self.config.interim_results {
                    self.pending
                        .push_back(CaptureEvent::Transcript(Transcript::interim(text)));
                }
            }
            Some(MicInput::Silence) => {
                self.pending
                    .push_back(CaptureEvent::Error(CaptureErrorCode::NoSpeech));
                self.finish();
            }
            Some(MicInput::EngineError(code)) => {
                self.pending.push_back(CaptureEvent::Error(code));
                self.finish();
            }
            Some(MicInput::EngineEnd) | None => self.finish(),
        }
    }

    fn finish(&mut self) {
        if self.finished {
            return;
        }
        if self.aborted.load(Ordering::Relaxed) {
            self.pending
                .push_back(CaptureEvent::Error(CaptureErrorCode::Aborted));
        }
        self.pending.push_back(CaptureEvent::End);
        self.finished = true;
        self.feed = None;
        self.release();
    }

    fn release(&self) {
        if let Ok(mut slot) = self.slot.lock()
            && slot.as_ref().is_some_and(|run| run.id == self.id)
        {
            *slot = None;
            debug!(run = self.id, "capture run ended");
        }
    }
}

impl Drop for RunStream {
    fn drop(&mut self) {
        self.release();
    }
}
