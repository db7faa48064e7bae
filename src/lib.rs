//! Lara: wake-word voice command pipeline.
//!
//! The assistant listens for a wake phrase, captures one spoken command,
//! classifies it into a structured intent, and routes the intent to an
//! action:
//! Microphone → Wake word → Command session → Classifier → Router → UI
//!
//! # Architecture
//!
//! - **Capture**: platform speech recognition behind [`capture::SpeechCapture`]
//! - **Wake word**: transcript matching with a supervised restart policy
//! - **Session**: one-shot command capture, one at a time
//! - **Intent**: network classifier with a deterministic pattern fallback
//! - **Router**: intent → action, optimistic writes, navigation targets
//! - **Orchestrator**: the start/stop/restart state machine tying it together

pub mod capture;
pub mod config;
pub mod error;
pub mod intent;
pub mod lara_dirs;
pub mod logging;
pub mod orchestrator;
pub mod router;
pub mod run_state;
pub mod runtime;
pub mod services;
pub mod session;
pub mod wakeword;

pub use config::LaraConfig;
pub use error::{AssistantError, Result};
pub use intent::{ClassifiedIntent, ClassifierChain, Intent, IntentSource};
pub use orchestrator::{Assistant, Collaborators};
pub use router::{ActionResult, ActionRouter};
pub use runtime::{AssistantEvent, AssistantState, EventSink};
