//! Configuration types for the voice-command pipeline.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable consulted when `classifier.api_key` is unset.
pub const CLASSIFIER_API_KEY_ENV: &str = "LARA_CLASSIFIER_API_KEY";

/// Top-level configuration for the assistant.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LaraConfig {
    /// Speech capture settings shared by the detector and the command session.
    pub capture: CaptureSettings,
    /// Wake phrase detection.
    pub wakeword: WakewordConfig,
    /// Command session (one-shot capture after a wake event).
    pub session: SessionConfig,
    /// Intent classification (primary service + pattern fallback).
    pub classifier: ClassifierConfig,
    /// Action routing.
    pub router: RouterConfig,
    /// Top-level assistant loop.
    pub orchestrator: OrchestratorConfig,
    /// Diagnostic logging.
    pub logging: LoggingConfig,
}

/// Speech capture configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    /// BCP-47 recognition language.
    pub language: String,
    /// Whether interim (non-final) hypotheses are delivered to consumers.
    pub interim_results: bool,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            language: "en-US".to_owned(),
            interim_results: false,
        }
    }
}

/// Wake phrase detection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WakewordConfig {
    /// Wake phrase (case-insensitive).
    pub phrase: String,
    /// Extra spellings accepted in addition to the generated phonetic variants.
    pub extra_variations: Vec<String>,
    /// Consecutive non-benign capture errors tolerated before giving up.
    pub max_consecutive_errors: u32,
    /// Debounce before the detector re-acquires the microphone.
    pub restart_delay_ms: u64,
}

impl Default for WakewordConfig {
    fn default() -> Self {
        Self {
            phrase: "hey lara".to_owned(),
            extra_variations: Vec::new(),
            max_consecutive_errors: 5,
            restart_delay_ms: 300,
        }
    }
}

impl WakewordConfig {
    /// Restart debounce as a [`Duration`].
    pub fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay_ms)
    }
}

/// Command session configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Silence after which the session ends with "no speech".
    ///
    /// Set to 0 to rely entirely on the capture engine's own timeout.
    pub silence_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            silence_timeout_ms: 8_000,
        }
    }
}

impl SessionConfig {
    /// Silence timeout, `None` when disabled.
    pub fn silence_timeout(&self) -> Option<Duration> {
        (self.silence_timeout_ms > 0).then(|| Duration::from_millis(self.silence_timeout_ms))
    }
}

/// Intent classifier configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Whether the primary (network) classifier is consulted at all.
    pub primary_enabled: bool,
    /// Base URL of an OpenAI-compatible chat completions API (without `/v1`).
    pub base_url: String,
    /// Model identifier sent with each request.
    pub model: String,
    /// API key. Falls back to [`CLASSIFIER_API_KEY_ENV`] when unset.
    pub api_key: Option<String>,
    /// Hard timeout for one primary classification call.
    pub timeout_ms: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            primary_enabled: true,
            base_url: "https://api.openai.com".to_owned(),
            model: "gpt-4o-mini".to_owned(),
            api_key: None,
            timeout_ms: 3_000,
        }
    }
}

impl ClassifierConfig {
    /// Primary call timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// API key from config, then from the environment. Empty keys count as unset.
    pub fn effective_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var(CLASSIFIER_API_KEY_ENV).ok())
            .filter(|k| !k.trim().is_empty())
    }
}

/// Action router configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// User id passed to the persistence service.
    pub user_id: String,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            user_id: "local-user".to_owned(),
        }
    }
}

/// Assistant loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Stop after one classify/route cycle instead of returning to wake listening.
    pub one_shot: bool,
    /// Delay between `stop()` and `start()` during `restart()`.
    pub restart_delay_ms: u64,
    /// Speak each action result back to the user.
    pub speak_confirmations: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            one_shot: false,
            restart_delay_ms: 500,
            speak_confirmations: true,
        }
    }
}

impl OrchestratorConfig {
    /// Restart delay as a [`Duration`].
    pub fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay_ms)
    }
}

/// Diagnostic logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default `EnvFilter` directive when `RUST_LOG` is unset.
    pub filter: String,
    /// Also write daily-rotated log files under the logs directory.
    pub file_logging: bool,
    /// Log directory override (defaults to [`crate::lara_dirs::logs_dir`]).
    pub log_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "lara=info".to_owned(),
            file_logging: false,
            log_dir: None,
        }
    }
}

impl LaraConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::error::AssistantError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::AssistantError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> PathBuf {
        crate::lara_dirs::config_file()
    }

    /// Reject values that would make the pipeline misbehave.
    ///
    /// # Errors
    ///
    /// Returns [`AssistantError::Config`](crate::error::AssistantError::Config)
    /// describing the first invalid field.
    pub fn validate(&self) -> crate::error::Result<()> {
        use crate::error::AssistantError;

        if self.wakeword.phrase.trim().is_empty() {
            return Err(AssistantError::Config("wakeword.phrase is empty".into()));
        }
        if self.wakeword.max_consecutive_errors == 0 {
            return Err(AssistantError::Config(
                "wakeword.max_consecutive_errors must be at least 1".into(),
            ));
        }
        if self.classifier.primary_enabled && self.classifier.timeout_ms == 0 {
            return Err(AssistantError::Config(
                "classifier.timeout_ms must be positive".into(),
            ));
        }
        if self.router.user_id.trim().is_empty() {
            return Err(AssistantError::Config("router.user_id is empty".into()));
        }
        Ok(())
    }
}
