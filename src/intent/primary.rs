//! Network intent classifier over an OpenAI-compatible chat completions API.
//!
//! The model is given fixed instructions requiring one JSON object per
//! transcript. The reply is recovered leniently (fences, surrounding prose)
//! and then validated strictly; anything that does not fit the schema is a
//! [`ClassifyError`] and the chain falls through to the pattern tier.

use super::json::parse_object;
use super::pattern::route_for;
use super::{ClassifiedIntent, ClassifyError, Intent, IntentClassifier, IntentSource};
use crate::config::ClassifierConfig;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::time::Duration;
use tracing::debug;

/// Instructions sent as the system message of every request.
pub const INSTRUCTIONS: &str = r#"You classify voice commands for a personal assistant named Lara.
Reply with exactly one JSON object and nothing else. Schema:
{
  "intent": "play_music" | "add_task" | "show_tasks" | "add_reminder" | "show_reminders" | "navigate" | "general_query",
  "query": string | null,      // play_music: what to search for
  "text": string | null,       // add_task, add_reminder, general_query
  "due_date": string | null,   // add_task: due date as spoken, if any
  "time": string | null,       // add_reminder: time as spoken, if any
  "target": string | null,     // navigate: one of /dashboard /tasks /reminders /health /automotive /weather /stores /music /settings /profile
  "confidence": number         // 0.0 to 1.0
}
Fields that do not apply to the chosen intent must be null.
If the command fits nothing else, use "general_query" with the full command as "text"."#;

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

/// The network classifier tier.
#[derive(Debug, Clone)]
pub struct PrimaryClassifier {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    timeout: Duration,
    enabled: bool,
}

impl PrimaryClassifier {
    /// Classifier against `base_url` (without the `/v1` suffix).
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            model: model.into(),
            api_key: None,
            timeout: Duration::from_secs(3),
            enabled: true,
        }
    }

    /// Build from configuration, resolving the API key from the environment
    /// when the config leaves it unset.
    pub fn from_config(config: &ClassifierConfig) -> Self {
        let mut classifier = Self::new(&config.base_url, &config.model).with_timeout(config.timeout());
        classifier.api_key = config.effective_api_key();
        classifier.enabled = config.primary_enabled;
        classifier
    }

    /// Set the bearer token.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Set the hard timeout for one call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Switch the tier on or off.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Whether this tier will make network calls.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url)
    }

    fn request_body(&self, transcript: &str) -> Value {
        json!({
            "model": self.model,
            "temperature": 0,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": INSTRUCTIONS },
                { "role": "user", "content": transcript },
            ],
        })
    }

    async fn request(&self, transcript: &str) -> Result<ClassifiedIntent, ClassifyError> {
        let mut request = self
            .client
            .post(self.endpoint())
            .header("Content-Type", "application/json");
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }

        let response = request
            .json(&self.request_body(transcript))
            .send()
            .await
            .map_err(|e| ClassifyError::Transport(format!("request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ClassifyError::Transport(format!("reading body failed: {e}")))?;
        if !status.is_success() {
            return Err(map_http_error(status, &body));
        }

        let parsed: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| ClassifyError::Malformed(format!("not a chat completion: {e}")))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ClassifyError::Malformed("no message content".to_owned()))?;

        debug!(content = content.as_str(), "primary classifier reply");
        parse_intent_reply(&content)
    }
}

#[async_trait]
impl IntentClassifier for PrimaryClassifier {
    fn name(&self) -> &str {
        "primary"
    }

    async fn classify(&self, transcript: &str) -> Result<ClassifiedIntent, ClassifyError> {
        if !self.enabled {
            return Err(ClassifyError::Disabled("primary classifier disabled".to_owned()));
        }
        tokio::time::timeout(self.timeout, self.request(transcript))
            .await
            .map_err(|_| ClassifyError::Timeout(self.timeout))?
    }
}

fn map_http_error(status: reqwest::StatusCode, body: &str) -> ClassifyError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(Value::as_str)
                .map(String::from)
        })
        .unwrap_or_else(|| body.chars().take(200).collect());
    ClassifyError::Http {
        status: status.as_u16(),
        message,
    }
}

/// Recover and validate the model's JSON reply.
pub fn parse_intent_reply(content: &str) -> Result<ClassifiedIntent, ClassifyError> {
    let object = parse_object(content)
        .ok_or_else(|| ClassifyError::Malformed("reply contains no JSON object".to_owned()))?;
    validate(&object)
}

fn validate(object: &Map<String, Value>) -> Result<ClassifiedIntent, ClassifyError> {
    let tag = object
        .get("intent")
        .and_then(Value::as_str)
        .ok_or_else(|| ClassifyError::Schema("missing \"intent\" tag".to_owned()))?;

    let confidence = object
        .get("confidence")
        .and_then(Value::as_f64)
        .ok_or_else(|| ClassifyError::Schema("missing numeric \"confidence\"".to_owned()))?;
    if !(0.0..=1.0).contains(&confidence) {
        return Err(ClassifyError::Schema(format!(
            "confidence {confidence} outside [0, 1]"
        )));
    }

    let intent = match tag {
        "play_music" => Intent::PlayMusic {
            query: required(object, "query")?,
        },
        "add_task" => Intent::AddTask {
            text: required(object, "text")?,
            due_date: optional(object, "due_date")?,
        },
        "show_tasks" => Intent::ShowTasks,
        "add_reminder" => Intent::AddReminder {
            text: required(object, "text")?,
            time: optional(object, "time")?,
        },
        "show_reminders" => Intent::ShowReminders,
        "navigate" => {
            let raw = required(object, "target")?;
            let target = route_for(raw.trim_start_matches('/'))
                .map(str::to_owned)
                .ok_or_else(|| ClassifyError::Schema(format!("unknown navigation target {raw:?}")))?;
            Intent::Navigate { target }
        }
        "general_query" => Intent::GeneralQuery {
            text: optional(object, "text")?.unwrap_or_default(),
        },
        other => {
            return Err(ClassifyError::Schema(format!("unknown intent {other:?}")));
        }
    };

    #[allow(clippy::cast_possible_truncation)]
    let confidence = confidence as f32;
    Ok(ClassifiedIntent::new(intent, confidence, IntentSource::Primary))
}

/// A non-null, non-blank string field.
fn required(object: &Map<String, Value>, field: &str) -> Result<String, ClassifyError> {
    optional(object, field)?
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ClassifyError::Schema(format!("\"{field}\" is required")))
}

/// A string-or-null field. Any other type is a schema violation.
fn optional(object: &Map<String, Value>, field: &str) -> Result<Option<String>, ClassifyError> {
    match object.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.trim().to_owned())),
        Some(other) => Err(ClassifyError::Schema(format!(
            "\"{field}\" must be a string or null, got {other}"
        ))),
    }
}
