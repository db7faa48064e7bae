//! Deterministic phrase-pattern classifier.
//!
//! Rules are tried in order and the first match wins, so order encodes
//! specificity: listing and creation rules come before navigation, and the
//! catch-all "play <anything>" rule comes last. "show my tasks" must never
//! reach the music rule, and "add a reminder to play piano" must never
//! reach it either.

use super::{ClassifiedIntent, ClassifyError, Intent, IntentClassifier, IntentSource};
use async_trait::async_trait;
use regex::{Captures, Regex};
use std::sync::LazyLock;
use tracing::{debug, warn};

/// Confidence for an unmatched transcript.
pub const GENERAL_QUERY_CONFIDENCE: f32 = 0.2;

const LIST_CONFIDENCE: f32 = 0.9;
const CREATE_CONFIDENCE: f32 = 0.85;
const NAVIGATE_CONFIDENCE: f32 = 0.85;
const PLAY_CONFIDENCE: f32 = 0.8;
const BARE_PLAY_CONFIDENCE: f32 = 0.5;

/// Spoken destination → application path.
const ROUTES: &[(&[&str], &str)] = &[
    (&["home", "dashboard", "main", "home page", "main page", "start"], "/dashboard"),
    (&["tasks", "task", "todos", "to-dos", "todo", "to-do", "todo list", "to-do list", "task list"], "/tasks"),
    (&["reminders", "reminder", "reminder list"], "/reminders"),
    (&["health", "health records", "medical", "medical records"], "/health"),
    (&["automotive", "car", "cars", "vehicle", "vehicles", "garage"], "/automotive"),
    (&["weather", "forecast", "weather forecast"], "/weather"),
    (&["stores", "store", "shops", "shop", "store directory"], "/stores"),
    (&["music", "player", "music player"], "/music"),
    (&["settings", "preferences", "options"], "/settings"),
    (&["profile", "account", "my account"], "/profile"),
];

/// Look up the application path for a spoken destination.
///
/// ```
/// assert_eq!(lara::intent::route_for("the reminders"), Some("/reminders"));
/// assert_eq!(lara::intent::route_for("car"), Some("/automotive"));
/// assert_eq!(lara::intent::route_for("moon"), None);
/// ```
pub fn route_for(destination: &str) -> Option<&'static str> {
    let lowered = destination.trim().to_lowercase();
    let mut dest = lowered.as_str();
    for article in ["the ", "my ", "our "] {
        dest = dest.strip_prefix(article).unwrap_or(dest);
    }
    for suffix in [" page", " screen", " tab", " section", " view"] {
        dest = dest.strip_suffix(suffix).unwrap_or(dest);
    }

    ROUTES
        .iter()
        .find(|(names, _)| names.contains(&dest))
        .map(|(_, path)| *path)
}

type Build = fn(&Captures<'_>) -> Option<(Intent, f32)>;

struct Rule {
    name: &'static str,
    pattern: Regex,
    build: Build,
}

/// Rule table, most specific first.
const RULES: &[(&str, &str, Build)] = &[
    (
        "show_tasks",
        r"^(?:show|list|display|open|view|see|check|what are|what's on|whats on)\s+(?:me\s+)?(?:all\s+)?(?:of\s+)?(?:my|the)?\s*(?:tasks?|to-?dos?|to do list|todo list)\b",
        show_tasks,
    ),
    (
        "show_reminders",
        r"^(?:show|list|display|open|view|see|check|what are)\s+(?:me\s+)?(?:all\s+)?(?:of\s+)?(?:my|the)?\s*reminders?\b",
        show_reminders,
    ),
    (
        "add_reminder",
        r"^(?:(?:add|create|set|make|new|set up)\s+(?:a\s+|an\s+)?(?:new\s+)?reminder|remind me)\s*(?:to\s+|for\s+|about\s+|that\s+)?(?P<body>.+)$",
        add_reminder,
    ),
    (
        "add_task",
        r"^(?:add|create|make|new)\s+(?:a\s+|an\s+)?(?:new\s+)?(?:task|to-?do|todo)\s*(?:to\s+|for\s+|called\s+|:\s*)?(?P<body>.+)$",
        add_task,
    ),
    (
        "add_to_list",
        r"^add\s+(?P<body>.+?)\s+to\s+(?:my\s+|the\s+)?(?:tasks?|task list|to-?do list|todo list|list)$",
        add_task,
    ),
    (
        "navigate",
        r"^(?:go to|goto|go back to|open|navigate to|take me to|bring me to|show me|show|switch to)\s+(?P<dest>.+?)$",
        navigate,
    ),
    (
        "play_music",
        r"^(?:play|put on|start playing|listen to)(?:\s+(?:me\s+)?(?:some\s+)?(?P<query>.+?))?(?:\s+on spotify)?$",
        play_music,
    ),
];

fn show_tasks(_: &Captures<'_>) -> Option<(Intent, f32)> {
    Some((Intent::ShowTasks, LIST_CONFIDENCE))
}

fn show_reminders(_: &Captures<'_>) -> Option<(Intent, f32)> {
    Some((Intent::ShowReminders, LIST_CONFIDENCE))
}

fn add_reminder(caps: &Captures<'_>) -> Option<(Intent, f32)> {
    let (text, time) = split_time_phrase(caps.name("body")?.as_str());
    (!text.is_empty()).then_some((Intent::AddReminder { text, time }, CREATE_CONFIDENCE))
}

fn add_task(caps: &Captures<'_>) -> Option<(Intent, f32)> {
    let (text, due_date) = split_time_phrase(caps.name("body")?.as_str());
    (!text.is_empty()).then_some((Intent::AddTask { text, due_date }, CREATE_CONFIDENCE))
}

fn navigate(caps: &Captures<'_>) -> Option<(Intent, f32)> {
    let target = route_for(caps.name("dest")?.as_str())?;
    Some((
        Intent::Navigate {
            target: target.to_owned(),
        },
        NAVIGATE_CONFIDENCE,
    ))
}

fn play_music(caps: &Captures<'_>) -> Option<(Intent, f32)> {
    let query = caps
        .name("query")
        .map(|m| m.as_str().trim().to_owned())
        .unwrap_or_default();
    let confidence = if query.is_empty() {
        BARE_PLAY_CONFIDENCE
    } else {
        PLAY_CONFIDENCE
    };
    Some((Intent::PlayMusic { query }, confidence))
}

/// Leading politeness and address forms that carry no intent.
const POLITE_PREFIX: &str = r"^(?:(?:hey\s+)?lara|please|can you|could you|would you|will you|i want to|i'd like to|i would like to|kindly)[,\s]+";

/// Trailing time phrase on a reminder or task body.
const TIME_PHRASE: &str = r"(?x)
    \s+(?P<time>
        (?:at|by|around|before)\s+\d{1,2}(?::\d{2})?\s*(?:am|pm|a\.m\.|p\.m\.|o'clock)?(?:\s+(?:today|tomorrow|tonight))?
      | (?:today|tomorrow|tonight|this\s+(?:morning|afternoon|evening|weekend)|next\s+(?:week|month))(?:\s+(?:at|by)\s+\d{1,2}(?::\d{2})?\s*(?:am|pm)?)?
      | (?:on|by|next)\s+(?:monday|tuesday|wednesday|thursday|friday|saturday|sunday)(?:\s+at\s+\d{1,2}(?::\d{2})?\s*(?:am|pm)?)?
      | in\s+(?:\d+|a|an|one|two|five|ten|fifteen|thirty)\s+(?:minutes?|mins?|hours?|days?|weeks?)
    )$";

static TIME_RE: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(TIME_PHRASE).ok());

/// Split a trailing time phrase off a reminder or task body.
fn split_time_phrase(body: &str) -> (String, Option<String>) {
    let body = body.trim();
    let split = TIME_RE.as_ref().and_then(|re| re.captures(body)).and_then(|caps| {
        let whole = caps.get(0)?;
        let time = caps.name("time")?;
        Some((
            body[..whole.start()].trim().to_owned(),
            time.as_str().trim().to_owned(),
        ))
    });
    match split {
        Some((text, time)) => (text, Some(time)),
        None => (body.to_owned(), None),
    }
}

/// The offline fallback tier.
pub struct PatternClassifier {
    rules: Vec<Rule>,
    polite_prefix: Option<Regex>,
}

impl PatternClassifier {
    /// Compile the rule table.
    pub fn new() -> Self {
        let rules = RULES
            .iter()
            .filter_map(|(name, src, build)| match Regex::new(src) {
                Ok(pattern) => Some(Rule {
                    name: *name,
                    pattern,
                    build: *build,
                }),
                Err(e) => {
                    warn!(rule = *name, error = %e, "pattern rule failed to compile; skipping");
                    None
                }
            })
            .collect();
        Self {
            rules,
            polite_prefix: Regex::new(POLITE_PREFIX).ok(),
        }
    }

    /// Number of compiled rules.
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Classify synchronously. Never fails.
    pub fn classify_text(&self, transcript: &str) -> ClassifiedIntent {
        let normalised = self.normalise(transcript);

        for rule in &self.rules {
            let Some(caps) = rule.pattern.captures(&normalised) else {
                continue;
            };
            if let Some((intent, confidence)) = (rule.build)(&caps) {
                debug!(rule = rule.name, intent = intent.tag(), "pattern rule matched");
                return ClassifiedIntent::new(intent, confidence, IntentSource::Fallback);
            }
        }

        ClassifiedIntent::new(
            Intent::GeneralQuery {
                text: transcript.trim().to_owned(),
            },
            GENERAL_QUERY_CONFIDENCE,
            IntentSource::Fallback,
        )
    }

    fn normalise(&self, transcript: &str) -> String {
        let mut text = transcript
            .trim()
            .trim_end_matches(['.', '!', '?', ','])
            .to_lowercase()
            .replace('\u{2019}', "'");
        if let Some(re) = &self.polite_prefix {
            loop {
                let stripped = re.replace(&text, "").into_owned();
                if stripped == text {
                    break;
                }
                text = stripped;
            }
        }
        text.trim().to_owned()
    }
}

impl Default for PatternClassifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IntentClassifier for PatternClassifier {
    fn name(&self) -> &str {
        "pattern"
    }

    async fn classify(&self, transcript: &str) -> Result<ClassifiedIntent, ClassifyError> {
        Ok(self.classify_text(transcript))
    }
}
