//! Chain of responsibility over classifier tiers.
//!
//! Tiers are tried in order; the deterministic [`PatternClassifier`] always
//! answers last, so [`ClassifierChain::classify`] cannot fail.
//!
//! # Fall-through policy
//!
//! - **Recoverable errors** (timeout, transport, 5xx, malformed or
//!   off-schema reply): fall through to the next tier for this transcript
//!   and try the tier again next time.
//! - **Permanent errors** (tier disabled, credentials rejected): the tier is
//!   skipped for the lifetime of the chain.
//! - **Low confidence**: if a tier answers below
//!   [`LOW_CONFIDENCE_THRESHOLD`](super::LOW_CONFIDENCE_THRESHOLD) and the
//!   pattern tier finds a confident match, the pattern answer wins.

use super::{ClassifiedIntent, ClassifyError, IntentClassifier, PatternClassifier, PrimaryClassifier};
use crate::config::ClassifierConfig;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Failure bookkeeping for one tier.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TierHealth {
    /// Consecutive recoverable failures.
    pub consecutive_failures: u32,
    /// Total failures over the chain's lifetime.
    pub total_failures: u64,
    /// The tier hit a permanent error and is skipped.
    pub permanently_failed: bool,
    /// Code of the most recent error.
    pub last_error: Option<&'static str>,
}

/// Ordered classifier tiers with a pattern-matching backstop.
pub struct ClassifierChain {
    tiers: Vec<Arc<dyn IntentClassifier>>,
    fallback: PatternClassifier,
    health: Mutex<HashMap<String, TierHealth>>,
}

impl ClassifierChain {
    /// A chain with only the pattern tier.
    pub fn pattern_only() -> Self {
        Self::new(Vec::new())
    }

    /// A chain trying `tiers` in order before the pattern tier.
    pub fn new(tiers: Vec<Arc<dyn IntentClassifier>>) -> Self {
        let health = tiers
            .iter()
            .map(|t| (t.name().to_owned(), TierHealth::default()))
            .collect();
        Self {
            tiers,
            fallback: PatternClassifier::new(),
            health: Mutex::new(health),
        }
    }

    /// Primary tier from configuration (when enabled) plus the pattern tier.
    pub fn from_config(config: &ClassifierConfig) -> Self {
        if config.primary_enabled {
            Self::new(vec![Arc::new(PrimaryClassifier::from_config(config))])
        } else {
            Self::pattern_only()
        }
    }

    /// Number of tiers including the pattern tier.
    pub fn len(&self) -> usize {
        self.tiers.len() + 1
    }

    /// Always `false`; the pattern tier is always present.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Health snapshot for the named tier.
    pub fn health(&self, tier: &str) -> Option<TierHealth> {
        self.health.lock().ok()?.get(tier).cloned()
    }

    /// Classify `transcript`. Never fails.
    pub async fn classify(&self, transcript: &str) -> ClassifiedIntent {
        if transcript.trim().is_empty() {
            debug!("blank transcript, skipping network tiers");
            return self.fallback.classify_text(transcript);
        }

        for tier in &self.tiers {
            let name = tier.name();
            if self.is_skipped(name) {
                continue;
            }

            match tier.classify(transcript).await {
                Ok(result) => {
                    self.report_success(name);
                    if result.is_confident() {
                        return result;
                    }
                    let pattern = self.fallback.classify_text(transcript);
                    if pattern.is_confident() {
                        info!(
                            tier = name,
                            confidence = result.confidence,
                            "low-confidence answer replaced by pattern match"
                        );
                        return pattern;
                    }
                    return result;
                }
                Err(e) => self.report_failure(name, &e),
            }
        }

        self.fallback.classify_text(transcript)
    }

    fn is_skipped(&self, tier: &str) -> bool {
        self.health
            .lock()
            .ok()
            .and_then(|h| h.get(tier).map(|s| s.permanently_failed))
            .unwrap_or(false)
    }

    fn report_success(&self, tier: &str) {
        if let Ok(mut health) = self.health.lock()
            && let Some(state) = health.get_mut(tier)
        {
            state.consecutive_failures = 0;
        }
    }

    fn report_failure(&self, tier: &str, error: &ClassifyError) {
        let Ok(mut health) = self.health.lock() else {
            return;
        };
        let state = health.entry(tier.to_owned()).or_default();
        state.total_failures += 1;
        state.last_error = Some(error.code());

        if error.is_permanent() {
            state.permanently_failed = true;
            warn!(tier, error = %error, "classifier tier failed permanently; skipping from now on");
        } else {
            state.consecutive_failures += 1;
            warn!(
                tier,
                failures = state.consecutive_failures,
                error = %error,
                "classifier tier failed; falling through"
            );
        }
    }
}

#[async_trait]
impl IntentClassifier for ClassifierChain {
    fn name(&self) -> &str {
        "chain"
    }

    async fn classify(&self, transcript: &str) -> Result<ClassifiedIntent, ClassifyError> {
        Ok(ClassifierChain::classify(self, transcript).await)
    }
}
