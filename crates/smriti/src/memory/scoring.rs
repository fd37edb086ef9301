//! Importance scoring and decay ("viveka")
//!
//! Computes the initial importance of a new memory from its category,
//! an optional caller-supplied override, and an opaque semantic
//! significance signal, then ages that importance with lazy exponential
//! decay. Decay is only ever computed at read time against an explicit
//! clock; stored importance is never mutated in the background.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::memory::types::{Category, MemoryRecord, Tier};

/// Configuration for importance scoring and decay
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScoringConfig {
    /// Exponential decay rate per hour (default: 0.02)
    #[serde(default = "default_decay_rate")]
    pub decay_rate: f32,
    /// Disable decay entirely; records keep their initial importance
    #[serde(default = "default_enable_decay")]
    pub enable_decay: bool,
    /// Saturating boost per accumulated access, applied as
    /// `frequency_weight * ln(access_count + 1)` (default: 0.05)
    #[serde(default = "default_frequency_weight")]
    pub frequency_weight: f32,
    /// Blend weight of the injected semantic significance signal when
    /// one is provided (default: 0.4)
    #[serde(default = "default_significance_weight")]
    pub significance_weight: f32,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            decay_rate: default_decay_rate(),
            enable_decay: default_enable_decay(),
            frequency_weight: default_frequency_weight(),
            significance_weight: default_significance_weight(),
        }
    }
}

fn default_decay_rate() -> f32 {
    0.02
}

fn default_enable_decay() -> bool {
    true
}

fn default_frequency_weight() -> f32 {
    0.05
}

fn default_significance_weight() -> f32 {
    0.4
}

/// Default importance prior for each category.
///
/// Facts, preferences and goals start above the midpoint since they
/// tend to stay useful; raw conversation turns start below it.
pub fn category_prior(category: &Category) -> f32 {
    match category {
        Category::Preference => 0.75,
        Category::Fact => 0.7,
        Category::Goal => 0.7,
        Category::Context => 0.5,
        Category::General => 0.5,
        Category::Conversation => 0.4,
        Category::Custom(_) => 0.5,
    }
}

/// Compute the initial importance for a new memory.
///
/// An explicit caller-supplied importance takes precedence and
/// short-circuits the automatic computation. Otherwise the category
/// prior is blended with the injected significance signal (an opaque
/// value in [0, 1]) when one is available.
pub fn initial_importance(
    category: &Category,
    explicit: Option<f32>,
    significance: Option<f32>,
    config: &ScoringConfig,
) -> f32 {
    if let Some(value) = explicit {
        return value.clamp(0.0, 1.0);
    }

    let prior = category_prior(category);
    let score = match significance {
        Some(signal) => {
            let signal = signal.clamp(0.0, 1.0);
            prior * (1.0 - config.significance_weight) + signal * config.significance_weight
        }
        None => prior,
    };

    score.clamp(0.0, 1.0)
}

/// Compute the effective importance of a record at `now`.
///
/// Episodic records decay exponentially from their last access and gain
/// a saturating frequency boost. Working-tier records do not decay
/// (FIFO + TTL governs their lifetime) and wisdom-tier records return
/// their stored importance unchanged, which is what makes wisdom
/// permanent: the value is frozen at promotion time and can only fall
/// through an explicit update.
pub fn effective_importance(record: &MemoryRecord, now: DateTime<Utc>, config: &ScoringConfig) -> f32 {
    match record.tier {
        Tier::Working | Tier::Wisdom => record.importance.clamp(0.0, 1.0),
        Tier::Episodic => {
            if !config.enable_decay || config.decay_rate <= 0.0 {
                return record.importance.clamp(0.0, 1.0);
            }

            let elapsed_hours = (now - record.last_accessed)
                .num_minutes()
                .max(0) as f32
                / 60.0;
            let decayed = record.importance * (-config.decay_rate * elapsed_hours).exp();
            let boost = config.frequency_weight * (record.access_count as f32 + 1.0).ln();

            (decayed + boost).clamp(0.0, 1.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn episodic_record(importance: f32, hours_old: i64, access_count: u32) -> MemoryRecord {
        let mut record = MemoryRecord::new("session-1", "Test content", Category::Conversation);
        record.tier = Tier::Episodic;
        record.importance = importance;
        record.access_count = access_count;
        record.last_accessed = Utc::now() - Duration::hours(hours_old);
        record
    }

    #[test]
    fn test_default_config() {
        let config = ScoringConfig::default();
        assert_eq!(config.decay_rate, 0.02);
        assert!(config.enable_decay);
        assert_eq!(config.frequency_weight, 0.05);
        assert_eq!(config.significance_weight, 0.4);
    }

    #[test]
    fn test_explicit_importance_short_circuits() {
        let config = ScoringConfig::default();
        let score = initial_importance(&Category::Conversation, Some(0.95), Some(0.1), &config);
        assert_eq!(score, 0.95);
    }

    #[test]
    fn test_explicit_importance_clamped() {
        let config = ScoringConfig::default();
        assert_eq!(
            initial_importance(&Category::Fact, Some(1.5), None, &config),
            1.0
        );
        assert_eq!(
            initial_importance(&Category::Fact, Some(-0.3), None, &config),
            0.0
        );
    }

    #[test]
    fn test_category_priors_ordering() {
        let config = ScoringConfig::default();
        let fact = initial_importance(&Category::Fact, None, None, &config);
        let conversation = initial_importance(&Category::Conversation, None, None, &config);
        assert!(
            fact > conversation,
            "Facts should default higher than conversation turns"
        );
    }

    #[test]
    fn test_significance_signal_raises_score() {
        let config = ScoringConfig::default();
        let plain = initial_importance(&Category::Conversation, None, None, &config);
        let significant = initial_importance(&Category::Conversation, None, Some(1.0), &config);
        assert!(significant > plain);
        assert!(significant <= 1.0);
    }

    #[test]
    fn test_decay_monotonic_without_reaccess() {
        let config = ScoringConfig::default();
        let now = Utc::now();

        let fresh = episodic_record(0.8, 0, 0);
        let aged = episodic_record(0.8, 48, 0);

        let fresh_score = effective_importance(&fresh, now, &config);
        let aged_score = effective_importance(&aged, now, &config);
        assert!(
            aged_score < fresh_score,
            "Older record should score lower, fresh={fresh_score}, aged={aged_score}"
        );
    }

    #[test]
    fn test_decay_disabled_keeps_importance() {
        let config = ScoringConfig {
            enable_decay: false,
            ..ScoringConfig::default()
        };
        let record = episodic_record(0.8, 500, 0);
        assert_eq!(effective_importance(&record, Utc::now(), &config), 0.8);
    }

    #[test]
    fn test_wisdom_never_decays() {
        let config = ScoringConfig::default();
        let mut record = episodic_record(0.9, 1000, 0);
        record.tier = Tier::Wisdom;
        assert_eq!(effective_importance(&record, Utc::now(), &config), 0.9);
    }

    #[test]
    fn test_working_does_not_decay() {
        let config = ScoringConfig::default();
        let mut record = episodic_record(0.6, 1000, 0);
        record.tier = Tier::Working;
        assert_eq!(effective_importance(&record, Utc::now(), &config), 0.6);
    }

    #[test]
    fn test_frequency_boost_saturates() {
        let config = ScoringConfig::default();
        let now = Utc::now();

        let rarely = effective_importance(&episodic_record(0.5, 1, 1), now, &config);
        let often = effective_importance(&episodic_record(0.5, 1, 50), now, &config);
        let very_often = effective_importance(&episodic_record(0.5, 1, 500), now, &config);

        assert!(often > rarely);
        // Logarithmic boost: the second jump is much smaller than the first
        assert!((very_often - often) < (often - rarely));
    }

    #[test]
    fn test_effective_importance_stays_in_bounds() {
        let config = ScoringConfig::default();
        let now = Utc::now();

        let heavy = episodic_record(1.0, 0, u32::MAX);
        let score = effective_importance(&heavy, now, &config);
        assert!((0.0..=1.0).contains(&score));

        let ancient = episodic_record(0.1, 100_000, 0);
        let score = effective_importance(&ancient, now, &config);
        assert!((0.0..=1.0).contains(&score));
    }
}
