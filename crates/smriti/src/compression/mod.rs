//! Semantic compression of low-value memories ("vismriti")
//!
//! When the episodic tier outgrows its token budget or record cap, the
//! compressor folds the least valuable records into one summarized
//! representative via the injected summarization capability. Batches
//! are all-or-nothing: if the capability fails, nothing is removed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::capability::{Embedder, Summarizer};
use crate::error::Result;
use crate::memory::scoring::{ScoringConfig, effective_importance};
use crate::memory::types::{MemoryRecord, Tier};
use crate::store::TieredStore;

/// Configuration for compression triggering and batch sizing
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CompressionConfig {
    /// Fraction of the token budget at which compression triggers
    /// (default: 0.75, sensible range 0.6 to 0.9)
    #[serde(default = "default_threshold")]
    pub threshold: f32,
    /// Records whose effective importance exceeds this are never
    /// selected for compression (default: 0.7)
    #[serde(default = "default_protect_threshold")]
    pub protect_threshold: f32,
    /// Safety margin below the trigger threshold that a compression
    /// pass aims for (default: 0.1)
    #[serde(default = "default_target_margin")]
    pub target_margin: f32,
    /// Minimum records per batch; fewer candidates means no-op.
    /// Values below 2 are treated as 2, since a batch of one record
    /// has nothing to fold together (default: 2)
    #[serde(default = "default_min_batch")]
    pub min_batch: usize,
    /// Maximum records per batch (default: 8)
    #[serde(default = "default_max_batch")]
    pub max_batch: usize,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            protect_threshold: default_protect_threshold(),
            target_margin: default_target_margin(),
            min_batch: default_min_batch(),
            max_batch: default_max_batch(),
        }
    }
}

fn default_threshold() -> f32 {
    0.75
}

fn default_protect_threshold() -> f32 {
    0.7
}

fn default_target_margin() -> f32 {
    0.1
}

fn default_min_batch() -> usize {
    2
}

fn default_max_batch() -> usize {
    8
}

/// Preset aggressiveness for a compression pass.
///
/// The modes are parameterizations of the same algorithm: they differ
/// only in the trigger threshold and batch sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionMode {
    /// Trigger late, compress small batches
    Conservative,
    /// Mid-range trigger and batch size
    Balanced,
    /// Trigger early, compress large batches
    Aggressive,
}

impl CompressionMode {
    /// Derive the parameters for this mode from a base configuration
    pub fn apply(self, base: &CompressionConfig) -> CompressionConfig {
        let mut config = base.clone();
        match self {
            CompressionMode::Conservative => {
                config.threshold = 0.9;
                config.max_batch = base.max_batch.div_ceil(2).max(base.min_batch);
            }
            CompressionMode::Balanced => {
                config.threshold = 0.75;
            }
            CompressionMode::Aggressive => {
                config.threshold = 0.6;
                config.max_batch = base.max_batch * 2;
            }
        }
        config
    }
}

/// Append-only audit record of one compression pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressionEvent {
    /// Unique identifier for this event
    pub id: Uuid,
    /// When the compression ran
    pub timestamp: DateTime<Utc>,
    /// Ids of the records consumed
    pub source_ids: Vec<Uuid>,
    /// Id of the representative record produced
    pub result_id: Uuid,
    /// Estimated tokens across the sources
    pub tokens_before: usize,
    /// Estimated tokens of the representative
    pub tokens_after: usize,
    /// Quality-retention proxy in [0, 1]: similarity between the
    /// concatenated sources and the summary when an embedder is
    /// available, a neutral 0.5 otherwise
    pub quality: f32,
}

impl CompressionEvent {
    /// Tokens saved by this pass
    pub fn tokens_saved(&self) -> usize {
        self.tokens_before.saturating_sub(self.tokens_after)
    }
}

/// Folds low-value episodic records into summarized representatives.
///
/// Wisdom-tier records and records above the protect threshold are
/// never candidates. The engine keeps an append-only audit trail of
/// every pass it executes.
pub struct Compressor {
    config: CompressionConfig,
    events: Vec<CompressionEvent>,
}

impl Compressor {
    /// Create a compressor with default configuration
    pub fn new() -> Self {
        Self::with_config(CompressionConfig::default())
    }

    /// Create a compressor with custom configuration
    pub fn with_config(config: CompressionConfig) -> Self {
        Self {
            config,
            events: Vec::new(),
        }
    }

    /// Get the current base configuration
    pub fn config(&self) -> &CompressionConfig {
        &self.config
    }

    /// The audit trail of completed compression passes, oldest first
    pub fn events(&self) -> &[CompressionEvent] {
        &self.events
    }

    /// Whether the store's episodic tier warrants compression: token
    /// usage at or above the threshold fraction of the budget, or the
    /// record count over capacity. The policy agent may also force a
    /// pass regardless of this check.
    pub fn should_compress(&self, store: &TieredStore) -> bool {
        let budget = store.config().token_budget as f32;
        let usage = store.episodic_tokens() as f32;

        usage >= self.config.threshold * budget
            || store.episodic_len() > store.config().episodic_capacity
    }

    /// Select compression candidates: episodic records ranked by
    /// ascending effective importance, then oldest first, excluding
    /// anything above the protect threshold. The batch is sized to
    /// bring token usage below the threshold minus the safety margin.
    pub fn select_candidates(
        &self,
        store: &TieredStore,
        scoring: &ScoringConfig,
        now: DateTime<Utc>,
    ) -> Vec<Uuid> {
        self.select_with(&self.config, store, scoring, now)
    }

    fn select_with(
        &self,
        config: &CompressionConfig,
        store: &TieredStore,
        scoring: &ScoringConfig,
        now: DateTime<Utc>,
    ) -> Vec<Uuid> {
        let mut ranked: Vec<(&MemoryRecord, f32)> = store
            .episodic()
            .iter()
            .map(|record| (record, effective_importance(record, now, scoring)))
            .filter(|(_, importance)| *importance <= config.protect_threshold)
            .collect();

        ranked.sort_by(|a, b| {
            a.1.total_cmp(&b.1)
                .then_with(|| a.0.created_at.cmp(&b.0.created_at))
        });

        let budget = store.config().token_budget as f32;
        let target = ((config.threshold - config.target_margin).max(0.0) * budget) as usize;
        let needed = store.episodic_tokens().saturating_sub(target);

        let min_batch = config.min_batch.max(2);
        let mut selected = Vec::new();
        let mut gathered_tokens = 0usize;
        for (record, _) in ranked {
            if selected.len() >= config.max_batch {
                break;
            }
            if gathered_tokens >= needed && selected.len() >= min_batch {
                break;
            }
            gathered_tokens += record.token_count;
            selected.push(record.id);
        }

        selected
    }

    /// Run one compression pass at the given aggressiveness.
    ///
    /// Returns `Ok(None)` when there are not enough candidates. On
    /// success the candidates are replaced by a single representative
    /// carrying the maximum input importance, the union of input
    /// metadata, and the source ids as provenance. If the summarizer
    /// fails, the error is returned and the store is left untouched.
    pub async fn compress(
        &mut self,
        store: &mut TieredStore,
        mode: CompressionMode,
        summarizer: &dyn Summarizer,
        embedder: &dyn Embedder,
        scoring: &ScoringConfig,
        now: DateTime<Utc>,
    ) -> Result<Option<CompressionEvent>> {
        let config = mode.apply(&self.config);
        let candidate_ids = self.select_with(&config, store, scoring, now);

        let min_batch = config.min_batch.max(2);
        if candidate_ids.len() < min_batch {
            debug!(
                candidates = candidate_ids.len(),
                min_batch, "not enough compression candidates"
            );
            return Ok(None);
        }

        let contents: Vec<String> = candidate_ids
            .iter()
            .filter_map(|id| store.get(*id))
            .map(|record| record.content.clone())
            .collect();
        let tokens_before: usize = candidate_ids
            .iter()
            .filter_map(|id| store.get(*id))
            .map(|record| record.token_count)
            .sum();

        // External call happens before any mutation so a failure rolls
        // back to the untouched store.
        let summary = summarizer.summarize(&contents).await?;

        let combined = contents.join("\n");
        let quality = match embedder.similarity(&combined, &summary).await {
            Ok(score) => score.clamp(0.0, 1.0),
            Err(error) => {
                warn!(%error, "quality proxy unavailable, recording neutral score");
                0.5
            }
        };

        let removed: Vec<MemoryRecord> = candidate_ids
            .iter()
            .filter_map(|id| store.remove(*id))
            .collect();

        let best = removed
            .iter()
            .max_by(|a, b| a.importance.total_cmp(&b.importance))
            .expect("batch has at least min_batch records");

        let mut representative =
            MemoryRecord::new(best.session_id.clone(), summary, best.category.clone());
        representative.set_importance(best.importance);
        representative.tier = Tier::Episodic;
        for record in &removed {
            for (key, value) in &record.metadata {
                representative
                    .metadata
                    .entry(key.clone())
                    .or_insert_with(|| value.clone());
            }
        }
        representative.compressed_from = removed.iter().map(|record| record.id).collect();

        let event = CompressionEvent {
            id: Uuid::new_v4(),
            timestamp: now,
            source_ids: representative.compressed_from.clone(),
            result_id: representative.id,
            tokens_before,
            tokens_after: representative.token_count,
            quality,
        };

        info!(
            sources = event.source_ids.len(),
            tokens_before = event.tokens_before,
            tokens_after = event.tokens_after,
            quality = event.quality,
            mode = ?mode,
            "compressed episodic batch"
        );

        store.place(representative);
        self.events.push(event.clone());

        Ok(Some(event))
    }
}

impl Default for Compressor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::types::Category;
    use crate::store::StoreConfig;
    use crate::testing::{FailingSummarizer, MockEmbedder, MockSummarizer};

    fn episodic_record(content: &str, importance: f32) -> MemoryRecord {
        let mut record = MemoryRecord::new("session-1", content, Category::Conversation);
        record.importance = importance;
        record.tier = Tier::Episodic;
        record
    }

    fn store_with_low_budget() -> TieredStore {
        TieredStore::new(StoreConfig {
            token_budget: 40,
            ..StoreConfig::default()
        })
    }

    mod config {
        use super::*;

        #[test]
        fn test_default_config() {
            let config = CompressionConfig::default();
            assert_eq!(config.threshold, 0.75);
            assert_eq!(config.protect_threshold, 0.7);
            assert_eq!(config.target_margin, 0.1);
            assert_eq!(config.min_batch, 2);
            assert_eq!(config.max_batch, 8);
        }

        #[test]
        fn test_unknown_option_rejected() {
            let toml_str = "threshold = 0.8\nturbo = true\n";
            let result: std::result::Result<CompressionConfig, _> = toml::from_str(toml_str);
            assert!(result.is_err());
        }

        #[test]
        fn test_modes_parameterize_threshold_and_batch() {
            let base = CompressionConfig::default();
            let conservative = CompressionMode::Conservative.apply(&base);
            let balanced = CompressionMode::Balanced.apply(&base);
            let aggressive = CompressionMode::Aggressive.apply(&base);

            assert!(conservative.threshold > balanced.threshold);
            assert!(balanced.threshold > aggressive.threshold);
            assert!(conservative.max_batch < aggressive.max_batch);
            // Everything else stays shared
            assert_eq!(conservative.protect_threshold, base.protect_threshold);
            assert_eq!(aggressive.min_batch, base.min_batch);
        }
    }

    mod triggering {
        use super::*;

        #[test]
        fn test_should_compress_on_token_pressure() {
            let compressor = Compressor::new();
            let mut store = store_with_low_budget();
            assert!(!compressor.should_compress(&store));

            store.place(episodic_record(&"long content ".repeat(20), 0.3));
            assert!(compressor.should_compress(&store));
        }

        #[test]
        fn test_should_compress_on_count_pressure() {
            let compressor = Compressor::new();
            let mut store = TieredStore::new(StoreConfig {
                episodic_capacity: 2,
                ..StoreConfig::default()
            });

            store.place(episodic_record("one", 0.3));
            store.place(episodic_record("two", 0.3));
            assert!(!compressor.should_compress(&store));

            store.place(episodic_record("three", 0.3));
            assert!(compressor.should_compress(&store));
        }
    }

    mod candidate_selection {
        use super::*;

        #[test]
        fn test_least_important_oldest_first() {
            let scoring = ScoringConfig {
                enable_decay: false,
                ..ScoringConfig::default()
            };
            let compressor = Compressor::new();
            let mut store = store_with_low_budget();

            let low = episodic_record(&"low value chatter ".repeat(5), 0.1);
            let low_id = low.id;
            let mid = episodic_record(&"middling detail ".repeat(5), 0.4);
            let mid_id = mid.id;
            store.place(mid);
            store.place(low);

            let candidates = compressor.select_candidates(&store, &scoring, Utc::now());
            assert_eq!(candidates.first(), Some(&low_id));
            assert!(candidates.contains(&mid_id));
        }

        #[test]
        fn test_protected_records_never_selected() {
            let scoring = ScoringConfig {
                enable_decay: false,
                ..ScoringConfig::default()
            };
            let compressor = Compressor::new();
            let mut store = store_with_low_budget();

            let protected = episodic_record(&"precious ".repeat(10), 0.75);
            let protected_id = protected.id;
            store.place(protected);
            store.place(episodic_record(&"filler one ".repeat(10), 0.2));
            store.place(episodic_record(&"filler two ".repeat(10), 0.2));

            let candidates = compressor.select_candidates(&store, &scoring, Utc::now());
            assert!(!candidates.contains(&protected_id));
        }

        #[test]
        fn test_selection_disjoint_from_protected_under_random_stores() {
            let scoring = ScoringConfig {
                enable_decay: false,
                ..ScoringConfig::default()
            };
            let compressor = Compressor::new();

            // Pseudo-random importance spread, deterministic seed
            for seed in 0u64..20 {
                let mut store = store_with_low_budget();
                let mut protected_ids = Vec::new();
                let mut state = seed.wrapping_mul(0x9e3779b97f4a7c15).wrapping_add(1);
                for i in 0..15 {
                    state = state
                        .wrapping_mul(6364136223846793005)
                        .wrapping_add(1442695040888963407);
                    let importance = (state >> 33) as f32 / (u32::MAX >> 1) as f32;
                    let record =
                        episodic_record(&format!("record {i} {}", "x".repeat(30)), importance);
                    if importance > compressor.config().protect_threshold {
                        protected_ids.push(record.id);
                    }
                    store.place(record);
                }

                let candidates = compressor.select_candidates(&store, &scoring, Utc::now());
                for id in &candidates {
                    assert!(
                        !protected_ids.contains(id),
                        "seed {seed}: protected record selected for compression"
                    );
                }
            }
        }

        #[test]
        fn test_batch_respects_max_batch() {
            let scoring = ScoringConfig::default();
            let compressor = Compressor::with_config(CompressionConfig {
                max_batch: 3,
                ..CompressionConfig::default()
            });
            let mut store = store_with_low_budget();
            for i in 0..10 {
                store.place(episodic_record(&format!("record {i} {}", "y".repeat(40)), 0.2));
            }

            let candidates = compressor.select_candidates(&store, &scoring, Utc::now());
            assert_eq!(candidates.len(), 3);
        }
    }

    mod compression_pass {
        use super::*;

        #[tokio::test]
        async fn test_compress_replaces_batch_with_representative() {
            let scoring = ScoringConfig {
                enable_decay: false,
                ..ScoringConfig::default()
            };
            let mut compressor = Compressor::new();
            let mut store = store_with_low_budget();

            let mut first = episodic_record("The user mentioned liking tea. More chatter here.", 0.2);
            first
                .metadata
                .insert("source".to_string(), serde_json::json!("chat"));
            let first_id = first.id;
            let mut second = episodic_record("The user asked about the weather in Berlin today.", 0.4);
            second
                .metadata
                .insert("channel".to_string(), serde_json::json!("web"));
            let second_id = second.id;
            store.place(first);
            store.place(second);

            let tokens_before = store.episodic_tokens();
            let event = compressor
                .compress(
                    &mut store,
                    CompressionMode::Balanced,
                    &MockSummarizer::new(),
                    &MockEmbedder::new(),
                    &scoring,
                    Utc::now(),
                )
                .await
                .unwrap()
                .expect("compression should run");

            assert_eq!(store.episodic_len(), 1);
            assert!(store.get(first_id).is_none());
            assert!(store.get(second_id).is_none());

            let representative = store.get(event.result_id).unwrap();
            assert_eq!(representative.tier, Tier::Episodic);
            // Highest input importance wins, never an average
            assert_eq!(representative.importance, 0.4);
            // Metadata union carries provenance from both inputs
            assert!(representative.metadata.contains_key("source"));
            assert!(representative.metadata.contains_key("channel"));
            assert_eq!(representative.compressed_from.len(), 2);
            assert!(representative.compressed_from.contains(&first_id));

            assert_eq!(event.tokens_before, tokens_before);
            assert!(event.tokens_after < event.tokens_before);
            assert!((0.0..=1.0).contains(&event.quality));
        }

        #[tokio::test]
        async fn test_compress_too_few_candidates_is_noop() {
            let scoring = ScoringConfig::default();
            let mut compressor = Compressor::new();
            let mut store = store_with_low_budget();
            store.place(episodic_record("lonely record", 0.2));

            let event = compressor
                .compress(
                    &mut store,
                    CompressionMode::Balanced,
                    &MockSummarizer::new(),
                    &MockEmbedder::new(),
                    &scoring,
                    Utc::now(),
                )
                .await
                .unwrap();

            assert!(event.is_none());
            assert_eq!(store.episodic_len(), 1);
        }

        #[tokio::test]
        async fn test_zero_min_batch_is_floored_not_fatal() {
            let scoring = ScoringConfig::default();
            let mut compressor = Compressor::with_config(CompressionConfig {
                min_batch: 0,
                ..CompressionConfig::default()
            });

            let mut empty = store_with_low_budget();
            let event = compressor
                .compress(
                    &mut empty,
                    CompressionMode::Balanced,
                    &MockSummarizer::new(),
                    &MockEmbedder::new(),
                    &scoring,
                    Utc::now(),
                )
                .await
                .unwrap();
            assert!(event.is_none(), "nothing to fold in an empty store");

            let mut single = store_with_low_budget();
            single.place(episodic_record("lonely record", 0.2));
            let event = compressor
                .compress(
                    &mut single,
                    CompressionMode::Balanced,
                    &MockSummarizer::new(),
                    &MockEmbedder::new(),
                    &scoring,
                    Utc::now(),
                )
                .await
                .unwrap();
            assert!(event.is_none(), "a batch of one is never compressed");
            assert_eq!(single.episodic_len(), 1);
        }

        #[tokio::test]
        async fn test_failed_summarizer_leaves_store_untouched() {
            let scoring = ScoringConfig {
                enable_decay: false,
                ..ScoringConfig::default()
            };
            let mut compressor = Compressor::new();
            let mut store = store_with_low_budget();
            store.place(episodic_record(&"some content ".repeat(5), 0.2));
            store.place(episodic_record(&"other content ".repeat(5), 0.3));

            let before_len = store.episodic_len();
            let before_tokens = store.episodic_tokens();

            let result = compressor
                .compress(
                    &mut store,
                    CompressionMode::Balanced,
                    &FailingSummarizer,
                    &MockEmbedder::new(),
                    &scoring,
                    Utc::now(),
                )
                .await;

            assert!(result.is_err(), "capability failure must surface");
            assert_eq!(store.episodic_len(), before_len);
            assert_eq!(store.episodic_tokens(), before_tokens);
            assert!(compressor.events().is_empty());
        }

        #[tokio::test]
        async fn test_failed_embedder_records_neutral_quality() {
            let scoring = ScoringConfig {
                enable_decay: false,
                ..ScoringConfig::default()
            };
            let mut compressor = Compressor::new();
            let mut store = store_with_low_budget();
            store.place(episodic_record(&"some content ".repeat(5), 0.2));
            store.place(episodic_record(&"other content ".repeat(5), 0.3));

            let event = compressor
                .compress(
                    &mut store,
                    CompressionMode::Balanced,
                    &MockSummarizer::new(),
                    &crate::testing::FailingEmbedder,
                    &scoring,
                    Utc::now(),
                )
                .await
                .unwrap()
                .expect("compression should still run without an embedder");

            assert_eq!(event.quality, 0.5);
        }

        #[tokio::test]
        async fn test_events_are_append_only() {
            let scoring = ScoringConfig {
                enable_decay: false,
                ..ScoringConfig::default()
            };
            let mut compressor = Compressor::new();
            let mut store = store_with_low_budget();

            for round in 0..2 {
                store.place(episodic_record(&format!("round {round} a {}", "z".repeat(40)), 0.2));
                store.place(episodic_record(&format!("round {round} b {}", "z".repeat(40)), 0.3));
                compressor
                    .compress(
                        &mut store,
                        CompressionMode::Aggressive,
                        &MockSummarizer::new(),
                        &MockEmbedder::new(),
                        &scoring,
                        Utc::now(),
                    )
                    .await
                    .unwrap();
            }

            assert_eq!(compressor.events().len(), 2);
            assert!(compressor.events()[0].timestamp <= compressor.events()[1].timestamp);
        }
    }
}
