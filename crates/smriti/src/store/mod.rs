//! Tiered memory store
//!
//! Holds one session's memories across the three tiers. The working
//! tier is a fixed-capacity FIFO with a TTL; the episodic tier is
//! bounded by a record count and a token budget and relies on the
//! compression engine for removal; the wisdom tier is unbounded and
//! only shrinks through explicit forget calls.

pub mod filter;

use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::memory::scoring::{ScoringConfig, effective_importance};
use crate::memory::types::{Category, MemoryRecord, Tier};

pub use filter::SearchFilter;

/// Configuration for tier capacities and promotion thresholds
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// Maximum number of records in the working tier (default: 10)
    #[serde(default = "default_working_capacity")]
    pub working_capacity: usize,
    /// Minutes a working-tier record lives before TTL expiry (default: 60)
    #[serde(default = "default_working_ttl_minutes")]
    pub working_ttl_minutes: i64,
    /// Maximum number of records in the episodic tier (default: 1000)
    #[serde(default = "default_episodic_capacity")]
    pub episodic_capacity: usize,
    /// Token budget for the episodic tier (default: 16000)
    #[serde(default = "default_token_budget")]
    pub token_budget: usize,
    /// Importance at or above which a record is consolidated into the
    /// wisdom tier (default: 0.8)
    #[serde(default = "default_consolidation_threshold")]
    pub consolidation_threshold: f32,
    /// Importance at or above which a record evicted from the working
    /// tier is promoted to episodic instead of being dropped (default: 0.5)
    #[serde(default = "default_promote_on_evict_threshold")]
    pub promote_on_evict_threshold: f32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            working_capacity: default_working_capacity(),
            working_ttl_minutes: default_working_ttl_minutes(),
            episodic_capacity: default_episodic_capacity(),
            token_budget: default_token_budget(),
            consolidation_threshold: default_consolidation_threshold(),
            promote_on_evict_threshold: default_promote_on_evict_threshold(),
        }
    }
}

fn default_working_capacity() -> usize {
    10
}

fn default_working_ttl_minutes() -> i64 {
    60
}

fn default_episodic_capacity() -> usize {
    1000
}

fn default_token_budget() -> usize {
    16000
}

fn default_consolidation_threshold() -> f32 {
    0.8
}

fn default_promote_on_evict_threshold() -> f32 {
    0.5
}

/// Result of a working-tier eviction pass
#[derive(Debug, Clone, Default)]
pub struct EvictionOutcome {
    /// Records promoted to episodic instead of being dropped
    pub promoted: Vec<Uuid>,
    /// Records dropped outright
    pub dropped: Vec<Uuid>,
}

/// Aggregate statistics for one session's store
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    /// Total number of records across all tiers
    pub total: usize,
    /// Record counts keyed by category label
    pub by_category: BTreeMap<String, usize>,
    /// Record counts keyed by tier label
    pub by_tier: BTreeMap<String, usize>,
    /// Mean effective importance across all records
    pub avg_importance: f32,
    /// Estimated token count across all tiers
    pub token_count: usize,
}

impl StoreStats {
    /// Stats for a session with no records
    pub fn empty() -> Self {
        Self {
            total: 0,
            by_category: BTreeMap::new(),
            by_tier: BTreeMap::new(),
            avg_importance: 0.0,
            token_count: 0,
        }
    }
}

/// One session's memories across the working, episodic, and wisdom tiers.
///
/// All mutation goes through this type; eviction, promotion, and TTL
/// expiry are computed lazily against an explicit clock, never by a
/// background task.
#[derive(Debug)]
pub struct TieredStore {
    working: VecDeque<MemoryRecord>,
    episodic: Vec<MemoryRecord>,
    wisdom: Vec<MemoryRecord>,
    config: StoreConfig,
}

impl TieredStore {
    /// Create an empty store with the given configuration
    pub fn new(config: StoreConfig) -> Self {
        Self {
            working: VecDeque::new(),
            episodic: Vec::new(),
            wisdom: Vec::new(),
            config,
        }
    }

    /// Get the current configuration
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Insert a new record, routing it to the appropriate tier.
    ///
    /// Importance at or above the consolidation threshold routes
    /// straight to wisdom. Durable categories (fact, preference, goal)
    /// and records above the promote threshold go to episodic.
    /// Everything else enters the working FIFO; if that overflows,
    /// exactly one record (the oldest) is evicted, moving to episodic
    /// when its importance warrants it and being dropped otherwise.
    pub fn insert(&mut self, mut record: MemoryRecord) -> Tier {
        let tier = self.route(&record);
        record.tier = tier;

        match tier {
            Tier::Wisdom => self.wisdom.push(record),
            Tier::Episodic => self.episodic.push(record),
            Tier::Working => {
                self.working.push_back(record);
                if self.working.len() > self.config.working_capacity
                    && let Some(oldest) = self.working.pop_front()
                {
                    self.promote_or_drop(oldest);
                }
            }
        }

        tier
    }

    fn route(&self, record: &MemoryRecord) -> Tier {
        if record.importance >= self.config.consolidation_threshold {
            Tier::Wisdom
        } else if record.importance >= self.config.promote_on_evict_threshold
            || matches!(
                record.category,
                Category::Fact | Category::Preference | Category::Goal
            )
        {
            Tier::Episodic
        } else {
            Tier::Working
        }
    }

    fn promote_or_drop(&mut self, mut record: MemoryRecord) -> (Uuid, bool) {
        let id = record.id;
        if record.importance >= self.config.promote_on_evict_threshold {
            debug!(record = %id, "promoting working-tier record to episodic on evict");
            record.tier = Tier::Episodic;
            self.episodic.push(record);
            (id, true)
        } else {
            debug!(record = %id, "dropping working-tier record on evict");
            (id, false)
        }
    }

    /// Apply working-tier TTL expiry, promoting or dropping each
    /// expired record by the same rule as capacity eviction.
    pub fn evict_due(&mut self, now: DateTime<Utc>) -> EvictionOutcome {
        let ttl = Duration::minutes(self.config.working_ttl_minutes);
        let mut outcome = EvictionOutcome::default();

        while let Some(front) = self.working.front() {
            if now - front.created_at <= ttl {
                break;
            }
            let expired = self
                .working
                .pop_front()
                .expect("front() just returned a record");
            let (id, promoted) = self.promote_or_drop(expired);
            if promoted {
                outcome.promoted.push(id);
            } else {
                outcome.dropped.push(id);
            }
        }

        outcome
    }

    /// Move episodic records whose effective importance has reached the
    /// consolidation threshold into the wisdom tier. The importance is
    /// frozen at its promotion-time effective value, which becomes the
    /// permanent floor since wisdom records never decay.
    pub fn promote_candidates(
        &mut self,
        now: DateTime<Utc>,
        scoring: &ScoringConfig,
    ) -> Vec<Uuid> {
        let mut promoted = Vec::new();
        let mut index = 0;

        while index < self.episodic.len() {
            let effective = effective_importance(&self.episodic[index], now, scoring);
            if effective >= self.config.consolidation_threshold {
                let mut record = self.episodic.remove(index);
                record.set_importance(effective);
                record.tier = Tier::Wisdom;
                debug!(record = %record.id, importance = effective, "consolidating record into wisdom");
                promoted.push(record.id);
                self.wisdom.push(record);
            } else {
                index += 1;
            }
        }

        promoted
    }

    /// Place a record directly into the tier recorded on it. Used by
    /// the compression engine to insert representatives at episodic.
    pub fn place(&mut self, record: MemoryRecord) {
        match record.tier {
            Tier::Working => self.working.push_back(record),
            Tier::Episodic => self.episodic.push(record),
            Tier::Wisdom => self.wisdom.push(record),
        }
    }

    /// Get a record by id from any tier
    pub fn get(&self, id: Uuid) -> Option<&MemoryRecord> {
        self.iter_all().find(|record| record.id == id)
    }

    /// Get a mutable record by id from any tier
    pub fn get_mut(&mut self, id: Uuid) -> Option<&mut MemoryRecord> {
        self.working
            .iter_mut()
            .chain(self.episodic.iter_mut())
            .chain(self.wisdom.iter_mut())
            .find(|record| record.id == id)
    }

    /// Remove a record by id from whichever tier holds it
    pub fn remove(&mut self, id: Uuid) -> Option<MemoryRecord> {
        if let Some(pos) = self.working.iter().position(|r| r.id == id) {
            return self.working.remove(pos);
        }
        if let Some(pos) = self.episodic.iter().position(|r| r.id == id) {
            return Some(self.episodic.remove(pos));
        }
        if let Some(pos) = self.wisdom.iter().position(|r| r.id == id) {
            return Some(self.wisdom.remove(pos));
        }
        None
    }

    /// Remove every record matching the filter, returning how many were removed
    pub fn remove_matching(&mut self, filter: &SearchFilter) -> usize {
        let before = self.total();
        self.working.retain(|record| !filter.matches(record));
        self.episodic.retain(|record| !filter.matches(record));
        self.wisdom.retain(|record| !filter.matches(record));
        before - self.total()
    }

    /// Iterate over every record across all tiers
    pub fn iter_all(&self) -> impl Iterator<Item = &MemoryRecord> {
        self.working
            .iter()
            .chain(self.episodic.iter())
            .chain(self.wisdom.iter())
    }

    /// Records currently in the episodic tier
    pub fn episodic(&self) -> &[MemoryRecord] {
        &self.episodic
    }

    /// Merge candidates from all tiers that pass the filter
    pub fn query(&self, filter: &SearchFilter) -> Vec<&MemoryRecord> {
        self.iter_all()
            .filter(|record| filter.matches(record))
            .collect()
    }

    /// Number of records in the working tier
    pub fn working_len(&self) -> usize {
        self.working.len()
    }

    /// Number of records in the episodic tier
    pub fn episodic_len(&self) -> usize {
        self.episodic.len()
    }

    /// Number of records in the wisdom tier
    pub fn wisdom_len(&self) -> usize {
        self.wisdom.len()
    }

    /// Total number of records across all tiers
    pub fn total(&self) -> usize {
        self.working.len() + self.episodic.len() + self.wisdom.len()
    }

    /// Estimated token count of the episodic tier
    pub fn episodic_tokens(&self) -> usize {
        self.episodic.iter().map(|record| record.token_count).sum()
    }

    /// Estimated token count across all tiers
    pub fn total_tokens(&self) -> usize {
        self.iter_all().map(|record| record.token_count).sum()
    }

    /// Whether the episodic tier has exceeded its count cap or token budget
    pub fn episodic_over_budget(&self) -> bool {
        self.episodic.len() > self.config.episodic_capacity
            || self.episodic_tokens() > self.config.token_budget
    }

    /// Aggregate statistics at `now`, with importances lazily decayed
    pub fn stats(&self, now: DateTime<Utc>, scoring: &ScoringConfig) -> StoreStats {
        let total = self.total();
        if total == 0 {
            return StoreStats::empty();
        }

        let mut by_category: BTreeMap<String, usize> = BTreeMap::new();
        let mut by_tier: BTreeMap<String, usize> = BTreeMap::new();
        let mut importance_sum = 0.0f32;

        for record in self.iter_all() {
            *by_category
                .entry(record.category.as_str().to_string())
                .or_insert(0) += 1;
            *by_tier.entry(record.tier.as_str().to_string()).or_insert(0) += 1;
            importance_sum += effective_importance(record, now, scoring);
        }

        StoreStats {
            total,
            by_category,
            by_tier,
            avg_importance: importance_sum / total as f32,
            token_count: self.total_tokens(),
        }
    }
}
