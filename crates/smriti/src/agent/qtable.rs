//! Discretized state, actions, and the learned value table

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::memory::scoring::{ScoringConfig, effective_importance};
use crate::store::TieredStore;

/// Discretized snapshot of one store's state.
///
/// Buckets are coarse on purpose: a tabular learner needs a small
/// state space to see each state often enough to learn from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentState {
    /// Episodic record count as a fraction of capacity, bucketed 0-3
    pub count_bucket: u8,
    /// Episodic token usage as a fraction of the budget, bucketed 0-3
    pub token_bucket: u8,
    /// Mean effective importance, bucketed 0-2
    pub importance_bucket: u8,
    /// Minutes since the last compression, bucketed 0-3 (3 = long ago or never)
    pub recency_bucket: u8,
}

impl AgentState {
    /// Observe a store at `now` and discretize its state
    pub fn observe(
        store: &TieredStore,
        scoring: &ScoringConfig,
        last_compression: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Self {
        let capacity = store.config().episodic_capacity.max(1) as f32;
        let budget = store.config().token_budget.max(1) as f32;

        let count_fraction = store.episodic_len() as f32 / capacity;
        let token_fraction = store.episodic_tokens() as f32 / budget;

        let mean_importance = if store.total() == 0 {
            0.0
        } else {
            store
                .iter_all()
                .map(|record| effective_importance(record, now, scoring))
                .sum::<f32>()
                / store.total() as f32
        };

        let recency_bucket = match last_compression {
            None => 3,
            Some(at) => match (now - at).num_minutes() {
                minutes if minutes < 5 => 0,
                minutes if minutes < 15 => 1,
                minutes if minutes < 60 => 2,
                _ => 3,
            },
        };

        Self {
            count_bucket: quarter_bucket(count_fraction),
            token_bucket: quarter_bucket(token_fraction),
            importance_bucket: third_bucket(mean_importance),
            recency_bucket,
        }
    }

    /// Stable string key for persistence
    pub fn key(&self) -> String {
        format!(
            "m{}-t{}-i{}-c{}",
            self.count_bucket, self.token_bucket, self.importance_bucket, self.recency_bucket
        )
    }
}

fn quarter_bucket(fraction: f32) -> u8 {
    match fraction {
        f if f < 0.25 => 0,
        f if f < 0.5 => 1,
        f if f < 0.75 => 2,
        _ => 3,
    }
}

fn third_bucket(value: f32) -> u8 {
    match value {
        v if v < 0.33 => 0,
        v if v < 0.66 => 1,
        _ => 2,
    }
}

/// Actions available to the policy agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Do nothing this cycle
    Wait,
    /// Compress with conservative parameters
    CompressConservative,
    /// Compress with balanced parameters
    CompressBalanced,
    /// Compress with aggressive parameters
    CompressAggressive,
}

impl Action {
    /// Every action, in a fixed order
    pub const ALL: [Action; 4] = [
        Action::Wait,
        Action::CompressConservative,
        Action::CompressBalanced,
        Action::CompressAggressive,
    ];

    /// Stable label used in persistence keys
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Wait => "wait",
            Action::CompressConservative => "compress_conservative",
            Action::CompressBalanced => "compress_balanced",
            Action::CompressAggressive => "compress_aggressive",
        }
    }
}

/// Learned value table keyed by serialized (state, action).
///
/// Unseen entries read as zero; entries are only removed on explicit
/// reset, never pruned.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QTable {
    values: HashMap<String, f32>,
}

impl QTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    fn entry_key(state: &AgentState, action: Action) -> String {
        format!("{}|{}", state.key(), action.as_str())
    }

    /// Learned value for a (state, action) pair; unseen pairs are 0.0
    pub fn get(&self, state: &AgentState, action: Action) -> f32 {
        self.values
            .get(&Self::entry_key(state, action))
            .copied()
            .unwrap_or(0.0)
    }

    /// Overwrite the value for a (state, action) pair
    pub fn set(&mut self, state: &AgentState, action: Action, value: f32) {
        self.values.insert(Self::entry_key(state, action), value);
    }

    /// Highest learned value across all actions in a state
    pub fn max_value(&self, state: &AgentState) -> f32 {
        Action::ALL
            .iter()
            .map(|action| self.get(state, *action))
            .fold(f32::NEG_INFINITY, f32::max)
    }

    /// Best action for a state, ties broken by the default balanced
    /// compression action
    pub fn best_action(&self, state: &AgentState) -> Action {
        let mut best = Action::CompressBalanced;
        let mut best_value = self.get(state, best);

        for action in Action::ALL {
            let value = self.get(state, action);
            if value > best_value {
                best = action;
                best_value = value;
            }
        }

        best
    }

    /// Number of stored (state, action) entries
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the table has no entries
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Drop every entry. Only used by explicit agent resets.
    pub fn clear(&mut self) {
        self.values.clear();
    }
}
