//! Learning policy agent
//!
//! A tabular Q-learning agent that decides, once per decision cycle,
//! whether to leave a session's store alone or compress it, and how
//! aggressively. State is a coarse discretization of store pressure,
//! reward blends token savings against summary quality, and the
//! learned table can be checkpointed between processes.

pub mod persistence;
pub mod qtable;

use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::agent::persistence::{JsonFileQTable, QTablePersistence};
use crate::agent::qtable::{Action, AgentState, QTable};
use crate::error::Result;

/// How the reward trades token savings against summary quality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardProfile {
    /// Favor shrinking the store (0.8 tokens, 0.2 quality)
    CostFocused,
    /// Favor faithful summaries (0.2 tokens, 0.8 quality)
    QualityFocused,
    /// Equal weight on both
    #[default]
    Balanced,
}

impl RewardProfile {
    /// (token_weight, quality_weight)
    pub fn weights(&self) -> (f32, f32) {
        match self {
            RewardProfile::CostFocused => (0.8, 0.2),
            RewardProfile::QualityFocused => (0.2, 0.8),
            RewardProfile::Balanced => (0.5, 0.5),
        }
    }
}

/// Policy agent configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// Whether the agent runs at all; when disabled every cycle is a no-op
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Q-update step size
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f32,

    /// Weight on the next state's best value in the Q-update
    #[serde(default = "default_discount")]
    pub discount: f32,

    /// Exploration rate at episode zero
    #[serde(default = "default_epsilon_start")]
    pub epsilon_start: f32,

    /// Exploration rate never decays below this
    #[serde(default = "default_epsilon_floor")]
    pub epsilon_floor: f32,

    /// Episodes for the exploration rate to halve
    #[serde(default = "default_epsilon_half_life")]
    pub epsilon_half_life_episodes: f32,

    /// Run a decision cycle every N remember calls
    #[serde(default = "default_decision_interval")]
    pub decision_interval: u64,

    /// Reward shaping profile
    #[serde(default)]
    pub reward_profile: RewardProfile,

    /// Where to persist the learned table; None uses the per-user default
    #[serde(default)]
    pub q_table_path: Option<PathBuf>,
}

fn default_enabled() -> bool {
    true
}

fn default_learning_rate() -> f32 {
    0.1
}

fn default_discount() -> f32 {
    0.9
}

fn default_epsilon_start() -> f32 {
    0.30
}

fn default_epsilon_floor() -> f32 {
    0.05
}

fn default_epsilon_half_life() -> f32 {
    10.0
}

fn default_decision_interval() -> u64 {
    1
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            learning_rate: default_learning_rate(),
            discount: default_discount(),
            epsilon_start: default_epsilon_start(),
            epsilon_floor: default_epsilon_floor(),
            epsilon_half_life_episodes: default_epsilon_half_life(),
            decision_interval: default_decision_interval(),
            reward_profile: RewardProfile::default(),
            q_table_path: None,
        }
    }
}

/// What one decision cycle actually did, fed back into the learner
#[derive(Debug, Clone, Copy)]
pub struct CycleOutcome {
    /// A compression was attempted and its capability failed
    pub failed: bool,
    /// Episodic token count before the action
    pub tokens_before: usize,
    /// Tokens removed by the action
    pub tokens_saved: usize,
    /// Summary quality in [0, 1]; meaningless unless tokens were saved
    pub quality: f32,
}

impl CycleOutcome {
    /// Outcome of a cycle that changed nothing
    pub fn wait() -> Self {
        Self {
            failed: false,
            tokens_before: 0,
            tokens_saved: 0,
            quality: 0.0,
        }
    }
}

/// Counters and derived values exposed for observability
#[derive(Debug, Clone, Serialize)]
pub struct AgentStats {
    pub episodes: u64,
    pub epsilon: f32,
    pub q_table_size: usize,
}

/// Tabular Q-learning agent over store-maintenance actions.
///
/// Interior mutability keeps the agent shareable across sessions: the
/// table sits behind a mutex and the episode counter is atomic, so
/// concurrent decision cycles serialize only on the table itself.
pub struct PolicyAgent {
    config: AgentConfig,
    qtable: Mutex<QTable>,
    episodes: AtomicU64,
    persistence: Option<Box<dyn QTablePersistence>>,
}

impl PolicyAgent {
    /// Agent with no persistence; the table lives and dies with the process
    pub fn new(config: AgentConfig) -> Self {
        Self {
            config,
            qtable: Mutex::new(QTable::new()),
            episodes: AtomicU64::new(0),
            persistence: None,
        }
    }

    /// Agent backed by file persistence at the configured (or default)
    /// table path.
    pub fn with_persistence(config: AgentConfig) -> Self {
        let persistence: Box<dyn QTablePersistence> = match &config.q_table_path {
            Some(path) => Box::new(JsonFileQTable::new(path.clone())),
            None => Box::new(JsonFileQTable::at_default_path()),
        };
        Self::with_backend(config, persistence)
    }

    /// Agent backed by an injected persistence implementation.
    ///
    /// Loads any previously checkpointed table; a missing or unreadable
    /// artifact just means starting fresh.
    pub fn with_backend(config: AgentConfig, persistence: Box<dyn QTablePersistence>) -> Self {
        let table = match persistence.load() {
            Ok(table) => {
                debug!(entries = table.len(), "loaded persisted value table");
                table
            }
            Err(error) => {
                warn!("failed to load persisted value table, starting fresh: {error}");
                QTable::new()
            }
        };

        Self {
            config,
            qtable: Mutex::new(table),
            episodes: AtomicU64::new(0),
            persistence: Some(persistence),
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Current exploration rate: exponential decay from the starting
    /// rate with a fixed half-life, clamped to the floor
    pub fn epsilon(&self) -> f32 {
        let episodes = self.episodes.load(Ordering::Relaxed) as f32;
        let decayed = self.config.epsilon_start
            * 0.5_f32.powf(episodes / self.config.epsilon_half_life_episodes);
        decayed.max(self.config.epsilon_floor)
    }

    /// Completed learning episodes
    pub fn episodes(&self) -> u64 {
        self.episodes.load(Ordering::Relaxed)
    }

    /// Pick an action for a state: explore uniformly with probability
    /// epsilon, otherwise exploit the learned table
    pub fn choose_action(&self, state: &AgentState) -> Action {
        let mut rng = rand::rng();
        if rng.random::<f32>() < self.epsilon() {
            let index = rng.random_range(0..Action::ALL.len());
            Action::ALL[index]
        } else {
            self.qtable.lock().unwrap_or_else(|e| e.into_inner()).best_action(state)
        }
    }

    /// Scalar reward for a cycle outcome under the configured profile
    pub fn reward(&self, outcome: &CycleOutcome) -> f32 {
        if outcome.failed {
            return -1.0;
        }
        if outcome.tokens_before == 0 {
            return 0.0;
        }

        let (token_weight, quality_weight) = self.config.reward_profile.weights();
        let savings = outcome.tokens_saved as f32 / outcome.tokens_before as f32;
        token_weight * savings + quality_weight * outcome.quality
    }

    /// Close out one decision cycle: apply the Q-update and advance the
    /// episode counter
    pub fn finish_cycle(
        &self,
        prev_state: &AgentState,
        action: Action,
        outcome: &CycleOutcome,
        next_state: &AgentState,
    ) {
        let reward = self.reward(outcome);

        let mut table = self.qtable.lock().unwrap_or_else(|e| e.into_inner());
        let current = table.get(prev_state, action);
        let max_next = table.max_value(next_state);
        let updated =
            current + self.config.learning_rate * (reward + self.config.discount * max_next - current);
        table.set(prev_state, action, updated);
        drop(table);

        let episode = self.episodes.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(
            episode,
            action = action.as_str(),
            reward,
            "finished decision cycle"
        );
    }

    /// Snapshot of learner counters for observability
    pub fn stats(&self) -> AgentStats {
        AgentStats {
            episodes: self.episodes(),
            epsilon: self.epsilon(),
            q_table_size: self.qtable.lock().unwrap_or_else(|e| e.into_inner()).len(),
        }
    }

    /// Persist the current table, if persistence is configured
    pub fn checkpoint(&self) -> Result<()> {
        if let Some(persistence) = &self.persistence {
            let table = self.qtable.lock().unwrap_or_else(|e| e.into_inner());
            persistence.save(&table)?;
        }
        Ok(())
    }

    /// Discard everything the agent has learned
    pub fn reset(&self) {
        self.qtable.lock().unwrap_or_else(|e| e.into_inner()).clear();
        self.episodes.store(0, Ordering::Relaxed);
    }
}

impl Drop for PolicyAgent {
    fn drop(&mut self) {
        if self.persistence.is_some()
            && let Err(error) = self.checkpoint()
        {
            warn!("failed to persist value table on shutdown: {error}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(count: u8) -> AgentState {
        AgentState {
            count_bucket: count,
            token_bucket: 0,
            importance_bucket: 0,
            recency_bucket: 3,
        }
    }

    fn success(tokens_before: usize, tokens_saved: usize, quality: f32) -> CycleOutcome {
        CycleOutcome {
            failed: false,
            tokens_before,
            tokens_saved,
            quality,
        }
    }

    mod config {
        use super::*;

        #[test]
        fn test_defaults() {
            let config = AgentConfig::default();
            assert!(config.enabled);
            assert_eq!(config.learning_rate, 0.1);
            assert_eq!(config.discount, 0.9);
            assert_eq!(config.epsilon_start, 0.30);
            assert_eq!(config.epsilon_floor, 0.05);
            assert_eq!(config.decision_interval, 1);
            assert_eq!(config.reward_profile, RewardProfile::Balanced);
            assert!(config.q_table_path.is_none());
        }

        #[test]
        fn test_reward_profile_weights_sum_to_one() {
            for profile in [
                RewardProfile::CostFocused,
                RewardProfile::QualityFocused,
                RewardProfile::Balanced,
            ] {
                let (token, quality) = profile.weights();
                assert!((token + quality - 1.0).abs() < 1e-6);
            }
        }
    }

    mod epsilon {
        use super::*;

        #[test]
        fn test_starts_at_configured_rate() {
            let agent = PolicyAgent::new(AgentConfig::default());
            assert_eq!(agent.epsilon(), 0.30);
        }

        #[test]
        fn test_halves_per_half_life() {
            let agent = PolicyAgent::new(AgentConfig::default());
            for _ in 0..10 {
                agent.finish_cycle(&state(0), Action::Wait, &CycleOutcome::wait(), &state(0));
            }
            assert!((agent.epsilon() - 0.15).abs() < 1e-4);
        }

        #[test]
        fn test_never_decays_below_floor() {
            let agent = PolicyAgent::new(AgentConfig::default());
            for _ in 0..500 {
                agent.finish_cycle(&state(0), Action::Wait, &CycleOutcome::wait(), &state(0));
            }
            assert_eq!(agent.epsilon(), 0.05);
        }
    }

    mod reward {
        use super::*;

        #[test]
        fn test_failed_cycle_is_penalized() {
            let agent = PolicyAgent::new(AgentConfig::default());
            let outcome = CycleOutcome {
                failed: true,
                tokens_before: 100,
                tokens_saved: 0,
                quality: 0.0,
            };
            assert_eq!(agent.reward(&outcome), -1.0);
        }

        #[test]
        fn test_wait_on_empty_store_is_neutral() {
            let agent = PolicyAgent::new(AgentConfig::default());
            assert_eq!(agent.reward(&CycleOutcome::wait()), 0.0);
        }

        #[test]
        fn test_balanced_blends_savings_and_quality() {
            let agent = PolicyAgent::new(AgentConfig::default());
            let reward = agent.reward(&success(100, 60, 0.8));
            assert!((reward - (0.5 * 0.6 + 0.5 * 0.8)).abs() < 1e-6);
        }

        #[test]
        fn test_cost_focused_rewards_savings_more() {
            let cost = PolicyAgent::new(AgentConfig {
                reward_profile: RewardProfile::CostFocused,
                ..AgentConfig::default()
            });
            let quality = PolicyAgent::new(AgentConfig {
                reward_profile: RewardProfile::QualityFocused,
                ..AgentConfig::default()
            });

            let high_savings_low_quality = success(100, 90, 0.2);
            assert!(cost.reward(&high_savings_low_quality) > quality.reward(&high_savings_low_quality));
        }
    }

    mod learning {
        use super::*;

        #[test]
        fn test_update_moves_value_toward_reward() {
            let agent = PolicyAgent::new(AgentConfig::default());
            let outcome = success(100, 50, 1.0);

            agent.finish_cycle(&state(3), Action::CompressBalanced, &outcome, &state(0));

            let value = agent
                .qtable
                .lock()
                .unwrap()
                .get(&state(3), Action::CompressBalanced);
            // lr 0.1, reward 0.75, empty next state: 0.1 * 0.75
            assert!((value - 0.075).abs() < 1e-6);
        }

        #[test]
        fn test_repeated_success_converges_to_exploitation() {
            let agent = PolicyAgent::new(AgentConfig::default());
            let outcome = success(100, 70, 0.9);
            for _ in 0..50 {
                agent.finish_cycle(&state(3), Action::CompressAggressive, &outcome, &state(1));
            }

            let table = agent.qtable.lock().unwrap();
            assert_eq!(table.best_action(&state(3)), Action::CompressAggressive);
            assert!(table.get(&state(3), Action::CompressAggressive) > 0.5);
        }

        #[test]
        fn test_reset_discards_learning() {
            let agent = PolicyAgent::new(AgentConfig::default());
            agent.finish_cycle(&state(2), Action::Wait, &CycleOutcome::wait(), &state(2));
            assert_eq!(agent.episodes(), 1);

            agent.reset();
            assert_eq!(agent.episodes(), 0);
            assert_eq!(agent.stats().q_table_size, 0);
        }

        #[test]
        fn test_choose_action_exploits_when_greedy() {
            let agent = PolicyAgent::new(AgentConfig {
                epsilon_start: 0.0,
                epsilon_floor: 0.0,
                ..AgentConfig::default()
            });
            let outcome = success(100, 80, 1.0);
            agent.finish_cycle(&state(3), Action::CompressConservative, &outcome, &state(0));

            for _ in 0..20 {
                assert_eq!(agent.choose_action(&state(3)), Action::CompressConservative);
            }
        }
    }

    mod checkpointing {
        use super::*;

        #[test]
        fn test_checkpoint_and_reload() {
            let temp_dir = tempfile::tempdir().unwrap();
            let path = temp_dir.path().join("q_table.json");
            let config = AgentConfig {
                q_table_path: Some(path.clone()),
                ..AgentConfig::default()
            };

            let agent = PolicyAgent::with_persistence(config.clone());
            agent.finish_cycle(&state(3), Action::CompressBalanced, &success(100, 40, 0.9), &state(1));
            agent.checkpoint().unwrap();

            let restored = PolicyAgent::with_persistence(config);
            assert_eq!(restored.stats().q_table_size, 1);
        }

        #[test]
        fn test_checkpoint_without_persistence_is_noop() {
            let agent = PolicyAgent::new(AgentConfig::default());
            assert!(agent.checkpoint().is_ok());
        }
    }
}
