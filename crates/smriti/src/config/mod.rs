//! Top-level configuration
//!
//! One TOML document with a section per subsystem. Every field has a
//! default, so an empty document is a valid configuration; unknown
//! keys are rejected rather than silently ignored.

use std::path::Path;

use serde::Deserialize;

use crate::agent::AgentConfig;
use crate::compression::CompressionConfig;
use crate::error::{Result, SmritiError};
use crate::memory::scoring::ScoringConfig;
use crate::store::StoreConfig;

/// Complete configuration for a memory core instance
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SmritiConfig {
    /// Tiered store sizing and routing
    #[serde(default)]
    pub store: StoreConfig,

    /// Importance scoring and decay
    #[serde(default)]
    pub scoring: ScoringConfig,

    /// Semantic compression thresholds and batching
    #[serde(default)]
    pub compression: CompressionConfig,

    /// Learning policy agent
    #[serde(default)]
    pub agent: AgentConfig,

    /// Hard cap on records per session; None means unlimited
    #[serde(default)]
    pub max_records_per_session: Option<usize>,
}

impl SmritiConfig {
    /// Parse a configuration from a TOML document
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|error| SmritiError::Config(error.to_string()))
    }

    /// Load a configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::RewardProfile;

    #[test]
    fn test_empty_document_is_all_defaults() {
        let config = SmritiConfig::from_toml_str("").unwrap();
        assert_eq!(config.store.working_capacity, 10);
        assert_eq!(config.scoring.decay_rate, 0.02);
        assert_eq!(config.compression.threshold, 0.75);
        assert!(config.agent.enabled);
        assert!(config.max_records_per_session.is_none());
    }

    #[test]
    fn test_partial_document_overrides_only_named_fields() {
        let config = SmritiConfig::from_toml_str(
            r#"
            max_records_per_session = 500

            [store]
            working_capacity = 4
            token_budget = 8000

            [agent]
            reward_profile = "cost_focused"
            "#,
        )
        .unwrap();

        assert_eq!(config.max_records_per_session, Some(500));
        assert_eq!(config.store.working_capacity, 4);
        assert_eq!(config.store.token_budget, 8000);
        assert_eq!(config.store.episodic_capacity, 1000, "untouched default");
        assert_eq!(config.agent.reward_profile, RewardProfile::CostFocused);
        assert_eq!(config.agent.learning_rate, 0.1, "untouched default");
    }

    #[test]
    fn test_unknown_top_level_key_is_rejected() {
        let result = SmritiConfig::from_toml_str("not_a_real_option = true\n");
        assert!(matches!(result, Err(SmritiError::Config(_))));
    }

    #[test]
    fn test_unknown_section_key_is_rejected() {
        let result = SmritiConfig::from_toml_str(
            r#"
            [scoring]
            decay_rte = 0.05
            "#,
        );
        assert!(matches!(result, Err(SmritiError::Config(_))));
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("smriti.toml");
        std::fs::write(&path, "[compression]\nthreshold = 0.6\n").unwrap();

        let config = SmritiConfig::load(&path).unwrap();
        assert_eq!(config.compression.threshold, 0.6);
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let result = SmritiConfig::load("/definitely/not/here.toml");
        assert!(matches!(result, Err(SmritiError::Io(_))));
    }
}
