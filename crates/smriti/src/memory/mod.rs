//! Memory records and importance scoring

pub mod scoring;
pub mod types;

pub use scoring::{ScoringConfig, effective_importance, initial_importance};
pub use types::{Category, MemoryRecord, Tier, estimate_tokens};
