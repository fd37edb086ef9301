//! Smriti - importance-aware tiered memory for conversational agents
//!
//! Smriti gives an agent a memory that behaves more like recollection
//! than like a database: memories enter a short-lived working tier,
//! consolidate into an episodic tier where their importance decays
//! unless they are re-accessed, and the most valuable ones settle into
//! a permanent wisdom tier. When the episodic tier comes under token
//! pressure, low-value memories are folded into summarized
//! representatives, and a small Q-learning agent learns when and how
//! aggressively to do so.
//!
//! Embedding and summarization are injected capabilities: the core
//! works against the [`capability::Embedder`] and
//! [`capability::Summarizer`] traits and never talks to a model
//! itself. Deterministic mock implementations live in [`testing`].
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use smriti::testing::{MockEmbedder, MockSummarizer};
//! use smriti::{Category, RecallOptions, RememberOptions, Smriti};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> smriti::Result<()> {
//! let memory = Smriti::new(Arc::new(MockEmbedder::new()), Arc::new(MockSummarizer::new()));
//!
//! memory
//!     .remember(
//!         "session-1",
//!         "The user prefers dark mode",
//!         RememberOptions::new().with_category(Category::Preference),
//!     )
//!     .await?;
//!
//! let recalled = memory
//!     .recall("session-1", "what display mode does the user like", RecallOptions::new())
//!     .await?;
//! assert!(!recalled.is_empty());
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod capability;
pub mod compression;
pub mod config;
pub mod error;
pub mod facade;
pub mod memory;
pub mod store;
pub mod testing;

pub use agent::persistence::{JsonFileQTable, QTablePersistence};
pub use agent::{AgentConfig, AgentStats, PolicyAgent, RewardProfile};
pub use capability::{Embedder, Summarizer};
pub use compression::{CompressionConfig, CompressionEvent, CompressionMode};
pub use config::SmritiConfig;
pub use error::{Result, SmritiError};
pub use facade::{RecallOptions, RecalledMemory, RememberOptions, Smriti, UpdateRequest};
pub use memory::{Category, MemoryRecord, ScoringConfig, Tier};
pub use store::{SearchFilter, StoreConfig, StoreStats};
