//! The memory core facade
//!
//! `Smriti` is the single entry point: it owns per-session tiered
//! stores, runs scoring and eviction on every write, blends semantic
//! relevance with importance on recall, and drives the learning policy
//! agent that decides when to compress. Sessions are fully isolated
//! from each other; the agent and its learned table are shared.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::agent::qtable::{Action, AgentState};
use crate::agent::{AgentStats, CycleOutcome, PolicyAgent};
use crate::capability::{Embedder, Summarizer};
use crate::compression::{CompressionEvent, CompressionMode, Compressor};
use crate::config::SmritiConfig;
use crate::error::{Result, SmritiError};
use crate::memory::scoring::{effective_importance, initial_importance};
use crate::memory::types::{Category, MemoryRecord};
use crate::store::{SearchFilter, StoreStats, TieredStore};

/// Caller-supplied attributes for a new memory
#[derive(Debug, Clone, Default)]
pub struct RememberOptions {
    /// Classification; defaults to `Category::General`
    pub category: Category,
    /// Explicit importance override in [0, 1]
    pub importance: Option<f32>,
    /// Opaque semantic significance signal in [0, 1]
    pub significance: Option<f32>,
    /// Free-form metadata attached to the record
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl RememberOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_category(mut self, category: Category) -> Self {
        self.category = category;
        self
    }

    pub fn with_importance(mut self, importance: f32) -> Self {
        self.importance = Some(importance);
        self
    }

    pub fn with_significance(mut self, significance: f32) -> Self {
        self.significance = Some(significance);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Tuning knobs for a recall query
#[derive(Debug, Clone)]
pub struct RecallOptions {
    /// Maximum number of results (default: 5)
    pub limit: usize,
    /// Drop results whose combined score falls below this
    pub min_score: Option<f32>,
    /// Restrict results to these categories
    pub categories: Option<Vec<Category>>,
}

impl Default for RecallOptions {
    fn default() -> Self {
        Self {
            limit: 5,
            min_score: None,
            categories: None,
        }
    }
}

impl RecallOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = Some(min_score);
        self
    }

    pub fn with_categories(mut self, categories: Vec<Category>) -> Self {
        self.categories = Some(categories);
        self
    }
}

/// Partial update applied to an existing memory; unset fields are left
/// as they are
#[derive(Debug, Clone, Default)]
pub struct UpdateRequest {
    pub content: Option<String>,
    pub category: Option<Category>,
    pub metadata: Option<BTreeMap<String, serde_json::Value>>,
    pub importance: Option<f32>,
}

impl UpdateRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn with_category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }

    pub fn with_metadata(mut self, metadata: BTreeMap<String, serde_json::Value>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_importance(mut self, importance: f32) -> Self {
        self.importance = Some(importance);
        self
    }
}

/// One recall result with its score breakdown
#[derive(Debug, Clone)]
pub struct RecalledMemory {
    /// The matched record
    pub record: MemoryRecord,
    /// Semantic relevance to the query in [0, 1]; 0.0 in fallback mode
    pub relevance: f32,
    /// Effective importance at query time
    pub importance: f32,
    /// Combined ranking score
    pub score: f32,
}

/// Relevance dominates the blend; importance breaks near-ties between
/// equally relevant memories.
const RELEVANCE_WEIGHT: f32 = 0.7;
const IMPORTANCE_WEIGHT: f32 = 0.3;

struct Session {
    store: TieredStore,
    compressor: Compressor,
    last_compression: Option<DateTime<Utc>>,
}

impl Session {
    fn new(config: &SmritiConfig) -> Self {
        Self {
            store: TieredStore::new(config.store.clone()),
            compressor: Compressor::with_config(config.compression.clone()),
            last_compression: None,
        }
    }
}

/// Importance-aware tiered memory core for conversational agents.
pub struct Smriti {
    config: SmritiConfig,
    sessions: DashMap<String, Arc<Mutex<Session>>>,
    agent: Arc<PolicyAgent>,
    embedder: Arc<dyn Embedder>,
    summarizer: Arc<dyn Summarizer>,
    remember_calls: AtomicU64,
}

impl Smriti {
    /// Memory core with default configuration
    pub fn new(embedder: Arc<dyn Embedder>, summarizer: Arc<dyn Summarizer>) -> Self {
        Self::with_config(SmritiConfig::default(), embedder, summarizer)
    }

    /// Memory core with custom configuration.
    ///
    /// The policy agent persists its learned table only when a table
    /// path is configured; otherwise learning is process-local.
    pub fn with_config(
        config: SmritiConfig,
        embedder: Arc<dyn Embedder>,
        summarizer: Arc<dyn Summarizer>,
    ) -> Self {
        let agent = if config.agent.q_table_path.is_some() {
            PolicyAgent::with_persistence(config.agent.clone())
        } else {
            PolicyAgent::new(config.agent.clone())
        };

        Self {
            config,
            sessions: DashMap::new(),
            agent: Arc::new(agent),
            embedder,
            summarizer,
            remember_calls: AtomicU64::new(0),
        }
    }

    /// Get the active configuration
    pub fn config(&self) -> &SmritiConfig {
        &self.config
    }

    fn session(&self, session_id: &str) -> Arc<Mutex<Session>> {
        let entry = self
            .sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Session::new(&self.config))));
        Arc::clone(entry.value())
    }

    fn existing_session(&self, session_id: &str) -> Option<Arc<Mutex<Session>>> {
        self.sessions
            .get(session_id)
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Store a new memory for a session.
    ///
    /// The record is scored, routed to a tier, and returned as stored.
    /// Each write also runs working-tier TTL expiry and episodic
    /// consolidation, and periodically hands the session to the policy
    /// agent for a compression decision. If the episodic tier is still
    /// over its pressure threshold afterwards, a balanced compression
    /// pass runs regardless of what the agent chose, so the token
    /// budget holds even when the learned policy prefers waiting.
    /// Neither agent nor compression failures ever fail the write.
    pub async fn remember(
        &self,
        session_id: &str,
        content: &str,
        options: RememberOptions,
    ) -> Result<MemoryRecord> {
        if session_id.trim().is_empty() {
            return Err(SmritiError::Validation(
                "session_id must not be empty".to_string(),
            ));
        }
        if content.trim().is_empty() {
            return Err(SmritiError::Validation(
                "content must not be empty".to_string(),
            ));
        }

        let now = Utc::now();
        let session = self.session(session_id);
        let mut session = session.lock().await;

        if let Some(limit) = self.config.max_records_per_session
            && session.store.total() >= limit
        {
            return Err(SmritiError::QuotaExceeded {
                current: session.store.total(),
                limit,
            });
        }

        let importance = initial_importance(
            &options.category,
            options.importance,
            options.significance,
            &self.config.scoring,
        );

        let mut record = MemoryRecord::new(session_id, content, options.category);
        record.set_importance(importance);
        record.metadata = options.metadata;

        let tier = session.store.insert(record.clone());
        record.tier = tier;
        debug!(session = session_id, record = %record.id, %tier, "remembered");

        session.store.evict_due(now);
        session.store.promote_candidates(now, &self.config.scoring);

        let interval = self.config.agent.decision_interval.max(1);
        let calls = self.remember_calls.fetch_add(1, Ordering::Relaxed) + 1;
        if self.config.agent.enabled && calls % interval == 0 {
            self.run_agent_cycle(&mut session, now).await;
        }

        if session.compressor.should_compress(&session.store) {
            self.relieve_pressure(&mut session, now).await;
        }

        Ok(record)
    }

    /// Forced balanced compression pass for a store over its pressure
    /// threshold. Runs outside the agent's learning loop; failures are
    /// logged and retried on a later write.
    async fn relieve_pressure(&self, session: &mut Session, now: DateTime<Utc>) {
        match session
            .compressor
            .compress(
                &mut session.store,
                CompressionMode::Balanced,
                self.summarizer.as_ref(),
                self.embedder.as_ref(),
                &self.config.scoring,
                now,
            )
            .await
        {
            Ok(Some(event)) => {
                session.last_compression = Some(now);
                debug!(
                    tokens_saved = event.tokens_saved(),
                    "relieved episodic pressure"
                );
            }
            Ok(None) => {}
            Err(error) => {
                warn!(%error, "pressure compression failed, will retry on a later write");
            }
        }
    }

    /// Recall the memories most relevant to a query.
    ///
    /// Ranks by a blend of semantic relevance and effective importance.
    /// When the similarity capability is unavailable the ranking falls
    /// back to importance alone rather than failing. Returned records
    /// are marked accessed, which feeds the frequency boost.
    pub async fn recall(
        &self,
        session_id: &str,
        query: &str,
        options: RecallOptions,
    ) -> Result<Vec<RecalledMemory>> {
        let Some(session) = self.existing_session(session_id) else {
            return Ok(Vec::new());
        };
        let mut session = session.lock().await;
        let now = Utc::now();

        let mut filter = SearchFilter::new();
        if let Some(categories) = &options.categories {
            filter = filter.with_categories(categories.clone());
        }

        let candidates: Vec<(Uuid, String, f32, DateTime<Utc>)> = session
            .store
            .query(&filter)
            .into_iter()
            .map(|record| {
                (
                    record.id,
                    record.content.clone(),
                    effective_importance(record, now, &self.config.scoring),
                    record.created_at,
                )
            })
            .collect();

        let mut fallback = false;
        let mut scored: Vec<(Uuid, f32, f32, DateTime<Utc>)> = Vec::with_capacity(candidates.len());
        for (id, content, importance, created_at) in candidates {
            let relevance = if fallback {
                0.0
            } else {
                match self.embedder.similarity(query, &content).await {
                    Ok(similarity) => similarity.clamp(0.0, 1.0),
                    Err(error) => {
                        warn!(%error, "similarity unavailable, ranking by importance only");
                        fallback = true;
                        0.0
                    }
                }
            };
            scored.push((id, relevance, importance, created_at));
        }

        let mut ranked: Vec<(Uuid, f32, f32, f32, DateTime<Utc>)> = scored
            .into_iter()
            .map(|(id, relevance, importance, created_at)| {
                let score = if fallback {
                    importance
                } else {
                    RELEVANCE_WEIGHT * relevance + IMPORTANCE_WEIGHT * importance
                };
                (id, relevance, importance, score, created_at)
            })
            .filter(|(_, _, _, score, _)| options.min_score.is_none_or(|min| *score >= min))
            .collect();

        ranked.sort_by(|a, b| {
            b.3.total_cmp(&a.3)
                .then_with(|| b.2.total_cmp(&a.2))
                .then_with(|| b.4.cmp(&a.4))
        });
        ranked.truncate(options.limit);

        let mut results = Vec::with_capacity(ranked.len());
        for (id, relevance, importance, score, _) in ranked {
            if let Some(record) = session.store.get_mut(id) {
                record.mark_accessed(now);
                results.push(RecalledMemory {
                    record: record.clone(),
                    relevance,
                    importance,
                    score,
                });
            }
        }

        Ok(results)
    }

    /// Structured search over one session, newest first.
    pub async fn search(
        &self,
        session_id: &str,
        filter: SearchFilter,
        limit: Option<usize>,
    ) -> Vec<MemoryRecord> {
        let Some(session) = self.existing_session(session_id) else {
            return Vec::new();
        };
        let session = session.lock().await;

        let mut matches: Vec<MemoryRecord> =
            session.store.query(&filter).into_iter().cloned().collect();
        matches.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        matches.truncate(limit.unwrap_or(100));
        matches
    }

    /// Apply a partial update to a memory, wherever it lives.
    ///
    /// Updates change the record in place; tier placement is only
    /// revisited by the normal promotion and eviction passes.
    pub async fn update(&self, id: Uuid, request: UpdateRequest) -> Result<MemoryRecord> {
        let sessions: Vec<Arc<Mutex<Session>>> = self
            .sessions
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        for session in sessions {
            let mut session = session.lock().await;
            if let Some(record) = session.store.get_mut(id) {
                if let Some(content) = request.content {
                    record.set_content(content);
                }
                if let Some(category) = request.category {
                    record.category = category;
                }
                if let Some(metadata) = request.metadata {
                    record.metadata = metadata;
                }
                if let Some(importance) = request.importance {
                    record.set_importance(importance);
                }
                record.updated_at = Utc::now();
                return Ok(record.clone());
            }
        }

        Err(SmritiError::NotFound(id))
    }

    /// Remove one memory, wherever it lives. Returns whether anything
    /// was removed.
    pub async fn forget(&self, id: Uuid) -> bool {
        let sessions: Vec<Arc<Mutex<Session>>> = self
            .sessions
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        for session in sessions {
            let mut session = session.lock().await;
            if session.store.remove(id).is_some() {
                return true;
            }
        }
        false
    }

    /// Remove every memory in a session, or only those in one category.
    /// Returns how many were removed. Other sessions are untouched.
    pub async fn forget_all(&self, session_id: &str, category: Option<Category>) -> usize {
        let Some(session) = self.existing_session(session_id) else {
            return 0;
        };
        let mut session = session.lock().await;

        let mut filter = SearchFilter::new();
        if let Some(category) = category {
            filter = filter.with_category(category);
        }
        session.store.remove_matching(&filter)
    }

    /// Aggregate statistics for one session's store
    pub async fn get_stats(&self, session_id: &str) -> StoreStats {
        let Some(session) = self.existing_session(session_id) else {
            return StoreStats::empty();
        };
        let session = session.lock().await;
        session.store.stats(Utc::now(), &self.config.scoring)
    }

    /// Learning counters for the shared policy agent
    pub fn get_agent_stats(&self) -> AgentStats {
        self.agent.stats()
    }

    /// Audit trail of compression passes for one session, oldest first
    pub async fn compression_events(&self, session_id: &str) -> Vec<CompressionEvent> {
        let Some(session) = self.existing_session(session_id) else {
            return Vec::new();
        };
        let session = session.lock().await;
        session.compressor.events().to_vec()
    }

    /// Persist the agent's learned table, if persistence is configured
    pub fn checkpoint(&self) -> Result<()> {
        self.agent.checkpoint()
    }

    /// One decision cycle: observe, act, observe again, learn. Failures
    /// are absorbed into the reward signal, never surfaced to the caller.
    async fn run_agent_cycle(&self, session: &mut Session, now: DateTime<Utc>) {
        let scoring = &self.config.scoring;
        let prev_state =
            AgentState::observe(&session.store, scoring, session.last_compression, now);
        let action = self.agent.choose_action(&prev_state);

        let outcome = match action {
            Action::Wait => CycleOutcome::wait(),
            Action::CompressConservative | Action::CompressBalanced | Action::CompressAggressive => {
                let mode = match action {
                    Action::CompressConservative => CompressionMode::Conservative,
                    Action::CompressAggressive => CompressionMode::Aggressive,
                    _ => CompressionMode::Balanced,
                };
                let tokens_before = session.store.episodic_tokens();

                match session
                    .compressor
                    .compress(
                        &mut session.store,
                        mode,
                        self.summarizer.as_ref(),
                        self.embedder.as_ref(),
                        scoring,
                        now,
                    )
                    .await
                {
                    Ok(Some(event)) => {
                        session.last_compression = Some(now);
                        CycleOutcome {
                            failed: false,
                            tokens_before: event.tokens_before,
                            tokens_saved: event.tokens_saved(),
                            quality: event.quality,
                        }
                    }
                    Ok(None) => CycleOutcome {
                        failed: false,
                        tokens_before,
                        tokens_saved: 0,
                        quality: 0.0,
                    },
                    Err(error) => {
                        warn!(%error, "compression failed during agent cycle");
                        CycleOutcome {
                            failed: true,
                            tokens_before,
                            tokens_saved: 0,
                            quality: 0.0,
                        }
                    }
                }
            }
        };

        let next_state =
            AgentState::observe(&session.store, scoring, session.last_compression, now);
        self.agent.finish_cycle(&prev_state, action, &outcome, &next_state);
    }
}
