//! Test utilities for smriti - deterministic mock capabilities
//!
//! Real deployments inject embedding-backed similarity and LLM-backed
//! summarization. These mocks are deterministic and dependency-free so
//! unit tests stay fast and reproducible.

use std::collections::HashSet;

use async_trait::async_trait;

use crate::capability::{Embedder, Summarizer};
use crate::error::{Result, SmritiError};

/// Deterministic word-overlap similarity for tests.
///
/// Scores the Jaccard overlap of lowercase word sets: identical texts
/// score 1.0, fully disjoint texts score 0.0.
#[derive(Debug, Clone, Default)]
pub struct MockEmbedder;

impl MockEmbedder {
    pub fn new() -> Self {
        Self
    }

    fn words(text: &str) -> HashSet<String> {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|word| !word.is_empty())
            .map(|word| word.to_lowercase())
            .collect()
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn similarity(&self, a: &str, b: &str) -> Result<f32> {
        let left = Self::words(a);
        let right = Self::words(b);

        if left.is_empty() && right.is_empty() {
            return Ok(1.0);
        }

        let intersection = left.intersection(&right).count() as f32;
        let union = left.union(&right).count() as f32;
        Ok(intersection / union)
    }

    async fn is_available(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "mock-embedder"
    }
}

/// Deterministic summarizer for tests.
///
/// Takes the first sentence of each input and truncates the result to
/// well under the combined input length, so compression always saves
/// tokens.
#[derive(Debug, Clone, Default)]
pub struct MockSummarizer;

impl MockSummarizer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Summarizer for MockSummarizer {
    async fn summarize(&self, texts: &[String]) -> Result<String> {
        let combined_len: usize = texts.iter().map(|t| t.chars().count()).sum();
        let first_sentences: Vec<&str> = texts
            .iter()
            .map(|text| {
                text.split(['.', '!', '?'])
                    .find(|s| !s.trim().is_empty())
                    .unwrap_or(text)
                    .trim()
            })
            .collect();

        let mut summary = first_sentences.join("; ");
        let cap = (combined_len / 3).max(16);
        if summary.chars().count() > cap {
            summary = summary.chars().take(cap).collect();
        }
        Ok(summary)
    }

    async fn is_available(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "mock-summarizer"
    }
}

/// Embedder that is always unavailable, for fallback-path tests.
#[derive(Debug, Clone, Default)]
pub struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    async fn similarity(&self, _a: &str, _b: &str) -> Result<f32> {
        Err(SmritiError::CapabilityUnavailable(
            "embedder offline".to_string(),
        ))
    }

    async fn is_available(&self) -> bool {
        false
    }

    fn name(&self) -> &'static str {
        "failing-embedder"
    }
}

/// Summarizer that is always unavailable, for fallback-path tests.
#[derive(Debug, Clone, Default)]
pub struct FailingSummarizer;

#[async_trait]
impl Summarizer for FailingSummarizer {
    async fn summarize(&self, _texts: &[String]) -> Result<String> {
        Err(SmritiError::CapabilityUnavailable(
            "summarizer offline".to_string(),
        ))
    }

    async fn is_available(&self) -> bool {
        false
    }

    fn name(&self) -> &'static str {
        "failing-summarizer"
    }
}
