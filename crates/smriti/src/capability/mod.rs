//! Injected capability traits
//!
//! The core never embeds or summarizes anything itself; it consumes a
//! similarity function and a summarization function as injected
//! capabilities. Implementations typically wrap an embedding model or
//! an LLM API, but the core only sees these traits.

use async_trait::async_trait;

use crate::error::Result;

/// Similarity capability over text content.
///
/// Implementations usually embed both texts and return a cosine
/// similarity, but any relevance measure in [0, 1] works.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Score the semantic similarity of two texts in [0, 1]
    async fn similarity(&self, a: &str, b: &str) -> Result<f32>;

    /// Check if the capability can currently serve requests
    async fn is_available(&self) -> bool;

    /// Capability name for logging
    fn name(&self) -> &'static str;
}

/// Summarization capability used by the compression engine.
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Produce a single summary of the given texts
    async fn summarize(&self, texts: &[String]) -> Result<String>;

    /// Check if the capability can currently serve requests
    async fn is_available(&self) -> bool;

    /// Capability name for logging
    fn name(&self) -> &'static str;
}
