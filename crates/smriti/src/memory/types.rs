//! Memory types for the Smriti system
//!
//! Defines the core record structure plus the supporting enums for
//! classification and tier placement.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single memory unit stored in the Smriti system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Unique identifier for this memory
    pub id: Uuid,
    /// Session (owner) this memory belongs to
    pub session_id: String,
    /// The actual content of the memory
    pub content: String,
    /// Free-form metadata attached by the caller
    pub metadata: BTreeMap<String, serde_json::Value>,
    /// Classification of what kind of memory this is
    pub category: Category,
    /// Current importance score in [0, 1]
    pub importance: f32,
    /// Which tier this memory currently lives in
    pub tier: Tier,
    /// When this memory was created
    pub created_at: DateTime<Utc>,
    /// When this memory was last updated
    pub updated_at: DateTime<Utc>,
    /// When this memory was last accessed
    pub last_accessed: DateTime<Utc>,
    /// How many times this memory has been accessed
    pub access_count: u32,
    /// Estimated token count of the content
    pub token_count: usize,
    /// Ids of the records this one was compressed from (empty for originals)
    pub compressed_from: Vec<Uuid>,
}

impl MemoryRecord {
    /// Create a new memory with default placement and a neutral importance.
    pub fn new(session_id: impl Into<String>, content: impl Into<String>, category: Category) -> Self {
        let content = content.into();
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            session_id: session_id.into(),
            token_count: estimate_tokens(&content),
            content,
            metadata: BTreeMap::new(),
            category,
            importance: 0.5,
            tier: Tier::Working,
            created_at: now,
            updated_at: now,
            last_accessed: now,
            access_count: 0,
            compressed_from: Vec::new(),
        }
    }

    /// Mark this memory as accessed, updating access count and timestamp
    pub fn mark_accessed(&mut self, now: DateTime<Utc>) {
        self.access_count = self.access_count.saturating_add(1);
        self.last_accessed = now;
    }

    /// Set the importance of this memory, clamped to [0, 1]
    pub fn set_importance(&mut self, importance: f32) {
        self.importance = importance.clamp(0.0, 1.0);
    }

    /// Replace the content, keeping the token estimate in sync
    pub fn set_content(&mut self, content: String) {
        self.token_count = estimate_tokens(&content);
        self.content = content;
    }
}

/// Classification of a memory, an open string domain with a recognized set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Category {
    /// A user preference ("prefers dark mode")
    Preference,
    /// A conversational exchange
    Conversation,
    /// A durable fact about the user or the world
    Fact,
    /// A goal the user is working toward
    Goal,
    /// Situational context
    Context,
    /// Anything else the caller did not classify
    General,
    /// Caller-defined category outside the recognized set
    Custom(String),
}

impl Category {
    /// Parse a category label. Recognized labels are matched
    /// case-insensitively; anything else becomes `Custom`.
    pub fn parse(label: &str) -> Self {
        match label.to_ascii_lowercase().as_str() {
            "preference" => Category::Preference,
            "conversation" => Category::Conversation,
            "fact" => Category::Fact,
            "goal" => Category::Goal,
            "context" => Category::Context,
            "general" | "" => Category::General,
            _ => Category::Custom(label.to_string()),
        }
    }

    /// The canonical label for this category
    pub fn as_str(&self) -> &str {
        match self {
            Category::Preference => "preference",
            Category::Conversation => "conversation",
            Category::Fact => "fact",
            Category::Goal => "goal",
            Category::Context => "context",
            Category::General => "general",
            Category::Custom(label) => label,
        }
    }
}

impl Default for Category {
    fn default() -> Self {
        Category::General
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for Category {
    fn from(label: String) -> Self {
        Category::parse(&label)
    }
}

impl From<&str> for Category {
    fn from(label: &str) -> Self {
        Category::parse(label)
    }
}

impl From<Category> for String {
    fn from(category: Category) -> Self {
        category.as_str().to_string()
    }
}

/// Memory tier indicating capacity and retention rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tier {
    /// Short-lived scratch space, fixed-capacity FIFO with TTL
    Working,
    /// Mid-term storage, compressed under pressure
    Episodic,
    /// Permanent storage, never automatically removed
    Wisdom,
}

impl Tier {
    /// The canonical label for this tier
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Working => "working",
            Tier::Episodic => "episodic",
            Tier::Wisdom => "wisdom",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rough token estimate used by all token budgets.
///
/// Four characters per token tracks common BPE vocabularies closely
/// enough for budget accounting without pulling in a tokenizer.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4).max(1)
}
