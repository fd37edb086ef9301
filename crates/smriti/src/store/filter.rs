//! Filter types for memory queries
//!
//! Query criteria applied when gathering candidates across tiers,
//! allowing callers to narrow by category, importance, and time range.

use chrono::{DateTime, Utc};

use crate::memory::types::{Category, MemoryRecord};

/// Filter criteria for memory queries.
///
/// All fields are optional - when `None`, that filter is not applied.
/// Multiple filters are combined with AND logic.
#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    /// Filter by specific categories (OR logic within this filter)
    pub categories: Option<Vec<Category>>,
    /// Minimum stored importance threshold (inclusive)
    pub min_importance: Option<f32>,
    /// Only return memories created after this time
    pub after: Option<DateTime<Utc>>,
    /// Only return memories created before this time
    pub before: Option<DateTime<Utc>>,
}

impl SearchFilter {
    /// Create a new empty filter (no filtering applied)
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter by categories
    pub fn with_categories(mut self, categories: Vec<Category>) -> Self {
        self.categories = Some(categories);
        self
    }

    /// Filter by a single category
    pub fn with_category(self, category: Category) -> Self {
        self.with_categories(vec![category])
    }

    /// Filter by minimum stored importance
    pub fn with_min_importance(mut self, min_importance: f32) -> Self {
        self.min_importance = Some(min_importance);
        self
    }

    /// Only match memories created after this time
    pub fn after(mut self, after: DateTime<Utc>) -> Self {
        self.after = Some(after);
        self
    }

    /// Only match memories created before this time
    pub fn before(mut self, before: DateTime<Utc>) -> Self {
        self.before = Some(before);
        self
    }

    /// Check whether a record passes every configured criterion
    pub fn matches(&self, record: &MemoryRecord) -> bool {
        if let Some(ref categories) = self.categories
            && !categories.is_empty()
            && !categories.contains(&record.category)
        {
            return false;
        }

        if let Some(min_importance) = self.min_importance
            && record.importance < min_importance
        {
            return false;
        }

        if let Some(after) = self.after
            && record.created_at <= after
        {
            return false;
        }

        if let Some(before) = self.before
            && record.created_at >= before
        {
            return false;
        }

        true
    }
}
