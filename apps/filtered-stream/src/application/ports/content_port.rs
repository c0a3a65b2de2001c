//! Content Store Port (Driven Port)
//!
//! Read access to the external content store. Implementations copy the
//! requested slice out from under their lock and return owned values, so
//! callers never hold a store lock while matching.

use chrono::{DateTime, Utc};

use crate::domain::content::{ContentItem, ContentLookup};
use crate::domain::rules::Rule;

/// Source of the active subscription rules.
pub trait RuleSource: Send + Sync {
    /// The rules currently in effect, in creation order.
    fn active_rules(&self) -> Vec<Rule>;
}

/// Snapshot queries over stored content.
pub trait ContentStore: ContentLookup {
    /// Content created strictly after `after`, oldest first.
    fn content_created_after(&self, after: DateTime<Utc>) -> Vec<ContentItem>;

    /// Content satisfying a predicate, oldest first.
    fn content_filtered(&self, predicate: &dyn Fn(&ContentItem) -> bool) -> Vec<ContentItem>;

    /// All stored content.
    fn all_content(&self) -> Vec<ContentItem> {
        self.content_filtered(&|_| true)
    }
}

/// Everything the delivery loop reads.
pub trait StreamStore: ContentStore + RuleSource {}

impl<T: ContentStore + RuleSource> StreamStore for T {}
