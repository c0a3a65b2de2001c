//! In-Memory Content Store
//!
//! Holds posts, users and the active rule set behind one `RwLock`.
//! Every read clones the requested slice and releases the lock before
//! returning, so delivery loops never match under the lock.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Deserialize;

use crate::application::ports::{ContentStore, RuleSource};
use crate::domain::content::{Author, ContentItem, ContentLookup, Entities, ReferenceKind};
use crate::domain::rules::Rule;

/// Longest accepted rule expression, in characters.
pub const MAX_RULE_LENGTH: usize = 1024;

/// First ID handed out for generated posts and rules.
const FIRST_GENERATED_ID: u64 = 1_000_000_000_000_000_000;

// =============================================================================
// Inputs and Errors
// =============================================================================

/// A rule to add.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewRule {
    /// Expression text.
    pub value: String,
    /// Optional tag.
    #[serde(default)]
    pub tag: Option<String>,
}

/// Result of a rule update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleChanges {
    /// Rules created.
    pub created: Vec<Rule>,
    /// Rules not created, with the reason.
    pub rejected: Vec<(NewRule, StoreError)>,
    /// IDs deleted.
    pub deleted: Vec<String>,
    /// IDs that did not exist.
    pub not_deleted: Vec<String>,
}

/// A post to ingest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct NewContent {
    /// Post text.
    pub text: String,
    /// Authoring user ID.
    pub author_id: String,
    /// Language code.
    #[serde(default)]
    pub lang: Option<String>,
    /// Posting client name.
    #[serde(default)]
    pub source: Option<String>,
    /// Conversation root ID.
    #[serde(default)]
    pub conversation_id: Option<String>,
    /// Post this replies to.
    #[serde(default)]
    pub in_reply_to_id: Option<String>,
    /// Post this quotes.
    #[serde(default)]
    pub quote_id: Option<String>,
    /// Post this reposts.
    #[serde(default)]
    pub retweet_of_id: Option<String>,
    /// Attached media keys.
    #[serde(default)]
    pub media_keys: Vec<String>,
    /// Sensitive-content flag.
    #[serde(default)]
    pub possibly_sensitive: bool,
}

/// Store error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Rule text is empty or too long.
    #[error("invalid rule: {0}")]
    InvalidRule(String),

    /// An identical rule already exists.
    #[error("duplicate rule: {0}")]
    DuplicateRule(String),

    /// A post with this ID already exists.
    #[error("duplicate content id: {0}")]
    DuplicateContent(String),

    /// Required text is missing.
    #[error("missing field: {0}")]
    MissingField(&'static str),

    /// Referenced post does not exist.
    #[error("unknown content id: {0}")]
    UnknownContent(String),
}

// =============================================================================
// Store
// =============================================================================

#[derive(Debug, Default)]
struct StoreState {
    /// Posts ordered by (created_at, id).
    content: BTreeMap<(DateTime<Utc>, String), ContentItem>,
    /// Post ID to creation time.
    created: HashMap<String, DateTime<Utc>>,
    users: HashMap<String, Author>,
    rules: Vec<Rule>,
}

/// Process-local content store.
///
/// # Example
///
/// ```rust
/// use chrono::Utc;
/// use filtered_stream::application::ports::{ContentStore, RuleSource};
/// use filtered_stream::domain::content::ContentItem;
/// use filtered_stream::infrastructure::store::{InMemoryStore, NewRule};
///
/// let store = InMemoryStore::new();
/// store.insert_content(ContentItem::new("1", "u1", "hello", Utc::now())).unwrap();
///
/// let changes = store.update_rules(
///     vec![NewRule { value: "hello".to_string(), tag: None }],
///     &[],
/// );
/// assert_eq!(changes.created.len(), 1);
/// assert_eq!(store.active_rules().len(), 1);
/// assert_eq!(store.all_content().len(), 1);
/// ```
#[derive(Debug)]
pub struct InMemoryStore {
    state: RwLock<StoreState>,
    next_id: AtomicU64,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: RwLock::new(StoreState::default()),
            next_id: AtomicU64::new(FIRST_GENERATED_ID),
        }
    }

    fn generate_id(&self) -> String {
        self.next_id.fetch_add(1, Ordering::Relaxed).to_string()
    }

    // =========================================================================
    // Content
    // =========================================================================

    /// Insert a fully formed post.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DuplicateContent`] if the ID is taken.
    pub fn insert_content(&self, item: ContentItem) -> Result<(), StoreError> {
        let mut state = self.state.write();
        if state.created.contains_key(&item.id) {
            return Err(StoreError::DuplicateContent(item.id));
        }
        state.created.insert(item.id.clone(), item.created_at);
        state
            .content
            .insert((item.created_at, item.id.clone()), item);
        Ok(())
    }

    /// Create a post from request fields, generating its ID and timestamp.
    ///
    /// Entities are extracted from the text; mentions of known users are
    /// resolved to their IDs.
    ///
    /// # Errors
    ///
    /// Returns an error if text or author is missing, or a referenced post
    /// does not exist.
    pub fn create_content(&self, new: NewContent) -> Result<ContentItem, StoreError> {
        if new.text.trim().is_empty() {
            return Err(StoreError::MissingField("text"));
        }
        if new.author_id.trim().is_empty() {
            return Err(StoreError::MissingField("author_id"));
        }

        let mut item = ContentItem::new(self.generate_id(), new.author_id, new.text, Utc::now());
        item.lang = new.lang;
        item.source = new.source;
        item.possibly_sensitive = new.possibly_sensitive;
        item.attachments.media_keys = new.media_keys;
        item.entities = self.resolve_mentions(Entities::from_text(&item.text));

        if let Some(parent_id) = new.in_reply_to_id {
            let parent = self
                .content(&parent_id)
                .ok_or_else(|| StoreError::UnknownContent(parent_id.clone()))?;
            item.in_reply_to_user_id = Some(parent.author_id);
            item.conversation_id = Some(parent.conversation_id.unwrap_or(parent.id));
            item = item.with_reference(ReferenceKind::RepliedTo, parent_id);
        }
        for (kind, id) in [
            (ReferenceKind::Quoted, new.quote_id),
            (ReferenceKind::Retweeted, new.retweet_of_id),
        ] {
            if let Some(id) = id {
                if self.content(&id).is_none() {
                    return Err(StoreError::UnknownContent(id));
                }
                item = item.with_reference(kind, id);
            }
        }
        if item.conversation_id.is_none() {
            let root = new.conversation_id.unwrap_or_else(|| item.id.clone());
            item.conversation_id = Some(root);
        }

        self.insert_content(item.clone())?;
        tracing::debug!(content_id = %item.id, author_id = %item.author_id, "Content created");
        Ok(item)
    }

    fn resolve_mentions(&self, mut entities: Entities) -> Entities {
        let state = self.state.read();
        for mention in &mut entities.mentions {
            mention.id = state
                .users
                .values()
                .find(|u| u.username.eq_ignore_ascii_case(&mention.username))
                .map(|u| u.id.clone());
        }
        entities
    }

    /// Number of stored posts.
    #[must_use]
    pub fn content_count(&self) -> usize {
        self.state.read().content.len()
    }

    // =========================================================================
    // Users
    // =========================================================================

    /// Insert or replace a user.
    pub fn upsert_user(&self, author: Author) {
        self.state.write().users.insert(author.id.clone(), author);
    }

    /// Find a user by username, ignoring case.
    #[must_use]
    pub fn user_by_username(&self, username: &str) -> Option<Author> {
        self.state
            .read()
            .users
            .values()
            .find(|u| u.username.eq_ignore_ascii_case(username))
            .cloned()
    }

    // =========================================================================
    // Rules
    // =========================================================================

    /// Add and delete rules in one step. Deletions apply first.
    pub fn update_rules(&self, add: Vec<NewRule>, delete_ids: &[String]) -> RuleChanges {
        let mut changes = RuleChanges::default();
        let mut state = self.state.write();

        for id in delete_ids {
            let before = state.rules.len();
            state.rules.retain(|r| &r.id != id);
            if state.rules.len() < before {
                changes.deleted.push(id.clone());
            } else {
                changes.not_deleted.push(id.clone());
            }
        }

        for new in add {
            let value = new.value.trim().to_string();
            let rejection = if value.is_empty() {
                Some(StoreError::InvalidRule("value is empty".to_string()))
            } else if value.chars().count() > MAX_RULE_LENGTH {
                Some(StoreError::InvalidRule(format!(
                    "value exceeds {MAX_RULE_LENGTH} characters"
                )))
            } else if state.rules.iter().any(|r| r.value == value) {
                Some(StoreError::DuplicateRule(value.clone()))
            } else {
                None
            };

            if let Some(error) = rejection {
                changes.rejected.push((new, error));
                continue;
            }

            let rule = Rule::new(self.generate_id(), value, new.tag.clone());
            state.rules.push(rule.clone());
            changes.created.push(rule);
        }

        tracing::info!(
            created = changes.created.len(),
            rejected = changes.rejected.len(),
            deleted = changes.deleted.len(),
            "Rules updated"
        );
        changes
    }
}

impl ContentLookup for InMemoryStore {
    fn user(&self, user_id: &str) -> Option<Author> {
        self.state.read().users.get(user_id).cloned()
    }

    fn content(&self, content_id: &str) -> Option<ContentItem> {
        let state = self.state.read();
        let created_at = *state.created.get(content_id)?;
        state
            .content
            .get(&(created_at, content_id.to_string()))
            .cloned()
    }
}

impl ContentStore for InMemoryStore {
    fn content_created_after(&self, after: DateTime<Utc>) -> Vec<ContentItem> {
        self.state
            .read()
            .content
            .range((after, String::new())..)
            .filter(|((created_at, _), _)| *created_at > after)
            .map(|(_, item)| item.clone())
            .collect()
    }

    fn content_filtered(&self, predicate: &dyn Fn(&ContentItem) -> bool) -> Vec<ContentItem> {
        self.state
            .read()
            .content
            .values()
            .filter(|item| predicate(item))
            .cloned()
            .collect()
    }
}

impl RuleSource for InMemoryStore {
    fn active_rules(&self) -> Vec<Rule> {
        self.state.read().rules.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn new_rule(value: &str) -> NewRule {
        NewRule {
            value: value.to_string(),
            tag: None,
        }
    }

    #[test]
    fn created_after_is_strict_and_ordered() {
        let store = InMemoryStore::new();
        let t0 = Utc::now();
        store
            .insert_content(ContentItem::new("b", "u1", "later", t0 + TimeDelta::seconds(2)))
            .unwrap();
        store.insert_content(ContentItem::new("a", "u1", "at", t0)).unwrap();
        store
            .insert_content(ContentItem::new("c", "u1", "soon", t0 + TimeDelta::seconds(1)))
            .unwrap();

        let ids: Vec<_> = store
            .content_created_after(t0)
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec!["c", "b"]);
    }

    #[test]
    fn duplicate_content_is_rejected() {
        let store = InMemoryStore::new();
        let item = ContentItem::new("1", "u1", "x", Utc::now());
        store.insert_content(item.clone()).unwrap();

        assert_eq!(
            store.insert_content(item),
            Err(StoreError::DuplicateContent("1".to_string()))
        );
        assert_eq!(store.content_count(), 1);
    }

    #[test]
    fn lookup_by_id() {
        let store = InMemoryStore::new();
        store.upsert_user(Author::new("u1", "Alice", "Alice A"));
        store
            .insert_content(ContentItem::new("1", "u1", "x", Utc::now()))
            .unwrap();

        assert_eq!(store.content("1").map(|c| c.text), Some("x".to_string()));
        assert!(store.content("2").is_none());
        assert_eq!(store.user_by_username("alice").map(|u| u.id), Some("u1".to_string()));
    }

    #[test]
    fn create_content_extracts_and_resolves() {
        let store = InMemoryStore::new();
        store.upsert_user(Author::new("u2", "bob", "Bob"));
        let root = store
            .create_content(NewContent {
                text: "hi @bob #rust".to_string(),
                author_id: "u1".to_string(),
                ..NewContent::default()
            })
            .unwrap();

        assert_eq!(root.entities.hashtags, vec!["rust"]);
        assert_eq!(root.entities.mentions[0].id.as_deref(), Some("u2"));
        assert_eq!(root.conversation_id.as_deref(), Some(root.id.as_str()));

        let reply = store
            .create_content(NewContent {
                text: "hello back".to_string(),
                author_id: "u2".to_string(),
                in_reply_to_id: Some(root.id.clone()),
                ..NewContent::default()
            })
            .unwrap();

        assert_eq!(reply.in_reply_to_user_id.as_deref(), Some("u1"));
        assert_eq!(reply.conversation_id, root.conversation_id);
        assert_eq!(reply.reference(ReferenceKind::RepliedTo), Some(root.id.as_str()));
    }

    #[test]
    fn create_content_validates() {
        let store = InMemoryStore::new();
        assert_eq!(
            store.create_content(NewContent {
                author_id: "u1".to_string(),
                ..NewContent::default()
            }),
            Err(StoreError::MissingField("text"))
        );
        assert_eq!(
            store.create_content(NewContent {
                text: "rt".to_string(),
                author_id: "u1".to_string(),
                retweet_of_id: Some("missing".to_string()),
                ..NewContent::default()
            }),
            Err(StoreError::UnknownContent("missing".to_string()))
        );
    }

    #[test]
    fn update_rules_adds_rejects_and_deletes() {
        let store = InMemoryStore::new();
        let first = store.update_rules(vec![new_rule("cats"), new_rule("dogs")], &[]);
        assert_eq!(first.created.len(), 2);

        let cats_id = first.created[0].id.clone();
        let second = store.update_rules(
            vec![new_rule("dogs"), new_rule("   "), new_rule("birds")],
            &[cats_id.clone(), "nope".to_string()],
        );

        assert_eq!(second.deleted, vec![cats_id]);
        assert_eq!(second.not_deleted, vec!["nope".to_string()]);
        assert_eq!(second.created.len(), 1);
        assert_eq!(second.rejected.len(), 2);
        assert!(matches!(second.rejected[0].1, StoreError::DuplicateRule(_)));

        let values: Vec<_> = store.active_rules().into_iter().map(|r| r.value).collect();
        assert_eq!(values, vec!["dogs", "birds"]);
    }

    #[test]
    fn rule_ids_are_unique() {
        let store = InMemoryStore::new();
        let changes = store.update_rules(vec![new_rule("a"), new_rule("b")], &[]);
        assert_ne!(changes.created[0].id, changes.created[1].id);
    }
}
