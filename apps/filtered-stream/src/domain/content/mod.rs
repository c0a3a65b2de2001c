//! Content Types
//!
//! Posts and author records as the streaming core sees them. These are
//! owned by the content store; the core only reads them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Content Item
// =============================================================================

/// A post that rules are matched against and streams deliver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentItem {
    /// Post ID.
    pub id: String,
    /// Raw post text.
    pub text: String,
    /// ID of the authoring user.
    pub author_id: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// BCP-47 language code detected for the text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
    /// ID of the conversation root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    /// Name of the posting client.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// User ID this post replies to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_reply_to_user_id: Option<String>,
    /// Structured entities extracted from the text.
    #[serde(default, skip_serializing_if = "Entities::is_empty")]
    pub entities: Entities,
    /// Links to other posts.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub referenced: Vec<ReferencedContent>,
    /// Attached media.
    #[serde(default, skip_serializing_if = "Attachments::is_empty")]
    pub attachments: Attachments,
    /// Whether the post was flagged as sensitive.
    #[serde(default)]
    pub possibly_sensitive: bool,
}

impl ContentItem {
    /// Create a post with only the required fields set.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        author_id: impl Into<String>,
        text: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            author_id: author_id.into(),
            created_at,
            lang: None,
            conversation_id: None,
            source: None,
            in_reply_to_user_id: None,
            entities: Entities::default(),
            referenced: Vec::new(),
            attachments: Attachments::default(),
            possibly_sensitive: false,
        }
    }

    /// Set the language.
    #[must_use]
    pub fn with_lang(mut self, lang: impl Into<String>) -> Self {
        self.lang = Some(lang.into());
        self
    }

    /// Set the entities.
    #[must_use]
    pub fn with_entities(mut self, entities: Entities) -> Self {
        self.entities = entities;
        self
    }

    /// Add a reference to another post.
    #[must_use]
    pub fn with_reference(mut self, kind: ReferenceKind, id: impl Into<String>) -> Self {
        self.referenced.push(ReferencedContent {
            kind,
            id: id.into(),
        });
        self
    }

    /// ID of the referenced post of the given kind, if any.
    #[must_use]
    pub fn reference(&self, kind: ReferenceKind) -> Option<&str> {
        self.referenced
            .iter()
            .find(|r| r.kind == kind)
            .map(|r| r.id.as_str())
    }
}

// =============================================================================
// Entities
// =============================================================================

/// Structured entities of a post.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entities {
    /// Hashtags without the leading `#`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hashtags: Vec<String>,
    /// Mentioned users.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mentions: Vec<Mention>,
    /// Links.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub urls: Vec<UrlEntity>,
    /// Cashtags without the leading `$`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cashtags: Vec<String>,
}

impl Entities {
    /// Check if no entities are present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hashtags.is_empty()
            && self.mentions.is_empty()
            && self.urls.is_empty()
            && self.cashtags.is_empty()
    }

    /// Extract entities from raw text.
    ///
    /// Words are split on whitespace and stripped of trailing punctuation.
    /// Mentions are left unresolved.
    #[must_use]
    pub fn from_text(text: &str) -> Self {
        let mut entities = Self::default();

        for word in text.split_whitespace() {
            if word.starts_with("http://") || word.starts_with("https://") {
                let url = word.trim_end_matches(|c: char| ".,!?;:)]}\"'".contains(c));
                entities.urls.push(UrlEntity {
                    url: url.to_string(),
                    expanded_url: None,
                });
                continue;
            }

            let mut chars = word.chars();
            let Some(sigil) = chars.next() else {
                continue;
            };
            let body: String = chars
                .take_while(|c| c.is_alphanumeric() || *c == '_')
                .collect();
            if body.is_empty() {
                continue;
            }

            match sigil {
                '#' => entities.hashtags.push(body),
                '@' => entities.mentions.push(Mention {
                    username: body,
                    id: None,
                }),
                '$' if body.chars().all(char::is_alphabetic) => entities.cashtags.push(body),
                _ => {}
            }
        }

        entities
    }
}

/// A mentioned user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mention {
    /// Username without the leading `@`.
    pub username: String,
    /// Resolved user ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// A link in the post text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlEntity {
    /// URL as it appears in the text (possibly shortened).
    pub url: String,
    /// Fully expanded URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expanded_url: Option<String>,
}

// =============================================================================
// References and Attachments
// =============================================================================

/// How one post refers to another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    /// Reply.
    RepliedTo,
    /// Quote post.
    Quoted,
    /// Repost.
    Retweeted,
}

/// A reference to another post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferencedContent {
    /// Reference type.
    #[serde(rename = "type")]
    pub kind: ReferenceKind,
    /// Referenced post ID.
    pub id: String,
}

/// Media attached to a post.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachments {
    /// Media keys, prefixed by media type (`3_` photo, `7_`/`13_` video).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub media_keys: Vec<String>,
}

impl Attachments {
    /// Check if nothing is attached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.media_keys.is_empty()
    }

    /// Check for attached photos.
    #[must_use]
    pub fn has_images(&self) -> bool {
        self.media_keys.iter().any(|k| k.starts_with("3_"))
    }

    /// Check for attached videos or animated GIFs.
    #[must_use]
    pub fn has_videos(&self) -> bool {
        self.media_keys
            .iter()
            .any(|k| k.starts_with("7_") || k.starts_with("13_") || k.starts_with("16_"))
    }
}

// =============================================================================
// Author
// =============================================================================

/// A user record resolved for a post's author.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    /// User ID.
    pub id: String,
    /// Handle without the leading `@`.
    pub username: String,
    /// Display name.
    pub name: String,
    /// Profile bio.
    #[serde(default)]
    pub description: String,
    /// Free-form profile location.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Verified badge.
    #[serde(default)]
    pub verified: bool,
    /// Follower count.
    #[serde(default)]
    pub followers_count: u64,
    /// Following count.
    #[serde(default)]
    pub following_count: u64,
    /// Number of posts.
    #[serde(default)]
    pub tweet_count: u64,
    /// Number of lists the user is on.
    #[serde(default)]
    pub listed_count: u64,
}

impl Author {
    /// Create an author with zeroed counters.
    #[must_use]
    pub fn new(id: impl Into<String>, username: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            name: name.into(),
            description: String::new(),
            location: None,
            verified: false,
            followers_count: 0,
            following_count: 0,
            tweet_count: 0,
            listed_count: 0,
        }
    }
}

// =============================================================================
// Lookup Capability
// =============================================================================

/// Resolves related records while evaluating rules.
///
/// Implementations must not hold locks across calls; the evaluator may call
/// these many times for a single item.
pub trait ContentLookup: Send + Sync {
    /// Resolve a user by ID.
    fn user(&self, user_id: &str) -> Option<Author>;

    /// Resolve a post by ID.
    fn content(&self, content_id: &str) -> Option<ContentItem>;

    /// Resolve the author of a post.
    fn author(&self, item: &ContentItem) -> Option<Author> {
        self.user(&item.author_id)
    }
}

/// Lookup that resolves nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLookup;

impl ContentLookup for NoLookup {
    fn user(&self, _user_id: &str) -> Option<Author> {
        None
    }

    fn content(&self, _content_id: &str) -> Option<ContentItem> {
        None
    }
}
