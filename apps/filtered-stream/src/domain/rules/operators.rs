//! Field Operators
//!
//! Colon-prefixed rule operators (`from:`, `lang:`, `followers_count:` ...).
//!
//! Operators whose data the content model does not carry (geo, place,
//! URL metadata, context annotations) parse to [`FieldOp::Unsupported`] and
//! always evaluate to `false`. Operators with a value that cannot be
//! interpreted parse to [`FieldOp::Malformed`], also `false`.

use crate::domain::content::ReferenceKind;

use super::evaluator::Subject;
use super::tokenizer::tokenize;

// =============================================================================
// Operator Types
// =============================================================================

/// A parsed field operator with its value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldOp {
    /// `has:` entity presence.
    Has(HasKind),
    /// `lang:` language code.
    Lang(String),
    /// `from:` author username or ID.
    From(String),
    /// `to:` replied-to user username or ID.
    To(String),
    /// `url:` / `url_contains:` substring of any link.
    Url(String),
    /// `retweets_of:` author of the reposted post.
    RetweetsOf(String),
    /// `conversation_id:`.
    ConversationId(String),
    /// `bio:` keyword or phrase in the author bio.
    Bio(TextQuery),
    /// `bio_name:` substring of the author display name.
    BioName(String),
    /// `bio_location:` substring of the author location.
    BioLocation(String),
    /// `is:` post or author property.
    Is(IsKind),
    /// `sample:` percentage of posts, keyed on post ID.
    Sample(u8),
    /// Author counter range (`followers_count:` ...).
    Count {
        /// Counter to compare.
        metric: CountMetric,
        /// Accepted range.
        range: CountRange,
    },
    /// `source:` posting client.
    Source(String),
    /// `in_reply_to_tweet_id:`.
    InReplyToTweetId(String),
    /// `retweets_of_tweet_id:`.
    RetweetsOfTweetId(String),
    /// Operator over data the content model does not carry.
    Unsupported(&'static str),
    /// Known operator with a value that could not be interpreted.
    Malformed(String),
}

/// Entity kinds for `has:`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HasKind {
    /// Any hashtag entity.
    Hashtags,
    /// Any mention entity.
    Mentions,
    /// Any URL entity.
    Links,
    /// Any attached media.
    Media,
    /// Attached photos.
    Images,
    /// Attached videos or GIFs.
    Videos,
    /// Any cashtag entity.
    Cashtags,
}

/// Properties for `is:`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsKind {
    /// Post is a repost.
    Retweet,
    /// Post is a reply.
    Reply,
    /// Post is a quote.
    Quote,
    /// Author is verified.
    Verified,
    /// Promoted-only post. Never true here.
    Nullcast,
}

/// Author counters usable in range operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountMetric {
    /// `followers_count:`.
    Followers,
    /// `tweets_count:` / `statuses_count:`.
    Tweets,
    /// `following_count:` / `friends_count:`.
    Following,
    /// `listed_count:` / `user_in_lists_count:`.
    Listed,
}

/// Keyword or phrase query against free text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextQuery {
    /// Must equal one token of the text.
    Keyword(String),
    /// Case-insensitive substring of the text.
    Phrase(String),
}

// =============================================================================
// Numeric Ranges
// =============================================================================

/// Inclusive numeric range: `M` means `>= M`, `MIN..MAX` is inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountRange {
    /// Lower bound.
    pub min: u64,
    /// Upper bound, if any.
    pub max: Option<u64>,
}

impl CountRange {
    /// Parse `M` or `MIN..MAX`. Returns `None` for anything else.
    ///
    /// ```rust
    /// use filtered_stream::domain::rules::CountRange;
    ///
    /// assert!(CountRange::parse("1000").unwrap().contains(1000));
    /// assert!(!CountRange::parse("10..20").unwrap().contains(21));
    /// assert!(CountRange::parse("20..10").is_none());
    /// ```
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.split_once("..") {
            Some((min, max)) => {
                let min = min.trim().parse().ok()?;
                let max = max.trim().parse().ok()?;
                (min <= max).then_some(Self {
                    min,
                    max: Some(max),
                })
            }
            None => Some(Self {
                min: value.trim().parse().ok()?,
                max: None,
            }),
        }
    }

    /// Check whether `value` falls in the range.
    #[must_use]
    pub fn contains(&self, value: u64) -> bool {
        value >= self.min && self.max.is_none_or(|max| value <= max)
    }
}

// =============================================================================
// Parsing
// =============================================================================

/// Operator prefixes, lowercase, each with the constructor for its value.
const OPERATORS: &[(&str, fn(&str) -> FieldOp)] = &[
    ("has:", parse_has),
    ("lang:", |v| FieldOp::Lang(v.to_lowercase())),
    ("from:", |v| FieldOp::From(strip_at(v))),
    ("to:", |v| FieldOp::To(strip_at(v))),
    ("url:", |v| FieldOp::Url(v.to_lowercase())),
    ("retweets_of:", |v| FieldOp::RetweetsOf(strip_at(v))),
    ("retweets_of_user:", |v| FieldOp::RetweetsOf(strip_at(v))),
    ("context:", |_| FieldOp::Unsupported("context")),
    ("entity:", |_| FieldOp::Unsupported("entity")),
    ("conversation_id:", |v| FieldOp::ConversationId(v.to_string())),
    ("bio:", parse_bio),
    ("user_bio:", parse_bio),
    ("bio_name:", |v| FieldOp::BioName(v.to_lowercase())),
    ("bio_location:", |v| FieldOp::BioLocation(v.to_lowercase())),
    ("user_bio_location:", |v| FieldOp::BioLocation(v.to_lowercase())),
    ("place:", |_| FieldOp::Unsupported("place")),
    ("place_country:", |_| FieldOp::Unsupported("place_country")),
    ("point_radius:", |_| FieldOp::Unsupported("point_radius")),
    ("bounding_box:", |_| FieldOp::Unsupported("bounding_box")),
    ("geo_bounding_box:", |_| FieldOp::Unsupported("bounding_box")),
    ("is:", parse_is),
    ("sample:", parse_sample),
    ("followers_count:", |v| parse_count(CountMetric::Followers, v)),
    ("tweets_count:", |v| parse_count(CountMetric::Tweets, v)),
    ("statuses_count:", |v| parse_count(CountMetric::Tweets, v)),
    ("following_count:", |v| parse_count(CountMetric::Following, v)),
    ("friends_count:", |v| parse_count(CountMetric::Following, v)),
    ("listed_count:", |v| parse_count(CountMetric::Listed, v)),
    ("user_in_lists_count:", |v| parse_count(CountMetric::Listed, v)),
    ("url_title:", |_| FieldOp::Unsupported("url_title")),
    ("within_url_title:", |_| FieldOp::Unsupported("url_title")),
    ("url_description:", |_| FieldOp::Unsupported("url_description")),
    ("within_url_description:", |_| FieldOp::Unsupported("url_description")),
    ("url_contains:", |v| FieldOp::Url(v.to_lowercase())),
    ("source:", |v| FieldOp::Source(v.to_lowercase())),
    ("in_reply_to_tweet_id:", |v| FieldOp::InReplyToTweetId(v.to_string())),
    ("in_reply_to_status_id:", |v| FieldOp::InReplyToTweetId(v.to_string())),
    ("retweets_of_tweet_id:", |v| FieldOp::RetweetsOfTweetId(v.to_string())),
    ("retweets_of_status_id:", |v| FieldOp::RetweetsOfTweetId(v.to_string())),
];

/// Parse a colon-prefixed condition.
///
/// Returns `None` when the prefix is not a known operator, so the caller
/// can fall through to keyword handling.
#[must_use]
pub fn parse_field(condition: &str) -> Option<FieldOp> {
    let colon = condition.find(':')?;
    let prefix = condition[..=colon].to_ascii_lowercase();
    let (_, build) = OPERATORS.iter().find(|(name, _)| *name == prefix)?;

    let value = strip_quotes(condition[colon + 1..].trim());
    if value.is_empty() {
        return Some(FieldOp::Malformed(condition.to_string()));
    }

    Some(build(value))
}

fn strip_quotes(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

fn strip_at(value: &str) -> String {
    value.trim_start_matches('@').to_lowercase()
}

fn parse_has(value: &str) -> FieldOp {
    match value.to_ascii_lowercase().as_str() {
        "hashtags" => FieldOp::Has(HasKind::Hashtags),
        "mentions" => FieldOp::Has(HasKind::Mentions),
        "links" => FieldOp::Has(HasKind::Links),
        "media" => FieldOp::Has(HasKind::Media),
        "images" => FieldOp::Has(HasKind::Images),
        "videos" | "video_link" => FieldOp::Has(HasKind::Videos),
        "cashtags" => FieldOp::Has(HasKind::Cashtags),
        "geo" => FieldOp::Unsupported("has:geo"),
        other => FieldOp::Malformed(format!("has:{other}")),
    }
}

fn parse_is(value: &str) -> FieldOp {
    match value.to_ascii_lowercase().as_str() {
        "retweet" => FieldOp::Is(IsKind::Retweet),
        "reply" => FieldOp::Is(IsKind::Reply),
        "quote" => FieldOp::Is(IsKind::Quote),
        "verified" => FieldOp::Is(IsKind::Verified),
        "nullcast" => FieldOp::Is(IsKind::Nullcast),
        other => FieldOp::Malformed(format!("is:{other}")),
    }
}

fn parse_bio(value: &str) -> FieldOp {
    let value = value.to_lowercase();
    if value.contains(char::is_whitespace) {
        FieldOp::Bio(TextQuery::Phrase(value))
    } else {
        FieldOp::Bio(TextQuery::Keyword(value))
    }
}

fn parse_sample(value: &str) -> FieldOp {
    match value.parse::<u8>() {
        Ok(percent @ 1..=100) => FieldOp::Sample(percent),
        _ => FieldOp::Malformed(format!("sample:{value}")),
    }
}

fn parse_count(metric: CountMetric, value: &str) -> FieldOp {
    CountRange::parse(value).map_or_else(
        || FieldOp::Malformed(value.to_string()),
        |range| FieldOp::Count { metric, range },
    )
}

// =============================================================================
// Evaluation
// =============================================================================

impl FieldOp {
    /// Evaluate the operator against a subject.
    pub(crate) fn evaluate(&self, subject: &Subject<'_>) -> bool {
        let item = subject.item();
        match self {
            Self::Has(kind) => match kind {
                HasKind::Hashtags => !item.entities.hashtags.is_empty(),
                HasKind::Mentions => !item.entities.mentions.is_empty(),
                HasKind::Links => !item.entities.urls.is_empty(),
                HasKind::Media => !item.attachments.is_empty(),
                HasKind::Images => item.attachments.has_images(),
                HasKind::Videos => item.attachments.has_videos(),
                HasKind::Cashtags => !item.entities.cashtags.is_empty(),
            },
            Self::Lang(lang) => item
                .lang
                .as_deref()
                .is_some_and(|l| l.eq_ignore_ascii_case(lang)),
            Self::From(user) => {
                item.author_id.eq_ignore_ascii_case(user)
                    || subject
                        .author()
                        .is_some_and(|a| a.username.eq_ignore_ascii_case(user))
            }
            Self::To(user) => item.in_reply_to_user_id.as_deref().is_some_and(|id| {
                id.eq_ignore_ascii_case(user)
                    || subject
                        .lookup()
                        .user(id)
                        .is_some_and(|u| u.username.eq_ignore_ascii_case(user))
            }),
            Self::Url(fragment) => item.entities.urls.iter().any(|u| {
                u.url.to_lowercase().contains(fragment.as_str())
                    || u
                        .expanded_url
                        .as_deref()
                        .is_some_and(|e| e.to_lowercase().contains(fragment.as_str()))
            }),
            Self::RetweetsOf(user) => item
                .reference(ReferenceKind::Retweeted)
                .and_then(|id| subject.lookup().content(id))
                .is_some_and(|original| {
                    original.author_id.eq_ignore_ascii_case(user)
                        || subject
                            .lookup()
                            .author(&original)
                            .is_some_and(|a| a.username.eq_ignore_ascii_case(user))
                }),
            Self::ConversationId(id) => item.conversation_id.as_deref() == Some(id.as_str()),
            Self::Bio(query) => subject.author().is_some_and(|a| match query {
                TextQuery::Keyword(word) => tokenize(&a.description).contains(word),
                TextQuery::Phrase(phrase) => a.description.to_lowercase().contains(phrase.as_str()),
            }),
            Self::BioName(fragment) => subject
                .author()
                .is_some_and(|a| a.name.to_lowercase().contains(fragment.as_str())),
            Self::BioLocation(fragment) => subject.author().is_some_and(|a| {
                a.location
                    .as_deref()
                    .is_some_and(|l| l.to_lowercase().contains(fragment.as_str()))
            }),
            Self::Is(kind) => match kind {
                IsKind::Retweet => item.reference(ReferenceKind::Retweeted).is_some(),
                IsKind::Reply => {
                    item.reference(ReferenceKind::RepliedTo).is_some()
                        || item.in_reply_to_user_id.is_some()
                }
                IsKind::Quote => item.reference(ReferenceKind::Quoted).is_some(),
                IsKind::Verified => subject.author().is_some_and(|a| a.verified),
                IsKind::Nullcast => false,
            },
            Self::Sample(percent) => sample_bucket(&item.id) < u64::from(*percent),
            Self::Count { metric, range } => subject.author().is_some_and(|a| {
                range.contains(match metric {
                    CountMetric::Followers => a.followers_count,
                    CountMetric::Tweets => a.tweet_count,
                    CountMetric::Following => a.following_count,
                    CountMetric::Listed => a.listed_count,
                })
            }),
            Self::Source(source) => item
                .source
                .as_deref()
                .is_some_and(|s| s.eq_ignore_ascii_case(source)),
            Self::InReplyToTweetId(id) => {
                item.reference(ReferenceKind::RepliedTo) == Some(id.as_str())
            }
            Self::RetweetsOfTweetId(id) => {
                item.reference(ReferenceKind::Retweeted) == Some(id.as_str())
            }
            Self::Unsupported(_) | Self::Malformed(_) => false,
        }
    }
}

/// Stable 0..100 bucket for a post ID.
fn sample_bucket(id: &str) -> u64 {
    let hash = blake3::hash(id.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&hash.as_bytes()[..8]);
    u64::from_le_bytes(prefix) % 100
}
