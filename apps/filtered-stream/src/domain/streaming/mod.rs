//! Streaming Domain Types
//!
//! Stream kinds, per-connection dedup state, candidate cycling, and the
//! newline-delimited JSON wire events written to subscribers.

use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use rand::Rng;
use rand::seq::SliceRandom;
use serde::Serialize;

use crate::domain::content::{Author, ContentItem};
use crate::domain::rules::{MatchOutcome, Rule};

/// Smallest accepted tick interval in milliseconds.
pub const MIN_DELAY_MS: u64 = 10;

/// Keep-alive line: carries no event.
pub const KEEP_ALIVE: &str = "\n";

// =============================================================================
// Stream Kind
// =============================================================================

/// What a streaming connection delivers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StreamKind {
    /// Unfiltered sample of all content.
    Sample,
    /// Unfiltered firehose of all content.
    Firehose,
    /// Content matching the active rule set, created after the stream opened.
    Search,
    /// Firehose restricted to one language.
    Language(String),
}

impl StreamKind {
    /// Short name used in logs and metric labels.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Sample => "sample",
            Self::Firehose => "firehose",
            Self::Search => "search",
            Self::Language(_) => "language",
        }
    }

    /// Whether delivered events carry `matching_rules`.
    #[must_use]
    pub const fn is_rule_filtered(&self) -> bool {
        matches!(self, Self::Search)
    }

    /// Whether a candidate belongs to this stream before any rule is applied.
    #[must_use]
    pub fn admits(&self, item: &ContentItem) -> bool {
        match self {
            Self::Sample | Self::Firehose | Self::Search => true,
            Self::Language(lang) => item
                .lang
                .as_deref()
                .is_some_and(|l| l.eq_ignore_ascii_case(lang)),
        }
    }
}

impl std::fmt::Display for StreamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Language(lang) => write!(f, "language:{lang}"),
            other => f.write_str(other.name()),
        }
    }
}

// =============================================================================
// Delay
// =============================================================================

/// Resolve a requested tick interval.
///
/// Absent values fall back to `default_ms`; everything is clamped to
/// `[MIN_DELAY_MS, max_ms]`.
#[must_use]
pub fn clamp_delay(requested_ms: Option<u64>, default_ms: u64, max_ms: u64) -> Duration {
    let max_ms = max_ms.max(MIN_DELAY_MS);
    let ms = requested_ms.unwrap_or(default_ms).clamp(MIN_DELAY_MS, max_ms);
    Duration::from_millis(ms)
}

// =============================================================================
// Dedup State
// =============================================================================

/// Bounded FIFO of recently delivered ids.
///
/// An id leaves the window once `capacity` newer ids have been recorded,
/// after which it may be delivered again.
#[derive(Debug, Clone)]
pub struct RecentWindow {
    capacity: usize,
    order: VecDeque<String>,
    members: HashSet<String>,
}

impl RecentWindow {
    /// Create a window holding at most `capacity` ids.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity),
            members: HashSet::with_capacity(capacity),
        }
    }

    /// Check whether an id is in the window.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.members.contains(id)
    }

    /// Record a delivered id, evicting the oldest when full.
    pub fn record(&mut self, id: &str) {
        if self.capacity == 0 || self.members.contains(id) {
            return;
        }
        if self.order.len() == self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.members.remove(&evicted);
            }
        }
        self.order.push_back(id.to_string());
        self.members.insert(id.to_string());
    }

    /// Number of ids currently remembered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Check whether the window is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Per-connection dedup policy.
#[derive(Debug, Clone)]
pub enum DedupState {
    /// Sample and firehose streams: avoid immediate repeats only.
    Recent(RecentWindow),
    /// Search streams: never repeat within a connection.
    EverSent(HashSet<String>),
}

impl DedupState {
    /// The policy a stream kind uses.
    #[must_use]
    pub fn for_kind(kind: &StreamKind, window: usize) -> Self {
        if kind.is_rule_filtered() {
            Self::EverSent(HashSet::new())
        } else {
            Self::Recent(RecentWindow::new(window))
        }
    }

    /// Whether delivering this id now would be a duplicate.
    #[must_use]
    pub fn is_duplicate(&self, id: &str) -> bool {
        match self {
            Self::Recent(window) => window.contains(id),
            Self::EverSent(sent) => sent.contains(id),
        }
    }

    /// Record a delivered id.
    pub fn record(&mut self, id: &str) {
        match self {
            Self::Recent(window) => window.record(id),
            Self::EverSent(sent) => {
                sent.insert(id.to_string());
            }
        }
    }
}

// =============================================================================
// Candidate Cycle
// =============================================================================

/// Shuffled snapshot of candidates walked cyclically.
#[derive(Debug, Clone, Default)]
pub struct CandidateCycle {
    items: Vec<ContentItem>,
    cursor: usize,
}

impl CandidateCycle {
    /// Shuffle a snapshot into a new cycle.
    #[must_use]
    pub fn new<R: Rng + ?Sized>(mut items: Vec<ContentItem>, rng: &mut R) -> Self {
        items.shuffle(rng);
        Self { items, cursor: 0 }
    }

    /// Replace the snapshot, reshuffling and restarting the walk.
    pub fn refresh<R: Rng + ?Sized>(&mut self, items: Vec<ContentItem>, rng: &mut R) {
        *self = Self::new(items, rng);
    }

    /// Number of candidates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check whether there are no candidates.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Advance to the next candidate the dedup state does not reject.
    ///
    /// Visits each candidate at most once per call; returns `None` when every
    /// candidate is currently a duplicate.
    pub fn next_eligible(&mut self, dedup: &DedupState) -> Option<&ContentItem> {
        let len = self.items.len();
        for _ in 0..len {
            let index = self.cursor % len;
            self.cursor = (index + 1) % len;
            if !dedup.is_duplicate(&self.items[index].id) {
                return Some(&self.items[index]);
            }
        }
        None
    }
}

// =============================================================================
// Wire Events
// =============================================================================

/// Rule annotation on a search event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchingRule {
    /// Rule ID.
    pub id: String,
    /// Rule tag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

impl From<&Rule> for MatchingRule {
    fn from(rule: &Rule) -> Self {
        Self {
            id: rule.id.clone(),
            tag: rule.tag.clone(),
        }
    }
}

/// Expanded objects referenced by an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Includes {
    /// Resolved authors.
    pub users: Vec<Author>,
}

/// One delivered event.
///
/// Serialized as a single JSON object per line:
///
/// ```text
/// {"data":{...},"matching_rules":[{"id":"1","tag":"pets"}],"includes":{"users":[...]}}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamEvent {
    /// The content item.
    pub data: ContentItem,
    /// Rules the item matched (search streams only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matching_rules: Option<Vec<MatchingRule>>,
    /// Resolved author, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub includes: Option<Includes>,
}

impl StreamEvent {
    /// Event for an unfiltered stream.
    #[must_use]
    pub fn unfiltered(item: ContentItem, author: Option<Author>) -> Self {
        Self {
            data: item,
            matching_rules: None,
            includes: author.map(|a| Includes { users: vec![a] }),
        }
    }

    /// Event for a rule match.
    #[must_use]
    pub fn matched(outcome: MatchOutcome, author: Option<Author>) -> Self {
        Self {
            matching_rules: Some(outcome.matched_rules.iter().map(MatchingRule::from).collect()),
            data: outcome.item,
            includes: author.map(|a| Includes { users: vec![a] }),
        }
    }

    /// Serialize as one newline-terminated line.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

// =============================================================================
// Outcome
// =============================================================================

/// How a delivery loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// The transport failed or the client went away.
    Disconnected,
    /// The session was cancelled (server shutdown or close-all).
    Cancelled,
}

/// Summary of a finished delivery loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamOutcome {
    /// Terminal state.
    pub end: StreamEnd,
    /// Events written.
    pub delivered: u64,
    /// Keep-alive lines written.
    pub keep_alives: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn items(n: usize) -> Vec<ContentItem> {
        (0..n)
            .map(|i| ContentItem::new(i.to_string(), "u1", format!("post {i}"), Utc::now()))
            .collect()
    }

    #[test]
    fn delay_defaults_and_clamps() {
        assert_eq!(clamp_delay(None, 100, 10_000), Duration::from_millis(100));
        assert_eq!(clamp_delay(Some(1), 100, 10_000), Duration::from_millis(10));
        assert_eq!(clamp_delay(Some(50_000), 100, 10_000), Duration::from_millis(10_000));
        assert_eq!(clamp_delay(Some(250), 100, 10_000), Duration::from_millis(250));
    }

    #[test]
    fn language_kind_admits_matching_lang_only() {
        let kind = StreamKind::Language("en".to_string());
        let en = ContentItem::new("1", "u1", "hi", Utc::now()).with_lang("EN");
        let fr = ContentItem::new("2", "u1", "salut", Utc::now()).with_lang("fr");
        let none = ContentItem::new("3", "u1", "?", Utc::now());

        assert!(kind.admits(&en));
        assert!(!kind.admits(&fr));
        assert!(!kind.admits(&none));
        assert_eq!(kind.to_string(), "language:en");
    }

    #[test]
    fn recent_window_forgets_oldest() {
        let mut window = RecentWindow::new(2);
        window.record("a");
        window.record("b");
        window.record("c");

        assert!(!window.contains("a"));
        assert!(window.contains("b"));
        assert!(window.contains("c"));
        assert_eq!(window.len(), 2);
    }

    #[test]
    fn ever_sent_never_forgets() {
        let mut dedup = DedupState::for_kind(&StreamKind::Search, 2);
        for id in ["a", "b", "c", "d"] {
            dedup.record(id);
        }
        assert!(dedup.is_duplicate("a"));
    }

    #[test]
    fn sample_never_repeats_within_window() {
        let window = 10;
        let mut rng = StdRng::seed_from_u64(7);
        let mut cycle = CandidateCycle::new(items(25), &mut rng);
        let mut dedup = DedupState::for_kind(&StreamKind::Sample, window);

        let mut delivered = Vec::new();
        for _ in 0..200 {
            let id = cycle.next_eligible(&dedup).map(|i| i.id.clone()).unwrap();
            dedup.record(&id);
            delivered.push(id);
        }

        for chunk in delivered.windows(window) {
            let unique: HashSet<_> = chunk.iter().collect();
            assert_eq!(unique.len(), window);
        }
        // Eventual repeats are allowed.
        assert!(delivered[25..].contains(&delivered[0]));
    }

    #[test]
    fn small_snapshot_exhausts_window() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut cycle = CandidateCycle::new(items(3), &mut rng);
        let mut dedup = DedupState::for_kind(&StreamKind::Firehose, 10);

        for _ in 0..3 {
            let id = cycle.next_eligible(&dedup).map(|i| i.id.clone()).unwrap();
            dedup.record(&id);
        }
        assert!(cycle.next_eligible(&dedup).is_none());
    }

    #[test]
    fn empty_cycle_yields_nothing() {
        let mut cycle = CandidateCycle::default();
        assert!(cycle.next_eligible(&DedupState::for_kind(&StreamKind::Sample, 10)).is_none());
    }

    #[test]
    fn search_event_wire_shape() {
        let item = ContentItem::new("10", "u1", "cats", Utc::now());
        let outcome = MatchOutcome {
            item,
            matched_rules: vec![Rule::new("r1", "cats", Some("pets".to_string()))],
        };
        let author = Author::new("u1", "alice", "Alice");

        let line = StreamEvent::matched(outcome, Some(author)).to_line().unwrap();
        assert!(line.ends_with('\n'));

        let json: serde_json::Value = serde_json::from_str(line.trim_end()).unwrap();
        assert_eq!(json["data"]["id"], "10");
        assert_eq!(json["matching_rules"][0]["id"], "r1");
        assert_eq!(json["matching_rules"][0]["tag"], "pets");
        assert_eq!(json["includes"]["users"][0]["username"], "alice");
    }

    #[test]
    fn unfiltered_event_omits_rules_and_unknown_author() {
        let item = ContentItem::new("10", "u1", "cats", Utc::now());
        let line = StreamEvent::unfiltered(item, None).to_line().unwrap();

        let json: serde_json::Value = serde_json::from_str(line.trim_end()).unwrap();
        assert!(json.get("matching_rules").is_none());
        assert!(json.get("includes").is_none());
    }
}
