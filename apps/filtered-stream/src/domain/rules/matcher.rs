//! Rule Matcher
//!
//! Holds the active rule set, compiled, and answers which rules a content
//! item matches.

use crate::domain::content::{ContentItem, ContentLookup};

use super::evaluator::{Subject, evaluate_subject};
use super::{CompiledRule, Rule};

/// A delivered item together with the rules it matched. `matched_rules` is
/// never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchOutcome {
    /// The matching item.
    pub item: ContentItem,
    /// Matched rules, in rule-set order.
    pub matched_rules: Vec<Rule>,
}

/// Matches content against a compiled rule set.
///
/// # Example
///
/// ```rust
/// use chrono::Utc;
/// use filtered_stream::domain::content::{ContentItem, NoLookup};
/// use filtered_stream::domain::rules::{Rule, RuleMatcher};
///
/// let matcher = RuleMatcher::new(vec![Rule::new("1", "rust OR go", None)]);
/// let post = ContentItem::new("10", "u1", "Writing rust today", Utc::now());
///
/// assert!(matcher.matches_any(&post, &NoLookup));
/// assert!(!RuleMatcher::default().matches_any(&post, &NoLookup));
/// ```
#[derive(Debug, Clone, Default)]
pub struct RuleMatcher {
    rules: Vec<CompiledRule>,
}

impl RuleMatcher {
    /// Compile a rule set.
    #[must_use]
    pub fn new(rules: impl IntoIterator<Item = Rule>) -> Self {
        Self {
            rules: rules.into_iter().map(CompiledRule::compile).collect(),
        }
    }

    /// Number of active rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Check whether there are no active rules.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// True iff at least one rule matches. An empty rule set never matches.
    #[must_use]
    pub fn matches_any(&self, item: &ContentItem, lookup: &dyn ContentLookup) -> bool {
        if self.rules.is_empty() {
            return false;
        }
        let subject = Subject::new(item, lookup);
        self.rules.iter().any(|r| evaluate_subject(&r.expr, &subject))
    }

    /// Every rule that matches, in rule-set order.
    #[must_use]
    pub fn matching_rules(&self, item: &ContentItem, lookup: &dyn ContentLookup) -> Vec<Rule> {
        let subject = Subject::new(item, lookup);
        self.rules
            .iter()
            .filter(|r| evaluate_subject(&r.expr, &subject))
            .map(|r| r.rule.clone())
            .collect()
    }

    /// The match outcome for an item, or `None` if no rule matches.
    #[must_use]
    pub fn match_outcome(&self, item: &ContentItem, lookup: &dyn ContentLookup) -> Option<MatchOutcome> {
        let matched_rules = self.matching_rules(item, lookup);
        (!matched_rules.is_empty()).then(|| MatchOutcome {
            item: item.clone(),
            matched_rules,
        })
    }
}

/// Check an item against uncompiled rules.
#[must_use]
pub fn matches_any(item: &ContentItem, rules: &[Rule], lookup: &dyn ContentLookup) -> bool {
    RuleMatcher::new(rules.iter().cloned()).matches_any(item, lookup)
}
