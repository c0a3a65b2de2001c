//! Rule Evaluator
//!
//! Walks a compiled [`Expr`] against one content item. Tokenization,
//! lowercasing and author resolution happen at most once per item no matter
//! how many clauses need them.

use std::cell::OnceCell;

use crate::domain::content::{Author, ContentItem, ContentLookup};

use super::parser::{Expr, parse};
use super::tokenizer::tokenize;

// =============================================================================
// Subject
// =============================================================================

/// A content item under evaluation, with lazily derived views of it.
pub struct Subject<'a> {
    item: &'a ContentItem,
    lookup: &'a dyn ContentLookup,
    tokens: OnceCell<Vec<String>>,
    lowercase_text: OnceCell<String>,
    author: OnceCell<Option<Author>>,
}

impl<'a> Subject<'a> {
    /// Wrap an item for evaluation.
    #[must_use]
    pub fn new(item: &'a ContentItem, lookup: &'a dyn ContentLookup) -> Self {
        Self {
            item,
            lookup,
            tokens: OnceCell::new(),
            lowercase_text: OnceCell::new(),
            author: OnceCell::new(),
        }
    }

    /// The item itself.
    #[must_use]
    pub const fn item(&self) -> &'a ContentItem {
        self.item
    }

    /// The lookup used for related records.
    #[must_use]
    pub fn lookup(&self) -> &'a dyn ContentLookup {
        self.lookup
    }

    /// Tokens of the item text.
    pub fn tokens(&self) -> &[String] {
        self.tokens.get_or_init(|| tokenize(&self.item.text))
    }

    /// Lowercased item text.
    pub fn lowercase_text(&self) -> &str {
        self.lowercase_text
            .get_or_init(|| self.item.text.to_lowercase())
    }

    /// Resolved author, if the lookup knows it.
    pub fn author(&self) -> Option<&Author> {
        self.author
            .get_or_init(|| self.lookup.author(self.item))
            .as_ref()
    }

    fn has_token(&self, word: &str) -> bool {
        self.tokens().iter().any(|t| t == word)
    }

    fn positions(&self, word: &str) -> Vec<usize> {
        self.tokens()
            .iter()
            .enumerate()
            .filter_map(|(i, t)| (t == word).then_some(i))
            .collect()
    }
}

// =============================================================================
// Evaluation
// =============================================================================

/// Evaluate a compiled expression against an item.
#[must_use]
pub fn evaluate(expr: &Expr, item: &ContentItem, lookup: &dyn ContentLookup) -> bool {
    evaluate_subject(expr, &Subject::new(item, lookup))
}

/// Parse and evaluate rule text against an item.
///
/// Prefer compiling once with [`parse`] when the same rule is checked
/// against many items.
#[must_use]
pub fn evaluate_expression(item: &ContentItem, expression: &str, lookup: &dyn ContentLookup) -> bool {
    evaluate(&parse(expression), item, lookup)
}

/// Evaluate a compiled expression against a prepared subject.
#[must_use]
pub fn evaluate_subject(expr: &Expr, subject: &Subject<'_>) -> bool {
    match expr {
        Expr::Or(branches) => branches.iter().any(|b| evaluate_subject(b, subject)),
        Expr::And(branches) => branches.iter().all(|b| evaluate_subject(b, subject)),
        Expr::Not(inner) => !evaluate_subject(inner, subject),
        Expr::Keyword(word) => subject.has_token(word),
        Expr::Phrase(phrase) => subject.lowercase_text().contains(phrase.as_str()),
        Expr::Emoji(emoji) => {
            let wanted = tokenize(emoji);
            (!wanted.is_empty() && wanted.iter().all(|w| subject.has_token(w)))
                || subject.item().text.contains(emoji.as_str())
        }
        Expr::Mention(username) => subject
            .item()
            .entities
            .mentions
            .iter()
            .any(|m| m.username.eq_ignore_ascii_case(username)),
        Expr::Hashtag(tag) => subject
            .item()
            .entities
            .hashtags
            .iter()
            .any(|h| h.eq_ignore_ascii_case(tag)),
        Expr::Cashtag(tag) => subject
            .item()
            .entities
            .cashtags
            .iter()
            .any(|c| c.eq_ignore_ascii_case(tag)),
        Expr::Proximity { keywords, distance } => {
            keywords
                .windows(2)
                .all(|pair| within_distance(subject, &pair[0], &pair[1], *distance))
        }
        Expr::Field(op) => op.evaluate(subject),
        Expr::Never => false,
    }
}

/// `second` follows `first` by at most `distance` tokens, or precedes it by
/// at most `distance - 2`.
fn within_distance(subject: &Subject<'_>, first: &str, second: &str, distance: usize) -> bool {
    let firsts = subject.positions(first);
    let seconds = subject.positions(second);

    firsts.iter().any(|&p| {
        seconds.iter().any(|&q| {
            if q > p {
                q - p <= distance
            } else if p > q {
                p - q + 2 <= distance
            } else {
                false
            }
        })
    })
}
