//! Rule Expression Parser
//!
//! Builds an [`Expr`] tree from rule text once, so evaluation per item is a
//! tree walk instead of repeated string splitting.
//!
//! Checks are applied to each (trimmed) expression in a fixed order:
//!
//! 1. Parenthesized groups, innermost first. Each group is parsed on its own
//!    and replaced in the text by a placeholder atom, until no balanced pair
//!    remains. Unbalanced parentheses are left in place.
//! 2. ` OR ` (case-insensitive, outside quotes): any branch.
//! 3. ` AND ` (case-insensitive, outside quotes): all branches.
//! 4. Implicit AND over whitespace-separated terms (quoted phrases are one term).
//! 5. `NOT ` or leading `-`: negation of the remainder.
//! 6. A single condition.
//!
//! OR is checked before AND, so `a OR b AND c` is `a OR (b AND c)`.

use super::operators::{FieldOp, parse_field};
use super::tokenizer::{contains_emoji, tokenize};

/// Marks the start of a reduced-group placeholder. Private-use code points
/// never appear in rule text.
const GROUP_OPEN: char = '\u{E000}';
/// Marks the end of a reduced-group placeholder.
const GROUP_CLOSE: char = '\u{E001}';

/// Allowed proximity distances.
const PROXIMITY_RANGE: std::ops::RangeInclusive<usize> = 1..=6;

// =============================================================================
// Expression Tree
// =============================================================================

/// A compiled rule expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    /// True if any branch is true.
    Or(Vec<Self>),
    /// True if every branch is true.
    And(Vec<Self>),
    /// Complement.
    Not(Box<Self>),
    /// Lowercase keyword that must equal one token of the text.
    Keyword(String),
    /// Lowercase phrase that must be a substring of the text.
    Phrase(String),
    /// Emoji literal.
    Emoji(String),
    /// Mention entity username, lowercase, without `@`.
    Mention(String),
    /// Hashtag entity, lowercase, without `#`.
    Hashtag(String),
    /// Cashtag entity, lowercase, without `$`.
    Cashtag(String),
    /// Keywords that must occur near each other.
    Proximity {
        /// Lowercase keywords, at least two.
        keywords: Vec<String>,
        /// Maximum token distance.
        distance: usize,
    },
    /// Colon-prefixed operator.
    Field(FieldOp),
    /// A clause that can never match (empty or malformed).
    Never,
}

impl Expr {
    /// Check whether this expression can never match.
    #[must_use]
    pub const fn is_never(&self) -> bool {
        matches!(self, Self::Never)
    }
}

// =============================================================================
// Parsing
// =============================================================================

/// Parse rule text into an expression tree. Never fails: clauses that cannot
/// be interpreted become [`Expr::Never`].
///
/// ```rust
/// use filtered_stream::domain::rules::{Expr, parse};
///
/// let expr = parse("cats OR dogs");
/// assert_eq!(
///     expr,
///     Expr::Or(vec![Expr::Keyword("cats".into()), Expr::Keyword("dogs".into())])
/// );
/// ```
#[must_use]
pub fn parse(expression: &str) -> Expr {
    let mut text = expression.trim().to_string();
    let mut groups: Vec<Expr> = Vec::new();

    while let Some((open, close)) = innermost_group(&text) {
        let parsed = parse_flat(&text[open + 1..close], &groups);
        let placeholder = format!("{GROUP_OPEN}{}{GROUP_CLOSE}", groups.len());
        groups.push(parsed);
        text.replace_range(open..=close, &placeholder);
    }

    parse_flat(&text, &groups)
}

/// Byte offsets of the first `(`...`)` pair with no parentheses between
/// them, ignoring anything inside double quotes.
fn innermost_group(text: &str) -> Option<(usize, usize)> {
    let mut in_quotes = false;
    let mut open = None;

    for (i, ch) in text.char_indices() {
        match ch {
            '"' => in_quotes = !in_quotes,
            '(' if !in_quotes => open = Some(i),
            ')' if !in_quotes => {
                if let Some(start) = open {
                    return Some((start, i));
                }
            }
            _ => {}
        }
    }

    None
}

/// Parse text that contains no balanced parentheses.
fn parse_flat(text: &str, groups: &[Expr]) -> Expr {
    let text = text.trim();
    if text.is_empty() {
        return Expr::Never;
    }

    let branches = split_on_operator(text, " OR ");
    if branches.len() > 1 {
        return combine(branches, groups, Expr::Or);
    }

    let branches = split_on_operator(text, " AND ");
    if branches.len() > 1 {
        return combine(branches, groups, Expr::And);
    }

    if strip_not_keyword(text).is_none() {
        let terms = split_terms(text);
        if terms.len() > 1 {
            return Expr::And(terms.into_iter().map(|t| parse_flat(t, groups)).collect());
        }
    }

    if let Some(rest) = strip_not_keyword(text).or_else(|| strip_minus(text)) {
        return Expr::Not(Box::new(parse_flat(rest, groups)));
    }

    parse_condition(text, groups)
}

fn combine(branches: Vec<&str>, groups: &[Expr], build: fn(Vec<Expr>) -> Expr) -> Expr {
    let parsed: Vec<Expr> = branches
        .into_iter()
        .filter(|b| !b.trim().is_empty())
        .map(|b| parse_flat(b, groups))
        .collect();

    if parsed.is_empty() {
        Expr::Never
    } else {
        build(parsed)
    }
}

/// Split on a space-delimited keyword operator outside quotes, case-insensitively.
fn split_on_operator<'a>(text: &'a str, operator: &str) -> Vec<&'a str> {
    let bytes = text.as_bytes();
    let op = operator.as_bytes();
    let mut parts = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'"' {
            in_quotes = !in_quotes;
        } else if !in_quotes
            && bytes.len() - i >= op.len()
            && bytes[i..i + op.len()].eq_ignore_ascii_case(op)
        {
            parts.push(&text[start..i]);
            // Resume on the trailing space so "a OR OR b" still splits twice.
            i += op.len() - 1;
            start = i;
            continue;
        }
        i += 1;
    }
    parts.push(&text[start..]);

    parts
}

/// Split on whitespace outside quotes.
fn split_terms(text: &str) -> Vec<&str> {
    let mut terms = Vec::new();
    let mut in_quotes = false;
    let mut start = None;

    for (i, ch) in text.char_indices() {
        if ch == '"' {
            in_quotes = !in_quotes;
        }
        if ch.is_whitespace() && !in_quotes {
            if let Some(s) = start.take() {
                terms.push(&text[s..i]);
            }
        } else if start.is_none() {
            start = Some(i);
        }
    }
    if let Some(s) = start {
        terms.push(&text[s..]);
    }

    terms
}

fn strip_not_keyword(text: &str) -> Option<&str> {
    let head = text.get(..4)?;
    if head.eq_ignore_ascii_case("NOT ") {
        let rest = text[4..].trim();
        (!rest.is_empty()).then_some(rest)
    } else {
        None
    }
}

fn strip_minus(text: &str) -> Option<&str> {
    let rest = text.strip_prefix('-')?.trim();
    (!rest.is_empty()).then_some(rest)
}

// =============================================================================
// Single Conditions
// =============================================================================

fn parse_condition(condition: &str, groups: &[Expr]) -> Expr {
    if let Some(index) = group_index(condition) {
        return groups.get(index).cloned().unwrap_or(Expr::Never);
    }

    if let Some(proximity) = parse_proximity(condition) {
        return proximity;
    }

    if let Some(op) = parse_field(condition) {
        return Expr::Field(op);
    }

    let mut chars = condition.chars();
    let sigil = chars.next();
    let rest = chars.as_str();
    if !rest.is_empty() {
        match sigil {
            Some('@') => return Expr::Mention(rest.to_lowercase()),
            Some('#') => return Expr::Hashtag(rest.to_lowercase()),
            Some('$') => return Expr::Cashtag(rest.to_lowercase()),
            _ => {}
        }
    }

    if let Some(phrase) = quoted(condition) {
        return if phrase.trim().is_empty() {
            Expr::Never
        } else {
            Expr::Phrase(phrase.to_lowercase())
        };
    }

    if contains_emoji(condition) {
        return Expr::Emoji(condition.to_string());
    }

    Expr::Keyword(condition.to_lowercase())
}

fn group_index(condition: &str) -> Option<usize> {
    condition
        .strip_prefix(GROUP_OPEN)?
        .strip_suffix(GROUP_CLOSE)?
        .parse()
        .ok()
}

fn quoted(condition: &str) -> Option<&str> {
    if condition.len() < 2 {
        return None;
    }
    condition.strip_prefix('"')?.strip_suffix('"')
}

/// `"a b"~N`. Returns `None` when the condition does not have that shape,
/// and `Some(Expr::Never)` when it does but the distance or keywords are invalid.
fn parse_proximity(condition: &str) -> Option<Expr> {
    if !condition.starts_with('"') {
        return None;
    }
    let (phrase, distance) = condition.rsplit_once('~')?;
    let phrase = quoted(phrase)?;

    let Ok(distance) = distance.trim().parse::<usize>() else {
        return Some(Expr::Never);
    };
    if !PROXIMITY_RANGE.contains(&distance) {
        return Some(Expr::Never);
    }

    let keywords = tokenize(phrase);
    if keywords.len() < 2 {
        return Some(Expr::Never);
    }

    Some(Expr::Proximity { keywords, distance })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::rules::operators::HasKind;

    fn kw(word: &str) -> Expr {
        Expr::Keyword(word.to_string())
    }

    fn not(expr: Expr) -> Expr {
        Expr::Not(Box::new(expr))
    }

    #[test]
    fn single_keyword_is_lowercased() {
        assert_eq!(parse("  Rust  "), kw("rust"));
    }

    #[test]
    fn or_binds_loosest() {
        assert_eq!(
            parse("a OR b AND c"),
            Expr::Or(vec![kw("a"), Expr::And(vec![kw("b"), kw("c")])])
        );
    }

    #[test]
    fn operators_are_case_insensitive() {
        assert_eq!(parse("a or b"), Expr::Or(vec![kw("a"), kw("b")]));
        assert_eq!(parse("a and b"), Expr::And(vec![kw("a"), kw("b")]));
    }

    #[test]
    fn or_inside_quotes_does_not_split() {
        assert_eq!(
            parse("\"salt OR pepper\""),
            Expr::Phrase("salt or pepper".to_string())
        );
    }

    #[test]
    fn implicit_and_with_negated_term() {
        assert_eq!(
            parse("from:alice -#spam"),
            Expr::And(vec![
                Expr::Field(FieldOp::From("alice".to_string())),
                not(Expr::Hashtag("spam".to_string())),
            ])
        );
    }

    #[test]
    fn quoted_phrase_is_one_implicit_term() {
        assert_eq!(
            parse("\"hello world\" rust"),
            Expr::And(vec![Expr::Phrase("hello world".to_string()), kw("rust")])
        );
    }

    #[test]
    fn not_keyword_negates_whole_remainder() {
        assert_eq!(parse("NOT cats"), not(kw("cats")));
        assert_eq!(
            parse("NOT cats dogs"),
            not(Expr::And(vec![kw("cats"), kw("dogs")]))
        );
    }

    #[test]
    fn groups_reduce_innermost_first() {
        assert_eq!(
            parse("(a OR (b c)) -d"),
            Expr::And(vec![
                Expr::Or(vec![kw("a"), Expr::And(vec![kw("b"), kw("c")])]),
                not(kw("d")),
            ])
        );
    }

    #[test]
    fn negated_group() {
        assert_eq!(parse("-(a OR b)"), not(Expr::Or(vec![kw("a"), kw("b")])));
    }

    #[test]
    fn unbalanced_parentheses_terminate() {
        assert_eq!(parse("(a OR b"), Expr::Or(vec![kw("(a"), kw("b")]));
        assert_eq!(parse("a) OR (b"), Expr::Or(vec![kw("a)"), kw("(b")]));
        assert_eq!(parse("((("), kw("((("));
    }

    #[test]
    fn parentheses_inside_quotes_are_literal() {
        assert_eq!(parse("\"(hello)\""), Expr::Phrase("(hello)".to_string()));
    }

    #[test]
    fn empty_group_never_matches() {
        assert_eq!(parse("()"), Expr::Never);
        assert_eq!(parse(""), Expr::Never);
    }

    #[test]
    fn proximity_parses() {
        assert_eq!(
            parse("\"breaking news\"~3"),
            Expr::Proximity {
                keywords: vec!["breaking".to_string(), "news".to_string()],
                distance: 3,
            }
        );
    }

    #[test]
    fn proximity_out_of_range_or_malformed_never_matches() {
        assert!(parse("\"breaking news\"~0").is_never());
        assert!(parse("\"breaking news\"~7").is_never());
        assert!(parse("\"breaking news\"~x").is_never());
        assert!(parse("\"breaking\"~2").is_never());
    }

    #[test]
    fn proximity_with_colon_is_not_a_field() {
        assert!(matches!(
            parse("\"lang: rust\"~2"),
            Expr::Proximity { .. }
        ));
    }

    #[test]
    fn sigils() {
        assert_eq!(parse("@Alice"), Expr::Mention("alice".to_string()));
        assert_eq!(parse("#AI"), Expr::Hashtag("ai".to_string()));
        assert_eq!(parse("$TSLA"), Expr::Cashtag("tsla".to_string()));
        assert_eq!(parse("#"), kw("#"));
    }

    #[test]
    fn emoji_literal() {
        assert_eq!(parse("🔥"), Expr::Emoji("🔥".to_string()));
    }

    #[test]
    fn field_operator() {
        assert_eq!(parse("has:links"), Expr::Field(FieldOp::Has(HasKind::Links)));
    }

    #[test]
    fn dangling_operator_drops_empty_branch() {
        assert_eq!(parse("a OR  OR b"), Expr::Or(vec![kw("a"), kw("b")]));
    }

    #[test]
    fn deep_nesting_terminates() {
        let expr = format!("{}x{}", "(".repeat(200), ")".repeat(200));
        assert_eq!(parse(&expr), kw("x"));
    }
}
