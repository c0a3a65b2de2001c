//! Rule Matching Engine
//!
//! Subscription rules, their expression language, and matching.
//!
//! # Pipeline
//!
//! ```text
//! rule text ──parse──► Expr (cached per rule) ──evaluate(item)──► bool
//!                                          ▲
//!                     tokenizer + lookup ──┘
//! ```
//!
//! Evaluation never fails: unsupported or malformed clauses evaluate to
//! `false` and only affect their own branch of a compound expression.

mod evaluator;
mod matcher;
mod operators;
mod parser;
mod tokenizer;

use serde::{Deserialize, Serialize};

pub use evaluator::{Subject, evaluate, evaluate_expression, evaluate_subject};
pub use matcher::{MatchOutcome, RuleMatcher, matches_any};
pub use operators::{CountMetric, CountRange, FieldOp, HasKind, IsKind, TextQuery, parse_field};
pub use parser::{Expr, parse};
pub use tokenizer::{contains_emoji, is_emoji, tokenize};

/// A subscription rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    /// Rule ID.
    pub id: String,
    /// Expression text.
    pub value: String,
    /// Optional label echoed back with matches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

impl Rule {
    /// Create a rule.
    #[must_use]
    pub fn new(id: impl Into<String>, value: impl Into<String>, tag: Option<String>) -> Self {
        Self {
            id: id.into(),
            value: value.into(),
            tag,
        }
    }
}

/// A rule with its expression parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledRule {
    /// The source rule.
    pub rule: Rule,
    /// Parsed expression.
    pub expr: Expr,
}

impl CompiledRule {
    /// Parse a rule's expression.
    #[must_use]
    pub fn compile(rule: Rule) -> Self {
        let expr = parse(&rule.value);
        Self { rule, expr }
    }
}
