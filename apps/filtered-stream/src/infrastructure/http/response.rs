//! HTTP response DTOs.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::rules::Rule;

/// Envelope for single-resource and list responses.
#[derive(Debug, Clone, Serialize)]
pub struct DataResponse<T> {
    /// Payload.
    pub data: T,
}

/// Response for `GET /2/tweets/search/stream/rules`.
#[derive(Debug, Clone, Serialize)]
pub struct RulesResponse {
    /// Active rules.
    pub data: Vec<Rule>,
    /// Response metadata.
    pub meta: RulesMeta,
}

/// Metadata for rule responses.
#[derive(Debug, Clone, Serialize)]
pub struct RulesMeta {
    /// Time the response was produced.
    pub sent: DateTime<Utc>,
    /// Number of rules in `data`.
    pub result_count: usize,
    /// Counts for an update.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<RulesSummary>,
}

/// Counts for a rule update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RulesSummary {
    /// Rules created.
    pub created: usize,
    /// Rules rejected.
    pub not_created: usize,
    /// Rules deleted.
    pub deleted: usize,
    /// IDs that did not exist.
    pub not_deleted: usize,
}

/// Response for `POST /2/tweets/search/stream/rules`.
#[derive(Debug, Clone, Serialize)]
pub struct UpdateRulesResponse {
    /// Created rules.
    pub data: Vec<Rule>,
    /// Response metadata.
    pub meta: RulesMeta,
    /// Per-rule rejections.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<RuleError>,
}

/// Why a rule was not created.
#[derive(Debug, Clone, Serialize)]
pub struct RuleError {
    /// Rejected rule text.
    pub value: String,
    /// Short error title.
    pub title: String,
    /// Detail message.
    pub detail: String,
}

/// Body of `DELETE /2/connections/all`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct KilledConnections {
    /// Streams cancelled.
    pub killed_connections: usize,
}
