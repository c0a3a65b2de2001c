//! HTTP request DTOs.

use serde::Deserialize;

use crate::infrastructure::store::NewRule;

use super::error::ApiError;

/// Query parameters accepted by every streaming endpoint.
///
/// Values are kept as text so that a malformed `delay_ms` falls back to the
/// default instead of rejecting the request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamQuery {
    /// Tick interval in milliseconds.
    #[serde(default)]
    pub delay_ms: Option<String>,
    /// Firehose partition.
    #[serde(default)]
    pub partition: Option<String>,
}

impl StreamQuery {
    /// The requested delay, if it parses.
    #[must_use]
    pub fn delay_ms(&self) -> Option<u64> {
        self.delay_ms.as_deref().and_then(|v| v.trim().parse().ok())
    }

    /// The partition, required on partitioned endpoints.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the parameter is missing or blank.
    pub fn require_partition(&self) -> Result<&str, ApiError> {
        self.partition
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .ok_or_else(|| {
                ApiError::Validation("The `partition` query parameter is required".to_string())
            })
    }
}

/// Body of `POST /2/tweets/search/stream/rules`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RulesRequest {
    /// Rules to add.
    #[serde(default)]
    pub add: Vec<NewRule>,
    /// Rules to delete.
    #[serde(default)]
    pub delete: Option<DeleteRules>,
}

impl RulesRequest {
    /// IDs to delete, possibly empty.
    #[must_use]
    pub fn delete_ids(&self) -> &[String] {
        self.delete.as_ref().map_or(&[], |d| d.ids.as_slice())
    }
}

/// Rule deletion by ID.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeleteRules {
    /// Rule IDs.
    #[serde(default)]
    pub ids: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_delay_is_ignored() {
        let query = StreamQuery {
            delay_ms: Some("fast".to_string()),
            partition: None,
        };
        assert_eq!(query.delay_ms(), None);

        let query = StreamQuery {
            delay_ms: Some(" 250 ".to_string()),
            partition: None,
        };
        assert_eq!(query.delay_ms(), Some(250));
    }

    #[test]
    fn partition_must_be_present_and_non_blank() {
        assert!(StreamQuery::default().require_partition().is_err());

        let blank = StreamQuery {
            delay_ms: None,
            partition: Some("  ".to_string()),
        };
        assert!(blank.require_partition().is_err());

        let set = StreamQuery {
            delay_ms: None,
            partition: Some("1".to_string()),
        };
        assert_eq!(set.require_partition().unwrap(), "1");
    }

    #[test]
    fn rules_request_parses_add_and_delete() {
        let request: RulesRequest = serde_json::from_str(
            r#"{"add":[{"value":"cats","tag":"pets"}],"delete":{"ids":["1"]}}"#,
        )
        .unwrap();

        assert_eq!(request.add[0].value, "cats");
        assert_eq!(request.add[0].tag.as_deref(), Some("pets"));
        assert_eq!(request.delete_ids(), ["1".to_string()]);
    }
}
