//! API errors and their problem-JSON rendering.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use crate::application::ports::SinkError;
use crate::infrastructure::store::StoreError;

/// Structured error body: `{"title","detail","type","status"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProblemResponse {
    /// Short summary of the problem class.
    pub title: String,
    /// Specific explanation.
    pub detail: String,
    /// Problem type URI.
    #[serde(rename = "type")]
    pub problem_type: String,
    /// HTTP status code.
    pub status: u16,
}

/// Errors surfaced to API callers before any stream is established.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// No usable bearer token.
    #[error("Authorization header with a bearer token is required")]
    Unauthorized,

    /// A request parameter is missing or invalid.
    #[error("{0}")]
    Validation(String),

    /// The request body could not be parsed.
    #[error("{0}")]
    InvalidBody(String),

    /// A referenced resource does not exist.
    #[error("{0}")]
    NotFound(String),

    /// The resource already exists.
    #[error("{0}")]
    Conflict(String),

    /// The transport cannot stream.
    #[error("{0}")]
    StreamUnavailable(String),
}

impl ApiError {
    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Validation(_) | Self::InvalidBody(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::StreamUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    const fn title(&self) -> &'static str {
        match self {
            Self::Unauthorized => "Unauthorized",
            Self::Validation(_) | Self::InvalidBody(_) => "Invalid Request",
            Self::NotFound(_) => "Not Found Error",
            Self::Conflict(_) => "Conflict",
            Self::StreamUnavailable(_) => "Service Unavailable",
        }
    }

    const fn problem_type(&self) -> &'static str {
        match self {
            Self::Unauthorized => "about:blank",
            Self::Validation(_) | Self::InvalidBody(_) => {
                "https://api.twitter.com/2/problems/invalid-request"
            }
            Self::NotFound(_) => "https://api.twitter.com/2/problems/resource-not-found",
            Self::Conflict(_) => "https://api.twitter.com/2/problems/duplicate-rules",
            Self::StreamUnavailable(_) => "https://api.twitter.com/2/problems/streaming-connection",
        }
    }

    /// Render the problem body.
    #[must_use]
    pub fn problem(&self) -> ProblemResponse {
        ProblemResponse {
            title: self.title().to_string(),
            detail: self.to_string(),
            problem_type: self.problem_type().to_string(),
            status: self.status().as_u16(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        tracing::debug!(status = self.status().as_u16(), detail = %self, "Request rejected");
        (self.status(), Json(self.problem())).into_response()
    }
}

impl From<SinkError> for ApiError {
    fn from(error: SinkError) -> Self {
        Self::StreamUnavailable(error.to_string())
    }
}

impl From<StoreError> for ApiError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::UnknownContent(_) => Self::NotFound(error.to_string()),
            StoreError::DuplicateContent(_) | StoreError::DuplicateRule(_) => {
                Self::Conflict(error.to_string())
            }
            StoreError::InvalidRule(_) | StoreError::MissingField(_) => {
                Self::Validation(error.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(ApiError::Unauthorized, 401 ; "unauthorized")]
    #[test_case(ApiError::Validation("x".into()), 400 ; "validation")]
    #[test_case(ApiError::InvalidBody("x".into()), 400 ; "invalid body")]
    #[test_case(ApiError::NotFound("x".into()), 404 ; "not found")]
    #[test_case(ApiError::Conflict("x".into()), 409 ; "conflict")]
    #[test_case(ApiError::from(SinkError::FlushUnsupported), 503 ; "stream unavailable")]
    fn status_codes(error: ApiError, expected: u16) {
        assert_eq!(error.status().as_u16(), expected);
        assert_eq!(error.problem().status, expected);
    }

    #[test]
    fn problem_wire_shape() {
        let problem = ApiError::Validation("partition missing".to_string()).problem();
        let json = serde_json::to_value(&problem).unwrap();

        assert_eq!(json["title"], "Invalid Request");
        assert_eq!(json["detail"], "partition missing");
        assert_eq!(json["status"], 400);
        assert!(json["type"].as_str().unwrap().ends_with("invalid-request"));
    }

    #[test]
    fn store_errors_map_to_statuses() {
        assert_eq!(
            ApiError::from(StoreError::UnknownContent("1".into())).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(StoreError::MissingField("text")).status(),
            StatusCode::BAD_REQUEST
        );
    }
}
