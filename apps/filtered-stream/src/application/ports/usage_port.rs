//! Usage Meter Port (Driven Port)
//!
//! Interface for recording billable stream deliveries.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Usage reporting error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UsageError {
    /// The meter refused the record.
    #[error("Usage record rejected: {message}")]
    Rejected {
        /// Reason given by the meter.
        message: String,
    },

    /// The meter could not be reached.
    #[error("Usage meter unavailable: {message}")]
    Unavailable {
        /// Underlying cause.
        message: String,
    },
}

/// One delivered payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageRecord {
    /// Subscriber billed for the delivery.
    pub subscriber_id: String,
    /// Request method of the stream.
    pub method: String,
    /// Request path of the stream.
    pub path: String,
    /// Serialized event.
    pub payload: String,
    /// Status code of the stream response.
    pub status_code: u16,
    /// When the delivery happened.
    pub recorded_at: DateTime<Utc>,
}

/// Port for metering deliveries.
#[async_trait]
pub trait UsageMeter: Send + Sync {
    /// Record one delivery.
    async fn report_usage(&self, record: UsageRecord) -> Result<(), UsageError>;
}

/// No-op usage meter for testing.
#[derive(Debug, Clone, Default)]
pub struct NoOpUsageMeter;

#[async_trait]
impl UsageMeter for NoOpUsageMeter {
    async fn report_usage(&self, _record: UsageRecord) -> Result<(), UsageError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn no_op_meter_succeeds() {
        let meter = NoOpUsageMeter;
        let record = UsageRecord {
            subscriber_id: "alice".to_string(),
            method: "GET".to_string(),
            path: "/2/tweets/sample/stream".to_string(),
            payload: "{}".to_string(),
            status_code: 200,
            recorded_at: Utc::now(),
        };

        assert!(meter.report_usage(record).await.is_ok());
    }

    #[test]
    fn error_messages() {
        let err = UsageError::Rejected {
            message: "quota".to_string(),
        };
        assert_eq!(err.to_string(), "Usage record rejected: quota");
    }
}
