//! Usage Ledger
//!
//! In-memory [`UsageMeter`] that totals delivered events and bytes per
//! subscriber.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use crate::application::ports::{UsageError, UsageMeter, UsageRecord};

/// Usage totals for one subscriber.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UsageTotals {
    /// Events delivered.
    pub events: u64,
    /// Payload bytes delivered.
    pub bytes: u64,
    /// Events per request path.
    pub by_path: HashMap<String, u64>,
    /// Most recent delivery.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_delivery: Option<DateTime<Utc>>,
}

/// Per-subscriber usage ledger.
#[derive(Debug, Default)]
pub struct UsageLedger {
    totals: Mutex<HashMap<String, UsageTotals>>,
}

impl UsageLedger {
    /// Create an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Totals for a subscriber (zero if it never received anything).
    #[must_use]
    pub fn totals(&self, subscriber_id: &str) -> UsageTotals {
        self.totals
            .lock()
            .get(subscriber_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Events delivered across all subscribers.
    #[must_use]
    pub fn total_events(&self) -> u64 {
        self.totals.lock().values().map(|t| t.events).sum()
    }
}

#[async_trait]
impl UsageMeter for UsageLedger {
    async fn report_usage(&self, record: UsageRecord) -> Result<(), UsageError> {
        if record.subscriber_id.is_empty() {
            return Err(UsageError::Rejected {
                message: "record has no subscriber".to_string(),
            });
        }

        let mut totals = self.totals.lock();
        let entry = totals.entry(record.subscriber_id).or_default();
        entry.events += 1;
        entry.bytes += record.payload.len() as u64;
        *entry.by_path.entry(record.path).or_default() += 1;
        entry.last_delivery = Some(record.recorded_at);
        Ok(())
    }
}
