use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::entry::Entry;
use crate::analytics::AnalyticsSummary;

/// Aggregate outcome of one batch invocation.
///
/// `entries` follows input order. Successful duplicates are dropped before the
/// counts are taken, so `successful + failed + duplicates_removed` equals the
/// number of identifiers submitted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchResult {
    pub entries: Vec<Entry>,
    pub successful: usize,
    pub failed: usize,
    pub failed_identifiers: Vec<String>,
    pub duplicates_removed: usize,
    pub analytics: AnalyticsSummary,
    pub elapsed: Duration,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl BatchResult {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn total_count(&self) -> usize {
        self.successful + self.failed
    }

    /// Percentage of counted entries that resolved, `0.0` for an empty batch.
    pub fn success_rate(&self) -> f64 {
        let total = self.total_count();
        if total == 0 {
            return 0.0;
        }
        self.successful as f64 / total as f64 * 100.0
    }

    pub fn successful_entries(&self) -> impl Iterator<Item = &Entry> {
        self.entries.iter().filter(|e| e.is_ok())
    }

    pub fn failed_entries(&self) -> impl Iterator<Item = &Entry> {
        self.entries.iter().filter(|e| e.has_error())
    }

    pub fn citation_keys(&self) -> Vec<&str> {
        self.successful_entries().map(|e| e.key.as_str()).collect()
    }

    /// Rewritten records of the successful entries, blank-line separated.
    pub fn bibliography(&self) -> String {
        self.successful_entries()
            .map(|e| e.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}
