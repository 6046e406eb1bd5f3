use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One open copy found for a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FulltextUrlDict {
    pub free_pdf_url: Option<String>,
    pub pdf_landing_page: String,
}

/// What one scrape-and-reduce pass learned about a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentResult {
    /// Stamped when enrichment was attempted, not when it finished.
    pub fulltext_last_updated: String,
    pub fulltext_url_dicts: Vec<FulltextUrlDict>,
    pub license: Option<String>,
    pub error: bool,
}

impl EnrichmentResult {
    pub fn started_at(now: DateTime<Utc>) -> Self {
        Self {
            fulltext_last_updated: index_timestamp(now),
            fulltext_url_dicts: Vec::new(),
            license: None,
            error: false,
        }
    }

    pub fn has_fulltext(&self) -> bool {
        !self.fulltext_url_dicts.is_empty()
    }
}

/// Timestamps are written as naive UTC ISO-8601 with microseconds,
/// e.g. `2024-01-02T03:04:05.123456`.
pub fn index_timestamp(now: DateTime<Utc>) -> String {
    now.naive_utc().format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}
