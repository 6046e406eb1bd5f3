use std::time::Duration;

use reqwest::Method;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{IndexError, IndexResult};
use crate::index::IndexClient;
use crate::index::queries::SAMPLED_QUERY;
use crate::models::RawRecord;

/// One search hit.
#[derive(Debug, Clone, Deserialize)]
pub struct Hit {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_source", default)]
    pub source: Value,
}

impl Hit {
    /// A source that does not deserialize still yields a record carrying the
    /// hit id, so the record gets marked as attempted instead of resurfacing
    /// in every sample.
    pub fn into_record(self) -> RawRecord {
        match RawRecord::from_source(&self.id, self.source) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(id = self.id.as_str(), error = %e, "unreadable record source");
                RawRecord {
                    id: self.id,
                    ..Default::default()
                }
            }
        }
    }
}

pub(crate) fn parse_hits(response: &Value) -> IndexResult<Vec<Hit>> {
    let hits = response
        .get("hits")
        .and_then(|h| h.get("hits"))
        .ok_or_else(|| IndexError::MissingTag("hits.hits".to_string()))?;
    Ok(serde_json::from_value(hits.clone())?)
}

impl IndexClient {
    pub async fn search(&self, query: &Value, timeout: Duration) -> IndexResult<Vec<Hit>> {
        let path = format!("{}/_search", self.index_name());
        let response = self
            .send_json(Method::POST, &path, &[], Some(query), timeout)
            .await?;
        parse_hits(&response)
    }
}

/// Random pages of never-scraped records. Exhausted once a page comes back
/// empty; progress lives entirely in the index, so a rerun resumes.
pub struct SampledSelector {
    client: IndexClient,
    timeout: Duration,
}

impl SampledSelector {
    pub fn new(client: IndexClient, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    pub async fn next_page(&self) -> IndexResult<Vec<RawRecord>> {
        let hits = self.client.search(&SAMPLED_QUERY, self.timeout).await?;
        Ok(hits.into_iter().map(Hit::into_record).collect())
    }
}
