use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::license::{LicenseNormalizer, coerce_unknown};
use crate::models::enrichment::{EnrichmentResult, FulltextUrlDict, index_timestamp};
use crate::models::record::RawRecord;
use crate::targets::derive_targets;
use crate::{INDEX_NAME, TYPE_NAME};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpType {
    Update,
}

impl OpType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Update => "update",
        }
    }
}

/// A partial update addressed to one document id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdateAction<D> {
    #[serde(rename = "_op_type")]
    pub op_type: OpType,
    #[serde(rename = "_index")]
    pub index: String,
    #[serde(rename = "_type", skip_serializing_if = "Option::is_none")]
    pub doc_type: Option<String>,
    #[serde(rename = "_id")]
    pub id: String,
    pub doc: D,
}

impl<D: Serialize> UpdateAction<D> {
    pub fn new(id: impl Into<String>, doc: D) -> Self {
        Self {
            op_type: OpType::Update,
            index: INDEX_NAME.to_string(),
            doc_type: Some(TYPE_NAME.to_string()),
            id: id.into(),
            doc,
        }
    }

    /// Point the action at a different index/type pair. An empty type
    /// drops `_type` from the request, for clusters without mapping types.
    pub fn with_target(mut self, index: &str, doc_type: &str) -> Self {
        self.index = index.to_string();
        self.doc_type = (!doc_type.is_empty()).then(|| doc_type.to_string());
        self
    }

    /// The two NDJSON lines this action contributes to a `_bulk` body.
    pub fn to_bulk_lines(&self) -> serde_json::Result<String> {
        let mut meta = serde_json::Map::new();
        meta.insert("_index".to_string(), json!(self.index));
        if let Some(doc_type) = &self.doc_type {
            meta.insert("_type".to_string(), json!(doc_type));
        }
        meta.insert("_id".to_string(), json!(self.id));

        let mut header = serde_json::Map::new();
        header.insert(self.op_type.as_str().to_string(), Value::Object(meta));
        let body = json!({ "doc": serde_json::to_value(&self.doc)? });
        Ok(format!(
            "{}\n{}\n",
            serde_json::to_string(&header)?,
            serde_json::to_string(&body)?
        ))
    }
}

/// Partial document written for a scraped record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampledUpdate {
    pub fulltext_last_updated: String,
    pub fulltext_url_dicts: Vec<FulltextUrlDict>,
    pub fulltext_license: Option<String>,
    /// Always null here; clears any backfill marker so the record is not
    /// mistaken for a metadata-only one.
    pub fulltext_updated: Option<String>,
}

impl SampledUpdate {
    pub fn from_result(result: &EnrichmentResult) -> Self {
        Self {
            fulltext_last_updated: result.fulltext_last_updated.clone(),
            fulltext_url_dicts: result.fulltext_url_dicts.clone(),
            fulltext_license: coerce_unknown(result.license.clone()),
            fulltext_updated: None,
        }
    }
}

/// Partial document written by the metadata-only backfill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackfillUpdate {
    pub fulltext_urls: Vec<String>,
    /// Outer `None` leaves the field untouched, `Some(None)` writes null.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fulltext_license: Option<Option<String>>,
    pub fulltext_updated: String,
}

pub fn build_sampled_action(id: &str, result: &EnrichmentResult) -> UpdateAction<SampledUpdate> {
    UpdateAction::new(id, SampledUpdate::from_result(result))
}

/// Backfill action for one scrolled hit. No scraping happens here: the
/// URLs and license are derived from what the record already carries.
pub fn build_backfill_action(
    hit_id: &str,
    record: &RawRecord,
    normalizer: &dyn LicenseNormalizer,
    now: DateTime<Utc>,
) -> UpdateAction<BackfillUpdate> {
    let fulltext_license = record
        .license
        .as_deref()
        .map(|raw| coerce_unknown(normalizer.normalize(raw)));

    UpdateAction::new(
        hit_id,
        BackfillUpdate {
            fulltext_urls: derive_targets(record),
            fulltext_license,
            fulltext_updated: index_timestamp(now),
        },
    )
}
