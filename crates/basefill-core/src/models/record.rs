use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A bibliographic record as stored in the index. Read-only to the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub sources: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub urls: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relations: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,

    /// Access-status code. 1 = metadata only, 2 = likely open.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oa: Option<u8>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RawRecord {
    /// Build a record from a hit's `_source`, falling back to the hit `_id`
    /// when the document carries no `id` of its own.
    pub fn from_source(hit_id: &str, source: Value) -> serde_json::Result<Self> {
        let mut record: Self = serde_json::from_value(source)?;
        if record.id.is_empty() {
            record.id = hit_id.to_string();
        }
        Ok(record)
    }

    pub fn has_source(&self, source: &str) -> bool {
        self.sources.iter().any(|s| s == source)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_full_source() {
        let record = RawRecord::from_source(
            "hit-1",
            json!({
                "id": "rec-1",
                "sources": ["PubMed Central (PMC)"],
                "urls": ["https://www.ncbi.nlm.nih.gov/pmc/articles/PMC1/"],
                "license": "CC BY 4.0",
                "oa": 2,
                "title": "Something"
            }),
        )
        .unwrap();

        assert_eq!(record.id, "rec-1");
        assert!(record.has_source("PubMed Central (PMC)"));
        assert_eq!(record.oa, Some(2));
        assert_eq!(record.relations, None);
        assert_eq!(record.extra.get("title"), Some(&json!("Something")));
    }

    #[test]
    fn missing_id_falls_back_to_hit_id() {
        let record = RawRecord::from_source("hit-7", json!({"oa": 1})).unwrap();
        assert_eq!(record.id, "hit-7");
        assert!(record.sources.is_empty());
        assert!(record.urls.is_none());
    }
}
