use once_cell::sync::Lazy;
use serde_json::{Value, json};

/// Records returned per sampled search call.
pub const SAMPLE_PAGE_SIZE: usize = 20;

/// Random page of records that have never been scraped. Likely-open
/// records (`oa = 2`) score higher but are not required.
pub static SAMPLED_QUERY: Lazy<Value> = Lazy::new(|| {
    json!({
        "size": SAMPLE_PAGE_SIZE,
        "query": {
            "function_score": {
                "query": {
                    "bool": {
                        "must_not": {
                            "exists": { "field": "fulltext_last_updated" }
                        },
                        "should": {
                            "term": { "oa": 2 }
                        }
                    }
                },
                "functions": [
                    { "random_score": {} }
                ],
                "score_mode": "sum"
            }
        }
    })
});

/// Every metadata-only record (`oa = 1`) not yet backfilled.
pub static BACKFILL_QUERY: Lazy<Value> = Lazy::new(|| {
    json!({
        "query": {
            "bool": {
                "filter": [
                    { "term": { "oa": 1 } },
                    { "bool": { "must_not": { "exists": { "field": "fulltext_updated" } } } }
                ]
            }
        }
    })
});
