use std::time::{Duration, Instant};

use futures::StreamExt;
use futures::stream;
use serde::Serialize;
use serde_json::Value;

use crate::error::{IndexError, IndexResult};
use crate::index::IndexClient;
use crate::models::UpdateAction;

/// Outcome of one `save` call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkReport {
    pub submitted: usize,
    pub failed: usize,
    pub chunks: usize,
    pub failures: Vec<DocumentFailure>,
    pub elapsed: Duration,
}

impl BulkReport {
    pub fn written(&self) -> usize {
        self.submitted - self.failed
    }

    fn absorb(&mut self, chunk: ChunkOutcome) {
        self.chunks += 1;
        self.submitted += chunk.submitted;
        self.failed += chunk.failures.len();
        self.failures.extend(chunk.failures);
    }
}

/// A single document the index refused.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentFailure {
    pub id: String,
    pub status: u16,
    pub reason: String,
}

struct ChunkOutcome {
    submitted: usize,
    failures: Vec<DocumentFailure>,
}

/// Chunked `_bulk` submission of update actions.
///
/// A document rejected by the index is logged and counted; the rest of its
/// chunk and every later chunk are still written. Only a request that fails
/// outright (after the client's retries) aborts the save.
pub struct BulkWriter {
    client: IndexClient,
    timeout: Duration,
}

impl BulkWriter {
    pub fn new(client: IndexClient) -> Self {
        let timeout = client.request_timeout();
        Self { client, timeout }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// With `threads > 1` chunks go out concurrently and in no particular
    /// order; otherwise one after another.
    pub async fn save<D>(
        &self,
        actions: &[UpdateAction<D>],
        threads: usize,
        chunk_size: usize,
    ) -> IndexResult<BulkReport>
    where
        D: Serialize + Sync,
    {
        let start = Instant::now();
        let mut report = BulkReport::default();
        if actions.is_empty() {
            return Ok(report);
        }

        for action in actions {
            self.check_target(action)?;
        }

        let chunks = actions.chunks(chunk_size.max(1));
        if threads > 1 {
            let mut pending = stream::iter(chunks)
                .map(|chunk| self.submit_chunk(chunk))
                .buffer_unordered(threads);
            while let Some(outcome) = pending.next().await {
                report.absorb(outcome?);
            }
        } else {
            for chunk in chunks {
                report.absorb(self.submit_chunk(chunk).await?);
            }
        }

        report.elapsed = start.elapsed();
        tracing::info!(
            records = report.submitted,
            failed = report.failed,
            chunks = report.chunks,
            "done sending {} records to index in {:.4}s",
            report.submitted,
            report.elapsed.as_secs_f64()
        );
        Ok(report)
    }

    fn check_target<D>(&self, action: &UpdateAction<D>) -> IndexResult<()> {
        if action.index != self.client.index_name() {
            return Err(IndexError::MissingTag(format!(
                "action {} targets index '{}', expected '{}'",
                action.id,
                action.index,
                self.client.index_name()
            )));
        }
        let expected_type = self.client.type_name();
        let actual_type = action.doc_type.as_deref().unwrap_or("");
        if actual_type != expected_type {
            return Err(IndexError::MissingTag(format!(
                "action {} has type '{}', expected '{}'",
                action.id, actual_type, expected_type
            )));
        }
        Ok(())
    }

    async fn submit_chunk<D: Serialize>(
        &self,
        chunk: &[UpdateAction<D>],
    ) -> IndexResult<ChunkOutcome> {
        let mut body = String::new();
        for action in chunk {
            body.push_str(&action.to_bulk_lines()?);
        }

        let response = self
            .client
            .send_ndjson("_bulk", &[("refresh", "false")], body, self.timeout)
            .await?;
        let failures = parse_failures(&response)?;
        for failure in &failures {
            tracing::warn!(
                id = failure.id.as_str(),
                status = failure.status,
                "A document failed: {}",
                failure.reason
            );
        }

        Ok(ChunkOutcome {
            submitted: chunk.len(),
            failures,
        })
    }
}

fn parse_failures(response: &Value) -> IndexResult<Vec<DocumentFailure>> {
    let items = response
        .get("items")
        .and_then(Value::as_array)
        .ok_or_else(|| IndexError::MissingTag("items".to_string()))?;

    let mut failures = Vec::new();
    for item in items {
        let result = item
            .get("update")
            .ok_or_else(|| IndexError::MissingTag(format!("update in bulk item {item}")))?;
        let status = result
            .get("status")
            .and_then(Value::as_u64)
            .and_then(|s| u16::try_from(s).ok())
            .unwrap_or(0);
        let error = result.get("error");
        if error.is_some() || status >= 300 {
            let reason = error
                .and_then(|e| e.get("reason").and_then(Value::as_str).map(ToOwned::to_owned))
                .or_else(|| error.map(|e| e.to_string()))
                .unwrap_or_else(|| format!("HTTP {status}"));
            failures.push(DocumentFailure {
                id: result
                    .get("_id")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                status,
                reason,
            });
        }
    }
    Ok(failures)
}
