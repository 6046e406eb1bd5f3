use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::page::PageScraper;
use crate::record::{FailureReason, Record, ScrapeOutcome};

/// Per-cycle tally of what the coordinator got back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScrapeSummary {
    pub records: usize,
    pub found: usize,
    pub not_found: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl ScrapeSummary {
    pub fn of(records: &[Record]) -> Self {
        let mut summary = Self {
            records: records.len(),
            ..Self::default()
        };
        for record in records {
            match record.outcome() {
                Some(ScrapeOutcome::Found { .. }) => summary.found += 1,
                Some(ScrapeOutcome::NotFound) | None => summary.not_found += 1,
                Some(ScrapeOutcome::Failed(_)) => summary.failed += 1,
                Some(ScrapeOutcome::Cancelled) => summary.cancelled += 1,
            }
        }
        summary
    }
}

/// Runs one scrape per record, each in its own task, with bounded
/// parallelism.
///
/// A record whose task panics or outlives `record_timeout` comes back as
/// the copy taken before dispatch, flagged with `error`. Nothing is retried.
pub struct ScrapeCoordinator {
    scraper: Arc<dyn PageScraper>,
    workers: usize,
    record_timeout: Duration,
    cancel: CancellationToken,
}

impl ScrapeCoordinator {
    pub fn new(scraper: Arc<dyn PageScraper>, cancel: CancellationToken) -> Self {
        Self {
            scraper,
            workers: num_cpus::get(),
            record_timeout: Duration::from_secs(30),
            cancel,
        }
    }

    /// 0 keeps the default of one worker per CPU.
    pub fn with_workers(mut self, workers: usize) -> Self {
        if workers > 0 {
            self.workers = workers;
        }
        self
    }

    pub fn with_record_timeout(mut self, record_timeout: Duration) -> Self {
        self.record_timeout = record_timeout;
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Scrape every record. Returns all of them, in input order, once each
    /// has finished, failed, timed out or seen the shutdown signal.
    pub async fn run(&self, records: Vec<Record>) -> Vec<Record> {
        let start = Instant::now();
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut dispatched = Vec::with_capacity(records.len());

        for record in records {
            let fallback = record.clone();
            let scraper = Arc::clone(&self.scraper);
            let cancel = self.cancel.clone();
            let semaphore = Arc::clone(&semaphore);
            let bound = self.record_timeout;

            let handle = tokio::spawn(async move {
                let mut record = record;
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    record.mark_failed(FailureReason::Fault("worker pool closed".to_string()));
                    return record;
                };
                if timeout(bound, record.scrape(scraper.as_ref(), &cancel))
                    .await
                    .is_err()
                {
                    tracing::warn!(id = record.id(), "scrape exceeded {:?}, giving up", bound);
                    record.mark_failed(FailureReason::TimedOut(bound));
                }
                record
            });
            dispatched.push((handle, fallback));
        }

        let mut results = Vec::with_capacity(dispatched.len());
        for (handle, mut fallback) in dispatched {
            match handle.await {
                Ok(record) => results.push(record),
                Err(e) => {
                    tracing::warn!(id = fallback.id(), "in scrape task, got error: {}", e);
                    fallback.mark_failed(FailureReason::Panicked(e.to_string()));
                    results.push(fallback);
                }
            }
        }

        let summary = ScrapeSummary::of(&results);
        if summary.cancelled > 0 {
            tracing::info!(cancelled = summary.cancelled, "shutdown requested during scrape");
        }
        tracing::info!(
            found = summary.found,
            failed = summary.failed,
            "scraping {} webpages took {:.2}s",
            summary.records,
            start.elapsed().as_secs_f64()
        );
        results
    }
}
