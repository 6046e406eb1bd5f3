use std::time::Duration;

use basefill_core::license::UNKNOWN_LICENSE;
use basefill_core::{
    EnrichmentResult, FulltextUrlDict, LicenseNormalizer, PipelineError, RawRecord, SampledUpdate,
    UpdateAction, build_sampled_action, coerce_unknown, derive_targets,
};
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::error::ScrapeError;
use crate::page::{PageScrape, PageScraper};

/// Why a record's scrape ended without a usable answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// The page scraper returned an error.
    Fault(String),
    /// The task running the scrape panicked.
    Panicked(String),
    /// The scrape did not finish within the per-record bound.
    TimedOut(Duration),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScrapeOutcome {
    Found { landing_page: String },
    NotFound,
    Failed(FailureReason),
    Cancelled,
}

/// A target that turned out to expose full text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenPage {
    pub url: String,
    pub scrape: PageScrape,
}

/// One raw record moving through a scrape cycle.
#[derive(Debug, Clone)]
pub struct Record {
    raw: RawRecord,
    targets: Vec<String>,
    open_pages: Vec<OpenPage>,
    result: EnrichmentResult,
    outcome: Option<ScrapeOutcome>,
    reduced: bool,
}

impl Record {
    pub fn new(raw: RawRecord) -> Self {
        Self::started_at(raw, Utc::now())
    }

    /// `now` becomes `fulltext_last_updated`: the time enrichment was
    /// attempted, whatever the outcome.
    pub fn started_at(raw: RawRecord, now: DateTime<Utc>) -> Self {
        let targets = derive_targets(&raw);
        Self {
            raw,
            targets,
            open_pages: Vec::new(),
            result: EnrichmentResult::started_at(now),
            outcome: None,
            reduced: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.raw.id
    }

    pub fn raw(&self) -> &RawRecord {
        &self.raw
    }

    pub fn targets(&self) -> &[String] {
        &self.targets
    }

    pub fn open_pages(&self) -> &[OpenPage] {
        &self.open_pages
    }

    pub fn result(&self) -> &EnrichmentResult {
        &self.result
    }

    pub fn outcome(&self) -> Option<&ScrapeOutcome> {
        self.outcome.as_ref()
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.outcome, Some(ScrapeOutcome::Cancelled))
    }

    /// Try targets in order and stop at the first one with full text.
    ///
    /// A scraper fault marks the record as errored and ends its scrape; the
    /// record is still usable afterwards, just without full text. A
    /// cancellation leaves the error flag alone.
    pub async fn scrape(
        &mut self,
        scraper: &dyn PageScraper,
        cancel: &CancellationToken,
    ) -> &ScrapeOutcome {
        let mut outcome = ScrapeOutcome::NotFound;

        for i in 0..self.targets.len() {
            if cancel.is_cancelled() {
                outcome = ScrapeOutcome::Cancelled;
                break;
            }
            let url = self.targets[i].clone();

            match scraper.scrape(&url).await {
                Ok(page) if page.has_fulltext_url => {
                    tracing::info!(
                        id = self.raw.id.as_str(),
                        "** found an open version! {}",
                        page.fulltext_url.as_deref().unwrap_or(url.as_str())
                    );
                    outcome = ScrapeOutcome::Found {
                        landing_page: url.clone(),
                    };
                    self.open_pages.push(OpenPage { url, scrape: page });
                    break;
                }
                Ok(_) => {}
                Err(ScrapeError::Cancelled) => {
                    outcome = ScrapeOutcome::Cancelled;
                    break;
                }
                Err(e) => {
                    tracing::warn!(id = self.raw.id.as_str(), url = url.as_str(), error = %e, "scrape failed");
                    self.result.error = true;
                    outcome = ScrapeOutcome::Failed(FailureReason::Fault(e.to_string()));
                    break;
                }
            }
        }

        self.outcome.insert(outcome)
    }

    /// Record a failure observed from outside the scrape itself.
    pub fn mark_failed(&mut self, reason: FailureReason) {
        self.result.error = true;
        self.outcome = Some(ScrapeOutcome::Failed(reason));
    }

    /// Fold the scrape into the enrichment result. Runs once; later calls
    /// are no-ops.
    pub fn reduce(&mut self, normalizer: &dyn LicenseNormalizer) -> basefill_core::Result<()> {
        if self.outcome.is_none() {
            return Err(PipelineError::NotScraped(self.raw.id.clone()));
        }
        if self.reduced {
            return Ok(());
        }

        // seed from the record's own license; a scraped one may replace it
        if let Some(raw) = self.raw.license.as_deref().filter(|l| !l.trim().is_empty()) {
            self.result.license = normalizer.normalize(raw);
        }

        for page in &self.open_pages {
            if !page.scrape.has_fulltext_url {
                continue;
            }
            self.result.fulltext_url_dicts.push(FulltextUrlDict {
                free_pdf_url: page.scrape.scraped_pdf_url.clone(),
                pdf_landing_page: page.url.clone(),
            });
            let usable = self
                .result
                .license
                .as_deref()
                .is_some_and(|l| l != UNKNOWN_LICENSE);
            if !usable {
                self.result.license = page.scrape.scraped_license.clone();
            }
        }

        self.result.license = coerce_unknown(self.result.license.take());
        self.reduced = true;
        Ok(())
    }

    pub fn to_action(&self) -> UpdateAction<SampledUpdate> {
        build_sampled_action(&self.raw.id, &self.result)
    }
}
