//! basefill scrape — landing page scraping, the per-record scrape model
//! and the worker pool that runs a cycle of scrapes.

pub mod coordinator;
pub mod error;
pub mod gather;
pub mod http;
pub mod page;
pub mod record;

pub use coordinator::{ScrapeCoordinator, ScrapeSummary};
pub use error::{Result, ScrapeError};
pub use gather::{Gathered, gather_within, scrape_targets_in_parallel};
pub use http::{FetchedPage, PageClient};
pub use page::{HtmlPageScraper, PageScrape, PageScraper};
pub use record::{FailureReason, OpenPage, Record, ScrapeOutcome};
