use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {1} from {0}")]
    Status(String, u16),

    #[error("rate limit from {0}, retry after {1}s")]
    RateLimit(String, u64),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("scrape fault: {0}")]
    Fault(String),

    /// Shutdown was requested while the scrape was in flight.
    #[error("scrape cancelled")]
    Cancelled,
}

impl ScrapeError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, ScrapeError>;
