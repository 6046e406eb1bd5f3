use std::time::Duration;

use reqwest::header::{CONTENT_TYPE, RETRY_AFTER};
use tokio::time::sleep;

use crate::error::{Result, ScrapeError};

/// Longest `Retry-After` we are willing to honor for a single page.
const MAX_RETRY_AFTER_SECS: u64 = 60;

// ─── FetchedPage ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct FetchedPage {
    /// URL after redirects.
    pub url: String,
    pub content_type: Option<String>,
    /// Empty for PDF responses; only HTML bodies are read.
    pub body: String,
}

impl FetchedPage {
    pub fn is_pdf(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.to_ascii_lowercase().contains("application/pdf"))
    }
}

// ─── PageClient ───────────────────────────────────────────────────────────────

/// HTTP client for third-party landing pages. Retries rate limits and
/// transport errors a small, fixed number of times.
#[derive(Clone)]
pub struct PageClient {
    client: reqwest::Client,
    max_retries: u32,
}

impl PageClient {
    pub fn new(user_agent: &str, max_retries: u32, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .gzip(true)
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;
        Ok(Self {
            client,
            max_retries,
        })
    }

    pub async fn fetch(&self, url: &str) -> Result<FetchedPage> {
        let mut attempt = 0u32;
        loop {
            let resp = self.client.get(url).send().await;
            match resp {
                Ok(r) if r.status() == 429 => {
                    let wait = r
                        .headers()
                        .get(RETRY_AFTER)
                        .and_then(|v| v.to_str().ok())
                        .and_then(|s| s.parse::<u64>().ok())
                        .unwrap_or(5)
                        .min(MAX_RETRY_AFTER_SECS);
                    if attempt >= self.max_retries {
                        return Err(ScrapeError::RateLimit(url.to_string(), wait));
                    }
                    sleep(Duration::from_secs(wait)).await;
                    attempt += 1;
                }
                Ok(r) if !r.status().is_success() => {
                    return Err(ScrapeError::Status(url.to_string(), r.status().as_u16()));
                }
                Ok(r) => {
                    let final_url = r.url().to_string();
                    let content_type = r
                        .headers()
                        .get(CONTENT_TYPE)
                        .and_then(|v| v.to_str().ok())
                        .map(ToOwned::to_owned);
                    let mut page = FetchedPage {
                        url: final_url,
                        content_type,
                        body: String::new(),
                    };
                    if !page.is_pdf() {
                        page.body = r.text().await?;
                    }
                    return Ok(page);
                }
                Err(e) => {
                    if attempt >= self.max_retries {
                        return Err(ScrapeError::Http(e));
                    }
                    let backoff = 2u64.pow(attempt);
                    sleep(Duration::from_secs(backoff)).await;
                    attempt += 1;
                }
            }
        }
    }
}
