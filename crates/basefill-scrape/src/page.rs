use std::sync::Arc;

use async_trait::async_trait;
use basefill_core::LicenseNormalizer;
use reqwest::Url;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ScrapeError};
use crate::http::{FetchedPage, PageClient};

/// What scraping one URL found.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageScrape {
    pub has_fulltext_url: bool,
    pub fulltext_url: Option<String>,
    pub scraped_pdf_url: Option<String>,
    /// Already normalized to a canonical tag (or `"unknown"`).
    pub scraped_license: Option<String>,
}

impl PageScrape {
    pub fn no_fulltext() -> Self {
        Self::default()
    }

    pub fn found(pdf_url: impl Into<String>, license: Option<String>) -> Self {
        let pdf_url = pdf_url.into();
        Self {
            has_fulltext_url: true,
            fulltext_url: Some(pdf_url.clone()),
            scraped_pdf_url: Some(pdf_url),
            scraped_license: license,
        }
    }
}

/// Decides whether a single web page exposes open full text.
///
/// Implementations are expected to be slow and fallible. Any error other
/// than [`ScrapeError::Cancelled`] is treated by callers as a soft failure
/// of the record being scraped.
#[async_trait]
pub trait PageScraper: Send + Sync {
    async fn scrape(&self, url: &str) -> Result<PageScrape>;
}

// ─── HtmlPageScraper ──────────────────────────────────────────────────────────

/// Default scraper: a PDF response is full text by itself; for HTML it looks
/// for a `citation_pdf_url` meta tag, then for a link to a `.pdf`.
pub struct HtmlPageScraper {
    client: PageClient,
    normalizer: Arc<dyn LicenseNormalizer>,
}

impl HtmlPageScraper {
    pub fn new(client: PageClient, normalizer: Arc<dyn LicenseNormalizer>) -> Self {
        Self { client, normalizer }
    }

    fn inspect(&self, page: &FetchedPage) -> Result<PageScrape> {
        if page.is_pdf() {
            return Ok(PageScrape::found(page.url.clone(), None));
        }

        let base = Url::parse(&page.url)
            .map_err(|e| ScrapeError::Parse(format!("invalid page URL {}: {e}", page.url)))?;
        let document = Html::parse_document(&page.body);

        let license = find_license(&document)?
            .and_then(|raw| self.normalizer.normalize(&raw));

        match find_pdf_link(&document, &base)? {
            Some(pdf_url) => Ok(PageScrape::found(pdf_url, license)),
            None => Ok(PageScrape {
                scraped_license: license,
                ..PageScrape::no_fulltext()
            }),
        }
    }
}

#[async_trait]
impl PageScraper for HtmlPageScraper {
    async fn scrape(&self, url: &str) -> Result<PageScrape> {
        // an unreachable page just has no full text; later targets still get tried
        let page = match self.client.fetch(url).await {
            Ok(page) => page,
            Err(e @ (ScrapeError::Status(..) | ScrapeError::RateLimit(..) | ScrapeError::Http(_))) => {
                tracing::debug!(url, error = %e, "page unavailable");
                return Ok(PageScrape::no_fulltext());
            }
            Err(e) => return Err(e),
        };
        let result = self.inspect(&page)?;
        if result.has_fulltext_url {
            tracing::debug!(url, pdf = ?result.scraped_pdf_url, "found full text link");
        }
        Ok(result)
    }
}

fn parse_selector(input: &str) -> Result<Selector> {
    Selector::parse(input)
        .map_err(|e| ScrapeError::Parse(format!("invalid selector {input}: {e}")))
}

fn find_pdf_link(document: &Html, base: &Url) -> Result<Option<String>> {
    let meta_selector = parse_selector("meta[name='citation_pdf_url']")?;
    if let Some(url) = document
        .select(&meta_selector)
        .filter_map(|m| m.value().attr("content"))
        .find_map(|href| resolve(base, href))
    {
        return Ok(Some(url));
    }

    let link_selector = parse_selector("a[href]")?;
    Ok(document
        .select(&link_selector)
        .filter(is_pdf_anchor)
        .filter_map(|a| a.value().attr("href"))
        .find_map(|href| resolve(base, href)))
}

fn is_pdf_anchor(anchor: &ElementRef<'_>) -> bool {
    let Some(href) = anchor.value().attr("href") else {
        return false;
    };
    let path = href
        .split(['?', '#'])
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();
    if path.ends_with(".pdf") {
        return true;
    }
    let label = anchor.text().collect::<String>().to_lowercase();
    label.contains("download pdf") || label.contains("full text (pdf)")
}

fn find_license(document: &Html) -> Result<Option<String>> {
    let rel_selector = parse_selector("link[rel='license'], a[rel='license']")?;
    if let Some(href) = document
        .select(&rel_selector)
        .filter_map(|el| el.value().attr("href"))
        .map(str::trim)
        .find(|href| !href.is_empty())
    {
        return Ok(Some(href.to_string()));
    }

    let meta_selector = parse_selector(
        "meta[name='DC.rights'], meta[name='dc.rights'], meta[name='dcterms.rights'], meta[name='DCTERMS.rights']",
    )?;
    Ok(document
        .select(&meta_selector)
        .filter_map(|el| el.value().attr("content"))
        .map(str::trim)
        .find(|content| !content.is_empty())
        .map(ToOwned::to_owned))
}

fn resolve(base: &Url, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with("javascript:") || href.starts_with("mailto:") {
        return None;
    }
    base.join(href).ok().map(|u| u.to_string())
}
