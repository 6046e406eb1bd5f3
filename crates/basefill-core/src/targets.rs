//! Which URLs of a record are worth scraping for full text.

use crate::models::RawRecord;

pub const PMC_SOURCE: &str = "PubMed Central (PMC)";
pub const PMC_PATH_SEGMENT: &str = "/pmc/";
/// PMC emits this truncated article URL for some records; it never resolves.
pub const PMC_PLACEHOLDER_URL: &str = "http://www.ncbi.nlm.nih.gov/pmc/articles/PMC";

/// Links through the DOI resolver land on publisher pages that are often
/// paywalled, so they say nothing about open access.
pub const DOI_RESOLVER: &str = "doi.org/";

pub const ORA_SOURCE: &str = "Oxford University Research Archive (ORA)";
pub const ORA_RELATION_PREFIX: &str = "uuid";
pub const ORA_OBJECT_URL: &str = "https://ora.ox.ac.uk/objects/";

/// Ordered scrape targets for a record: direct URLs first, then URLs
/// synthesized from repository relations. Never contains a DOI link.
pub fn derive_targets(record: &RawRecord) -> Vec<String> {
    let mut targets: Vec<String> = match &record.urls {
        // PMC records carry DOI-ish junk next to the real article links
        Some(urls) if record.has_source(PMC_SOURCE) => urls
            .iter()
            .filter(|url| url.contains(PMC_PATH_SEGMENT) && url.as_str() != PMC_PLACEHOLDER_URL)
            .cloned()
            .collect(),
        Some(urls) => urls.clone(),
        None => Vec::new(),
    };

    targets.retain(|url| !is_doi_url(url));

    // ORA returns object ids instead of URLs
    if record.has_source(ORA_SOURCE)
        && let Some(relations) = &record.relations
    {
        targets.extend(
            relations
                .iter()
                .filter(|rel| rel.starts_with(ORA_RELATION_PREFIX))
                .map(|rel| format!("{ORA_OBJECT_URL}{rel}")),
        );
    }

    targets
}

pub fn is_doi_url(url: &str) -> bool {
    url.contains(DOI_RESOLVER)
}
