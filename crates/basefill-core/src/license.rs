//! License string normalization.
//!
//! Raw license fields in the index are free text ("CC BY 4.0",
//! "http://creativecommons.org/licenses/by-nc/3.0/", "Public Domain", ...).
//! The pipeline only ever writes canonical tags such as `cc-by` or `pd`.

pub const UNKNOWN_LICENSE: &str = "unknown";

/// Maps a raw license string to a canonical tag.
///
/// Returns `Some("unknown")` for text that looks like a license statement but
/// matches nothing known, and `None` when there is nothing to normalize.
pub trait LicenseNormalizer: Send + Sync {
    fn normalize(&self, raw: &str) -> Option<String>;
}

/// `"unknown"` is never surfaced in a written document.
pub fn coerce_unknown(license: Option<String>) -> Option<String> {
    license.filter(|l| l != UNKNOWN_LICENSE)
}

/// Substring lookup over the text with spaces and hyphens removed.
/// Order matters: more specific patterns come before their prefixes.
const LICENSE_LOOKUPS: &[(&str, &str)] = &[
    // Publisher-specific terms
    (
        "elsevier.com/openaccess/userlicense",
        "elsevier-specific: oa user license",
    ),
    (
        "pubs.acs.org/page/policy/authorchoice_termsofuse.html",
        "acs-specific: authorchoice/editors choice usage agreement",
    ),
    // Creative Commons URLs
    ("creativecommons.org/licenses/byncnd", "cc-by-nc-nd"),
    ("creativecommons.org/licenses/byncsa", "cc-by-nc-sa"),
    ("creativecommons.org/licenses/bync", "cc-by-nc"),
    ("creativecommons.org/licenses/bynd", "cc-by-nd"),
    ("creativecommons.org/licenses/bysa", "cc-by-sa"),
    ("creativecommons.org/licenses/by", "cc-by"),
    ("creativecommons.org/publicdomain/zero", "cc0"),
    ("creativecommons.org/publicdomain/mark", "pd"),
    // Short forms
    ("ccbyncnd", "cc-by-nc-nd"),
    ("ccbyncsa", "cc-by-nc-sa"),
    ("ccbync", "cc-by-nc"),
    ("ccbynd", "cc-by-nd"),
    ("ccbysa", "cc-by-sa"),
    ("ccby", "cc-by"),
    ("cc0", "cc0"),
    // Spelled-out forms
    (
        "creativecommonsattributionnoncommercialnoderivatives",
        "cc-by-nc-nd",
    ),
    (
        "creativecommonsattributionnoncommercialnoderivs",
        "cc-by-nc-nd",
    ),
    ("creativecommonsattributionnoncommercialsharealike", "cc-by-nc-sa"),
    ("creativecommonsattributionnoncommercial", "cc-by-nc"),
    ("creativecommonsattributionnoderivatives", "cc-by-nd"),
    ("creativecommonsattributionnoderivs", "cc-by-nd"),
    ("creativecommonsattributionsharealike", "cc-by-sa"),
    ("creativecommonsattribution", "cc-by"),
    ("publicdomain", "pd"),
    // Software-style licenses occasionally attached to datasets and code
    ("mitlicense", "mit"),
    ("gnugeneralpubliclicense", "gpl"),
    ("gpl", "gpl"),
];

/// Default table-driven normalizer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TableLicenseNormalizer;

impl LicenseNormalizer for TableLicenseNormalizer {
    fn normalize(&self, raw: &str) -> Option<String> {
        let squashed: String = raw
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '-')
            .flat_map(char::to_lowercase)
            .collect();

        if squashed.is_empty() {
            return None;
        }

        let tag = LICENSE_LOOKUPS
            .iter()
            .find(|(needle, _)| squashed.contains(needle))
            .map(|(_, tag)| *tag)
            .unwrap_or(UNKNOWN_LICENSE);
        Some(tag.to_string())
    }
}
