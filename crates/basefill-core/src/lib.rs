//! basefill core — records, update actions, license and target rules,
//! and the search index client.

pub mod config;
pub mod error;
pub mod index;
pub mod license;
pub mod models;
pub mod targets;

/// Index holding the bibliographic records.
pub const INDEX_NAME: &str = "base";
/// Document type of those records.
pub const TYPE_NAME: &str = "record";

pub use config::AppConfig;
pub use error::{ExitCode, IndexError, IndexResult, PipelineError, Result};
pub use license::{LicenseNormalizer, TableLicenseNormalizer, coerce_unknown};
pub use models::*;
pub use targets::derive_targets;
