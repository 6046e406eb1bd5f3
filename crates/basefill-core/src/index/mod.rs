//! REST client for the search index: sampled search, scroll cursor and
//! chunked bulk updates.

pub mod bulk;
pub mod client;
pub mod queries;
pub mod scroll;
pub mod search;

pub use bulk::{BulkReport, BulkWriter, DocumentFailure};
pub use client::IndexClient;
pub use queries::{BACKFILL_QUERY, SAMPLE_PAGE_SIZE, SAMPLED_QUERY};
pub use scroll::ScrollCursor;
pub use search::{Hit, SampledSelector};
