pub mod action;
pub mod enrichment;
pub mod record;

pub use action::*;
pub use enrichment::*;
pub use record::*;
