//! Version label classification and ordering.
//!
//! - [`classifier`]: label → (maturity, normalized version), or rejection
//! - [`ordering`]: numeric, component-wise comparison of normalized versions

pub mod classifier;
pub mod ordering;

pub use classifier::{ClassifiedVersion, Maturity, extract_version};
pub use ordering::{SortableVersion, compare_versions, sort_by_version};
