//! Duplicate detection and merging.
//!
//! - [`DuplicateGrouper`] fingerprints assets in parallel and groups equal
//!   content
//! - [`DuplicateGroup`] is one set of identical assets, survivor first
//! - [`merge_duplicates`] deletes every non-survivor and records it

pub mod grouper;
pub mod groups;
pub mod merge;

pub use grouper::{DuplicateGrouper, GroupError, GrouperConfig, GroupingReport, GroupingStats};
pub use groups::DuplicateGroup;
pub use merge::{merge_duplicates, MergeError, MergeReport};
