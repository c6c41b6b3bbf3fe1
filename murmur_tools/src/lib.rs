//! Window manifests and per-recording summaries.

pub mod manifest;
pub mod summary;

pub use manifest::{read_manifest, write_manifest};
pub use summary::write_file_summary;
