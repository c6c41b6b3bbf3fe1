//! Dataset indexing: labels from file names, centered window slicing and
//! the train/test split.

pub mod index;
pub mod label;
pub mod record_set;
pub mod slicing;
pub mod split;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub use index::{DatasetIndex, DatasetIndexer, IndexStats};
pub use label::Label;
pub use record_set::RecordSetId;
pub use slicing::{WindowSpec, window_offsets};
pub use split::{SplitStrategy, split_dataset};

/// One training example: a window of `length_secs` starting at `offset_secs`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WindowRecord {
    pub path: PathBuf,
    pub label: Label,
    pub offset_secs: f64,
    pub file_duration_secs: f64,
}
