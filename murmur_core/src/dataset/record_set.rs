use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::dataset::WindowRecord;

/// Identity of an ordered window list.
///
/// The split is a seeded shuffle of this list, so two runs hold out the same
/// windows only when their ids match.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSetId {
    pub windows: usize,
    pub hash: String,
}

impl RecordSetId {
    pub fn of(records: &[WindowRecord]) -> Self {
        let mut hasher = DefaultHasher::new();
        for record in records {
            record.path.to_string_lossy().hash(&mut hasher);
            record.label.hash(&mut hasher);
            record.offset_secs.to_bits().hash(&mut hasher);
        }

        Self {
            windows: records.len(),
            hash: format!("{:016x}", hasher.finish()),
        }
    }
}

impl fmt::Display for RecordSetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} windows, #{}", self.windows, self.hash)
    }
}
