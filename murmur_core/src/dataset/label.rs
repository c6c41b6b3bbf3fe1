use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::MurmurError;

/// Binary class of a recording.
///
/// Class indices follow the sorted class names, so `Abnormal` is 0.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    Abnormal,
    Normal,
}

impl Label {
    pub const ALL: [Label; 2] = [Label::Abnormal, Label::Normal];

    pub fn index(self) -> usize {
        match self {
            Label::Abnormal => 0,
            Label::Normal => 1,
        }
    }

    pub fn from_index(index: usize) -> Result<Self, MurmurError> {
        Self::ALL
            .get(index)
            .copied()
            .ok_or(MurmurError::UnknownClass(index))
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Label::Abnormal => "abnormal",
            Label::Normal => "normal",
        }
    }

    pub fn class_names() -> Vec<String> {
        Self::ALL.iter().map(|l| l.as_str().to_string()).collect()
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Label {
    type Err = MurmurError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "abnormal" => Ok(Label::Abnormal),
            "normal" => Ok(Label::Normal),
            other => Err(MurmurError::Config(format!("unknown label: {other}"))),
        }
    }
}

/// Label key of a recording: its file name up to the first `_`.
pub fn label_key(file_name: &str) -> &str {
    file_name.split('_').next().unwrap_or(file_name)
}

/// Maps a file name onto a class, or `None` when its key is excluded.
pub fn classify_file_name(
    file_name: &str,
    normal_label: &str,
    excluded_labels: &[String],
) -> Option<Label> {
    let key = label_key(file_name);
    if excluded_labels.iter().any(|e| e == key) {
        return None;
    }

    if key == normal_label {
        Some(Label::Normal)
    } else {
        Some(Label::Abnormal)
    }
}
