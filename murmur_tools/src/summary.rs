use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use murmur_core::dataset::{Label, WindowRecord};

#[derive(Debug, Serialize)]
struct FileRow<'a> {
    audio_path: &'a str,
    label: Label,
    duration_secs: f64,
    windows: usize,
}

/// Writes one CSV row per recording with its label, duration and window count.
/// Returns the number of rows.
pub fn write_file_summary(out_path: &Path, records: &[WindowRecord]) -> Result<usize> {
    let mut files: BTreeMap<String, (Label, f64, usize)> = BTreeMap::new();
    for record in records {
        let entry = files
            .entry(record.path.to_string_lossy().to_string())
            .or_insert((record.label, record.file_duration_secs, 0));
        entry.2 += 1;
    }

    let mut writer = csv::Writer::from_path(out_path)
        .with_context(|| format!("Failed to create summary: {}", out_path.display()))?;

    for (audio_path, (label, duration_secs, windows)) in &files {
        writer.serialize(FileRow {
            audio_path,
            label: *label,
            duration_secs: *duration_secs,
            windows: *windows,
        })?;
    }
    writer.flush()?;

    log::info!("Wrote {} recordings to {}", files.len(), out_path.display());
    Ok(files.len())
}
