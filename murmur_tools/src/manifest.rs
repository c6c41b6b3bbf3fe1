use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufRead, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use murmur_core::dataset::{Label, WindowRecord};

/// One JSONL line of a window manifest.
#[derive(Debug, Serialize, Deserialize)]
struct ManifestLine {
    audio_path: String,
    label: Label,
    offset_secs: f64,
    duration_secs: f64,
}

impl From<&WindowRecord> for ManifestLine {
    fn from(record: &WindowRecord) -> Self {
        Self {
            audio_path: record.path.to_string_lossy().to_string(),
            label: record.label,
            offset_secs: record.offset_secs,
            duration_secs: record.file_duration_secs,
        }
    }
}

impl From<ManifestLine> for WindowRecord {
    fn from(line: ManifestLine) -> Self {
        Self {
            path: PathBuf::from(line.audio_path),
            label: line.label,
            offset_secs: line.offset_secs,
            file_duration_secs: line.duration_secs,
        }
    }
}

/// Writes one JSON object per window. Returns the number of lines written.
pub fn write_manifest(out_path: &Path, records: &[WindowRecord]) -> Result<usize> {
    if let Some(parent) = out_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let out_file = File::create(out_path)
        .with_context(|| format!("Failed to create output: {}", out_path.display()))?;
    let mut writer = BufWriter::new(out_file);

    for record in records {
        serde_json::to_writer(&mut writer, &ManifestLine::from(record))?;
        writer.write_all(b"\n")?;
    }

    writer.flush()?;

    log::info!("Wrote {} windows to {}", records.len(), out_path.display());
    Ok(records.len())
}

/// Reads a manifest written by [`write_manifest`]. Blank lines are ignored.
pub fn read_manifest(path: &Path) -> Result<Vec<WindowRecord>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open manifest: {}", path.display()))?;

    let mut records = Vec::new();
    for (number, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read {}", path.display()))?;
        if line.trim().is_empty() {
            continue;
        }

        let parsed: ManifestLine = serde_json::from_str(&line)
            .with_context(|| format!("Failed to parse {}:{}", path.display(), number + 1))?;
        records.push(parsed.into());
    }

    log::info!("Read {} windows from {}", records.len(), path.display());
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records() -> Vec<WindowRecord> {
        vec![
            WindowRecord {
                path: PathBuf::from("datasets/set_a/normal__201101070538.wav"),
                label: Label::Normal,
                offset_secs: 0.25,
                file_duration_secs: 5.5,
            },
            WindowRecord {
                path: PathBuf::from("datasets/set_b/murmur_noisymurmur_135_1306428972976_A.wav"),
                label: Label::Abnormal,
                offset_secs: 2.0,
                file_duration_secs: 7.0,
            },
        ]
    }

    #[test]
    fn written_manifest_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifests/train.jsonl");

        assert_eq!(2, write_manifest(&path, &records()).unwrap());
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(2, text.lines().count());
        assert!(text.lines().next().unwrap().contains("\"label\":\"normal\""));

        assert_eq!(records(), read_manifest(&path).unwrap());
    }

    #[test]
    fn bad_line_reports_its_number() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.jsonl");
        std::fs::write(&path, "\n{\"nope\": 1}\n").unwrap();

        let err = read_manifest(&path).unwrap_err();
        assert!(format!("{err}").ends_with(":2"), "{err}");
    }
}
