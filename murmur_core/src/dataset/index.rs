use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use walkdir::WalkDir;

use crate::audio::probe_duration;
use crate::config::DatasetConfig;
use crate::dataset::label::{Label, classify_file_name};
use crate::dataset::slicing::window_offsets;
use crate::dataset::WindowRecord;

/// Counters gathered while indexing.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IndexStats {
    pub files_seen: usize,
    pub files_indexed: usize,
    pub too_short: usize,
    pub excluded: usize,
    pub unreadable: usize,
    pub windows: BTreeMap<Label, usize>,
}

impl IndexStats {
    pub fn total_windows(&self) -> usize {
        self.windows.values().sum()
    }

    pub fn windows_for(&self, label: Label) -> usize {
        self.windows.get(&label).copied().unwrap_or_default()
    }
}

#[derive(Clone, Debug, Default)]
pub struct DatasetIndex {
    pub records: Vec<WindowRecord>,
    pub stats: IndexStats,
}

/// Walks dataset directories and slices every usable recording into windows.
pub struct DatasetIndexer {
    config: DatasetConfig,
}

impl DatasetIndexer {
    pub fn new(config: DatasetConfig) -> Self {
        Self { config }
    }

    /// Indexes the configured directories.
    pub fn index_configured(&self) -> Result<DatasetIndex> {
        self.index(&self.config.directories)
    }

    /// Indexes `dirs` in order. Within a directory files are sorted by path.
    ///
    /// # Errors
    /// Fails when a directory can't be listed. Unreadable audio files are
    /// counted and skipped.
    pub fn index<P: AsRef<Path>>(&self, dirs: &[P]) -> Result<DatasetIndex> {
        self.config.window.validate()?;

        let mut index = DatasetIndex::default();

        for dir in dirs {
            let dir = dir.as_ref();
            let files = self.list_audio_files(dir)?;
            log::info!("{}: {} audio files", dir.display(), files.len());

            for path in files {
                index.stats.files_seen += 1;
                self.index_file(&path, &mut index);
            }
        }

        log::info!(
            "Indexed {} windows from {} files (normal {}, abnormal {}); skipped {} short, {} excluded, {} unreadable",
            index.stats.total_windows(),
            index.stats.files_indexed,
            index.stats.windows_for(Label::Normal),
            index.stats.windows_for(Label::Abnormal),
            index.stats.too_short,
            index.stats.excluded,
            index.stats.unreadable,
        );

        Ok(index)
    }

    fn index_file(&self, path: &Path, index: &mut DatasetIndex) {
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            index.stats.unreadable += 1;
            return;
        };

        let Some(label) = classify_file_name(
            file_name,
            &self.config.normal_label,
            &self.config.excluded_labels,
        ) else {
            log::debug!("{file_name}: excluded label");
            index.stats.excluded += 1;
            return;
        };

        let duration = match probe_duration(path) {
            Ok(d) => d,
            Err(e) => {
                log::warn!("{}: skipped, {e:#}", path.display());
                index.stats.unreadable += 1;
                return;
            }
        };

        let offsets = window_offsets(duration, self.config.window);
        if offsets.is_empty() {
            log::debug!("{file_name}: {duration:.2}s is shorter than one window");
            index.stats.too_short += 1;
            return;
        }

        index.stats.files_indexed += 1;
        *index.stats.windows.entry(label).or_default() += offsets.len();

        index
            .records
            .extend(offsets.into_iter().map(|offset_secs| WindowRecord {
                path: path.to_path_buf(),
                label,
                offset_secs,
                file_duration_secs: duration,
            }));
    }

    fn list_audio_files(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let max_depth = if self.config.recursive { usize::MAX } else { 1 };

        let mut files = Vec::new();
        for entry in WalkDir::new(dir).min_depth(1).max_depth(max_depth) {
            let entry =
                entry.with_context(|| format!("failed to list directory: {}", dir.display()))?;

            if entry.file_type().is_file() && self.has_audio_extension(entry.path()) {
                files.push(entry.into_path());
            }
        }

        files.sort();
        Ok(files)
    }

    fn has_audio_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .is_some_and(|e| self.config.extensions.iter().any(|allowed| *allowed == e))
    }
}
