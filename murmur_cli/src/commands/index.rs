use anyhow::Result;

use murmur_core::PipelineConfig;
use murmur_core::dataset::{DatasetIndexer, Label};

use crate::cli::IndexArgs;

pub fn run(args: &IndexArgs, mut config: PipelineConfig) -> Result<()> {
    args.data.apply(&mut config);
    config.dataset.window.validate()?;

    let index = DatasetIndexer::new(config.dataset.clone()).index_configured()?;

    murmur_tools::write_manifest(&args.out, &index.records)?;
    if let Some(summary) = &args.summary {
        murmur_tools::write_file_summary(summary, &index.records)?;
    }

    println!(
        "{} windows (normal {}, abnormal {}) from {} of {} files",
        index.stats.total_windows(),
        index.stats.windows_for(Label::Normal),
        index.stats.windows_for(Label::Abnormal),
        index.stats.files_indexed,
        index.stats.files_seen,
    );
    Ok(())
}
