use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use murmur_core::PipelineConfig;
use murmur_core::dataset::SplitStrategy;

/// murmur: normal/abnormal heart-sound classifier.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// TOML configuration file. Built-in defaults are used when omitted.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level: off, error, warn, info, debug, trace. `RUST_LOG` takes precedence.
    #[arg(long, global = true, default_value = "info", value_parser = clap::value_parser!(log::LevelFilter))]
    pub log_level: log::LevelFilter,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Slice the dataset into windows and write a JSONL manifest.
    Index(IndexArgs),
    /// Extract features, train the network and save the model.
    Train(TrainArgs),
    /// Reload a saved model and report on the held-out split.
    Evaluate(EvaluateArgs),
}

/// Where the windows come from.
#[derive(Args, Debug, Clone)]
pub struct DataArgs {
    /// Read windows from a manifest instead of scanning directories.
    #[arg(long, conflicts_with_all = ["data_dir", "recursive"])]
    pub manifest: Option<PathBuf>,

    /// Dataset directory. Repeat for several; replaces the configured list.
    #[arg(long = "data-dir")]
    pub data_dir: Vec<PathBuf>,

    /// Descend into subdirectories.
    #[arg(long, default_value_t = false)]
    pub recursive: bool,
}

impl DataArgs {
    pub fn apply(&self, config: &mut PipelineConfig) {
        if !self.data_dir.is_empty() {
            config.dataset.directories = self.data_dir.clone();
        }
        if self.recursive {
            config.dataset.recursive = true;
        }
    }
}

#[derive(Args, Debug)]
pub struct IndexArgs {
    #[command(flatten)]
    pub data: DataArgs,

    /// Manifest to write.
    #[arg(short, long, default_value = "windows.jsonl")]
    pub out: PathBuf,

    /// Also write a per-recording CSV summary.
    #[arg(long)]
    pub summary: Option<PathBuf>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct SplitArgs {
    /// Held-out fraction, in (0, 1).
    #[arg(long)]
    pub test_fraction: Option<f64>,

    /// Shuffle seed for the split and the epoch order.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Split windows individually or keep each recording on one side.
    #[arg(long, value_enum)]
    pub split: Option<SplitArg>,
}

impl SplitArgs {
    pub fn apply(&self, config: &mut PipelineConfig) {
        if let Some(fraction) = self.test_fraction {
            config.training.test_fraction = fraction;
        }
        if let Some(seed) = self.seed {
            config.training.seed = seed;
        }
        if let Some(split) = self.split {
            config.training.split = split.into();
        }
    }
}

#[derive(Args, Debug)]
pub struct TrainArgs {
    #[command(flatten)]
    pub data: DataArgs,

    #[command(flatten)]
    pub split: SplitArgs,

    #[arg(long)]
    pub epochs: Option<usize>,

    #[arg(long)]
    pub batch_size: Option<usize>,

    #[arg(long)]
    pub learning_rate: Option<f64>,

    /// Model path without extension.
    #[arg(long)]
    pub model_out: Option<PathBuf>,

    /// Skip writing the per-epoch history.
    #[arg(long, default_value_t = false)]
    pub no_history: bool,

    #[arg(long, value_enum, default_value_t = BackendArg::Wgpu)]
    pub backend: BackendArg,
}

impl TrainArgs {
    /// Applies command-line overrides on top of the loaded configuration.
    pub fn apply(&self, config: &mut PipelineConfig) {
        self.data.apply(config);
        self.split.apply(config);

        if let Some(epochs) = self.epochs {
            config.training.epochs = epochs;
        }
        if let Some(batch_size) = self.batch_size {
            config.training.batch_size = batch_size;
        }
        if let Some(lr) = self.learning_rate {
            config.training.learning_rate = lr;
        }
        if let Some(path) = &self.model_out {
            config.output.model_path = path.clone();
        }
        if self.no_history {
            config.output.write_history = false;
        }
    }
}

#[derive(Args, Debug)]
pub struct EvaluateArgs {
    #[command(flatten)]
    pub data: DataArgs,

    /// Overrides the split settings stored with the model.
    #[command(flatten)]
    pub split: SplitArgs,

    /// Model path without extension. Defaults to the configured output path.
    #[arg(long)]
    pub model: Option<PathBuf>,

    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Evaluate even if the windows differ from the ones the model was split on.
    #[arg(long, default_value_t = false)]
    pub allow_dataset_mismatch: bool,

    #[arg(long, value_enum, default_value_t = BackendArg::Wgpu)]
    pub backend: BackendArg,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitArg {
    Window,
    File,
}

impl From<SplitArg> for SplitStrategy {
    fn from(arg: SplitArg) -> Self {
        match arg {
            SplitArg::Window => SplitStrategy::Window,
            SplitArg::File => SplitStrategy::File,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendArg {
    /// GPU through wgpu.
    Wgpu,
    /// CPU.
    Ndarray,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn train_overrides() {
        let cli = Cli::parse_from([
            "murmur",
            "--log-level",
            "debug",
            "train",
            "--data-dir",
            "a",
            "--data-dir",
            "b",
            "--epochs",
            "5",
            "--split",
            "file",
            "--seed",
            "7",
            "--model-out",
            "out/model",
            "--backend",
            "ndarray",
        ]);
        assert_eq!(log::LevelFilter::Debug, cli.log_level);

        let Command::Train(args) = cli.command else {
            panic!("expected train");
        };
        assert_eq!(BackendArg::Ndarray, args.backend);

        let mut config = PipelineConfig::default();
        args.apply(&mut config);
        assert_eq!(vec![PathBuf::from("a"), PathBuf::from("b")], config.dataset.directories);
        assert_eq!(5, config.training.epochs);
        assert_eq!(7, config.training.seed);
        assert_eq!(SplitStrategy::File, config.training.split);
        assert_eq!(PathBuf::from("out/model"), config.output.model_path);
        assert_eq!(128, config.training.batch_size);
        assert!(config.output.write_history);
    }

    #[test]
    fn manifest_conflicts_with_directories() {
        let result = Cli::try_parse_from([
            "murmur",
            "evaluate",
            "--manifest",
            "w.jsonl",
            "--data-dir",
            "a",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn log_level_is_checked() {
        let cli = Cli::parse_from(["murmur", "index"]);
        assert_eq!(log::LevelFilter::Info, cli.log_level);

        let cli = Cli::parse_from(["murmur", "index", "--log-level", "WARN"]);
        assert_eq!(log::LevelFilter::Warn, cli.log_level);

        assert!(Cli::try_parse_from(["murmur", "--log-level", "verbose", "index"]).is_err());
    }

    #[test]
    fn config_is_global() {
        let cli = Cli::parse_from(["murmur", "index", "--config", "murmur.toml"]);
        assert_eq!(Some(PathBuf::from("murmur.toml")), cli.config);
        let Command::Index(args) = cli.command else {
            panic!("expected index");
        };
        assert_eq!(PathBuf::from("windows.jsonl"), args.out);
    }
}
