use anyhow::Result;
use clap::Parser;

use murmur_core::PipelineConfig;
use murmur_core::config::load_config;

mod cli;
mod commands;

use cli::{Cli, Command};

fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(cli.log_level)
        .parse_default_env()
        .init();

    let config = match &cli.config {
        Some(path) => {
            log::info!("Loading config {}", path.display());
            load_config(path)?
        }
        None => PipelineConfig::default(),
    };

    match cli.command {
        Command::Index(args) => commands::index::run(&args, config),
        Command::Train(args) => commands::train::run(&args, config),
        Command::Evaluate(args) => commands::evaluate::run(&args, config),
    }
}
