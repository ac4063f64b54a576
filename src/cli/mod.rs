use anyhow::Result;
use clap::{Parser, Subcommand};
use newslabel::Config;
use std::path::PathBuf;
use tracing::info;

pub mod commands;

#[derive(Parser)]
#[command(
    name = "newslabel",
    about = "Ticker resolution and model labeling for news events",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Company registry CSV (overrides REGISTRY_PATH)
    #[arg(short, long, global = true)]
    pub registry: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Resolve cleaned records to tickers and write the unlabeled table
    Resolve {
        /// JSON array of cleaned records
        #[arg(short, long)]
        input: PathBuf,

        /// Directory for resolution artifacts and the output table
        #[arg(short, long, default_value = "output")]
        output_dir: PathBuf,
    },

    /// Label resolved records that have no label yet
    Label {
        /// Directory written by `resolve`
        #[arg(short, long, default_value = "output")]
        output_dir: PathBuf,

        /// Label at most this many pending records
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Resolve then label in one go
    Run {
        /// JSON array of cleaned records
        #[arg(short, long)]
        input: PathBuf,

        /// Directory for resolution artifacts and the output table
        #[arg(short, long, default_value = "output")]
        output_dir: PathBuf,

        /// Label at most this many pending records
        #[arg(short, long)]
        limit: Option<usize>,
    },
}

/// Execute CLI command
pub async fn run(cli: Cli, mut config: Config) -> Result<()> {
    if let Some(registry) = cli.registry {
        config.registry.path = registry.display().to_string();
    }

    match cli.command {
        Commands::Resolve { input, output_dir } => {
            info!(input = %input.display(), "Resolving records");
            commands::resolve(&config, &input, &output_dir)?;
        }
        Commands::Label { output_dir, limit } => {
            info!(output_dir = %output_dir.display(), "Labeling resolved records");
            commands::label(&config, &output_dir, limit).await?;
        }
        Commands::Run {
            input,
            output_dir,
            limit,
        } => {
            info!(input = %input.display(), "Running resolution and labeling");
            commands::resolve(&config, &input, &output_dir)?;
            commands::label(&config, &output_dir, limit).await?;
        }
    }
    Ok(())
}
