//! vwsd CLI - rank candidate images for Visual Word-Sense Disambiguation and
//! score the rankings.
//!
//! # Usage
//!
//! ```bash
//! # Download the default CLIP model
//! vwsd models download
//!
//! # Rank candidates for English with two prompt templates
//! vwsd infer --data-dir dataset --prompt "<>" --prompt "a photo of <>" --output-dir result/clip
//!
//! # Rank against pre-generated query images
//! vwsd infer --image-to-image --query-dir image --query-pattern "generated_{}.jpg"
//!
//! # Score the predictions and append to the metrics log
//! vwsd evaluate --prediction-dir result/clip --reference all.gold.txt
//! ```

use clap::{Parser, Subcommand};

mod cli;
mod logging;

/// vwsd - CLIP ranking and IR evaluation for Visual Word-Sense Disambiguation.
#[derive(Parser, Debug)]
#[command(name = "vwsd")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Rank each sample's candidate images and write predictions
    Infer(cli::infer::InferArgs),

    /// Score predictions against gold references
    Evaluate(cli::evaluate::EvaluateArgs),

    /// Manage CLIP models (download, list, etc.)
    Models(cli::models::ModelsArgs),

    /// View and manage configuration
    Config(cli::config::ConfigArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logging isn't initialized yet, so config warnings go through eprintln.
    let config = match vwsd_core::Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!(
                "Warning: Failed to load config: {e}\n  \
                 Using default configuration. Check your config file with `vwsd config path`."
            );
            vwsd_core::Config::default()
        }
    };
    logging::init_from_config(&config, cli.verbose, cli.json_logs);

    tracing::debug!("vwsd v{}", vwsd_core::VERSION);

    match cli.command {
        Commands::Infer(args) => cli::infer::execute(args, config).await,
        Commands::Evaluate(args) => cli::evaluate::execute(args, config).await,
        Commands::Models(args) => cli::models::execute(args, config).await,
        Commands::Config(args) => cli::config::execute(args).await,
    }
}
