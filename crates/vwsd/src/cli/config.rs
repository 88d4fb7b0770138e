//! The `vwsd config` command: inspect, create and check the config file.

use std::path::Path;

use clap::{Args, Subcommand};
use vwsd_core::{ClipScorer, Config};

/// Arguments for the `config` command.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

/// Subcommands for configuration management.
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the effective configuration as TOML
    Show,

    /// Print the config file path
    Path,

    /// Write a config file with the default settings
    Init {
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },

    /// Validate the config file and report resolved paths and models
    Check {
        /// Languages to report models for (repeatable)
        #[arg(short, long)]
        language: Vec<String>,
    },
}

/// Execute the config command.
pub async fn execute(args: ConfigArgs) -> anyhow::Result<()> {
    let path = Config::default_path();

    match args.command {
        ConfigCommand::Show => println!("{}", Config::load()?.to_toml()?),
        ConfigCommand::Path => println!("{}", path.display()),
        ConfigCommand::Init { force } => {
            write_default(&path, force)?;
            tracing::info!("Config file created at: {}", path.display());
            println!("Configuration initialized at: {}", path.display());
        }
        ConfigCommand::Check { language } => {
            let config = if path.exists() {
                Config::load_from(&path)?
            } else {
                println!("No config file at {}; checking defaults.", path.display());
                Config::default()
            };
            let languages = if language.is_empty() {
                vec![config.dataset.language.clone()]
            } else {
                language
            };
            for line in check_report(&config, &languages) {
                println!("{line}");
            }
        }
    }

    Ok(())
}

/// Write the default config to `path`, refusing to clobber unless `force`.
fn write_default(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "Config file already exists at: {}\nUse --force to overwrite.",
            path.display()
        );
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, Config::default().to_toml()?)?;
    Ok(())
}

/// Resolved locations plus, per language, the model and whether it's installed.
fn check_report(config: &Config, languages: &[String]) -> Vec<String> {
    let mode = if config.inference.image_to_image {
        "image-to-image"
    } else {
        "text prompts"
    };
    let mut lines = vec![
        "Configuration OK".to_string(),
        format!("  data dir:    {}", config.data_dir().display()),
        format!("  model dir:   {}", config.model_dir().display()),
        format!("  output dir:  {}", config.inference.output_dir.display()),
        format!("  metrics log: {}", config.evaluation.metrics_log.display()),
        format!(
            "  queries:     {} ({} prompts × {} input types)",
            mode,
            config.inference.prompts.len(),
            config.inference.input_types.len()
        ),
    ];
    for language in languages {
        let status = if ClipScorer::model_exists(&config.model_dir_for(language)) {
            "ready"
        } else {
            "not installed"
        };
        lines.push(format!(
            "  {:4} → {:36} {}",
            language,
            config.model_for(language),
            status
        ));
    }
    lines
}
