//! The `vwsd infer` command: rank candidate images and write predictions.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Instant;

use clap::{Args, ValueEnum};
use vwsd_core::{load_dataset, ClipScorer, Config, InferenceDriver, InferenceOptions, InputType};

/// Arguments for the `infer` command. Unset options fall back to the config file.
#[derive(Args, Debug, Default)]
pub struct InferArgs {
    /// Dataset root directory
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Language code(s) to process (repeatable)
    #[arg(short, long)]
    pub language: Vec<String>,

    /// English model name under the model directory
    #[arg(short, long)]
    pub model: Option<String>,

    /// Model used for languages other than English
    #[arg(long)]
    pub multilingual_model: Option<String>,

    /// Directory for prediction and full-result files
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Prompt template containing `<>` (repeatable)
    #[arg(short, long)]
    pub prompt: Vec<String>,

    /// Sample field substituted into prompts (repeatable)
    #[arg(long, value_enum)]
    pub input_type: Vec<InputTypeArg>,

    /// Texts or images per encoder call
    #[arg(short, long)]
    pub batch_size: Option<usize>,

    /// Render a similarity plot per sample into `<output_dir>/visualization`
    #[arg(long)]
    pub plot: bool,

    /// Rank against pre-generated query images instead of prompts (English only)
    #[arg(long)]
    pub image_to_image: bool,

    /// Directory of query images (image-to-image mode)
    #[arg(long)]
    pub query_dir: Option<PathBuf>,

    /// Query image file name, `{}` is replaced with the sample index
    #[arg(long)]
    pub query_pattern: Option<String>,

    /// Offset added to the sample index when resolving query images
    #[arg(long, allow_hyphen_values = true)]
    pub index_offset: Option<i64>,
}

/// Sample field used in prompts.
#[derive(Clone, Copy, Debug, PartialEq, ValueEnum)]
pub enum InputTypeArg {
    /// The ambiguous target word
    TargetWord,
    /// The short phrase containing the target word
    TargetPhrase,
}

impl From<InputTypeArg> for InputType {
    fn from(arg: InputTypeArg) -> Self {
        match arg {
            InputTypeArg::TargetWord => InputType::TargetWord,
            InputTypeArg::TargetPhrase => InputType::TargetPhrase,
        }
    }
}

impl InferArgs {
    /// Overlay the command-line options onto `config`.
    pub fn apply(&self, config: &mut Config) {
        let dataset = &mut config.dataset;
        if let Some(dir) = &self.data_dir {
            dataset.data_dir = dir.clone();
        }

        let inference = &mut config.inference;
        if let Some(model) = &self.model {
            inference.model = model.clone();
        }
        if let Some(model) = &self.multilingual_model {
            inference.multilingual_model = model.clone();
        }
        if self.image_to_image {
            inference.image_to_image = true;
        }
        if let Some(dir) = &self.output_dir {
            inference.output_dir = dir.clone();
        }
        if !self.prompt.is_empty() {
            inference.prompts = self.prompt.clone();
        }
        if !self.input_type.is_empty() {
            inference.input_types = self.input_type.iter().map(|&t| t.into()).collect();
        }
        if let Some(batch_size) = self.batch_size {
            inference.batch_size = batch_size;
        }
        if let Some(dir) = &self.query_dir {
            inference.query_dir = dir.clone();
        }
        if let Some(pattern) = &self.query_pattern {
            inference.query_pattern = pattern.clone();
        }
        if let Some(offset) = self.index_offset {
            inference.index_offset = offset;
        }
    }

    /// Languages to process, defaulting to the configured one.
    pub fn languages(&self, config: &Config) -> Vec<String> {
        if self.language.is_empty() {
            vec![config.dataset.language.clone()]
        } else {
            self.language.clone()
        }
    }
}

/// Execute the infer command.
pub async fn execute(args: InferArgs, mut config: Config) -> anyhow::Result<()> {
    args.apply(&mut config);
    config.validate()?;

    let languages = args.languages(&config);
    let output_dir = config.inference.output_dir.clone();
    let plot_dir = args.plot.then(|| output_dir.join("visualization"));

    let datasets = load_dataset(&config.dataset, &config.data_dir(), &languages)?;
    let total: usize = datasets.values().map(Vec::len).sum();
    tracing::info!(
        "Loaded {} samples across {} language(s)",
        total,
        datasets.len()
    );

    let mut scorers: BTreeMap<String, ClipScorer> = BTreeMap::new();
    for language in datasets.keys() {
        let name = config.model_for(language);
        if scorers.contains_key(name) {
            continue;
        }
        let model_dir = config.model_dir_for(language);
        if !ClipScorer::model_exists(&model_dir) {
            anyhow::bail!(
                "Model '{}' for language '{}' not found at {}\nRun `vwsd models download -l {}` first.",
                name,
                language,
                model_dir.display(),
                language
            );
        }
        let scorer = ClipScorer::load(&model_dir, config.inference.logit_scale)?;
        scorers.insert(name.to_string(), scorer);
    }

    let progress = create_progress_bar(total as u64);
    let start_time = Instant::now();
    let mut written = 0;
    let mut skipped = 0;

    for (language, samples) in &datasets {
        let Some(scorer) = scorers.get(config.model_for(language)) else {
            anyhow::bail!("No model loaded for language '{}'", language);
        };
        let options = InferenceOptions::from_config(&config, language, plot_dir.clone());
        let driver = InferenceDriver::new(scorer, options)?;

        progress.set_message(language.clone());
        let results = driver.run_language(language, samples, |_| progress.inc(1))?;
        for dir in results.write(&output_dir)? {
            tracing::debug!("{}: wrote {:?}", language, dir);
        }
        written += results.samples.len();
        skipped += results.skipped;
    }

    progress.finish_with_message("done");

    let elapsed = start_time.elapsed();
    eprintln!();
    eprintln!("  Ranked:   {:>8}", written);
    if skipped > 0 {
        eprintln!("  Skipped:  {:>8}", skipped);
    }
    eprintln!("  Duration: {:>7.1}s", elapsed.as_secs_f64());
    eprintln!("  Output:   {}", output_dir.display());

    Ok(())
}

fn create_progress_bar(total: u64) -> indicatif::ProgressBar {
    use indicatif::{ProgressBar, ProgressStyle};

    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}",
            )
            .unwrap()
            .progress_chars("##-"),
    );
    pb.set_message("starting...");
    pb
}
