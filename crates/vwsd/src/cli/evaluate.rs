//! The `vwsd evaluate` command: score prediction files and log the metrics.

use std::path::PathBuf;

use clap::Args;
use vwsd_core::output::markdown_table;
use vwsd_core::{Config, Evaluator, IrEvaluator, MetricLog, MetricRecord};

/// Arguments for the `evaluate` command.
#[derive(Args, Debug)]
pub struct EvaluateArgs {
    /// Gold file with `candidate<TAB>language` lines
    #[arg(short, long)]
    pub reference: PathBuf,

    /// Directory holding `prediction.<lang>.txt` files (defaults to the inference output dir)
    #[arg(short, long)]
    pub prediction_dir: Option<PathBuf>,

    /// Language code(s) to evaluate (repeatable)
    #[arg(short, long)]
    pub language: Vec<String>,

    /// Metric log to append to
    #[arg(long)]
    pub metrics_log: Option<PathBuf>,

    /// Ranking metric, e.g. `ndcg@5` (repeatable)
    #[arg(short, long)]
    pub metric: Vec<String>,

    /// Label stored with the record (defaults to the prediction directory)
    #[arg(long)]
    pub name: Option<String>,

    /// Print the record as JSON instead of the log table
    #[arg(long)]
    pub json: bool,
}

impl EvaluateArgs {
    /// Overlay the command-line options onto `config`.
    pub fn apply(&self, config: &mut Config) {
        if let Some(dir) = &self.prediction_dir {
            config.inference.output_dir = dir.clone();
        }
        if let Some(log) = &self.metrics_log {
            config.evaluation.metrics_log = log.clone();
        }
        if !self.metric.is_empty() {
            config.evaluation.metrics = self.metric.clone();
        }
    }

    pub fn languages(&self, config: &Config) -> Vec<String> {
        if self.language.is_empty() {
            vec![config.dataset.language.clone()]
        } else {
            self.language.clone()
        }
    }
}

/// Execute the evaluate command.
pub async fn execute(args: EvaluateArgs, mut config: Config) -> anyhow::Result<()> {
    args.apply(&mut config);
    config.validate()?;

    let prediction_dir = config.inference.output_dir.clone();
    let languages = args.languages(&config);
    tracing::info!(
        "Evaluating {:?} in {} against {}",
        languages,
        prediction_dir.display(),
        args.reference.display()
    );

    let evaluator = Evaluator::new(IrEvaluator, config.evaluation.metrics.clone());
    let mut record = evaluator.evaluate_dir(&prediction_dir, &args.reference, &languages)?;
    if let Some(name) = &args.name {
        record.model = name.clone();
    }

    let log = MetricLog::new(&config.evaluation.metrics_log);
    log.append(&record)?;
    tracing::info!("Appended metrics to {:?}", log.path());

    if args.json {
        println!("{}", serde_json::to_string_pretty(&record)?);
    } else {
        print_records(&log.read_all()?);
    }

    Ok(())
}

fn print_records(records: &[MetricRecord]) {
    println!("{}", markdown_table(records));
}
