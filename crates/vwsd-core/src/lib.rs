//! vwsd Core - ranking and evaluation for Visual Word-Sense Disambiguation.
//!
//! Given a target word or phrase and a set of candidate images, candidates are
//! ranked by a vision-language similarity model, and the rankings are scored
//! against gold references with standard IR metrics.
//!
//! # Architecture
//!
//! ```text
//! Dataset → Queries (prompts | query image) → SimilarityScorer → Ranking → prediction/full_result
//! prediction + gold → official MRR/Hit@1 + RankingEvaluator → MetricRecord → metrics log
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use vwsd_core::{ClipScorer, Config, InferenceDriver, InferenceOptions};
//!
//! let config = Config::load()?;
//! let scorer = ClipScorer::load(&config.model_dir_for("en"), config.inference.logit_scale)?;
//! let driver = InferenceDriver::new(&scorer, InferenceOptions::from_config(&config, "en", None))?;
//! let results = driver.run_language("en", &samples, |_| {})?;
//! // one directory per (prompt, input type), e.g. `mask.target_word/`
//! let dirs = results.write(&config.inference.output_dir)?;
//! ```

// Module declarations
pub mod config;
pub mod dataset;
pub mod error;
pub mod evaluation;
pub mod inference;
pub mod math;
pub mod output;
pub mod ranking;
pub mod similarity;
pub mod visualize;

// Re-exports for convenient access
pub use config::Config;
pub use dataset::{load_dataset, InputType, Sample};
pub use error::{ConfigError, DatasetError, EvalError, Result, SimilarityError, VwsdError};
pub use evaluation::{Evaluator, IrEvaluator, MetricRecord, RankingEvaluator};
pub use inference::{InferenceDriver, InferenceOptions, LanguageResults, QueryMode, VariantResult};
pub use output::MetricLog;
pub use ranking::{rank_candidates, Ranking};
pub use similarity::{ClipScorer, Query, SimilarityScorer};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
