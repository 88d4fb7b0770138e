//! Sub-configuration structs with defaults for the SemEval V-WSD layout.

use crate::dataset::InputType;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Placeholder that prompt templates must contain.
pub const PROMPT_PLACEHOLDER: &str = "<>";

/// The only language served by the English CLIP text tower and image queries.
pub const ENGLISH: &str = "en";

/// General settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Directory where models are stored
    pub model_dir: PathBuf,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("~/.vwsd/models"),
        }
    }
}

/// Dataset location and file naming.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    /// Root directory of the dataset
    pub data_dir: PathBuf,

    /// Sample file name; `{language}` is replaced with the language code
    pub data_file_pattern: String,

    /// Candidate image directory, relative to `data_dir`
    pub image_dir: PathBuf,

    /// Default language code
    pub language: String,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("dataset"),
            data_file_pattern: "{language}.test.data.v1.1.txt".to_string(),
            image_dir: PathBuf::from("test_images_resized"),
            language: "en".to_string(),
        }
    }
}

/// Inference driver settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    /// Model for English, a directory under `general.model_dir`
    pub model: String,

    /// Model for every other language (multilingual text tower)
    pub multilingual_model: String,

    /// Texts or images per encoder call
    pub batch_size: usize,

    /// Prompt templates; each must contain `<>`
    pub prompts: Vec<String>,

    /// Sample fields substituted into the prompt templates
    pub input_types: Vec<InputType>,

    /// Where predictions and full results are written
    pub output_dir: PathBuf,

    /// Multiplier applied to cosine similarity
    pub logit_scale: f32,

    /// Rank against pre-generated query images instead of prompts (English only)
    pub image_to_image: bool,

    /// Directory of query images for image-to-image mode
    pub query_dir: PathBuf,

    /// Query image file name; each `{}` is replaced with the sample index plus `index_offset`
    pub query_pattern: String,

    /// Offset added to the sample index when resolving query images
    pub index_offset: i64,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            model: "clip-vit-base-patch32".to_string(),
            multilingual_model: "clip-vit-base-patch32-multilingual".to_string(),
            batch_size: 16,
            prompts: [
                PROMPT_PLACEHOLDER,
                "This is <>.",
                "Example of an image caption that explains <>.",
            ]
            .iter()
            .map(|p| p.to_string())
            .collect(),
            input_types: vec![InputType::TargetWord, InputType::TargetPhrase],
            output_dir: PathBuf::from("result"),
            logit_scale: 100.0,
            image_to_image: false,
            query_dir: PathBuf::from("image"),
            query_pattern: "generated_{}.jpg".to_string(),
            index_offset: 0,
        }
    }
}

/// Evaluator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    /// Append-only JSONL log of metric records
    pub metrics_log: PathBuf,

    /// Metrics computed by the ranking evaluator, e.g. "ndcg@5"
    pub metrics: Vec<String>,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            metrics_log: PathBuf::from("rank_metrics.jsonl"),
            metrics: ["hit_rate@1", "map@5", "mrr@5", "ndcg@5", "map@10", "mrr@10", "ndcg@10"]
                .iter()
                .map(|m| m.to_string())
                .collect(),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: error, warn, info, debug, trace
    pub level: String,

    /// Log format: "pretty" or "json"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}
