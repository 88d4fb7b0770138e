//! Dataset loading for the V-WSD sample files.
//!
//! Each language has one tab-separated file. A line holds the target word,
//! the full target phrase, and then the candidate image file names:
//!
//! ```text
//! andromeda	andromeda tree	image.1.jpg	image.2.jpg	...
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::DatasetConfig;
use crate::error::DatasetError;

/// One evaluation instance.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Position of the sample within its language file
    pub index: usize,
    /// The ambiguous word
    pub target_word: String,
    /// The word together with its disambiguating context
    pub target_phrase: String,
    /// Candidate image identifiers, in file order
    pub candidates: Vec<String>,
    /// Resolved paths of the candidate images
    pub candidate_paths: Vec<PathBuf>,
}

impl Sample {
    /// Text field used to fill prompt templates.
    pub fn text(&self, input_type: InputType) -> &str {
        match input_type {
            InputType::TargetWord => &self.target_word,
            InputType::TargetPhrase => &self.target_phrase,
        }
    }
}

/// Which sample field is substituted into a prompt template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InputType {
    TargetWord,
    TargetPhrase,
}

impl std::fmt::Display for InputType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InputType::TargetWord => write!(f, "target word"),
            InputType::TargetPhrase => write!(f, "target phrase"),
        }
    }
}

/// Path of the sample file for `language`.
pub fn data_file(config: &DatasetConfig, data_dir: &Path, language: &str) -> PathBuf {
    data_dir.join(config.data_file_pattern.replace("{language}", language))
}

/// Load the samples of every requested language.
pub fn load_dataset(
    config: &DatasetConfig,
    data_dir: &Path,
    languages: &[String],
) -> Result<BTreeMap<String, Vec<Sample>>, DatasetError> {
    let image_dir = data_dir.join(&config.image_dir);
    let mut dataset = BTreeMap::new();

    for language in languages {
        let path = data_file(config, data_dir, language);
        if !path.exists() {
            return Err(DatasetError::NotFound(path));
        }
        let content = std::fs::read_to_string(&path).map_err(|e| DatasetError::Malformed {
            path: path.clone(),
            line: 0,
            message: e.to_string(),
        })?;
        let samples = parse_samples(&content, &path, &image_dir)?;
        tracing::info!("Loaded {} samples for {:?} from {:?}", samples.len(), language, path);
        dataset.insert(language.clone(), samples);
    }

    Ok(dataset)
}

/// Parse sample lines. Blank lines are skipped and do not consume an index.
pub fn parse_samples(
    content: &str,
    path: &Path,
    image_dir: &Path,
) -> Result<Vec<Sample>, DatasetError> {
    let mut samples = Vec::new();

    for (line_no, line) in content.lines().enumerate() {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }

        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 3 {
            return Err(DatasetError::Malformed {
                path: path.to_path_buf(),
                line: line_no + 1,
                message: format!("expected at least 3 tab-separated fields, got {}", fields.len()),
            });
        }

        let candidates: Vec<String> = fields[2..]
            .iter()
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect();
        let candidate_paths = candidates.iter().map(|c| image_dir.join(c)).collect();

        samples.push(Sample {
            index: samples.len(),
            target_word: fields[0].trim().to_string(),
            target_phrase: fields[1].trim().to_string(),
            candidates,
            candidate_paths,
        });
    }

    Ok(samples)
}
