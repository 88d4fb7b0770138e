//! The inference driver: ranks every sample's candidates with a scorer.
//!
//! In text mode each (input type, prompt template) pair is one query variant;
//! in image-to-image mode a pre-generated query image is looked up per sample.
//! Every variant keeps its own ranking and is written to its own directory,
//! so prompt templates can be evaluated against each other.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use crate::config::{validate_prompts, Config, ENGLISH, PROMPT_PLACEHOLDER};
use crate::dataset::{InputType, Sample};
use crate::error::{ConfigError, Result, SimilarityError};
use crate::output::{self, FullResultRow, IMAGE_QUERY_DIR};
use crate::ranking::{rank_candidates, Ranking};
use crate::similarity::{Query, SimilarityScorer};
use crate::visualize;

/// Where queries come from.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryMode {
    /// Prompt templates filled with sample fields
    Text {
        prompts: Vec<String>,
        input_types: Vec<InputType>,
    },
    /// One query image per sample, `<query_dir>/<pattern>` with `{}` → index + offset
    Image {
        query_dir: PathBuf,
        pattern: String,
        index_offset: i64,
    },
}

/// Options for one inference run.
#[derive(Debug, Clone)]
pub struct InferenceOptions {
    pub mode: QueryMode,
    pub batch_size: usize,
    /// Root directory for similarity plots (usually `<output_dir>/visualization`)
    pub plot_dir: Option<PathBuf>,
}

impl InferenceOptions {
    /// Build options for `language` from the inference config.
    ///
    /// Image queries are only paired with the English model; other languages
    /// fall back to text prompts.
    pub fn from_config(config: &Config, language: &str, plot_dir: Option<PathBuf>) -> Self {
        let inference = &config.inference;
        let image_to_image = if inference.image_to_image && language != ENGLISH {
            tracing::warn!(
                "Image-to-image mode only supports English; using text prompts for {}",
                language
            );
            false
        } else {
            inference.image_to_image
        };

        let mode = if image_to_image {
            QueryMode::Image {
                query_dir: inference.query_dir.clone(),
                pattern: inference.query_pattern.clone(),
                index_offset: inference.index_offset,
            }
        } else {
            QueryMode::Text {
                prompts: inference.prompts.clone(),
                input_types: inference.input_types.clone(),
            }
        };
        Self {
            mode,
            batch_size: inference.batch_size,
            plot_dir,
        }
    }
}

/// One query variant's ranking of a sample.
#[derive(Debug, Clone)]
pub struct VariantResult {
    /// Output directory name of the variant
    pub dir: String,
    pub row: FullResultRow,
}

/// The outcome for one sample.
#[derive(Debug, Clone)]
pub struct SampleResult {
    pub index: usize,
    pub variants: Vec<VariantResult>,
}

/// Everything produced for one language.
#[derive(Debug, Clone, Default)]
pub struct LanguageResults {
    pub language: String,
    pub samples: Vec<SampleResult>,
    /// Samples skipped for a missing query image
    pub skipped: usize,
}

impl LanguageResults {
    /// Full-result rows grouped by variant directory, in sample order.
    pub fn rows_by_variant(&self) -> BTreeMap<&str, Vec<&FullResultRow>> {
        let mut groups: BTreeMap<&str, Vec<&FullResultRow>> = BTreeMap::new();
        for sample in &self.samples {
            for variant in &sample.variants {
                groups.entry(variant.dir.as_str()).or_default().push(&variant.row);
            }
        }
        groups
    }

    /// Ranked candidate ids per variant directory, one entry per processed sample.
    pub fn predictions(&self) -> BTreeMap<&str, Vec<Vec<String>>> {
        self.rows_by_variant()
            .into_iter()
            .map(|(dir, rows)| (dir, rows.iter().map(|r| r.ranking.clone()).collect()))
            .collect()
    }

    /// Write `prediction.<lang>.txt` and `full_result.<lang>.csv` into
    /// `<output_dir>/<variant>/` for every variant. Returns the directories written.
    pub fn write(&self, output_dir: &Path) -> Result<Vec<PathBuf>> {
        let mut written = Vec::new();

        for (dir, rows) in self.rows_by_variant() {
            let variant_dir = output_dir.join(dir);
            std::fs::create_dir_all(&variant_dir)?;

            let predictions: Vec<Vec<String>> = rows.iter().map(|r| r.ranking.clone()).collect();
            let prediction_path = output::prediction_path(&variant_dir, &self.language);
            output::write_predictions(
                BufWriter::new(File::create(&prediction_path)?),
                &predictions,
            )?;

            let rows: Vec<FullResultRow> = rows.into_iter().cloned().collect();
            let full_path = output::full_result_path(&variant_dir, &self.language);
            output::write_full_results(BufWriter::new(File::create(&full_path)?), &rows)?;

            tracing::info!(
                "{}: wrote {} predictions to {:?}",
                self.language,
                predictions.len(),
                variant_dir
            );
            written.push(variant_dir);
        }

        Ok(written)
    }
}

/// Drives a [`SimilarityScorer`] over dataset samples, one at a time.
pub struct InferenceDriver<'a, S: SimilarityScorer> {
    scorer: &'a S,
    options: InferenceOptions,
}

impl<'a, S: SimilarityScorer> InferenceDriver<'a, S> {
    /// Create a driver, rejecting prompt templates without `<>`.
    pub fn new(scorer: &'a S, options: InferenceOptions) -> Result<Self> {
        if options.batch_size == 0 {
            return Err(ConfigError::ValidationError("batch_size must be > 0".into()).into());
        }
        if let QueryMode::Text {
            prompts,
            input_types,
        } = &options.mode
        {
            if prompts.is_empty() || input_types.is_empty() {
                return Err(ConfigError::ValidationError(
                    "text mode needs at least one prompt and one input type".into(),
                )
                .into());
            }
            validate_prompts(prompts)?;
        }
        Ok(Self { scorer, options })
    }

    /// Query image path for a sample in image-to-image mode.
    pub fn query_image_path(query_dir: &Path, pattern: &str, index: usize, offset: i64) -> PathBuf {
        let number = index as i64 + offset;
        query_dir.join(pattern.replace("{}", &number.to_string()))
    }

    /// Plot location: `<root>/<lang>/similarity.<n>.png`, or under
    /// `<root>/image_to_image/` for image queries.
    pub fn plot_path(&self, root: &Path, language: &str, index: usize) -> PathBuf {
        let root = match self.options.mode {
            QueryMode::Text { .. } => root.to_path_buf(),
            QueryMode::Image { .. } => root.join("image_to_image"),
        };
        root.join(language).join(format!("similarity.{index}.png"))
    }

    /// Rank every sample of one language. `on_sample` is called after each sample.
    pub fn run_language(
        &self,
        language: &str,
        samples: &[Sample],
        mut on_sample: impl FnMut(&Sample),
    ) -> Result<LanguageResults> {
        let mut results = LanguageResults {
            language: language.to_string(),
            ..Default::default()
        };

        for sample in samples {
            match self.run_sample(language, sample)? {
                Some(result) => results.samples.push(result),
                None => results.skipped += 1,
            }
            on_sample(sample);
        }

        if results.skipped > 0 {
            tracing::warn!(
                "{}: skipped {} of {} samples with no query image",
                language,
                results.skipped,
                samples.len()
            );
        }
        Ok(results)
    }

    /// Rank one sample. Returns `None` when its query image is missing.
    pub fn run_sample(&self, language: &str, sample: &Sample) -> Result<Option<SampleResult>> {
        let (query, variants) = match &self.options.mode {
            QueryMode::Text {
                prompts,
                input_types,
            } => {
                let mut texts = Vec::new();
                let mut variants = Vec::new();
                for &input_type in input_types {
                    for prompt in prompts {
                        let text = prompt.replace(PROMPT_PLACEHOLDER, sample.text(input_type));
                        texts.push(text.clone());
                        variants.push(Variant::Text {
                            text,
                            input_type,
                            prompt: prompt.clone(),
                        });
                    }
                }
                (Query::Texts(texts), variants)
            }
            QueryMode::Image {
                query_dir,
                pattern,
                index_offset,
            } => {
                let path = Self::query_image_path(query_dir, pattern, sample.index, *index_offset);
                if !path.exists() {
                    tracing::warn!("Query image not found for sample {}: {:?}", sample.index, path);
                    return Ok(None);
                }
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                (Query::Image(path), vec![Variant::Image { name }])
            }
        };

        let scores = self
            .scorer
            .score(&query, &sample.candidate_paths, self.options.batch_size)?;
        check_shape(&scores, query.len(), sample.candidates.len())?;

        let rankings: Vec<Ranking> = scores
            .iter()
            .map(|row| rank_candidates(&sample.candidates, row))
            .collect();
        tracing::debug!(
            "Sample {} ({:?}): best {:?}",
            sample.index,
            sample.target_phrase,
            rankings.first().and_then(Ranking::best)
        );

        if let Some(root) = &self.options.plot_dir {
            let plot_path = self.plot_path(root, language, sample.index);
            if let Err(e) = visualize::render_similarity(sample, &rankings, &plot_path) {
                tracing::warn!("Failed to render plot for sample {}: {e}", sample.index);
            }
        }

        let variants = rankings
            .into_iter()
            .zip(variants)
            .map(|(ranking, variant)| variant.into_result(language, sample.index, ranking))
            .collect();

        Ok(Some(SampleResult {
            index: sample.index,
            variants,
        }))
    }
}

/// Reject score matrices that are not `queries × candidates`.
fn check_shape(scores: &[Vec<f32>], queries: usize, candidates: usize) -> Result<()> {
    let bad_row = scores.iter().position(|row| row.len() != candidates);
    if scores.len() != queries || bad_row.is_some() {
        return Err(SimilarityError::Model {
            message: format!(
                "Scorer returned {} rows (row lengths {:?}), expected {} × {}",
                scores.len(),
                scores.iter().map(Vec::len).collect::<Vec<_>>(),
                queries,
                candidates
            ),
        }
        .into());
    }
    Ok(())
}

enum Variant {
    Text {
        text: String,
        input_type: InputType,
        prompt: String,
    },
    Image {
        name: String,
    },
}

impl Variant {
    fn into_result(self, language: &str, index: usize, ranking: Ranking) -> VariantResult {
        let mut row = FullResultRow {
            language: language.to_string(),
            index,
            ranking: ranking.candidates,
            relevance: ranking.scores,
            text: None,
            input_type: None,
            prompt: None,
            query_image: None,
        };
        let dir = match self {
            Variant::Text {
                text,
                input_type,
                prompt,
            } => {
                let dir = output::variant_dir(&prompt, input_type);
                row.text = Some(text);
                row.input_type = Some(input_type.to_string());
                row.prompt = Some(prompt);
                dir
            }
            Variant::Image { name } => {
                row.query_image = Some(name);
                row.input_type = Some("image_query".to_string());
                row.prompt = Some("image_to_image".to_string());
                IMAGE_QUERY_DIR.to_string()
            }
        };
        VariantResult { dir, row }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{SimilarityResult, VwsdError};
    use std::cell::RefCell;

    /// Scores candidate j as `weights[j] + row`, recording every call.
    struct FixedScorer {
        weights: Vec<f32>,
        calls: RefCell<Vec<(Query, usize)>>,
    }

    impl FixedScorer {
        fn new(weights: &[f32]) -> Self {
            Self {
                weights: weights.to_vec(),
                calls: RefCell::new(vec![]),
            }
        }
    }

    impl SimilarityScorer for FixedScorer {
        fn score(
            &self,
            query: &Query,
            candidates: &[PathBuf],
            batch_size: usize,
        ) -> SimilarityResult<Vec<Vec<f32>>> {
            self.calls.borrow_mut().push((query.clone(), batch_size));
            Ok((0..query.len())
                .map(|row| {
                    candidates
                        .iter()
                        .enumerate()
                        .map(|(j, _)| self.weights[j] + row as f32)
                        .collect()
                })
                .collect())
        }
    }

    /// Returns the same matrix for every call, whatever the query.
    struct MatrixScorer(Vec<Vec<f32>>);

    impl SimilarityScorer for MatrixScorer {
        fn score(&self, _: &Query, _: &[PathBuf], _: usize) -> SimilarityResult<Vec<Vec<f32>>> {
            Ok(self.0.clone())
        }
    }

    fn sample(index: usize) -> Sample {
        let candidates: Vec<String> = ["a.jpg", "b.jpg", "c.jpg"].iter().map(|s| s.to_string()).collect();
        Sample {
            index,
            target_word: "bank".into(),
            target_phrase: "river bank".into(),
            candidate_paths: candidates.iter().map(PathBuf::from).collect(),
            candidates,
        }
    }

    fn text_options(prompts: &[&str], input_types: &[InputType]) -> InferenceOptions {
        InferenceOptions {
            mode: QueryMode::Text {
                prompts: prompts.iter().map(|p| p.to_string()).collect(),
                input_types: input_types.to_vec(),
            },
            batch_size: 8,
            plot_dir: None,
        }
    }

    fn image_options(query_dir: &Path) -> InferenceOptions {
        InferenceOptions {
            mode: QueryMode::Image {
                query_dir: query_dir.to_path_buf(),
                pattern: "generated_{}.jpg".into(),
                index_offset: 1,
            },
            batch_size: 4,
            plot_dir: None,
        }
    }

    #[test]
    fn test_text_mode_builds_one_variant_per_prompt() {
        let scorer = FixedScorer::new(&[0.1, 0.9, 0.5]);
        let options = text_options(
            &["<>", "a photo of <>"],
            &[InputType::TargetWord, InputType::TargetPhrase],
        );
        let driver = InferenceDriver::new(&scorer, options).unwrap();

        let result = driver.run_sample("en", &sample(0)).unwrap().unwrap();
        let dirs: Vec<&str> = result.variants.iter().map(|v| v.dir.as_str()).collect();
        assert_eq!(
            dirs,
            vec![
                "mask.target_word",
                "a_photo_of_mask.target_word",
                "mask.target_phrase",
                "a_photo_of_mask.target_phrase",
            ]
        );
        let rows: Vec<&FullResultRow> = result.variants.iter().map(|v| &v.row).collect();
        assert_eq!(rows[0].ranking, vec!["b.jpg", "c.jpg", "a.jpg"]);
        assert_eq!(rows[1].text.as_deref(), Some("a photo of bank"));
        assert_eq!(rows[2].input_type.as_deref(), Some("target phrase"));
        assert_eq!(rows[3].prompt.as_deref(), Some("a photo of <>"));

        let calls = scorer.calls.borrow();
        assert_eq!(
            calls[0].0,
            Query::Texts(vec![
                "bank".into(),
                "a photo of bank".into(),
                "river bank".into(),
                "a photo of river bank".into(),
            ])
        );
        assert_eq!(calls[0].1, 8);
    }

    #[test]
    fn test_each_prompt_keeps_its_own_ranking() {
        let dir = tempfile::tempdir().unwrap();
        let scorer = MatrixScorer(vec![vec![3.0, 2.0, 1.0], vec![1.0, 2.0, 3.0]]);
        let options = text_options(&["<>", "This is <>."], &[InputType::TargetWord]);
        let driver = InferenceDriver::new(&scorer, options).unwrap();

        let results = driver.run_language("en", &[sample(0)], |_| {}).unwrap();
        let written = results.write(dir.path()).unwrap();
        assert_eq!(
            written,
            vec![
                dir.path().join("This_is_mask..target_word"),
                dir.path().join("mask.target_word"),
            ]
        );

        let read = |variant: &str| {
            output::read_predictions(&output::prediction_path(&dir.path().join(variant), "en"))
                .unwrap()
        };
        assert_eq!(read("mask.target_word"), vec![vec!["a.jpg", "b.jpg", "c.jpg"]]);
        assert_eq!(
            read("This_is_mask..target_word"),
            vec![vec!["c.jpg", "b.jpg", "a.jpg"]]
        );
        assert!(!output::prediction_path(dir.path(), "en").exists());
    }

    #[test]
    fn test_prompt_without_placeholder_is_rejected() {
        let scorer = FixedScorer::new(&[0.0]);
        let options = text_options(&["a photo"], &[InputType::TargetWord]);
        let err = InferenceDriver::new(&scorer, options).err().unwrap();
        assert!(matches!(err, VwsdError::Config(_)));
    }

    #[test]
    fn test_zero_batch_size_is_rejected() {
        let scorer = FixedScorer::new(&[0.0]);
        let mut options = text_options(&["<>"], &[InputType::TargetWord]);
        options.batch_size = 0;
        assert!(InferenceDriver::new(&scorer, options).is_err());
    }

    #[test]
    fn test_short_score_row_is_rejected() {
        let scorer = MatrixScorer(vec![vec![0.3, 0.2]]);
        let driver =
            InferenceDriver::new(&scorer, text_options(&["<>"], &[InputType::TargetWord])).unwrap();
        let err = driver.run_sample("en", &sample(0)).unwrap_err();
        assert!(matches!(err, VwsdError::Similarity(SimilarityError::Model { .. })));
    }

    #[test]
    fn test_missing_score_row_is_rejected() {
        let scorer = MatrixScorer(vec![vec![0.3, 0.2, 0.1]]);
        let options = text_options(&["<>", "This is <>."], &[InputType::TargetWord]);
        let driver = InferenceDriver::new(&scorer, options).unwrap();
        assert!(driver.run_sample("en", &sample(0)).is_err());
    }

    #[test]
    fn test_image_mode_skips_missing_query() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("generated_1.jpg"), b"").unwrap();

        let scorer = FixedScorer::new(&[0.3, 0.2, 0.1]);
        let driver = InferenceDriver::new(&scorer, image_options(dir.path())).unwrap();

        let mut seen = 0;
        let results = driver
            .run_language("en", &[sample(0), sample(1)], |_| seen += 1)
            .unwrap();

        assert_eq!(seen, 2);
        assert_eq!(results.skipped, 1);
        assert_eq!(results.samples.len(), 1);
        assert_eq!(results.samples[0].index, 0);

        let variant = &results.samples[0].variants[0];
        assert_eq!(variant.dir, IMAGE_QUERY_DIR);
        assert_eq!(variant.row.query_image.as_deref(), Some("generated_1.jpg"));
        assert_eq!(
            scorer.calls.borrow()[0].0,
            Query::Image(dir.path().join("generated_1.jpg"))
        );
    }

    #[test]
    fn test_image_mode_ignores_prompts() {
        let mut config = Config::default();
        config.inference.image_to_image = true;
        config.inference.prompts = vec!["x".into()];
        assert!(config.validate().is_ok());

        let scorer = FixedScorer::new(&[0.0]);
        let options = InferenceOptions::from_config(&config, "en", None);
        assert!(matches!(options.mode, QueryMode::Image { .. }));
        assert!(InferenceDriver::new(&scorer, options).is_ok());
    }

    #[test]
    fn test_non_english_falls_back_to_text_mode() {
        let mut config = Config::default();
        config.inference.image_to_image = true;

        let options = InferenceOptions::from_config(&config, "fa", None);
        assert_eq!(
            options.mode,
            QueryMode::Text {
                prompts: config.inference.prompts.clone(),
                input_types: config.inference.input_types.clone(),
            }
        );
    }

    #[test]
    fn test_query_image_path_offset() {
        let path = InferenceDriver::<FixedScorer>::query_image_path(
            Path::new("img"),
            "q_{}.png",
            5,
            -2,
        );
        assert_eq!(path, PathBuf::from("img/q_3.png"));
    }

    #[test]
    fn test_plot_paths() {
        let scorer = FixedScorer::new(&[0.0]);
        let root = Path::new("result/visualization");

        let text = InferenceDriver::new(&scorer, text_options(&["<>"], &[InputType::TargetWord]))
            .unwrap();
        assert_eq!(
            text.plot_path(root, "it", 4),
            PathBuf::from("result/visualization/it/similarity.4.png")
        );

        let image = InferenceDriver::new(&scorer, image_options(Path::new("img"))).unwrap();
        assert_eq!(
            image.plot_path(root, "en", 4),
            PathBuf::from("result/visualization/image_to_image/en/similarity.4.png")
        );
    }

    #[test]
    fn test_results_written_per_variant() {
        let dir = tempfile::tempdir().unwrap();
        let scorer = FixedScorer::new(&[0.5, 0.5, 0.9]);
        let driver =
            InferenceDriver::new(&scorer, text_options(&["<>"], &[InputType::TargetPhrase]))
                .unwrap();

        let results = driver
            .run_language("it", &[sample(0), sample(1)], |_| {})
            .unwrap();
        results.write(dir.path()).unwrap();

        let variant_dir = dir.path().join("mask.target_phrase");
        let predictions =
            output::read_predictions(&output::prediction_path(&variant_dir, "it")).unwrap();
        assert_eq!(predictions.len(), 2);
        for prediction in &predictions {
            // tie between a and b keeps candidate order
            assert_eq!(prediction, &vec!["c.jpg", "a.jpg", "b.jpg"]);
        }
        let csv = std::fs::read_to_string(output::full_result_path(&variant_dir, "it")).unwrap();
        assert_eq!(csv.lines().count(), 3);
    }
}
