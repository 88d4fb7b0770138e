//! Similarity scoring between queries and candidate images.
//!
//! The inference driver only sees [`SimilarityScorer`]; [`ClipScorer`] is the
//! CLIP implementation backed by ONNX Runtime.
//!
//! # Usage
//!
//! ```rust,ignore
//! use vwsd_core::similarity::{ClipScorer, Query, SimilarityScorer};
//!
//! let scorer = ClipScorer::load(&config.model_dir_for("en"), 100.0)?;
//! let scores = scorer.score(&Query::Texts(vec!["a photo of a bank".into()]), &paths, 16)?;
//! // scores[0][j] is the similarity of the prompt to candidate j
//! ```

pub(crate) mod preprocess;
pub(crate) mod text;
pub(crate) mod vision;

use std::path::{Path, PathBuf};

use crate::error::{SimilarityError, SimilarityResult};
use crate::math::{similarity_matrix, stack_rows};

use self::preprocess::preprocess;
use self::text::TextEncoder;
use self::vision::VisionEncoder;

/// Vision encoder ONNX filename.
pub const VISUAL_MODEL_FILENAME: &str = "visual.onnx";
/// Text encoder ONNX filename.
pub const TEXT_MODEL_FILENAME: &str = "text_model.onnx";
/// Tokenizer filename.
pub const TOKENIZER_FILENAME: &str = "tokenizer.json";

/// CLIP input resolution.
const IMAGE_SIZE: u32 = 224;

/// What candidates are compared against.
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    /// One row of scores per text
    Texts(Vec<String>),
    /// A single query image
    Image(PathBuf),
}

impl Query {
    /// Number of score rows this query produces.
    pub fn len(&self) -> usize {
        match self {
            Query::Texts(texts) => texts.len(),
            Query::Image(_) => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Scores queries against candidate images.
pub trait SimilarityScorer {
    /// Return a `query.len() × candidates.len()` score matrix, higher is more similar.
    ///
    /// `batch_size` bounds how many texts or images go into one encoder call.
    fn score(
        &self,
        query: &Query,
        candidates: &[PathBuf],
        batch_size: usize,
    ) -> SimilarityResult<Vec<Vec<f32>>>;
}

/// CLIP text and vision encoders scoring by scaled cosine similarity.
pub struct ClipScorer {
    vision: VisionEncoder,
    text: TextEncoder,
    logit_scale: f32,
}

impl ClipScorer {
    /// Load the CLIP encoders from a model directory.
    ///
    /// Expects `visual.onnx`, `text_model.onnx` and `tokenizer.json` in `model_dir`.
    pub fn load(model_dir: &Path, logit_scale: f32) -> SimilarityResult<Self> {
        for name in [VISUAL_MODEL_FILENAME, TEXT_MODEL_FILENAME, TOKENIZER_FILENAME] {
            let path = model_dir.join(name);
            if !path.exists() {
                return Err(SimilarityError::Model {
                    message: format!(
                        "{} not found. Run `vwsd models download` first.",
                        path.display()
                    ),
                });
            }
        }

        tracing::info!("Loading CLIP model from {:?}", model_dir);
        let vision = VisionEncoder::load(&model_dir.join(VISUAL_MODEL_FILENAME))?;
        let text = TextEncoder::new(
            &model_dir.join(TEXT_MODEL_FILENAME),
            &model_dir.join(TOKENIZER_FILENAME),
        )?;
        tracing::info!("CLIP model loaded successfully");

        Ok(Self {
            vision,
            text,
            logit_scale,
        })
    }

    /// Check whether all model files exist on disk.
    pub fn model_exists(model_dir: &Path) -> bool {
        [VISUAL_MODEL_FILENAME, TEXT_MODEL_FILENAME, TOKENIZER_FILENAME]
            .iter()
            .all(|name| model_dir.join(name).exists())
    }

    fn embed_images(&self, paths: &[PathBuf], batch_size: usize) -> SimilarityResult<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(paths.len());
        for chunk in paths.chunks(batch_size.max(1)) {
            let tensors = chunk
                .iter()
                .map(|path| {
                    let image = image::open(path).map_err(|e| SimilarityError::Image {
                        path: path.clone(),
                        message: e.to_string(),
                    })?;
                    Ok(preprocess(&image, IMAGE_SIZE))
                })
                .collect::<SimilarityResult<Vec<_>>>()?;
            embeddings.extend(self.vision.embed_batch(&tensors)?);
        }
        Ok(embeddings)
    }

    fn embed_texts(&self, texts: &[String], batch_size: usize) -> SimilarityResult<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(batch_size.max(1)) {
            embeddings.extend(self.text.encode_batch(chunk)?);
        }
        Ok(embeddings)
    }
}

impl SimilarityScorer for ClipScorer {
    fn score(
        &self,
        query: &Query,
        candidates: &[PathBuf],
        batch_size: usize,
    ) -> SimilarityResult<Vec<Vec<f32>>> {
        let query_embeddings = match query {
            Query::Texts(texts) => self.embed_texts(texts, batch_size)?,
            Query::Image(path) => self.embed_images(std::slice::from_ref(path), 1)?,
        };
        let candidate_embeddings = self.embed_images(candidates, batch_size)?;

        let (Some(queries), Some(candidates)) = (
            stack_rows(&query_embeddings),
            stack_rows(&candidate_embeddings),
        ) else {
            return Err(SimilarityError::Model {
                message: "Encoders returned embeddings of inconsistent dimension".to_string(),
            });
        };
        if queries.ncols() != candidates.ncols() {
            return Err(SimilarityError::Model {
                message: format!(
                    "Text/image embedding dimensions differ: {} vs {}",
                    queries.ncols(),
                    candidates.ncols()
                ),
            });
        }

        Ok(similarity_matrix(&queries, &candidates, self.logit_scale))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_len() {
        assert_eq!(Query::Texts(vec!["a".into(), "b".into()]).len(), 2);
        assert_eq!(Query::Image(PathBuf::from("q.jpg")).len(), 1);
        assert!(Query::Texts(vec![]).is_empty());
    }

    #[test]
    fn test_model_exists_requires_all_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(VISUAL_MODEL_FILENAME), b"").unwrap();
        assert!(!ClipScorer::model_exists(dir.path()));
        std::fs::write(dir.path().join(TEXT_MODEL_FILENAME), b"").unwrap();
        std::fs::write(dir.path().join(TOKENIZER_FILENAME), b"").unwrap();
        assert!(ClipScorer::model_exists(dir.path()));
    }

    #[test]
    fn test_load_reports_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let err = ClipScorer::load(dir.path(), 100.0).err().unwrap();
        assert!(err.to_string().contains("vwsd models download"));
    }
}
