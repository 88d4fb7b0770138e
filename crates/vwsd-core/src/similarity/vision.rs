//! CLIP vision encoder session.
//!
//! Loads a CLIP vision tower exported to ONNX (`visual.onnx`) and turns
//! preprocessed image tensors into L2-normalized `image_embeds` vectors.

use std::path::Path;
use std::sync::Mutex;

use ndarray::Array4;
use ort::session::Session;
use ort::value::Value;

use crate::error::{SimilarityError, SimilarityResult};

/// Output holding the projected image embedding.
const IMAGE_EMBEDS: &str = "image_embeds";

/// Wraps an ONNX Runtime session for CLIP image embedding.
///
/// Uses a `Mutex` because `Session::run` requires `&mut self`.
pub struct VisionEncoder {
    session: Mutex<Session>,
    /// Name of the input tensor (detected from model metadata).
    input_name: String,
}

impl VisionEncoder {
    /// Load a CLIP vision encoder from an ONNX file.
    pub fn load(model_path: &Path) -> SimilarityResult<Self> {
        let session = Session::builder()
            .map_err(|e| SimilarityError::Model {
                message: format!("Failed to create ONNX session builder: {e}"),
            })?
            .commit_from_file(model_path)
            .map_err(|e| SimilarityError::Model {
                message: format!("Failed to load vision model {}: {e}", model_path.display()),
            })?;

        let input_name = session
            .inputs()
            .first()
            .map(|i| i.name().to_string())
            .unwrap_or_else(|| "pixel_values".to_string());

        tracing::debug!(
            "Loaded CLIP vision encoder from {:?} (input: {:?})",
            model_path,
            input_name
        );

        Ok(Self {
            session: Mutex::new(session),
            input_name,
        })
    }

    /// Embed a batch of preprocessed `[1, 3, H, W]` tensors in one ONNX call.
    pub fn embed_batch(&self, tensors: &[Array4<f32>]) -> SimilarityResult<Vec<Vec<f32>>> {
        let batch_size = tensors.len();
        if batch_size == 0 {
            return Ok(vec![]);
        }

        let shape_0 = tensors[0].shape();
        if let Some(bad) = tensors.iter().find(|t| t.shape() != shape_0) {
            return Err(SimilarityError::Model {
                message: format!(
                    "Tensor shape mismatch in batch: expected {:?}, got {:?}",
                    shape_0,
                    bad.shape()
                ),
            });
        }

        let mut flat_data = Vec::with_capacity(batch_size * tensors[0].len());
        for t in tensors {
            flat_data.extend(t.iter().copied());
        }
        let batch_shape: Vec<i64> = vec![
            batch_size as i64,
            shape_0[1] as i64,
            shape_0[2] as i64,
            shape_0[3] as i64,
        ];

        let input_value =
            Value::from_array((batch_shape, flat_data)).map_err(|e| SimilarityError::Model {
                message: format!("Failed to create image input tensor: {e}"),
            })?;

        let mut session = self.session.lock().map_err(|e| SimilarityError::Model {
            message: format!("Vision session lock poisoned: {e}"),
        })?;

        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => input_value])
            .map_err(|e| SimilarityError::Model {
                message: format!("Vision inference failed: {e}"),
            })?;

        let image_embeds = outputs
            .iter()
            .find(|(name, _)| *name == IMAGE_EMBEDS)
            .ok_or_else(|| SimilarityError::Model {
                message: format!("Vision model did not produce {IMAGE_EMBEDS}"),
            })?;

        let (shape, data) =
            image_embeds
                .1
                .try_extract_tensor::<f32>()
                .map_err(|e| SimilarityError::Model {
                    message: format!("Failed to extract {IMAGE_EMBEDS}: {e}"),
                })?;

        let embedding_dim = match shape.len() {
            1 => data.len() / batch_size,
            2 => shape[1] as usize,
            _ => {
                return Err(SimilarityError::Model {
                    message: format!("Unexpected {IMAGE_EMBEDS} shape: {:?}", shape),
                });
            }
        };

        Ok(data
            .chunks(embedding_dim)
            .take(batch_size)
            .map(crate::math::l2_normalize)
            .collect())
    }
}
