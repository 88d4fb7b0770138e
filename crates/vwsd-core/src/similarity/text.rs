//! CLIP text encoder for prompt embeddings.
//!
//! Loads `text_model.onnx` and `tokenizer.json` and encodes prompts into
//! L2-normalized vectors in the same space as the images. English CLIP
//! exports name the output `text_embeds`; multilingual sentence-transformers
//! exports (distilled onto the CLIP image space) name it `sentence_embedding`.

use std::path::Path;
use std::sync::Mutex;

use ort::session::Session;
use ort::value::Value;
use tokenizers::TruncationParams;

use crate::error::{SimilarityError, SimilarityResult};

/// CLIP context length.
const MAX_LENGTH: usize = 77;

/// Outputs holding the projected text embedding, in lookup order.
const EMBEDDING_OUTPUTS: &[&str] = &["text_embeds", "sentence_embedding"];

/// CLIP text encoder wrapper.
pub struct TextEncoder {
    session: Mutex<Session>,
    tokenizer: tokenizers::Tokenizer,
    /// Whether the exported graph takes an `attention_mask` input.
    uses_attention_mask: bool,
    pad_id: u32,
}

impl TextEncoder {
    /// Load the text encoder and its tokenizer.
    pub fn new(model_path: &Path, tokenizer_path: &Path) -> SimilarityResult<Self> {
        let session = Session::builder()
            .map_err(|e| SimilarityError::Model {
                message: format!("Failed to create ONNX session builder: {e}"),
            })?
            .commit_from_file(model_path)
            .map_err(|e| SimilarityError::Model {
                message: format!("Failed to load text model {}: {e}", model_path.display()),
            })?;

        let mut tokenizer = tokenizers::Tokenizer::from_file(tokenizer_path).map_err(|e| {
            SimilarityError::Model {
                message: format!("Failed to load tokenizer: {e}"),
            }
        })?;
        // Truncation keeps BOS and EOS.
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: MAX_LENGTH,
                ..Default::default()
            }))
            .map_err(|e| SimilarityError::Model {
                message: format!("Failed to configure tokenizer truncation: {e}"),
            })?;

        let uses_attention_mask = session
            .inputs()
            .iter()
            .any(|i| i.name() == "attention_mask");
        let pad_id = tokenizer.get_padding().map(|p| p.pad_id).unwrap_or(0);

        tracing::debug!(
            "Loaded CLIP text encoder (attention_mask: {}, pad_id: {})",
            uses_attention_mask,
            pad_id
        );

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            uses_attention_mask,
            pad_id,
        })
    }

    /// Encode a batch of texts to normalized embeddings, one per input.
    pub fn encode_batch(&self, texts: &[String]) -> SimilarityResult<Vec<Vec<f32>>> {
        let batch_size = texts.len();
        if batch_size == 0 {
            return Ok(vec![]);
        }

        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| SimilarityError::Model {
                message: format!("Tokenization failed: {e}"),
            })?;

        let ids: Vec<&[u32]> = encodings.iter().map(|e| e.get_ids()).collect();
        let (input_ids, attention_mask) = pack_ids(&ids, self.pad_id)?;

        let shape = vec![batch_size as i64, MAX_LENGTH as i64];
        let ids_value =
            Value::from_array((shape.clone(), input_ids)).map_err(|e| SimilarityError::Model {
                message: format!("Failed to create input_ids tensor: {e}"),
            })?;

        let mut session = self.session.lock().map_err(|e| SimilarityError::Model {
            message: format!("Text session lock poisoned: {e}"),
        })?;

        let outputs = if self.uses_attention_mask {
            let mask_value =
                Value::from_array((shape, attention_mask)).map_err(|e| SimilarityError::Model {
                    message: format!("Failed to create attention_mask tensor: {e}"),
                })?;
            session.run(ort::inputs!["input_ids" => ids_value, "attention_mask" => mask_value])
        } else {
            session.run(ort::inputs!["input_ids" => ids_value])
        }
        .map_err(|e| SimilarityError::Model {
            message: format!("Text inference failed: {e}"),
        })?;

        let (output_name, embeds) = EMBEDDING_OUTPUTS
            .iter()
            .find_map(|wanted| {
                outputs
                    .iter()
                    .find(|(name, _)| name == wanted)
                    .map(|(_, value)| (*wanted, value))
            })
            .ok_or_else(|| SimilarityError::Model {
                message: format!("Text model produced none of {EMBEDDING_OUTPUTS:?}"),
            })?;

        let (_shape, data) =
            embeds
                .try_extract_tensor::<f32>()
                .map_err(|e| SimilarityError::Model {
                    message: format!("Failed to extract {output_name}: {e}"),
                })?;

        split_embeddings(data, batch_size)
    }
}

/// Lay token ids out as `[batch, MAX_LENGTH]` ids and attention mask, padding with `pad_id`.
fn pack_ids(ids: &[&[u32]], pad_id: u32) -> SimilarityResult<(Vec<i64>, Vec<i64>)> {
    let mut input_ids = vec![pad_id as i64; ids.len() * MAX_LENGTH];
    let mut attention_mask = vec![0i64; ids.len() * MAX_LENGTH];
    for (i, row) in ids.iter().enumerate() {
        if row.len() > MAX_LENGTH {
            return Err(SimilarityError::Model {
                message: format!("Tokenizer produced {} tokens, limit is {MAX_LENGTH}", row.len()),
            });
        }
        for (j, &id) in row.iter().enumerate() {
            input_ids[i * MAX_LENGTH + j] = id as i64;
            attention_mask[i * MAX_LENGTH + j] = 1;
        }
    }
    Ok((input_ids, attention_mask))
}

/// Split a flat `[batch, dim]` output into normalized rows.
fn split_embeddings(data: &[f32], batch_size: usize) -> SimilarityResult<Vec<Vec<f32>>> {
    if data.is_empty() || data.len() % batch_size != 0 {
        return Err(SimilarityError::Model {
            message: format!(
                "Text model returned {} values for a batch of {batch_size}",
                data.len()
            ),
        });
    }
    let embedding_dim = data.len() / batch_size;
    Ok(data
        .chunks(embedding_dim)
        .map(crate::math::l2_normalize)
        .collect())
}
