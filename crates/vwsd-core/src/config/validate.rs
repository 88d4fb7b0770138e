//! Configuration validation with range checks.

use crate::error::ConfigError;
use crate::evaluation::Metric;

use super::{Config, PROMPT_PLACEHOLDER};

impl Config {
    /// Validate configuration values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.inference.batch_size == 0 {
            return Err(ConfigError::ValidationError(
                "inference.batch_size must be > 0".into(),
            ));
        }
        // Image queries ignore the prompt templates.
        if !self.inference.image_to_image {
            if self.inference.prompts.is_empty() {
                return Err(ConfigError::ValidationError(
                    "inference.prompts must not be empty".into(),
                ));
            }
            validate_prompts(&self.inference.prompts)?;
            if self.inference.input_types.is_empty() {
                return Err(ConfigError::ValidationError(
                    "inference.input_types must not be empty".into(),
                ));
            }
        }
        if self.inference.logit_scale <= 0.0 {
            return Err(ConfigError::ValidationError(
                "inference.logit_scale must be > 0".into(),
            ));
        }
        for name in &self.evaluation.metrics {
            Metric::parse(name).map_err(|e| {
                ConfigError::ValidationError(format!("evaluation.metrics: {e}"))
            })?;
        }
        Ok(())
    }
}

/// Check that every prompt template carries the `<>` placeholder.
pub fn validate_prompts(prompts: &[String]) -> Result<(), ConfigError> {
    match prompts.iter().find(|p| !p.contains(PROMPT_PLACEHOLDER)) {
        Some(bad) => Err(ConfigError::ValidationError(format!(
            "prompt {bad:?} is missing the {PROMPT_PLACEHOLDER} placeholder"
        ))),
        None => Ok(()),
    }
}
