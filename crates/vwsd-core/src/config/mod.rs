//! Configuration management for vwsd.
//!
//! Configuration is loaded from the platform config directory with sensible
//! defaults. Every section implements `Default`, so a partial file is fine.

mod types;
mod validate;

pub use types::*;
pub use validate::validate_prompts;

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Root configuration structure for vwsd.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Dataset layout
    pub dataset: DatasetConfig,

    /// Inference driver settings
    pub inference: InferenceConfig,

    /// Evaluator settings
    pub evaluation: EvaluationConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// Returns default configuration if the file doesn't exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default config file path.
    ///
    /// Uses platform-appropriate directories:
    /// - macOS: ~/Library/Application Support/org.vwsd.vwsd/config.toml
    /// - Linux: ~/.config/vwsd/config.toml
    /// - Windows: C:\Users\<User>\AppData\Roaming\vwsd\config\config.toml
    ///
    /// Falls back to ~/.vwsd/config.toml if directory detection fails.
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("org", "vwsd", "vwsd")
            .map(|dirs| dirs.config_dir().to_path_buf().join("config.toml"))
            .unwrap_or_else(|| {
                let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
                PathBuf::from(home).join(".vwsd").join("config.toml")
            })
    }

    /// Get the resolved model directory path (with ~ expansion).
    pub fn model_dir(&self) -> PathBuf {
        expand(&self.general.model_dir)
    }

    /// Get the resolved dataset directory path (with ~ expansion).
    pub fn data_dir(&self) -> PathBuf {
        expand(&self.dataset.data_dir)
    }

    /// Model used for `language`: the English model for `en`, else the multilingual one.
    pub fn model_for(&self, language: &str) -> &str {
        if language == ENGLISH {
            &self.inference.model
        } else {
            &self.inference.multilingual_model
        }
    }

    /// Directory holding the model files used for `language`.
    pub fn model_dir_for(&self, language: &str) -> PathBuf {
        self.model_dir().join(self.model_for(language))
    }

    /// Serialize the config to a pretty TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ValidationError(e.to_string()))
    }
}

fn expand(path: &Path) -> PathBuf {
    let path_str = path.to_string_lossy();
    PathBuf::from(shellexpand::tilde(&path_str).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::InputType;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.inference.batch_size, 16);
        assert_eq!(
            config.inference.prompts,
            vec![
                "<>",
                "This is <>.",
                "Example of an image caption that explains <>."
            ]
        );
        assert_eq!(
            config.inference.input_types,
            vec![InputType::TargetWord, InputType::TargetPhrase]
        );
        assert!(!config.inference.image_to_image);
        assert_eq!(config.dataset.language, "en");
        assert_eq!(config.evaluation.metrics.len(), 7);
    }

    #[test]
    fn test_config_to_toml() {
        let config = Config::default();
        let toml = config.to_toml().unwrap();
        assert!(toml.contains("[general]"));
        assert!(toml.contains("[inference]"));
        assert!(toml.contains("[evaluation]"));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            [inference]
            batch_size = 4
            input_types = ["target-phrase"]
            "#,
        )
        .unwrap();
        assert_eq!(config.inference.batch_size, 4);
        assert_eq!(config.inference.input_types, vec![InputType::TargetPhrase]);
        assert_eq!(config.inference.prompts.len(), 3);
        assert_eq!(config.inference.model, "clip-vit-base-patch32");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_load_from_rejects_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[inference]\nbatch_size = 0\n").unwrap();
        let err = Config::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("batch_size"));
    }

    #[test]
    fn test_model_dir_per_language() {
        let mut config = Config::default();
        config.general.model_dir = PathBuf::from("/models");
        assert_eq!(
            config.model_dir_for("en"),
            PathBuf::from("/models/clip-vit-base-patch32")
        );
        assert_eq!(
            config.model_dir_for("fa"),
            PathBuf::from("/models/clip-vit-base-patch32-multilingual")
        );
        assert_eq!(config.model_for("it"), "clip-vit-base-patch32-multilingual");
    }
}
