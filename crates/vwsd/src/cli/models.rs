//! The `vwsd models` command for managing CLIP models.

use std::path::{Path, PathBuf};

use clap::{Args, Subcommand};
use vwsd_core::similarity::{TEXT_MODEL_FILENAME, TOKENIZER_FILENAME, VISUAL_MODEL_FILENAME};
use vwsd_core::{ClipScorer, Config};
use walkdir::WalkDir;

/// Arguments for the `models` command.
#[derive(Args, Debug)]
pub struct ModelsArgs {
    #[command(subcommand)]
    pub command: ModelsCommand,
}

/// Subcommands for model management.
#[derive(Subcommand, Debug)]
pub enum ModelsCommand {
    /// Download a CLIP model (vision encoder + text encoder + tokenizer)
    Download {
        /// Model to download (defaults to the models configured for --language)
        #[arg(short, long)]
        model: Option<String>,

        /// Languages whose configured models to download (repeatable)
        #[arg(short, long)]
        language: Vec<String>,

        /// Re-download files that already exist
        #[arg(long)]
        force: bool,
    },

    /// List installed models
    List,

    /// Show model directory path
    Path,
}

/// One file of a model directory and where it comes from.
struct ModelFile {
    repo: &'static str,
    remote_path: &'static str,
    local_name: &'static str,
}

/// A downloadable CLIP variant.
struct ModelVariant {
    name: &'static str,
    label: &'static str,
    files: &'static [ModelFile],
}

/// The standard CLIP export layout of a Hugging Face repo.
macro_rules! clip_files {
    ($repo:literal) => {
        &[
            ModelFile {
                repo: $repo,
                remote_path: "onnx/vision_model.onnx",
                local_name: VISUAL_MODEL_FILENAME,
            },
            ModelFile {
                repo: $repo,
                remote_path: "onnx/text_model.onnx",
                local_name: TEXT_MODEL_FILENAME,
            },
            ModelFile {
                repo: $repo,
                remote_path: "tokenizer.json",
                local_name: TOKENIZER_FILENAME,
            },
        ]
    };
}

/// Multilingual text tower distilled onto the ViT-B/32 image space.
const MULTILINGUAL_TEXT_REPO: &str = "sentence-transformers/clip-ViT-B-32-multilingual-v1";

const VARIANTS: &[ModelVariant] = &[
    ModelVariant {
        name: "clip-vit-base-patch32",
        label: "ViT-B/32",
        files: clip_files!("Xenova/clip-vit-base-patch32"),
    },
    ModelVariant {
        name: "clip-vit-base-patch16",
        label: "ViT-B/16",
        files: clip_files!("Xenova/clip-vit-base-patch16"),
    },
    ModelVariant {
        name: "clip-vit-large-patch14",
        label: "ViT-L/14",
        files: clip_files!("Xenova/clip-vit-large-patch14"),
    },
    ModelVariant {
        name: "clip-vit-base-patch32-multilingual",
        label: "mViT-B/32",
        files: &[
            ModelFile {
                repo: "Xenova/clip-vit-base-patch32",
                remote_path: "onnx/vision_model.onnx",
                local_name: VISUAL_MODEL_FILENAME,
            },
            ModelFile {
                repo: MULTILINGUAL_TEXT_REPO,
                remote_path: "onnx/model.onnx",
                local_name: TEXT_MODEL_FILENAME,
            },
            ModelFile {
                repo: MULTILINGUAL_TEXT_REPO,
                remote_path: "tokenizer.json",
                local_name: TOKENIZER_FILENAME,
            },
        ],
    },
];

fn find_variant(name: &str) -> Option<&'static ModelVariant> {
    VARIANTS.iter().find(|v| v.name == name)
}

fn file_url(file: &ModelFile) -> String {
    format!(
        "https://huggingface.co/{}/resolve/main/{}",
        file.repo, file.remote_path
    )
}

/// Models needed for `languages`: the English model and/or the multilingual one.
fn required_models(config: &Config, languages: &[String]) -> Vec<String> {
    let mut names: Vec<String> = languages
        .iter()
        .map(|l| config.model_for(l).to_string())
        .collect();
    names.sort();
    names.dedup();
    names
}

/// Execute the models command.
pub async fn execute(args: ModelsArgs, config: Config) -> anyhow::Result<()> {
    match args.command {
        ModelsCommand::Download {
            model,
            language,
            force,
        } => {
            let names = match model {
                Some(name) => vec![name],
                None if language.is_empty() => {
                    required_models(&config, &[config.dataset.language.clone()])
                }
                None => required_models(&config, &language),
            };

            let client = reqwest::Client::new();
            for name in names {
                let Some(variant) = find_variant(&name) else {
                    let known: Vec<&str> = VARIANTS.iter().map(|v| v.name).collect();
                    anyhow::bail!("Unknown model '{}'. Known models: {}", name, known.join(", "));
                };
                download_variant(&client, variant, &config.model_dir(), force).await?;
            }
            tracing::info!("All downloads complete.");
        }

        ModelsCommand::List => {
            let model_dir = config.model_dir();

            if !model_dir.exists() {
                println!("No models installed.");
                println!("Run `vwsd models download` to download the default model.");
                return Ok(());
            }

            println!("Installed models:");
            println!("  Directory: {}\n", model_dir.display());

            for (name, ready) in installed_models(&model_dir) {
                let status = if ready { "ready" } else { "incomplete" };
                let label = find_variant(&name).map(|v| v.label).unwrap_or("custom");
                let default_marker = if name == config.inference.model {
                    "  (default)"
                } else if name == config.inference.multilingual_model {
                    "  (default, non-English)"
                } else {
                    ""
                };
                println!("    - {:30} {:10} {:12}{}", name, label, status, default_marker);
            }

            println!("\n  Available:");
            for variant in VARIANTS {
                if !model_dir.join(variant.name).exists() {
                    println!("    - {:30} {:10} not installed", variant.name, variant.label);
                }
            }
        }

        ModelsCommand::Path => {
            println!("{}", config.model_dir().display());
        }
    }

    Ok(())
}

/// Model directories directly under `model_dir`, with whether all files are present.
fn installed_models(model_dir: &Path) -> Vec<(String, bool)> {
    let mut models: Vec<(String, bool)> = WalkDir::new(model_dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_dir())
        .map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            (name, ClipScorer::model_exists(entry.path()))
        })
        .collect();
    models.sort();
    models
}

/// Download every file of `variant` into `<model_dir>/<name>`. Skips existing files.
async fn download_variant(
    client: &reqwest::Client,
    variant: &ModelVariant,
    model_dir: &Path,
    force: bool,
) -> anyhow::Result<()> {
    let variant_dir = model_dir.join(variant.name);
    std::fs::create_dir_all(&variant_dir)?;

    for file in variant.files {
        let local_name = file.local_name;
        let dest = variant_dir.join(local_name);
        if dest.exists() && !force {
            tracing::info!("{} already exists at {:?}", local_name, dest);
            continue;
        }

        let url = file_url(file);
        tracing::info!("Downloading {} {}...", variant.label, local_name);
        tracing::info!("  Source: {}", url);
        tracing::info!("  Destination: {:?}", dest);

        download_file(client, &url, &dest).await?;

        let file_size = std::fs::metadata(&dest)?.len();
        tracing::info!(
            "  {} complete ({:.1} MB)",
            local_name,
            file_size as f64 / (1024.0 * 1024.0)
        );
    }

    Ok(())
}

/// Partial download location; renamed onto `dest` once complete.
fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    dest.with_file_name(name)
}

/// Download a file from a URL to a local path, streaming to disk.
///
/// An interrupted download leaves only the `.part` file behind.
async fn download_file(client: &reqwest::Client, url: &str, dest: &Path) -> anyhow::Result<()> {
    use futures_util::StreamExt;
    use tokio::io::AsyncWriteExt;

    let response = client
        .get(url)
        .send()
        .await?
        .error_for_status()
        .map_err(|e| anyhow::anyhow!("Download failed: {e}"))?;

    let total_size = response.content_length();
    if let Some(size) = total_size {
        tracing::info!("  Size: {:.1} MB", size as f64 / (1024.0 * 1024.0));
    }

    let partial = partial_path(dest);
    let mut file = tokio::fs::File::create(&partial).await?;
    let mut stream = response.bytes_stream();
    let mut downloaded: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        downloaded += chunk.len() as u64;

        if let Some(total) = total_size {
            if downloaded % (50 * 1024 * 1024) < chunk.len() as u64 {
                tracing::info!(
                    "  Progress: {:.0}%",
                    downloaded as f64 / total as f64 * 100.0
                );
            }
        }
    }

    file.flush().await?;
    drop(file);

    if let Some(total) = total_size {
        if downloaded != total {
            let _ = tokio::fs::remove_file(&partial).await;
            anyhow::bail!(
                "Incomplete download of {}: got {} of {} bytes",
                url,
                downloaded,
                total
            );
        }
    }

    tokio::fs::rename(&partial, dest).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_variants_resolve() {
        let variant = find_variant("clip-vit-base-patch32").unwrap();
        assert_eq!(
            file_url(&variant.files[0]),
            "https://huggingface.co/Xenova/clip-vit-base-patch32/resolve/main/onnx/vision_model.onnx"
        );
        assert!(find_variant("clip-vit-huge-patch14").is_none());
    }

    #[test]
    fn every_variant_provides_all_model_files() {
        for variant in VARIANTS {
            let mut names: Vec<&str> = variant.files.iter().map(|f| f.local_name).collect();
            names.sort();
            assert_eq!(
                names,
                vec![TEXT_MODEL_FILENAME, TOKENIZER_FILENAME, VISUAL_MODEL_FILENAME],
                "{}",
                variant.name
            );
        }
    }

    #[test]
    fn multilingual_variant_pairs_vit_b32_images() {
        let variant = find_variant("clip-vit-base-patch32-multilingual").unwrap();
        assert_eq!(variant.files[0].repo, "Xenova/clip-vit-base-patch32");
        assert_eq!(variant.files[1].repo, MULTILINGUAL_TEXT_REPO);
    }

    #[test]
    fn default_models_are_downloadable() {
        let config = Config::default();
        assert!(find_variant(&config.inference.model).is_some());
        assert!(find_variant(&config.inference.multilingual_model).is_some());
    }

    #[test]
    fn required_models_follow_languages() {
        let config = Config::default();
        let langs = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        assert_eq!(
            required_models(&config, &langs(&["en"])),
            vec!["clip-vit-base-patch32"]
        );
        assert_eq!(
            required_models(&config, &langs(&["fa", "it", "en"])),
            vec!["clip-vit-base-patch32", "clip-vit-base-patch32-multilingual"]
        );
    }

    #[test]
    fn partial_path_appends_suffix() {
        assert_eq!(
            partial_path(Path::new("/m/clip/visual.onnx")),
            PathBuf::from("/m/clip/visual.onnx.part")
        );
    }

    #[test]
    fn installed_models_reports_completeness() {
        let dir = tempfile::tempdir().unwrap();
        let complete = dir.path().join("clip-vit-base-patch32");
        std::fs::create_dir_all(&complete).unwrap();
        for local in [VISUAL_MODEL_FILENAME, TEXT_MODEL_FILENAME, TOKENIZER_FILENAME] {
            std::fs::write(complete.join(local), b"").unwrap();
        }
        std::fs::create_dir_all(dir.path().join("half")).unwrap();
        std::fs::write(dir.path().join("stray.txt"), b"").unwrap();

        assert_eq!(
            installed_models(dir.path()),
            vec![
                ("clip-vit-base-patch32".to_string(), true),
                ("half".to_string(), false),
            ]
        );
    }
}
