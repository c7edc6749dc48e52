//! GGUF Resolution
//!
//! Maps Ollama model names to the quantized GGUF blobs Ollama already has
//! on disk, so the sharding coordinator can serve any pulled model without
//! a separate download. Layout:
//!
//! ```text
//! ~/.ollama/models/manifests/registry.ollama.ai/<namespace>/<name>/<tag>
//! ~/.ollama/models/blobs/sha256-<hex>
//! ```

use std::path::PathBuf;

use async_trait::async_trait;
use serde::Deserialize;

use sollol_core::{GgufResolver, Result};

const DEFAULT_REGISTRY: &str = "registry.ollama.ai";
const DEFAULT_NAMESPACE: &str = "library";
const DEFAULT_TAG: &str = "latest";
const MODEL_MEDIA_TYPE: &str = "application/vnd.ollama.image.model";

#[derive(Debug, Deserialize)]
struct Manifest {
    layers: Vec<Layer>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Layer {
    media_type: String,
    digest: String,
}

/// Resolves model names against the local Ollama blob store
#[derive(Clone, Debug)]
pub struct OllamaGgufResolver {
    models_dir: PathBuf,
}

impl Default for OllamaGgufResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl OllamaGgufResolver {
    pub fn new() -> Self {
        let models_dir = std::env::var("OLLAMA_MODELS").map_or_else(
            |_| {
                dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join(".ollama")
                    .join("models")
            },
            PathBuf::from,
        );
        Self { models_dir }
    }

    pub fn with_models_dir(models_dir: impl Into<PathBuf>) -> Self {
        Self { models_dir: models_dir.into() }
    }

    fn manifest_path(&self, model: &str) -> PathBuf {
        let (name, tag) = model
            .split_once(':')
            .map_or((model, DEFAULT_TAG), |(name, tag)| (name, tag));
        let (namespace, name) = name
            .split_once('/')
            .unwrap_or((DEFAULT_NAMESPACE, name));

        self.models_dir
            .join("manifests")
            .join(DEFAULT_REGISTRY)
            .join(namespace)
            .join(name)
            .join(tag)
    }
}

#[async_trait]
impl GgufResolver for OllamaGgufResolver {
    async fn resolve(&self, model: &str) -> Result<Option<PathBuf>> {
        let manifest_path = self.manifest_path(model);
        let data = match tokio::fs::read(&manifest_path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No manifest for '{}' at {}", model, manifest_path.display());
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let manifest: Manifest = serde_json::from_slice(&data)?;
        let Some(layer) = manifest
            .layers
            .iter()
            .find(|layer| layer.media_type == MODEL_MEDIA_TYPE)
        else {
            tracing::warn!("Manifest for '{}' has no model layer", model);
            return Ok(None);
        };

        // "sha256:<hex>" digests map to "blobs/sha256-<hex>" on disk
        let blob = self
            .models_dir
            .join("blobs")
            .join(layer.digest.replace(':', "-"));

        if tokio::fs::try_exists(&blob).await? {
            tracing::info!("Resolved '{}' -> {}", model, blob.display());
            Ok(Some(blob))
        } else {
            tracing::warn!("Manifest for '{}' points at missing blob {}", model, blob.display());
            Ok(None)
        }
    }
}
