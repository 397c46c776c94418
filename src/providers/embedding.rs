//! Network and local embedding backends.
//!
//! - [`OpenAiEmbedder`]: `POST https://api.openai.com/v1/embeddings`,
//!   key from `OPENAI_API_KEY` (or `api_key_env`).
//! - [`OllamaEmbedder`]: `POST <url>/api/embed` on a local Ollama.
//! - `LocalEmbedder` (feature `local-embeddings-fastembed`): fastembed
//!   ONNX models, no network after the first download.
//!
//! Requests are split into `batch_size` batches and go through
//! [`post_json`](super::post_json) for retry/backoff.

use anyhow::{bail, Result};
use async_trait::async_trait;

use docflow_core::embedding::Embedder;

use super::{api_token, http_client, post_json};
use crate::config::ModelConfig;

const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
const OPENAI_EMBEDDINGS_URL: &str = "https://api.openai.com/v1/embeddings";

fn required_model(config: &ModelConfig, provider: &str) -> Result<(String, usize)> {
    let model = config
        .model
        .clone()
        .ok_or_else(|| anyhow::anyhow!("models.embedding.model required for {} provider", provider))?;
    let dims = config
        .dims
        .ok_or_else(|| anyhow::anyhow!("models.embedding.dims required for {} provider", provider))?;
    Ok((model, dims))
}

fn check_dims(vectors: &[Vec<f32>], expected: usize, provider: &str) -> Result<()> {
    if let Some(v) = vectors.iter().find(|v| v.len() != expected) {
        bail!(
            "{} returned a {}-dimensional vector, expected {}",
            provider,
            v.len(),
            expected
        );
    }
    Ok(())
}

// ============ OpenAI ============

pub struct OpenAiEmbedder {
    model: String,
    dims: usize,
    api_key: String,
    batch_size: usize,
    max_retries: u32,
    client: reqwest::Client,
}

impl OpenAiEmbedder {
    /// Fails if the model, dims, or API key are missing.
    pub fn new(config: &ModelConfig) -> Result<Self> {
        let (model, dims) = required_model(config, "OpenAI")?;
        let api_key = api_token(config, "OPENAI_API_KEY")
            .ok_or_else(|| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        Ok(Self {
            model,
            dims,
            api_key,
            batch_size: config.batch_size.max(1),
            max_retries: config.max_retries,
            client: http_client(config)?,
        })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let body = serde_json::json!({ "model": self.model, "input": batch });
            let json = post_json(
                &self.client,
                OPENAI_EMBEDDINGS_URL,
                Some(&self.api_key),
                &body,
                self.max_retries,
                "OpenAI",
            )
            .await?;
            out.extend(parse_openai_response(&json)?);
        }
        check_dims(&out, self.dims, "OpenAI")?;
        Ok(out)
    }
}

/// Extract `data[].embedding`, ordered by `index` when present.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (position, item) in data.iter().enumerate() {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing embedding"))?;
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(position);
        let vec: Vec<f32> = embedding
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();
        indexed.push((index, vec));
    }
    indexed.sort_by_key(|(i, _)| *i);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

// ============ Ollama ============

pub struct OllamaEmbedder {
    model: String,
    dims: usize,
    url: String,
    batch_size: usize,
    max_retries: u32,
    client: reqwest::Client,
}

impl OllamaEmbedder {
    pub fn new(config: &ModelConfig) -> Result<Self> {
        let (model, dims) = required_model(config, "Ollama")?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string());
        Ok(Self {
            model,
            dims,
            url: url.trim_end_matches('/').to_string(),
            batch_size: config.batch_size.max(1),
            max_retries: config.max_retries,
            client: http_client(config)?,
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let endpoint = format!("{}/api/embed", self.url);
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let body = serde_json::json!({ "model": self.model, "input": batch });
            let json =
                post_json(&self.client, &endpoint, None, &body, self.max_retries, "Ollama").await?;
            out.extend(parse_ollama_response(&json)?);
        }
        check_dims(&out, self.dims, "Ollama")?;
        Ok(out)
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: missing embeddings array"))?;

    embeddings
        .iter()
        .map(|embedding| {
            Ok(embedding
                .as_array()
                .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: embedding is not an array"))?
                .iter()
                .map(|v| v.as_f64().unwrap_or(0.0) as f32)
                .collect())
        })
        .collect()
}

// ============ Local (fastembed) ============

#[cfg(feature = "local-embeddings-fastembed")]
pub use local::LocalEmbedder;

#[cfg(feature = "local-embeddings-fastembed")]
mod local {
    use std::sync::{Arc, Mutex};

    use anyhow::{bail, Result};
    use async_trait::async_trait;

    use docflow_core::embedding::Embedder;

    use crate::config::ModelConfig;

    const DEFAULT_LOCAL_MODEL: &str = "all-minilm-l6-v2";

    /// fastembed model loaded once and shared; inference runs on a
    /// blocking thread.
    pub struct LocalEmbedder {
        model_name: String,
        dims: usize,
        batch_size: usize,
        model: Arc<Mutex<fastembed::TextEmbedding>>,
    }

    impl LocalEmbedder {
        /// Download (first run) and load the model. Blocking.
        pub fn load(config: &ModelConfig) -> Result<Self> {
            let model_name = config
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_LOCAL_MODEL.to_string());
            let (model_id, default_dims) = fastembed_model(&model_name)?;
            let model = fastembed::TextEmbedding::try_new(
                fastembed::InitOptions::new(model_id).with_show_download_progress(true),
            )
            .map_err(|e| anyhow::anyhow!("Failed to initialize local embedding model: {}", e))?;

            Ok(Self {
                model_name,
                dims: config.dims.unwrap_or(default_dims),
                batch_size: config.batch_size.max(1),
                model: Arc::new(Mutex::new(model)),
            })
        }
    }

    fn fastembed_model(name: &str) -> Result<(fastembed::EmbeddingModel, usize)> {
        use fastembed::EmbeddingModel::*;
        Ok(match name {
            "all-minilm-l6-v2" => (AllMiniLML6V2, 384),
            "bge-small-en-v1.5" => (BGESmallENV15, 384),
            "bge-base-en-v1.5" => (BGEBaseENV15, 768),
            "bge-large-en-v1.5" => (BGELargeENV15, 1024),
            "nomic-embed-text-v1.5" => (NomicEmbedTextV15, 768),
            "multilingual-e5-small" => (MultilingualE5Small, 384),
            other => bail!(
                "Unknown local embedding model: '{}'. Supported models: \
                 all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5, bge-large-en-v1.5, \
                 nomic-embed-text-v1.5, multilingual-e5-small",
                other
            ),
        })
    }

    #[async_trait]
    impl Embedder for LocalEmbedder {
        fn model_name(&self) -> &str {
            &self.model_name
        }
        fn dims(&self) -> usize {
            self.dims
        }

        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            let model = self.model.clone();
            let batch_size = self.batch_size;
            let texts = texts.to_vec();
            tokio::task::spawn_blocking(move || {
                let mut model = model
                    .lock()
                    .map_err(|_| anyhow::anyhow!("local embedding model lock poisoned"))?;
                model
                    .embed(texts, Some(batch_size))
                    .map_err(|e| anyhow::anyhow!("Local embedding failed: {}", e))
            })
            .await?
        }
    }
}
