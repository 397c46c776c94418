//! TOML configuration.
//!
//! Every section is optional and falls back to its `Default`; see
//! `config/docflow.example.toml` for a fully commented example.
//!
//! ```toml
//! [db]
//! path = "./data/docflow.sqlite"
//!
//! [storage]
//! root = "./data/artifacts"
//!
//! [jobs]
//! workers = 4
//!
//! [models.generation]
//! provider = "ollama"
//! model = "llama3"
//! ```

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use docflow_core::analysis::AnalysisParams;
use docflow_core::retrieval::RetrievalParams;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub models: ModelsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/docflow.sqlite"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Root directory for uploaded and generated artifacts.
    pub root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./data/artifacts"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    1000
}
fn default_chunk_overlap() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Per-document excerpt cap when building generation context.
    #[serde(default = "default_excerpt_chars")]
    pub excerpt_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            excerpt_chars: default_excerpt_chars(),
        }
    }
}

fn default_top_k() -> usize {
    3
}
fn default_excerpt_chars() -> usize {
    2000
}

#[derive(Debug, Deserialize, Clone)]
pub struct JobsConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Per-job deadline in seconds; 0 disables it.
    #[serde(default)]
    pub timeout_secs: u64,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
            timeout_secs: 0,
        }
    }
}

fn default_workers() -> usize {
    4
}
fn default_queue_capacity() -> usize {
    64
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExtractionConfig {
    /// Structured output shorter than this (trimmed) is treated as minimal.
    #[serde(default = "default_min_text_chars")]
    pub min_text_chars: usize,
    #[serde(default = "default_ocr_language")]
    pub ocr_language: String,
    #[serde(default = "default_ocr_dpi")]
    pub ocr_dpi: u32,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            min_text_chars: default_min_text_chars(),
            ocr_language: default_ocr_language(),
            ocr_dpi: default_ocr_dpi(),
        }
    }
}

fn default_min_text_chars() -> usize {
    100
}
fn default_ocr_language() -> String {
    "eng".to_string()
}
fn default_ocr_dpi() -> u32 {
    300
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnalysisConfig {
    #[serde(default = "default_summary_chunk_chars")]
    pub summary_chunk_chars: usize,
    #[serde(default = "default_max_summary_chunks")]
    pub max_summary_chunks: usize,
    #[serde(default = "default_min_summary_chunk_chars")]
    pub min_summary_chunk_chars: usize,
    #[serde(default = "default_summary_sentences")]
    pub summary_sentences: usize,
    #[serde(default = "default_max_keywords")]
    pub max_keywords: usize,
    #[serde(default = "default_model_input_chars")]
    pub model_input_chars: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            summary_chunk_chars: default_summary_chunk_chars(),
            max_summary_chunks: default_max_summary_chunks(),
            min_summary_chunk_chars: default_min_summary_chunk_chars(),
            summary_sentences: default_summary_sentences(),
            max_keywords: default_max_keywords(),
            model_input_chars: default_model_input_chars(),
        }
    }
}

fn default_summary_chunk_chars() -> usize {
    1000
}
fn default_max_summary_chunks() -> usize {
    3
}
fn default_min_summary_chunk_chars() -> usize {
    50
}
fn default_summary_sentences() -> usize {
    5
}
fn default_max_keywords() -> usize {
    10
}
fn default_model_input_chars() -> usize {
    512
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_sampling_top_k")]
    pub top_k: u32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default = "default_repeat_penalty")]
    pub repeat_penalty: f32,
    /// Excerpt length per reference in the templated fallback document.
    #[serde(default = "default_fallback_excerpt_chars")]
    pub fallback_excerpt_chars: usize,
    /// Unresolvable reference ids tolerated before the job fails.
    #[serde(default = "default_max_missing_references")]
    pub max_missing_references: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            top_k: default_sampling_top_k(),
            top_p: default_top_p(),
            repeat_penalty: default_repeat_penalty(),
            fallback_excerpt_chars: default_fallback_excerpt_chars(),
            max_missing_references: default_max_missing_references(),
        }
    }
}

fn default_max_tokens() -> u32 {
    2000
}
fn default_temperature() -> f32 {
    0.7
}
fn default_sampling_top_k() -> u32 {
    40
}
fn default_top_p() -> f32 {
    0.4
}
fn default_repeat_penalty() -> f32 {
    1.18
}
fn default_fallback_excerpt_chars() -> usize {
    200
}
fn default_max_missing_references() -> usize {
    2
}

/// Provider settings for one model capability.
#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Environment variable holding the API token, if the provider needs one.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl ModelConfig {
    pub fn with_provider(provider: &str) -> Self {
        Self {
            provider: provider.to_string(),
            model: None,
            url: None,
            dims: None,
            api_key_env: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }

    pub fn disabled() -> Self {
        Self::with_provider("disabled")
    }

    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelsConfig {
    #[serde(default = "default_embedding_model")]
    pub embedding: ModelConfig,
    #[serde(default = "ModelConfig::disabled")]
    pub summarization: ModelConfig,
    #[serde(default = "ModelConfig::disabled")]
    pub sentiment: ModelConfig,
    #[serde(default = "ModelConfig::disabled")]
    pub entities: ModelConfig,
    #[serde(default = "ModelConfig::disabled")]
    pub question_answering: ModelConfig,
    #[serde(default = "ModelConfig::disabled")]
    pub generation: ModelConfig,
    #[serde(default = "default_ocr_model")]
    pub ocr: ModelConfig,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            embedding: default_embedding_model(),
            summarization: ModelConfig::disabled(),
            sentiment: ModelConfig::disabled(),
            entities: ModelConfig::disabled(),
            question_answering: ModelConfig::disabled(),
            generation: ModelConfig::disabled(),
            ocr: default_ocr_model(),
        }
    }
}

fn default_embedding_model() -> ModelConfig {
    ModelConfig::with_provider("hashing")
}
fn default_ocr_model() -> ModelConfig {
    ModelConfig::with_provider("tesseract")
}

impl Config {
    /// All-defaults configuration with the database and artifacts under `root`.
    pub fn minimal(root: &Path) -> Self {
        Self {
            db: DbConfig {
                path: root.join("docflow.sqlite"),
            },
            storage: StorageConfig {
                root: root.join("artifacts"),
            },
            ..Default::default()
        }
    }

    pub fn retrieval_params(&self) -> RetrievalParams {
        RetrievalParams {
            chunk_size: self.chunking.chunk_size,
            chunk_overlap: self.chunking.chunk_overlap,
        }
    }

    pub fn analysis_params(&self) -> AnalysisParams {
        AnalysisParams {
            summary_chunk_chars: self.analysis.summary_chunk_chars,
            max_summary_chunks: self.analysis.max_summary_chunks,
            min_summary_chunk_chars: self.analysis.min_summary_chunk_chars,
            summary_sentences: self.analysis.summary_sentences,
            max_keywords: self.analysis.max_keywords,
            model_input_chars: self.analysis.model_input_chars,
        }
    }

    /// Check numeric bounds and provider names.
    pub fn validate(&self) -> Result<()> {
        if self.chunking.chunk_size == 0 {
            bail!("chunking.chunk_size must be > 0");
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            bail!("chunking.chunk_overlap must be < chunking.chunk_size");
        }
        if self.retrieval.top_k == 0 {
            bail!("retrieval.top_k must be >= 1");
        }
        if self.retrieval.excerpt_chars == 0 {
            bail!("retrieval.excerpt_chars must be > 0");
        }
        if self.jobs.workers == 0 {
            bail!("jobs.workers must be >= 1");
        }
        if self.jobs.queue_capacity == 0 {
            bail!("jobs.queue_capacity must be >= 1");
        }
        if self.analysis.summary_chunk_chars == 0 || self.analysis.max_summary_chunks == 0 {
            bail!("analysis.summary_chunk_chars and analysis.max_summary_chunks must be > 0");
        }
        if !(0.0..=2.0).contains(&self.generation.temperature) {
            bail!("generation.temperature must be in [0.0, 2.0]");
        }
        if !(0.0..=1.0).contains(&self.generation.top_p) {
            bail!("generation.top_p must be in [0.0, 1.0]");
        }

        let models = &self.models;
        check_provider(
            "embedding",
            &models.embedding,
            &["disabled", "hashing", "local", "openai", "ollama"],
        )?;
        for (name, m) in [
            ("summarization", &models.summarization),
            ("sentiment", &models.sentiment),
            ("entities", &models.entities),
            ("question_answering", &models.question_answering),
        ] {
            check_provider(name, m, &["disabled", "hf-inference"])?;
        }
        check_provider("generation", &models.generation, &["disabled", "ollama"])?;
        check_provider("ocr", &models.ocr, &["disabled", "tesseract"])?;

        if matches!(models.embedding.provider.as_str(), "openai" | "ollama") {
            if models.embedding.model.is_none() {
                bail!(
                    "models.embedding.model must be specified when provider is '{}'",
                    models.embedding.provider
                );
            }
            if models.embedding.dims.is_none() || models.embedding.dims == Some(0) {
                bail!(
                    "models.embedding.dims must be > 0 when provider is '{}'",
                    models.embedding.provider
                );
            }
        }
        for (name, m) in [
            ("summarization", &models.summarization),
            ("sentiment", &models.sentiment),
            ("entities", &models.entities),
            ("question_answering", &models.question_answering),
            ("generation", &models.generation),
        ] {
            if m.is_enabled() && m.model.is_none() {
                bail!(
                    "models.{}.model must be specified when provider is '{}'",
                    name,
                    m.provider
                );
            }
        }
        Ok(())
    }
}

fn check_provider(name: &str, m: &ModelConfig, allowed: &[&str]) -> Result<()> {
    if !allowed.contains(&m.provider.as_str()) {
        bail!(
            "Unknown {} provider: '{}'. Must be one of: {}.",
            name,
            m.provider,
            allowed.join(", ")
        );
    }
    Ok(())
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> (tempfile::NamedTempFile, PathBuf) {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        let path = f.path().to_path_buf();
        (f, path)
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let (_f, path) = write_config("");
        let config = load_config(&path).unwrap();
        assert_eq!(config.chunking.chunk_size, 1000);
        assert_eq!(config.chunking.chunk_overlap, 200);
        assert_eq!(config.retrieval.top_k, 3);
        assert_eq!(config.extraction.min_text_chars, 100);
        assert_eq!(config.generation.max_tokens, 2000);
        assert_eq!(config.models.embedding.provider, "hashing");
        assert_eq!(config.models.ocr.provider, "tesseract");
        assert!(!config.models.generation.is_enabled());
    }

    #[test]
    fn test_sections_override_defaults() {
        let (_f, path) = write_config(
            r#"
[db]
path = "/tmp/x.sqlite"

[jobs]
workers = 2
timeout_secs = 60

[models.generation]
provider = "ollama"
model = "llama3"
url = "http://localhost:11434"
"#,
        );
        let config = load_config(&path).unwrap();
        assert_eq!(config.db.path, PathBuf::from("/tmp/x.sqlite"));
        assert_eq!(config.jobs.workers, 2);
        assert_eq!(config.jobs.timeout_secs, 60);
        assert_eq!(config.models.generation.model.as_deref(), Some("llama3"));
        assert_eq!(config.models.summarization.provider, "disabled");
    }

    #[test]
    fn test_overlap_must_be_smaller_than_size() {
        let (_f, path) = write_config("[chunking]\nchunk_size = 100\nchunk_overlap = 100\n");
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("chunk_overlap"));
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let (_f, path) = write_config("[models.sentiment]\nprovider = \"magic\"\n");
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("Unknown sentiment provider"));
    }

    #[test]
    fn test_enabled_model_requires_name() {
        let (_f, path) = write_config("[models.summarization]\nprovider = \"hf-inference\"\n");
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn test_missing_file_has_context() {
        let err = load_config(Path::new("/nonexistent/docflow.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
