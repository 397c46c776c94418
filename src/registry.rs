//! Process-wide model registry.
//!
//! Every capability is loaded lazily, at most once per process, on first
//! use. Each lives in its own [`tokio::sync::OnceCell`], so concurrent
//! first callers wait on one initialization instead of racing it, and
//! afterwards observe either a ready handle or "unavailable", never a
//! half-built model.
//!
//! ```text
//!                 first use              load ok
//! Uninitialized ────────────▶ loading ─────────────▶ Ready(handle)
//!                                │
//!                                │ disabled / load error
//!                                ▼
//!                           Unavailable
//! ```
//!
//! An unavailable capability is not an error: callers fall back to their
//! rule-based path (see the analysis, extraction, and generation engines).
//!
//! # Providers
//!
//! | Capability | Config table | Providers |
//! |------------|--------------|-----------|
//! | Embedding | `[models.embedding]` | `hashing`, `local`, `openai`, `ollama`, `disabled` |
//! | Summarization | `[models.summarization]` | `hf-inference`, `disabled` |
//! | Sentiment | `[models.sentiment]` | `hf-inference`, `disabled` |
//! | EntityRecognition | `[models.entities]` | `hf-inference`, `disabled` |
//! | QuestionAnswering | `[models.question_answering]` | `hf-inference`, `disabled` |
//! | Generation | `[models.generation]` | `ollama`, `disabled` |
//! | Ocr | `[models.ocr]` | `tesseract`, `disabled` |

use std::fmt;
use std::sync::Arc;

use anyhow::{bail, Result};
use tokio::sync::OnceCell;

use docflow_core::analysis::{EntityRecognizer, SentimentClassifier, Summarizer};
use docflow_core::embedding::{Embedder, HashingEmbedder, HASHING_DIMS};
use docflow_core::retrieval::QuestionAnswerer;

use crate::config::{ExtractionConfig, ModelConfig, ModelsConfig};
use crate::generation::TextGenerator;
use crate::ocr::{OcrEngine, TesseractOcr};
use crate::providers::embedding::{OllamaEmbedder, OpenAiEmbedder};
use crate::providers::hf::HfInferenceModel;
use crate::providers::ollama::OllamaGenerator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Embedding,
    Summarization,
    Sentiment,
    EntityRecognition,
    QuestionAnswering,
    Generation,
    Ocr,
}

impl Capability {
    pub const ALL: [Capability; 7] = [
        Capability::Embedding,
        Capability::Summarization,
        Capability::Sentiment,
        Capability::EntityRecognition,
        Capability::QuestionAnswering,
        Capability::Generation,
        Capability::Ocr,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Embedding => "embedding",
            Capability::Summarization => "summarization",
            Capability::Sentiment => "sentiment",
            Capability::EntityRecognition => "entities",
            Capability::QuestionAnswering => "question_answering",
            Capability::Generation => "generation",
            Capability::Ocr => "ocr",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// Not requested yet.
    Uninitialized,
    Ready,
    Unavailable,
}

impl Readiness {
    pub fn as_str(&self) -> &'static str {
        match self {
            Readiness::Uninitialized => "uninitialized",
            Readiness::Ready => "ready",
            Readiness::Unavailable => "unavailable",
        }
    }
}

/// One row of [`ModelRegistry::warm_up`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityStatus {
    pub capability: Capability,
    pub provider: String,
    pub readiness: Readiness,
    pub model: Option<String>,
}

type Slot<T> = OnceCell<Option<Arc<T>>>;

pub struct ModelRegistry {
    models: ModelsConfig,
    extraction: ExtractionConfig,
    embedder: Slot<dyn Embedder>,
    summarizer: Slot<dyn Summarizer>,
    sentiment: Slot<dyn SentimentClassifier>,
    recognizer: Slot<dyn EntityRecognizer>,
    question_answerer: Slot<dyn QuestionAnswerer>,
    generator: Slot<dyn TextGenerator>,
    ocr: Slot<dyn OcrEngine>,
}

fn readiness_of<T: ?Sized>(slot: &Slot<T>) -> Readiness {
    match slot.get() {
        None => Readiness::Uninitialized,
        Some(Some(_)) => Readiness::Ready,
        Some(None) => Readiness::Unavailable,
    }
}

/// Turn a load result into the cached slot value, logging the outcome.
fn settle<T: ?Sized>(capability: Capability, provider: &str, loaded: Result<Option<Arc<T>>>) -> Option<Arc<T>> {
    match loaded {
        Ok(Some(handle)) => {
            tracing::info!(capability = %capability, provider, "model ready");
            Some(handle)
        }
        Ok(None) => {
            tracing::debug!(capability = %capability, "capability disabled");
            None
        }
        Err(e) => {
            tracing::warn!(
                capability = %capability,
                provider,
                error = %e,
                "model unavailable, falling back"
            );
            None
        }
    }
}

impl ModelRegistry {
    pub fn new(models: ModelsConfig, extraction: ExtractionConfig) -> Self {
        Self::builder(models, extraction).build()
    }

    /// Registry with some capabilities pre-seeded or forced unavailable.
    pub fn builder(models: ModelsConfig, extraction: ExtractionConfig) -> RegistryBuilder {
        RegistryBuilder {
            registry: Self {
                models,
                extraction,
                embedder: OnceCell::new(),
                summarizer: OnceCell::new(),
                sentiment: OnceCell::new(),
                recognizer: OnceCell::new(),
                question_answerer: OnceCell::new(),
                generator: OnceCell::new(),
                ocr: OnceCell::new(),
            },
        }
    }

    fn provider(&self, capability: Capability) -> &ModelConfig {
        match capability {
            Capability::Embedding => &self.models.embedding,
            Capability::Summarization => &self.models.summarization,
            Capability::Sentiment => &self.models.sentiment,
            Capability::EntityRecognition => &self.models.entities,
            Capability::QuestionAnswering => &self.models.question_answering,
            Capability::Generation => &self.models.generation,
            Capability::Ocr => &self.models.ocr,
        }
    }

    /// Current state without triggering a load.
    pub fn readiness(&self, capability: Capability) -> Readiness {
        match capability {
            Capability::Embedding => readiness_of(&self.embedder),
            Capability::Summarization => readiness_of(&self.summarizer),
            Capability::Sentiment => readiness_of(&self.sentiment),
            Capability::EntityRecognition => readiness_of(&self.recognizer),
            Capability::QuestionAnswering => readiness_of(&self.question_answerer),
            Capability::Generation => readiness_of(&self.generator),
            Capability::Ocr => readiness_of(&self.ocr),
        }
    }

    pub fn is_ready(&self, capability: Capability) -> bool {
        self.readiness(capability) == Readiness::Ready
    }

    pub async fn embedder(&self) -> Option<Arc<dyn Embedder>> {
        let config = &self.models.embedding;
        self.embedder
            .get_or_init(|| async {
                settle(Capability::Embedding, &config.provider, load_embedder(config).await)
            })
            .await
            .clone()
    }

    pub async fn summarizer(&self) -> Option<Arc<dyn Summarizer>> {
        let config = &self.models.summarization;
        self.summarizer
            .get_or_init(|| async {
                let loaded = load_hf(config).map(|m| m.map(|m| m as Arc<dyn Summarizer>));
                settle(Capability::Summarization, &config.provider, loaded)
            })
            .await
            .clone()
    }

    pub async fn sentiment(&self) -> Option<Arc<dyn SentimentClassifier>> {
        let config = &self.models.sentiment;
        self.sentiment
            .get_or_init(|| async {
                let loaded = load_hf(config).map(|m| m.map(|m| m as Arc<dyn SentimentClassifier>));
                settle(Capability::Sentiment, &config.provider, loaded)
            })
            .await
            .clone()
    }

    pub async fn recognizer(&self) -> Option<Arc<dyn EntityRecognizer>> {
        let config = &self.models.entities;
        self.recognizer
            .get_or_init(|| async {
                let loaded = load_hf(config).map(|m| m.map(|m| m as Arc<dyn EntityRecognizer>));
                settle(Capability::EntityRecognition, &config.provider, loaded)
            })
            .await
            .clone()
    }

    pub async fn question_answerer(&self) -> Option<Arc<dyn QuestionAnswerer>> {
        let config = &self.models.question_answering;
        self.question_answerer
            .get_or_init(|| async {
                let loaded = load_hf(config).map(|m| m.map(|m| m as Arc<dyn QuestionAnswerer>));
                settle(Capability::QuestionAnswering, &config.provider, loaded)
            })
            .await
            .clone()
    }

    pub async fn generator(&self) -> Option<Arc<dyn TextGenerator>> {
        let config = &self.models.generation;
        self.generator
            .get_or_init(|| async {
                let loaded: Result<Option<Arc<dyn TextGenerator>>> = match config.provider.as_str() {
                    "disabled" => Ok(None),
                    "ollama" => OllamaGenerator::new(config).map(|g| Some(Arc::new(g) as _)),
                    other => Err(anyhow::anyhow!("Unknown generation provider: {}", other)),
                };
                settle(Capability::Generation, &config.provider, loaded)
            })
            .await
            .clone()
    }

    pub async fn ocr(&self) -> Option<Arc<dyn OcrEngine>> {
        let config = &self.models.ocr;
        let language = self.extraction.ocr_language.clone();
        let dpi = self.extraction.ocr_dpi;
        self.ocr
            .get_or_init(|| async move {
                let loaded: Result<Option<Arc<dyn OcrEngine>>> = match config.provider.as_str() {
                    "disabled" => Ok(None),
                    "tesseract" => tokio::task::spawn_blocking(move || TesseractOcr::detect(&language, dpi))
                        .await
                        .map(|found| found.map(|t| Arc::new(t) as _))
                        .map_err(Into::into),
                    other => Err(anyhow::anyhow!("Unknown OCR provider: {}", other)),
                };
                settle(Capability::Ocr, &config.provider, loaded)
            })
            .await
            .clone()
    }

    /// Initialize every capability and report the outcome.
    pub async fn warm_up(&self) -> Vec<CapabilityStatus> {
        let mut out = Vec::with_capacity(Capability::ALL.len());
        for capability in Capability::ALL {
            let model = match capability {
                Capability::Embedding => self.embedder().await.map(|m| m.model_name().to_string()),
                Capability::Summarization => self.summarizer().await.map(|m| m.model_name().to_string()),
                Capability::Sentiment => self.sentiment().await.map(|m| m.model_name().to_string()),
                Capability::EntityRecognition => {
                    self.recognizer().await.map(|m| m.model_name().to_string())
                }
                Capability::QuestionAnswering => {
                    self.question_answerer().await.map(|m| m.model_name().to_string())
                }
                Capability::Generation => self.generator().await.map(|m| m.model_name().to_string()),
                Capability::Ocr => self.ocr().await.map(|m| m.name().to_string()),
            };
            out.push(CapabilityStatus {
                capability,
                provider: self.provider(capability).provider.clone(),
                readiness: self.readiness(capability),
                model,
            });
        }
        out
    }
}

async fn load_embedder(config: &ModelConfig) -> Result<Option<Arc<dyn Embedder>>> {
    match config.provider.as_str() {
        "disabled" => Ok(None),
        "hashing" => Ok(Some(Arc::new(HashingEmbedder::new(
            config.dims.unwrap_or(HASHING_DIMS),
        )))),
        "openai" => Ok(Some(Arc::new(OpenAiEmbedder::new(config)?))),
        "ollama" => Ok(Some(Arc::new(OllamaEmbedder::new(config)?))),
        #[cfg(feature = "local-embeddings-fastembed")]
        "local" => {
            let config = config.clone();
            let model = tokio::task::spawn_blocking(move || {
                crate::providers::embedding::LocalEmbedder::load(&config)
            })
            .await??;
            Ok(Some(Arc::new(model)))
        }
        #[cfg(not(feature = "local-embeddings-fastembed"))]
        "local" => bail!("Local embedding provider requires --features local-embeddings-fastembed"),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

fn load_hf(config: &ModelConfig) -> Result<Option<Arc<HfInferenceModel>>> {
    match config.provider.as_str() {
        "disabled" => Ok(None),
        "hf-inference" => Ok(Some(Arc::new(HfInferenceModel::new(config)?))),
        other => bail!("Unknown provider: {}", other),
    }
}

/// Pre-seeds capabilities before the registry is shared.
pub struct RegistryBuilder {
    registry: ModelRegistry,
}

impl RegistryBuilder {
    pub fn with_embedder(mut self, m: Arc<dyn Embedder>) -> Self {
        self.registry.embedder = OnceCell::new_with(Some(Some(m)));
        self
    }

    pub fn with_summarizer(mut self, m: Arc<dyn Summarizer>) -> Self {
        self.registry.summarizer = OnceCell::new_with(Some(Some(m)));
        self
    }

    pub fn with_sentiment(mut self, m: Arc<dyn SentimentClassifier>) -> Self {
        self.registry.sentiment = OnceCell::new_with(Some(Some(m)));
        self
    }

    pub fn with_recognizer(mut self, m: Arc<dyn EntityRecognizer>) -> Self {
        self.registry.recognizer = OnceCell::new_with(Some(Some(m)));
        self
    }

    pub fn with_question_answerer(mut self, m: Arc<dyn QuestionAnswerer>) -> Self {
        self.registry.question_answerer = OnceCell::new_with(Some(Some(m)));
        self
    }

    pub fn with_generator(mut self, m: Arc<dyn TextGenerator>) -> Self {
        self.registry.generator = OnceCell::new_with(Some(Some(m)));
        self
    }

    pub fn with_ocr(mut self, m: Arc<dyn OcrEngine>) -> Self {
        self.registry.ocr = OnceCell::new_with(Some(Some(m)));
        self
    }

    /// Force a capability to report unavailable without loading anything.
    pub fn without(mut self, capability: Capability) -> Self {
        let r = &mut self.registry;
        match capability {
            Capability::Embedding => r.embedder = OnceCell::new_with(Some(None)),
            Capability::Summarization => r.summarizer = OnceCell::new_with(Some(None)),
            Capability::Sentiment => r.sentiment = OnceCell::new_with(Some(None)),
            Capability::EntityRecognition => r.recognizer = OnceCell::new_with(Some(None)),
            Capability::QuestionAnswering => r.question_answerer = OnceCell::new_with(Some(None)),
            Capability::Generation => r.generator = OnceCell::new_with(Some(None)),
            Capability::Ocr => r.ocr = OnceCell::new_with(Some(None)),
        }
        self
    }

    pub fn build(self) -> ModelRegistry {
        self.registry
    }
}
