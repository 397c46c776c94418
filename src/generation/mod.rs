//! Generation engine: prompt + template + references → content.
//!
//! ```text
//! references ──▶ excerpts ─┐
//! template ────────────────┼──▶ PromptBuilder ──▶ TextGenerator ──▶ content
//! prompt ──────────────────┘          │                 │ (absent / error / empty)
//!                                     │                 ▼
//!                                     └────────▶ fallback_document
//! ```
//!
//! Content is then rendered into the requested [`OutputFormat`] through a
//! [`render::Renderer`] by [`render::render_or_fallback`]; a renderer
//! failure degrades to a plain-text artifact instead of failing the job.
//!
//! Job failures are reserved for [`GenerationError`]: too many missing
//! references, nothing to generate from, or an artifact that cannot be
//! written.

pub mod prompt;
pub mod render;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use docflow_core::models::{Document, GeneratorKind, OutputFormat, Template};
use docflow_core::retrieval::ContextExcerpt;

use crate::config::GenerationConfig;

pub use prompt::{fallback_document, PromptBuilder};

/// Sampling options passed to a generative model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingParams {
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_k: u32,
    pub top_p: f32,
    pub repeat_penalty: f32,
}

impl From<&GenerationConfig> for SamplingParams {
    fn from(c: &GenerationConfig) -> Self {
        Self {
            max_tokens: c.max_tokens,
            temperature: c.temperature,
            top_k: c.top_k,
            top_p: c.top_p,
            repeat_penalty: c.repeat_penalty,
        }
    }
}

/// Free-text generation from a single prompt.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    fn model_name(&self) -> &str;
    async fn generate(&self, prompt: &str, params: &SamplingParams) -> anyhow::Result<String>;
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("{missing} of {requested} reference documents not found: {}", .ids.join(", "))]
    InvalidReference {
        missing: usize,
        requested: usize,
        ids: Vec<String>,
    },
    #[error("nothing to generate: no prompt and no reference content")]
    NothingToGenerate,
    #[error("generation failed: {0}")]
    Failure(String),
}

/// Check resolved references against the requested ids.
///
/// Returns the ids that did not resolve (to be skipped), or
/// [`GenerationError::InvalidReference`] when more than `max_missing`
/// are gone or none of them resolved.
pub fn check_references(
    requested: &[String],
    resolved: &[Document],
    max_missing: usize,
) -> Result<Vec<String>, GenerationError> {
    let missing: Vec<String> = requested
        .iter()
        .filter(|id| !resolved.iter().any(|d| &d.id == *id))
        .cloned()
        .collect();
    if missing.is_empty() {
        return Ok(missing);
    }
    if missing.len() > max_missing || missing.len() == requested.len() {
        return Err(GenerationError::InvalidReference {
            missing: missing.len(),
            requested: requested.len(),
            ids: missing,
        });
    }
    tracing::warn!(skipped = ?missing, "skipping missing reference documents");
    Ok(missing)
}

/// Inputs for one generation run.
#[derive(Debug, Clone, Copy)]
pub struct GenerationRequest<'a> {
    pub title: &'a str,
    pub prompt: &'a str,
    pub format: OutputFormat,
    pub template: Option<&'a Template>,
    pub excerpts: &'a [ContextExcerpt],
}

/// Generated content and who produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Composed {
    pub content: String,
    pub generator: GeneratorKind,
    pub model: Option<String>,
}

pub struct GenerationEngine {
    generator: Option<Arc<dyn TextGenerator>>,
    sampling: SamplingParams,
    fallback_excerpt_chars: usize,
}

impl GenerationEngine {
    pub fn new(generator: Option<Arc<dyn TextGenerator>>, config: &GenerationConfig) -> Self {
        Self {
            generator,
            sampling: SamplingParams::from(config),
            fallback_excerpt_chars: config.fallback_excerpt_chars,
        }
    }

    pub async fn compose(&self, req: GenerationRequest<'_>) -> Result<Composed, GenerationError> {
        if req.prompt.trim().is_empty() && req.excerpts.is_empty() {
            return Err(GenerationError::NothingToGenerate);
        }

        if let Some(generator) = &self.generator {
            let prompt = PromptBuilder::new(req.prompt, req.format)
                .excerpts(req.excerpts)
                .template(req.template)
                .build();
            match generator.generate(&prompt, &self.sampling).await {
                Ok(content) if !content.trim().is_empty() => {
                    return Ok(Composed {
                        content: content.trim().to_string(),
                        generator: GeneratorKind::Model,
                        model: Some(generator.model_name().to_string()),
                    });
                }
                Ok(_) => {
                    tracing::warn!(model = generator.model_name(), "generator returned no text, using template");
                }
                Err(e) => {
                    tracing::warn!(
                        model = generator.model_name(),
                        error = %e,
                        "generator failed, using template"
                    );
                }
            }
        }

        Ok(Composed {
            content: fallback_document(
                req.title,
                req.prompt,
                req.template,
                req.excerpts,
                self.fallback_excerpt_chars,
            ),
            generator: GeneratorKind::Template,
            model: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Echo {
        seen: Mutex<Option<String>>,
        reply: String,
    }

    impl Echo {
        fn replying(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                seen: Mutex::new(None),
                reply: reply.to_string(),
            })
        }
    }

    #[async_trait]
    impl TextGenerator for Echo {
        fn model_name(&self) -> &str {
            "echo"
        }
        async fn generate(&self, prompt: &str, _params: &SamplingParams) -> anyhow::Result<String> {
            *self.seen.lock().unwrap() = Some(prompt.to_string());
            Ok(self.reply.clone())
        }
    }

    struct Broken;

    #[async_trait]
    impl TextGenerator for Broken {
        fn model_name(&self) -> &str {
            "broken"
        }
        async fn generate(&self, _prompt: &str, _params: &SamplingParams) -> anyhow::Result<String> {
            anyhow::bail!("connection refused")
        }
    }

    fn request<'a>(prompt: &'a str, excerpts: &'a [ContextExcerpt]) -> GenerationRequest<'a> {
        GenerationRequest {
            title: "Report",
            prompt,
            format: OutputFormat::Markdown,
            template: None,
            excerpts,
        }
    }

    fn doc(id: &str) -> Document {
        let mut d = Document::new(id, "a.txt", "uploads/documents/a.txt");
        d.id = id.to_string();
        d
    }

    #[tokio::test]
    async fn test_model_output_is_used() {
        let echo = Echo::replying("  # Report\n\nBody  ");
        let engine = GenerationEngine::new(Some(echo.clone()), &GenerationConfig::default());
        let out = engine.compose(request("Write a report", &[])).await.unwrap();
        assert_eq!(out.content, "# Report\n\nBody");
        assert_eq!(out.generator, GeneratorKind::Model);
        assert_eq!(out.model.as_deref(), Some("echo"));
        let seen = echo.seen.lock().unwrap().clone().unwrap();
        assert!(seen.ends_with("Task: Write a report"));
    }

    #[tokio::test]
    async fn test_generator_error_falls_back_to_template() {
        let engine = GenerationEngine::new(Some(Arc::new(Broken)), &GenerationConfig::default());
        let out = engine.compose(request("Write a report", &[])).await.unwrap();
        assert_eq!(out.generator, GeneratorKind::Template);
        assert!(out.content.starts_with("# Report"));
        assert!(out.content.contains("## Executive Summary"));
    }

    #[tokio::test]
    async fn test_empty_model_output_falls_back() {
        let engine = GenerationEngine::new(Some(Echo::replying("   ")), &GenerationConfig::default());
        let out = engine.compose(request("Write", &[])).await.unwrap();
        assert_eq!(out.generator, GeneratorKind::Template);
    }

    #[tokio::test]
    async fn test_nothing_to_generate() {
        let engine = GenerationEngine::new(None, &GenerationConfig::default());
        let err = engine.compose(request("  ", &[])).await.unwrap_err();
        assert!(matches!(err, GenerationError::NothingToGenerate));

        let excerpts = vec![ContextExcerpt {
            document_id: "d1".into(),
            document_title: "Notes".into(),
            text: "Some reference text".into(),
        }];
        assert!(engine.compose(request("", &excerpts)).await.is_ok());
    }

    #[test]
    fn test_check_references_skips_within_threshold() {
        let requested = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let skipped = check_references(&requested, &[doc("a"), doc("c")], 2).unwrap();
        assert_eq!(skipped, vec!["b"]);
        assert!(check_references(&requested, &[doc("a"), doc("b"), doc("c")], 0)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_check_references_rejects_too_many_or_all_missing() {
        let requested = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let err = check_references(&requested, &[doc("a")], 1).unwrap_err();
        assert!(matches!(err, GenerationError::InvalidReference { missing: 2, .. }));

        let one = vec!["gone".to_string()];
        let err = check_references(&one, &[], 5).unwrap_err();
        assert_eq!(err.to_string(), "1 of 1 reference documents not found: gone");
    }
}
