//! Analysis engine: summary, keywords, sentiment, entities, and topics.
//!
//! Each capability prefers its model-backed implementation and degrades
//! to a rule-based one independently of the others:
//!
//! | Field | Model | Fallback |
//! |-------|-------|----------|
//! | `summary` | [`Summarizer`] over leading windows | [`text::extractive_summary`] |
//! | `keywords` | none | [`text::keywords`] |
//! | `sentiment` | [`SentimentClassifier`] | [`text::lexicon_sentiment`] |
//! | `entities` | [`EntityRecognizer`] + sub-word merging | [`entities::regex_entities`] |
//! | `topics` | none | [`text::topics_from_keywords`] |
//!
//! A model error or empty model output is logged and triggers the
//! fallback; it never fails the analysis. Empty input fails immediately
//! with [`AnalysisError::NoText`].

pub mod entities;
pub mod text;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;

use crate::models::AnalysisOutput;
use crate::retrieval::truncate_chars;

pub use entities::TokenEntity;

/// Abstractive summarization model.
#[async_trait]
pub trait Summarizer: Send + Sync {
    fn model_name(&self) -> &str;
    async fn summarize(&self, text: &str) -> Result<String>;
}

/// Top label predicted by a sentiment model.
#[derive(Debug, Clone, PartialEq)]
pub struct SentimentLabel {
    pub label: String,
    pub score: f64,
}

impl SentimentLabel {
    /// Signed score: `POSITIVE` → `+score`, `NEGATIVE` → `-score`,
    /// anything else → 0. Clamped to `[-1, 1]`.
    pub fn signed(&self) -> f64 {
        let label = self.label.to_ascii_uppercase();
        let s = if label.starts_with("POS") {
            self.score
        } else if label.starts_with("NEG") {
            -self.score
        } else {
            0.0
        };
        s.clamp(-1.0, 1.0)
    }
}

#[async_trait]
pub trait SentimentClassifier: Send + Sync {
    fn model_name(&self) -> &str;
    async fn classify(&self, text: &str) -> Result<SentimentLabel>;
}

/// Token-classification model.
#[async_trait]
pub trait EntityRecognizer: Send + Sync {
    fn model_name(&self) -> &str;
    async fn recognize(&self, text: &str) -> Result<Vec<TokenEntity>>;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnalysisError {
    /// The document has no extracted text to analyze.
    #[error("no_extracted_text")]
    NoText,
}

/// Tuning knobs, decoupled from application config.
#[derive(Debug, Clone)]
pub struct AnalysisParams {
    /// Window size (characters) fed to the summarization model.
    pub summary_chunk_chars: usize,
    /// Number of leading windows summarized.
    pub max_summary_chunks: usize,
    /// Windows shorter than this are skipped.
    pub min_summary_chunk_chars: usize,
    /// Sentences kept by the extractive fallback.
    pub summary_sentences: usize,
    pub max_keywords: usize,
    /// Prefix length sent to sentiment and entity models.
    pub model_input_chars: usize,
}

impl Default for AnalysisParams {
    fn default() -> Self {
        Self {
            summary_chunk_chars: 1000,
            max_summary_chunks: 3,
            min_summary_chunk_chars: 50,
            summary_sentences: 5,
            max_keywords: 10,
            model_input_chars: 512,
        }
    }
}

/// Composes optional model handles with rule-based fallbacks.
#[derive(Default)]
pub struct AnalysisEngine {
    params: AnalysisParams,
    summarizer: Option<Arc<dyn Summarizer>>,
    sentiment: Option<Arc<dyn SentimentClassifier>>,
    recognizer: Option<Arc<dyn EntityRecognizer>>,
}

impl AnalysisEngine {
    pub fn new(params: AnalysisParams) -> Self {
        Self {
            params,
            ..Default::default()
        }
    }

    pub fn with_summarizer(mut self, s: Option<Arc<dyn Summarizer>>) -> Self {
        self.summarizer = s;
        self
    }

    pub fn with_sentiment(mut self, s: Option<Arc<dyn SentimentClassifier>>) -> Self {
        self.sentiment = s;
        self
    }

    pub fn with_recognizer(mut self, r: Option<Arc<dyn EntityRecognizer>>) -> Self {
        self.recognizer = r;
        self
    }

    pub async fn analyze(&self, input: &str) -> Result<AnalysisOutput, AnalysisError> {
        if input.trim().is_empty() {
            return Err(AnalysisError::NoText);
        }

        let summary = self.summary(input).await;
        let keywords = text::keywords(input, self.params.max_keywords);
        let sentiment = self.sentiment(input).await;
        let entities = self.entities(input).await;
        let topics = text::topics_from_keywords(&keywords);

        Ok(AnalysisOutput {
            summary,
            keywords,
            sentiment,
            entities,
            topics,
        })
    }

    async fn summary(&self, input: &str) -> String {
        if let Some(model) = &self.summarizer {
            match self.model_summary(model.as_ref(), input).await {
                Ok(s) if !s.trim().is_empty() => return s,
                Ok(_) => tracing::warn!(
                    model = model.model_name(),
                    "summarizer returned nothing, using extractive summary"
                ),
                Err(e) => tracing::warn!(
                    model = model.model_name(),
                    error = %e,
                    "summarizer failed, using extractive summary"
                ),
            }
        }
        let summary = text::extractive_summary(input, self.params.summary_sentences);
        if summary.is_empty() {
            truncate_chars(input.trim(), self.params.summary_chunk_chars)
        } else {
            summary
        }
    }

    async fn model_summary(&self, model: &dyn Summarizer, input: &str) -> Result<String> {
        let chars: Vec<char> = input.chars().collect();
        let mut parts = Vec::new();
        for window in chars
            .chunks(self.params.summary_chunk_chars.max(1))
            .take(self.params.max_summary_chunks)
        {
            let window: String = window.iter().collect();
            if window.trim().chars().count() < self.params.min_summary_chunk_chars {
                continue;
            }
            let part = model.summarize(&window).await?;
            let part = part.trim();
            if !part.is_empty() {
                parts.push(part.to_string());
            }
        }
        Ok(parts.join(" "))
    }

    async fn sentiment(&self, input: &str) -> f64 {
        if let Some(model) = &self.sentiment {
            let prefix = truncate_chars(input, self.params.model_input_chars);
            match model.classify(&prefix).await {
                Ok(label) => return label.signed(),
                Err(e) => tracing::warn!(
                    model = model.model_name(),
                    error = %e,
                    "sentiment model failed, using lexicon"
                ),
            }
        }
        text::lexicon_sentiment(input)
    }

    async fn entities(&self, input: &str) -> Vec<crate::models::Entity> {
        if let Some(model) = &self.recognizer {
            let prefix = truncate_chars(input, self.params.model_input_chars);
            match model.recognize(&prefix).await {
                Ok(tokens) if !tokens.is_empty() => {
                    return entities::merge_subword_tokens(&tokens);
                }
                Ok(_) => tracing::debug!(
                    model = model.model_name(),
                    "recognizer found no entities, using patterns"
                ),
                Err(e) => tracing::warn!(
                    model = model.model_name(),
                    error = %e,
                    "entity model failed, using patterns"
                ),
            }
        }
        entities::regex_entities(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EntityKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSummarizer {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Summarizer for CountingSummarizer {
        fn model_name(&self) -> &str {
            "counting"
        }
        async fn summarize(&self, text: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("part({})", text.chars().count()))
        }
    }

    struct FailingModel;

    #[async_trait]
    impl SentimentClassifier for FailingModel {
        fn model_name(&self) -> &str {
            "failing"
        }
        async fn classify(&self, _text: &str) -> Result<SentimentLabel> {
            anyhow::bail!("model offline")
        }
    }

    struct NegativeModel;

    #[async_trait]
    impl SentimentClassifier for NegativeModel {
        fn model_name(&self) -> &str {
            "negative"
        }
        async fn classify(&self, text: &str) -> Result<SentimentLabel> {
            assert!(text.chars().count() <= 512);
            Ok(SentimentLabel {
                label: "NEGATIVE".to_string(),
                score: 0.8,
            })
        }
    }

    #[tokio::test]
    async fn test_empty_text_fails_with_no_text() {
        let engine = AnalysisEngine::new(AnalysisParams::default());
        let err = engine.analyze("   \n").await.unwrap_err();
        assert_eq!(err, AnalysisError::NoText);
        assert_eq!(err.to_string(), "no_extracted_text");
    }

    #[tokio::test]
    async fn test_fallbacks_without_models() {
        let engine = AnalysisEngine::new(AnalysisParams::default());
        let out = engine
            .analyze("The schedule is attached. Email ops@example.com with questions.")
            .await
            .unwrap();
        assert!(!out.summary.is_empty());
        assert_eq!(out.sentiment, 0.0);
        assert!(out.entities.iter().any(|e| e.kind == EntityKind::Email));
        assert_eq!(out.topics.first().map(|t| t.score), Some(1.0));
    }

    #[tokio::test]
    async fn test_model_summary_windows() {
        let model = Arc::new(CountingSummarizer {
            calls: AtomicUsize::new(0),
        });
        let engine = AnalysisEngine::new(AnalysisParams::default())
            .with_summarizer(Some(model.clone() as Arc<dyn Summarizer>));
        // 4 full windows plus a short tail: only the first 3 are summarized.
        let input = "word ".repeat(850);
        let out = engine.analyze(&input).await.unwrap();
        assert_eq!(model.calls.load(Ordering::SeqCst), 3);
        assert_eq!(out.summary, "part(1000) part(1000) part(1000)");
    }

    #[tokio::test]
    async fn test_model_summary_skips_short_windows() {
        let model = Arc::new(CountingSummarizer {
            calls: AtomicUsize::new(0),
        });
        let engine = AnalysisEngine::new(AnalysisParams::default())
            .with_summarizer(Some(model.clone() as Arc<dyn Summarizer>));
        let out = engine.analyze("Too short to summarize.").await.unwrap();
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
        assert_eq!(out.summary, "Too short to summarize.");
    }

    #[tokio::test]
    async fn test_capabilities_degrade_independently() {
        let engine = AnalysisEngine::new(AnalysisParams::default())
            .with_sentiment(Some(Arc::new(FailingModel)));
        let out = engine.analyze("What a great and excellent day.").await.unwrap();
        assert_eq!(out.sentiment, 1.0);

        let engine = AnalysisEngine::new(AnalysisParams::default())
            .with_sentiment(Some(Arc::new(NegativeModel)));
        let long = "great ".repeat(300);
        let out = engine.analyze(&long).await.unwrap();
        assert_eq!(out.sentiment, -0.8);
    }

    #[test]
    fn test_signed_sentiment_labels() {
        let l = |label: &str, score| SentimentLabel {
            label: label.to_string(),
            score,
        };
        assert_eq!(l("POSITIVE", 0.9).signed(), 0.9);
        assert_eq!(l("negative", 0.7).signed(), -0.7);
        assert_eq!(l("NEUTRAL", 0.99).signed(), 0.0);
        assert_eq!(l("POSITIVE", 1.7).signed(), 1.0);
    }
}
