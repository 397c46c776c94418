//! Extraction engine: raw upload → `(text, metadata)`.
//!
//! The engine walks an ordered list of [`ExtractionStrategy`] objects.
//! Each strategy belongs to a [`Stage`] that decides when it may run:
//!
//! | Stage | Runs while the best result so far is |
//! |-------|--------------------------------------|
//! | [`Stage::Structured`] | empty |
//! | [`Stage::Ocr`] | empty or minimal |
//! | [`Stage::Basic`] | empty |
//!
//! A result is *minimal* when its trimmed length is below
//! `extraction.min_text_chars`. A candidate replaces the current best when
//! the best is empty or the candidate is strictly longer, and the walk
//! stops at the first non-minimal best.
//!
//! # Outcomes
//!
//! - Some strategy produced text → that text, `extraction_method` = the
//!   strategy name.
//! - Nothing produced text → a placeholder naming the file, with
//!   `extraction_unavailable` (no supporting strategy was available) or
//!   `binary_file` (strategies ran and found nothing). This is a degraded
//!   success, not a failure.
//! - The upload cannot be read → [`ExtractionError::Io`], which fails the
//!   job.
//!
//! Strategy errors never escape: they are logged and the walk moves on.
//! Reordering or adding strategies is a change to the list passed to
//! [`ExtractionEngine::new`].

pub mod ooxml;
pub mod strategies;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use docflow_core::job::ExtractionOutput;
use docflow_core::models::{file_extension, DocumentType, ExtractionMetadata};

use crate::config::ExtractionConfig;
use crate::registry::ModelRegistry;

pub const PLACEHOLDER_METHOD: &str = "placeholder";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Structured,
    Ocr,
    Basic,
}

/// What a strategy sees: the stored file plus its bytes, read once.
#[derive(Debug, Clone)]
pub struct ExtractionInput {
    pub path: PathBuf,
    /// Name the file was uploaded under, used for extension checks and
    /// the placeholder text.
    pub file_name: String,
    pub declared_type: DocumentType,
    pub bytes: Arc<Vec<u8>>,
}

impl ExtractionInput {
    pub fn extension(&self) -> Option<String> {
        file_extension(&self.file_name)
    }
}

/// Text produced by one strategy.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Candidate {
    pub text: String,
    pub pages: Option<u32>,
    pub encoding: Option<String>,
    pub properties: BTreeMap<String, String>,
    pub ocr: bool,
}

impl Candidate {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    fn len(&self) -> usize {
        self.text.trim().chars().count()
    }
}

#[async_trait]
pub trait ExtractionStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn stage(&self) -> Stage;
    /// Whether this strategy handles the input's type at all.
    fn supports(&self, input: &ExtractionInput) -> bool;
    /// Whether the backing capability (binary, model) is present.
    async fn is_available(&self) -> bool {
        true
    }
    async fn try_extract(&self, input: &ExtractionInput) -> anyhow::Result<Candidate>;
}

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub struct ExtractionEngine {
    strategies: Vec<Arc<dyn ExtractionStrategy>>,
    min_text_chars: usize,
}

impl ExtractionEngine {
    pub fn new(strategies: Vec<Arc<dyn ExtractionStrategy>>, min_text_chars: usize) -> Self {
        Self {
            strategies,
            min_text_chars,
        }
    }

    /// The standard cascade (see [`strategies::default_strategies`]).
    pub fn with_defaults(registry: Arc<ModelRegistry>, config: &ExtractionConfig) -> Self {
        Self::new(strategies::default_strategies(registry), config.min_text_chars)
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    fn is_minimal(&self, c: &Candidate) -> bool {
        c.len() < self.min_text_chars
    }

    pub async fn extract(
        &self,
        path: &Path,
        declared_type: DocumentType,
        file_name: &str,
    ) -> Result<ExtractionOutput, ExtractionError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| ExtractionError::Io {
                path: path.display().to_string(),
                source,
            })?;
        let input = ExtractionInput {
            path: path.to_path_buf(),
            file_name: file_name.to_string(),
            declared_type,
            bytes: Arc::new(bytes),
        };

        let mut attempts: Vec<String> = Vec::new();
        let mut any_available = false;
        let mut best: Option<(&'static str, Candidate)> = None;

        for strategy in &self.strategies {
            if !strategy.supports(&input) {
                continue;
            }
            let admitted = match (strategy.stage(), &best) {
                (_, None) => true,
                (Stage::Ocr, Some((_, c))) => self.is_minimal(c),
                _ => false,
            };
            if !admitted {
                continue;
            }
            if !strategy.is_available().await {
                tracing::debug!(strategy = strategy.name(), "strategy unavailable, skipping");
                continue;
            }
            any_available = true;
            attempts.push(strategy.name().to_string());

            match strategy.try_extract(&input).await {
                Ok(candidate) if candidate.len() > 0 => {
                    let replace = match &best {
                        None => true,
                        Some((_, current)) => candidate.len() > current.len(),
                    };
                    tracing::debug!(
                        strategy = strategy.name(),
                        chars = candidate.len(),
                        replace,
                        "strategy produced text"
                    );
                    if replace {
                        best = Some((strategy.name(), candidate));
                    }
                }
                Ok(_) => {
                    tracing::debug!(strategy = strategy.name(), "strategy produced no text");
                }
                Err(e) => {
                    tracing::warn!(
                        strategy = strategy.name(),
                        file = %input.file_name,
                        error = %e,
                        "extraction strategy failed, trying next"
                    );
                }
            }

            if best.as_ref().is_some_and(|(_, c)| !self.is_minimal(c)) {
                break;
            }
        }

        Ok(match best {
            Some((method, candidate)) => ExtractionOutput {
                text: candidate.text.trim().to_string(),
                metadata: ExtractionMetadata {
                    extraction_method: method.to_string(),
                    ocr_processed: candidate.ocr,
                    pages: candidate.pages,
                    encoding: candidate.encoding,
                    binary_file: false,
                    extraction_unavailable: false,
                    properties: candidate.properties,
                    attempts,
                },
            },
            None => {
                tracing::info!(
                    file = %input.file_name,
                    declared_type = %declared_type,
                    any_available,
                    "no strategy produced text, storing placeholder"
                );
                ExtractionOutput {
                    text: placeholder_text(&input.file_name),
                    metadata: ExtractionMetadata {
                        extraction_method: PLACEHOLDER_METHOD.to_string(),
                        binary_file: any_available,
                        extraction_unavailable: !any_available,
                        attempts,
                        ..Default::default()
                    },
                }
            }
        })
    }
}

pub fn placeholder_text(file_name: &str) -> String {
    format!("[No extractable text in {}]", file_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixed {
        name: &'static str,
        stage: Stage,
        available: bool,
        output: Option<String>,
        calls: AtomicUsize,
    }

    impl Fixed {
        fn new(name: &'static str, stage: Stage, output: Option<&str>) -> Arc<Self> {
            Arc::new(Self {
                name,
                stage,
                available: true,
                output: output.map(str::to_string),
                calls: AtomicUsize::new(0),
            })
        }

        fn unavailable(name: &'static str, stage: Stage) -> Arc<Self> {
            Arc::new(Self {
                name,
                stage,
                available: false,
                output: None,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ExtractionStrategy for Fixed {
        fn name(&self) -> &'static str {
            self.name
        }
        fn stage(&self) -> Stage {
            self.stage
        }
        fn supports(&self, _input: &ExtractionInput) -> bool {
            true
        }
        async fn is_available(&self) -> bool {
            self.available
        }
        async fn try_extract(&self, _input: &ExtractionInput) -> anyhow::Result<Candidate> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.output {
                Some(text) => Ok(Candidate {
                    text: text.clone(),
                    ocr: self.stage == Stage::Ocr,
                    ..Default::default()
                }),
                None => anyhow::bail!("{} failed", self.name),
            }
        }
    }

    fn upload(content: &[u8]) -> (tempfile::TempDir, PathBuf) {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("upload.bin");
        std::fs::write(&path, content).unwrap();
        (tmp, path)
    }

    fn engine(strategies: Vec<Arc<dyn ExtractionStrategy>>) -> ExtractionEngine {
        ExtractionEngine::new(strategies, 20)
    }

    #[tokio::test]
    async fn test_first_adequate_result_short_circuits() {
        let structured = Fixed::new("structured", Stage::Structured, Some("a long enough structured result"));
        let ocr = Fixed::new("ocr", Stage::Ocr, Some("ocr text that is even longer than that"));
        let (_tmp, path) = upload(b"x");
        let out = engine(vec![structured.clone(), ocr.clone()])
            .extract(&path, DocumentType::Pdf, "a.pdf")
            .await
            .unwrap();
        assert_eq!(out.metadata.extraction_method, "structured");
        assert_eq!(ocr.calls.load(Ordering::SeqCst), 0);
        assert_eq!(out.metadata.attempts, vec!["structured"]);
    }

    #[tokio::test]
    async fn test_ocr_replaces_minimal_only_when_longer() {
        let structured = Fixed::new("structured", Stage::Structured, Some("short"));
        let ocr = Fixed::new("ocr", Stage::Ocr, Some("much longer OCR output"));
        let (_tmp, path) = upload(b"x");
        let out = engine(vec![structured, ocr])
            .extract(&path, DocumentType::Pdf, "a.pdf")
            .await
            .unwrap();
        assert_eq!(out.metadata.extraction_method, "ocr");
        assert!(out.metadata.ocr_processed);

        let structured = Fixed::new("structured", Stage::Structured, Some("short one"));
        let ocr = Fixed::new("ocr", Stage::Ocr, Some("tiny"));
        let basic = Fixed::new("basic", Stage::Basic, Some("basic reader output, also long"));
        let out = engine(vec![structured, ocr, basic.clone()])
            .extract(&path, DocumentType::Pdf, "a.pdf")
            .await
            .unwrap();
        assert_eq!(out.text, "short one");
        assert!(!out.metadata.ocr_processed);
        // Basic only runs when nothing was found.
        assert_eq!(basic.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failures_fall_through_to_basic() {
        let structured = Fixed::new("structured", Stage::Structured, None);
        let basic = Fixed::new("basic", Stage::Basic, Some("plain"));
        let (_tmp, path) = upload(b"x");
        let out = engine(vec![structured, basic])
            .extract(&path, DocumentType::Docx, "a.docx")
            .await
            .unwrap();
        assert_eq!(out.text, "plain");
        assert_eq!(out.metadata.attempts, vec!["structured", "basic"]);
    }

    #[tokio::test]
    async fn test_placeholder_binary_when_strategies_ran() {
        let structured = Fixed::new("structured", Stage::Structured, None);
        let (_tmp, path) = upload(b"x");
        let out = engine(vec![structured])
            .extract(&path, DocumentType::Pdf, "scan.pdf")
            .await
            .unwrap();
        assert_eq!(out.text, "[No extractable text in scan.pdf]");
        assert_eq!(out.metadata.extraction_method, PLACEHOLDER_METHOD);
        assert!(out.metadata.binary_file);
        assert!(!out.metadata.extraction_unavailable);
    }

    #[tokio::test]
    async fn test_placeholder_unavailable_when_nothing_could_run() {
        let ocr = Fixed::unavailable("ocr", Stage::Ocr);
        let (_tmp, path) = upload(b"\x89PNG");
        let out = engine(vec![ocr])
            .extract(&path, DocumentType::Image, "photo.png")
            .await
            .unwrap();
        assert!(out.metadata.extraction_unavailable);
        assert!(!out.metadata.binary_file);
        assert!(out.metadata.attempts.is_empty());
    }

    #[tokio::test]
    async fn test_unreadable_file_is_an_error() {
        let err = engine(vec![])
            .extract(Path::new("/nonexistent/upload.txt"), DocumentType::Txt, "upload.txt")
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractionError::Io { .. }));
    }
}
