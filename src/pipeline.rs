//! Background stages: extraction, analysis, generation.
//!
//! [`Pipeline`] is the [`JobRunner`] behind the worker pool. Every stage
//! follows the same shape:
//!
//! ```text
//! load entity ──▶ still pending? ──no──▶ skip
//!                      │ yes
//!                      ▼
//!                JobTracker::start ──▶ engine ──▶ complete | fail
//! ```
//!
//! Engine failures land on the record as `failed` with a message; only
//! store failures escape as errors, and those are logged by the worker.
//! A record deleted while its job runs is left deleted: the tracker's
//! update-only writes report [`JobError::Vanished`] and the result is
//! dropped.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use docflow_core::analysis::AnalysisEngine;
use docflow_core::embedding::{Embedder, HashingEmbedder};
use docflow_core::job::{GenerationOutput, Job, JobError, JobStatus, JobTracker};
use docflow_core::models::{Document, GeneratedDocument, GenerationMetadata};
use docflow_core::retrieval::{build_context, leading_excerpts, ContextExcerpt, RetrievalIndex};
use docflow_core::store::Store;

use crate::config::Config;
use crate::extraction::{ExtractionEngine, PLACEHOLDER_METHOD};
use crate::generation::render::{render_or_fallback, Renderer};
use crate::generation::{check_references, GenerationEngine, GenerationError, GenerationRequest};
use crate::registry::ModelRegistry;
use crate::storage::ArtifactStore;
use crate::worker::{JobRequest, JobRunner};

pub struct Pipeline {
    store: Arc<dyn Store>,
    artifacts: ArtifactStore,
    registry: Arc<ModelRegistry>,
    tracker: JobTracker,
    extraction: ExtractionEngine,
    renderer: Arc<dyn Renderer>,
    config: Arc<Config>,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn Store>,
        artifacts: ArtifactStore,
        registry: Arc<ModelRegistry>,
        renderer: Arc<dyn Renderer>,
        config: Arc<Config>,
    ) -> Self {
        let extraction = ExtractionEngine::with_defaults(registry.clone(), &config.extraction);
        Self {
            tracker: JobTracker::new(store.clone()),
            store,
            artifacts,
            registry,
            extraction,
            renderer,
            config,
        }
    }

    /// Complete `job` with `result`, or fail it with the error message.
    async fn finish<J: Job>(&self, job: &mut J, result: Result<J::Output, String>) -> Result<()> {
        match result {
            Ok(output) => match self.tracker.complete(job, output).await {
                // The tracker already recorded the failure.
                Err(JobError::IncompletePayload { .. }) => Ok(()),
                other => Ok(other?),
            },
            Err(message) => Ok(self.tracker.fail(job, &message).await?),
        }
    }

    // ============ Extraction ============

    async fn run_extraction(&self, document_id: &str) -> Result<()> {
        let Some(mut doc) = self.store.get_document(document_id).await? else {
            tracing::warn!(document_id, "document vanished before extraction");
            return Ok(());
        };
        if doc.state.status != JobStatus::Pending {
            tracing::debug!(document_id, status = %doc.state.status, "extraction not pending, skipping");
            return Ok(());
        }
        self.tracker.start(&mut doc).await?;
        tracing::info!(document_id, declared_type = %doc.declared_type, "extraction started");

        let result = match self.artifacts.resolve(&doc.file_reference) {
            Ok(path) => self
                .extraction
                .extract(&path, doc.declared_type, &doc.original_filename)
                .await
                .map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        if let Ok(output) = &result {
            tracing::info!(
                document_id,
                method = %output.metadata.extraction_method,
                chars = output.text.chars().count(),
                "extraction finished"
            );
        }
        self.finish(&mut doc, result).await
    }

    // ============ Analysis ============

    async fn run_analysis(&self, document_id: &str) -> Result<()> {
        let Some(mut record) = self.store.get_analysis_for_document(document_id).await? else {
            tracing::warn!(document_id, "analysis record vanished");
            return Ok(());
        };
        if record.state.status != JobStatus::Pending {
            tracing::debug!(document_id, status = %record.state.status, "analysis not pending, skipping");
            return Ok(());
        }
        self.tracker.start(&mut record).await?;
        tracing::info!(document_id, analysis_id = %record.id, "analysis started");

        let text = self
            .store
            .get_document(document_id)
            .await?
            .map(analyzable_text)
            .unwrap_or_default();

        let engine = AnalysisEngine::new(self.config.analysis_params())
            .with_summarizer(self.registry.summarizer().await)
            .with_sentiment(self.registry.sentiment().await)
            .with_recognizer(self.registry.recognizer().await);
        let result = engine.analyze(&text).await.map_err(|e| e.to_string());
        self.finish(&mut record, result).await
    }

    // ============ Generation ============

    async fn run_generation(&self, generated_id: &str) -> Result<()> {
        let Some(mut generated) = self.store.get_generated(generated_id).await? else {
            tracing::warn!(generated_id, "generated document vanished");
            return Ok(());
        };
        if generated.state.status != JobStatus::Pending {
            tracing::debug!(generated_id, status = %generated.state.status, "generation not pending, skipping");
            return Ok(());
        }
        self.tracker.start(&mut generated).await?;
        tracing::info!(generated_id, format = %generated.output_format, "generation started");

        let result = self.generate(&generated).await.map_err(|e| e.to_string());
        self.finish(&mut generated, result).await
    }

    async fn generate(&self, generated: &GeneratedDocument) -> Result<GenerationOutput, GenerationError> {
        let failure = |e: anyhow::Error| GenerationError::Failure(format!("{:#}", e));

        let mut references = Vec::new();
        for id in &generated.reference_document_ids {
            if let Some(doc) = self.store.get_document(id).await.map_err(failure)? {
                references.push(doc);
            }
        }
        let skipped_references = check_references(
            &generated.reference_document_ids,
            &references,
            self.config.generation.max_missing_references,
        )?;

        let (template, template_missing) = match &generated.template_id {
            Some(template_id) => match self.store.get_template(template_id).await.map_err(failure)? {
                Some(t) => (Some(t), false),
                None => {
                    tracing::warn!(template_id, "template not found, generating without it");
                    (None, true)
                }
            },
            None => (None, false),
        };

        let excerpts = self.reference_excerpts(&generated.prompt, &references).await;
        let engine = GenerationEngine::new(self.registry.generator().await, &self.config.generation);
        let composed = engine
            .compose(GenerationRequest {
                title: &generated.title,
                prompt: &generated.prompt,
                format: generated.output_format,
                template: template.as_ref(),
                excerpts: &excerpts,
            })
            .await?;

        let rendered = {
            let content = composed.content.clone();
            let title = generated.title.clone();
            let format = generated.output_format;
            let renderer = self.renderer.clone();
            tokio::task::spawn_blocking(move || {
                render_or_fallback(renderer.as_ref(), &content, &title, format)
            })
            .await
            .map_err(|e| GenerationError::Failure(format!("renderer crashed: {}", e)))?
        };
        let artifact = self
            .artifacts
            .save_generated(rendered.format.extension(), &rendered.bytes)
            .await
            .map_err(|e| GenerationError::Failure(e.to_string()))?;

        tracing::info!(
            generated_id = %generated.id,
            generator = ?composed.generator,
            rendered_format = %rendered.format,
            substituted = rendered.substituted,
            "generation finished"
        );
        Ok(GenerationOutput {
            content: composed.content,
            file_reference: artifact.reference,
            metadata: GenerationMetadata {
                generator: composed.generator,
                model: composed.model,
                rendered_format: rendered.format,
                substituted: rendered.substituted,
                skipped_references,
                template_missing,
            },
        })
    }

    /// Retrieval-ranked excerpts for the prompt, or each reference's
    /// leading text when there is no prompt or retrieval finds nothing.
    async fn reference_excerpts(&self, prompt: &str, references: &[Document]) -> Vec<ContextExcerpt> {
        let cap = self.config.retrieval.excerpt_chars;
        let references: Vec<Document> = references
            .iter()
            .filter(|d| d.metadata.extraction_method != PLACEHOLDER_METHOD)
            .cloned()
            .collect();
        if references.is_empty() {
            return Vec::new();
        }
        if !prompt.trim().is_empty() {
            let index = retrieval_index(&self.registry, &self.config).await;
            let k = self.config.retrieval.top_k * references.len();
            match index.retrieve(prompt, &references, k).await {
                Ok(results) if !results.is_empty() => return build_context(&results, cap),
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "retrieval failed, using leading excerpts"),
            }
        }
        leading_excerpts(&references, cap)
    }

    async fn abort(&self, request: &JobRequest, message: &str) -> Result<()> {
        let id = request.entity_id();
        match request {
            JobRequest::Extract(_) => {
                if let Some(mut doc) = self.store.get_document(id).await? {
                    self.fail_unfinished(&mut doc, message).await?;
                }
            }
            JobRequest::Analyze(_) => {
                if let Some(mut record) = self.store.get_analysis_for_document(id).await? {
                    self.fail_unfinished(&mut record, message).await?;
                }
            }
            JobRequest::Generate(_) => {
                if let Some(mut generated) = self.store.get_generated(id).await? {
                    self.fail_unfinished(&mut generated, message).await?;
                }
            }
        }
        Ok(())
    }

    async fn fail_unfinished<J: Job>(&self, job: &mut J, message: &str) -> Result<()> {
        if job.state().status.is_terminal() {
            return Ok(());
        }
        match self.tracker.fail(job, message).await {
            Ok(()) | Err(JobError::Vanished { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Extracted text eligible for analysis. Placeholder text for files
/// nothing could read counts as no text.
fn analyzable_text(doc: Document) -> String {
    if doc.metadata.extraction_method == PLACEHOLDER_METHOD {
        String::new()
    } else {
        doc.extracted_text
    }
}

/// Retrieval over the registry's embedder, or the built-in hashing
/// embedder when the configured one is unavailable.
pub async fn retrieval_index(registry: &ModelRegistry, config: &Config) -> RetrievalIndex {
    let embedder: Arc<dyn Embedder> = match registry.embedder().await {
        Some(e) => e,
        None => {
            tracing::debug!("embedding capability unavailable, using hashing embedder");
            Arc::new(HashingEmbedder::default())
        }
    };
    RetrievalIndex::new(embedder, config.retrieval_params())
}

#[async_trait]
impl JobRunner for Pipeline {
    async fn run(&self, request: &JobRequest) {
        let result = match request {
            JobRequest::Extract(id) => self.run_extraction(id).await,
            JobRequest::Analyze(id) => self.run_analysis(id).await,
            JobRequest::Generate(id) => self.run_generation(id).await,
        };
        match result {
            Ok(()) => {}
            Err(e) if matches!(e.downcast_ref::<JobError>(), Some(JobError::Vanished { .. })) => {
                tracing::info!(
                    job = request.kind(),
                    id = request.entity_id(),
                    "record deleted while the job ran, result dropped"
                );
            }
            Err(e) => {
                tracing::error!(
                    job = request.kind(),
                    id = request.entity_id(),
                    error = %format!("{:#}", e),
                    "job could not record its outcome"
                );
            }
        }
    }

    async fn on_abort(&self, request: &JobRequest, message: &str) {
        if let Err(e) = self.abort(request, message).await {
            tracing::error!(
                job = request.kind(),
                id = request.entity_id(),
                error = %format!("{:#}", e),
                "failed to record aborted job"
            );
        }
    }
}
