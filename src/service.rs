//! The operation surface.
//!
//! [`DocflowService`] owns the store, the artifact directory, the model
//! registry and the worker pool. Submitting operations validate input,
//! write the pending record, enqueue a job and return immediately; job
//! outcomes are read back by polling the record's status.
//!
//! | Operation | Dispatches |
//! |-----------|-----------|
//! | [`submit_document`](DocflowService::submit_document), [`reprocess`](DocflowService::reprocess) | extraction |
//! | [`analyze`](DocflowService::analyze), [`reanalyze`](DocflowService::reanalyze) | analysis |
//! | [`generate`](DocflowService::generate), [`regenerate`](DocflowService::regenerate) | generation |
//!
//! Everything else ([`ask`](DocflowService::ask),
//! [`analyze_query`](DocflowService::analyze_query), downloads, templates,
//! conversations) runs inline. [`chat`](DocflowService::chat) may start a
//! generation when the message asks for a document.
//!
//! Redispatching an entity that a worker is running is coalesced: the
//! current status is returned and nothing is queued. A `processing`
//! record no worker owns was interrupted and is reset like a terminal
//! one. A `pending` entity is re-queued as is.
//!
//! [`open`](DocflowService::open) fails every record a previous process
//! left `processing` (see [`recover_interrupted`](DocflowService::recover_interrupted)),
//! so pollers never wait on a job that nobody runs.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use docflow_core::job::{Job, JobStatus, JobTracker};
use docflow_core::models::{
    file_extension, AnalysisRecord, Conversation, Document, DocumentType, GeneratedDocument,
    Message, OutputFormat, Role, Template,
};
use docflow_core::query::{self, listed_questions, QueryAnalysis, QueryKind};
use docflow_core::retrieval::extractive_answer;
use docflow_core::store::Store;

use crate::config::Config;
use crate::db;
use crate::error::{ServiceError, ServiceResult};
use crate::extraction::PLACEHOLDER_METHOD;
use crate::generation::render::{NativeRenderer, Renderer};
use crate::generation::SamplingParams;
use crate::migrate;
use crate::pipeline::{retrieval_index, Pipeline};
use crate::registry::{CapabilityStatus, ModelRegistry};
use crate::sqlite_store::SqliteStore;
use crate::storage::{ArtifactStore, StorageError};
use crate::worker::{JobRequest, WorkerPool};

/// Reply used by [`DocflowService::chat`] when nothing relevant was found.
pub const NO_ANSWER_REPLY: &str =
    "I could not find anything relevant to that in the attached document. Try rephrasing the question.";
/// Reply used by [`DocflowService::chat`] when no document is attached.
pub const NO_DOCUMENT_REPLY: &str =
    "This conversation has no document attached. Attach a document to ask questions about its content.";

/// Most clarifying questions kept from a model.
const MAX_CLARIFYING_QUESTIONS: usize = 3;

/// Error recorded on jobs found `processing` with no worker running them.
pub const INTERRUPTED_MESSAGE: &str = "interrupted before completion, reprocess to retry";

/// Extracted text with the extraction status.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractedText {
    pub text: String,
    pub status: JobStatus,
}

/// Handle returned by [`DocflowService::analyze`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisHandle {
    pub analysis_id: String,
    pub status: JobStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnswerSource {
    pub document_id: String,
    pub document_title: String,
    pub relevance_score: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub answer: String,
    pub source: AnswerSource,
}

/// File bytes ready to serve.
#[derive(Debug, Clone)]
pub struct Download {
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
    pub file_name: String,
}

/// Parameters of [`DocflowService::generate`].
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub title: Option<String>,
    pub prompt: String,
    pub output_format: OutputFormat,
    pub template_id: Option<String>,
    pub document_ids: Vec<String>,
}

impl GenerateRequest {
    pub fn new(prompt: &str, output_format: OutputFormat) -> Self {
        Self {
            title: None,
            prompt: prompt.to_string(),
            output_format,
            template_id: None,
            document_ids: Vec::new(),
        }
    }
}

pub struct DocflowService {
    store: Arc<dyn Store>,
    artifacts: ArtifactStore,
    registry: Arc<ModelRegistry>,
    tracker: JobTracker,
    pool: WorkerPool,
    config: Arc<Config>,
}

impl DocflowService {
    /// Open the SQLite database named in `config`, migrate it, and start
    /// the worker pool with a registry built from `[models.*]`.
    pub async fn open(config: Config) -> anyhow::Result<Self> {
        config.validate()?;
        let pool = db::connect(&config).await?;
        migrate::migrate_pool(&pool).await?;
        let registry = Arc::new(ModelRegistry::new(
            config.models.clone(),
            config.extraction.clone(),
        ));
        let service = Self::new(config, Arc::new(SqliteStore::new(pool)), registry);
        let recovered = service.recover_interrupted().await?;
        if recovered > 0 {
            tracing::warn!(recovered, "failed jobs interrupted by a previous shutdown");
        }
        Ok(service)
    }

    /// Assemble a service over an explicit store and registry. Must be
    /// called inside a Tokio runtime (the worker pool is spawned here).
    pub fn new(config: Config, store: Arc<dyn Store>, registry: Arc<ModelRegistry>) -> Self {
        Self::with_renderer(config, store, registry, Arc::new(NativeRenderer))
    }

    /// Like [`new`](Self::new), rendering generated documents through
    /// `renderer`.
    pub fn with_renderer(
        config: Config,
        store: Arc<dyn Store>,
        registry: Arc<ModelRegistry>,
        renderer: Arc<dyn Renderer>,
    ) -> Self {
        let config = Arc::new(config);
        let artifacts = ArtifactStore::new(config.storage.root.clone());
        let pipeline = Arc::new(Pipeline::new(
            store.clone(),
            artifacts.clone(),
            registry.clone(),
            renderer,
            config.clone(),
        ));
        let pool = WorkerPool::start(pipeline, &config.jobs);
        Self {
            tracker: JobTracker::new(store.clone()),
            store,
            artifacts,
            registry,
            pool,
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Initialize every model capability and report readiness.
    pub async fn model_status(&self) -> Vec<CapabilityStatus> {
        self.registry.warm_up().await
    }

    /// Stop accepting jobs and wait for queued ones to finish.
    pub async fn shutdown(&self) {
        self.pool.shutdown().await;
    }

    async fn dispatch(&self, request: JobRequest) -> ServiceResult<()> {
        self.pool
            .submit(request)
            .await
            .map_err(|e| ServiceError::Internal(e.into()))
    }

    /// Reset `job` and queue `request`, unless a worker is running it.
    async fn redispatch<J: Job>(&self, job: &mut J, request: JobRequest) -> ServiceResult<JobStatus> {
        match job.state().status {
            JobStatus::Processing if self.pool.is_running(&request) => {
                tracing::info!(job = request.kind(), id = request.entity_id(), "already processing, not redispatched");
                return Ok(JobStatus::Processing);
            }
            JobStatus::Processing => {
                tracing::warn!(job = request.kind(), id = request.entity_id(), "no worker owns this processing record, resetting");
                self.tracker.reset(job).await?
            }
            JobStatus::Pending => {}
            JobStatus::Completed | JobStatus::Failed => self.tracker.reset(job).await?,
        }
        self.dispatch(request).await?;
        Ok(JobStatus::Pending)
    }

    /// Fail `job` with [`INTERRUPTED_MESSAGE`] if it is `processing` and
    /// no worker runs `request`.
    async fn fail_if_orphaned<J: Job>(&self, job: &mut J, request: JobRequest) -> ServiceResult<bool> {
        if job.state().status != JobStatus::Processing || self.pool.is_running(&request) {
            return Ok(false);
        }
        self.tracker.fail(job, INTERRUPTED_MESSAGE).await?;
        Ok(true)
    }

    /// Fail every record left `processing` without a worker, which is what
    /// a crash or kill mid-job leaves behind. Returns how many were failed.
    pub async fn recover_interrupted(&self) -> ServiceResult<usize> {
        let mut recovered = 0;
        for mut doc in self.store.list_documents().await? {
            let request = JobRequest::Extract(doc.id.clone());
            recovered += usize::from(self.fail_if_orphaned(&mut doc, request).await?);
            if let Some(mut record) = self.store.get_analysis_for_document(&doc.id).await? {
                let request = JobRequest::Analyze(doc.id.clone());
                recovered += usize::from(self.fail_if_orphaned(&mut record, request).await?);
            }
        }
        for mut generated in self.store.list_generated().await? {
            let request = JobRequest::Generate(generated.id.clone());
            recovered += usize::from(self.fail_if_orphaned(&mut generated, request).await?);
        }
        Ok(recovered)
    }

    // ============ Documents ============

    /// Store an upload and queue its extraction. Returns the document id.
    pub async fn submit_document(
        &self,
        title: &str,
        file_name: &str,
        bytes: &[u8],
    ) -> ServiceResult<String> {
        let file_name = file_name.trim();
        if file_name.is_empty() {
            return Err(ServiceError::InvalidInput("file name is required".into()));
        }
        if bytes.is_empty() {
            return Err(ServiceError::InvalidInput("file is empty".into()));
        }
        let title = match title.trim() {
            "" => file_name,
            t => t,
        };

        let extension = file_extension(file_name);
        let artifact = self.artifacts.save_upload(extension.as_deref(), bytes).await?;
        let doc = Document::new(title, file_name, &artifact.reference);
        self.store.save_document(&doc).await?;
        tracing::info!(
            document_id = %doc.id,
            declared_type = %doc.declared_type,
            size = artifact.size,
            checksum = %artifact.checksum,
            "document submitted"
        );

        self.dispatch(JobRequest::Extract(doc.id.clone())).await?;
        Ok(doc.id)
    }

    pub async fn get_document(&self, id: &str) -> ServiceResult<Document> {
        self.store
            .get_document(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("document", id))
    }

    pub async fn list_documents(&self) -> ServiceResult<Vec<Document>> {
        Ok(self.store.list_documents().await?)
    }

    pub async fn get_extracted_text(&self, id: &str) -> ServiceResult<ExtractedText> {
        let doc = self.get_document(id).await?;
        Ok(ExtractedText {
            text: doc.extracted_text,
            status: doc.state.status,
        })
    }

    /// Re-run extraction from scratch.
    pub async fn reprocess(&self, id: &str) -> ServiceResult<JobStatus> {
        let mut doc = self.get_document(id).await?;
        let request = JobRequest::Extract(doc.id.clone());
        self.redispatch(&mut doc, request).await
    }

    pub async fn download_document(&self, id: &str) -> ServiceResult<Download> {
        let doc = self.get_document(id).await?;
        let bytes = self.artifacts.read(&doc.file_reference).await?;
        Ok(Download {
            bytes,
            content_type: upload_content_type(&doc),
            file_name: doc.original_filename,
        })
    }

    /// Delete a document, its analysis and its uploaded file. Generated
    /// documents keep their content but lose the reference; attached
    /// conversations are detached.
    pub async fn delete_document(&self, id: &str) -> ServiceResult<()> {
        let doc = self.get_document(id).await?;
        if !self.store.delete_document(id).await? {
            return Err(ServiceError::not_found("document", id));
        }
        if let Err(e) = self.artifacts.remove(&doc.file_reference).await {
            tracing::warn!(document_id = id, error = %e, "failed to remove uploaded file");
        }
        tracing::info!(document_id = id, "document deleted");
        Ok(())
    }

    // ============ Analysis ============

    /// Create the document's analysis record and queue it, or return the
    /// existing one.
    pub async fn analyze(&self, document_id: &str) -> ServiceResult<AnalysisHandle> {
        let doc = self.get_document(document_id).await?;
        if doc.state.status != JobStatus::Completed {
            return Err(ServiceError::NotReady(format!(
                "document {} is {}, extraction must complete before analysis",
                document_id, doc.state.status
            )));
        }

        let (record, created) = self
            .store
            .create_analysis_if_absent(&AnalysisRecord::new(document_id))
            .await?;
        if created {
            tracing::info!(document_id, analysis_id = %record.id, "analysis requested");
            self.dispatch(JobRequest::Analyze(document_id.to_string()))
                .await?;
        }
        Ok(AnalysisHandle {
            analysis_id: record.id,
            status: record.state.status,
        })
    }

    pub async fn get_analysis(&self, document_id: &str) -> ServiceResult<AnalysisRecord> {
        self.store
            .get_analysis_for_document(document_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("analysis", document_id))
    }

    /// Reset the existing analysis and run it again.
    pub async fn reanalyze(&self, document_id: &str) -> ServiceResult<AnalysisHandle> {
        let mut record = self.get_analysis(document_id).await?;
        let status = self
            .redispatch(&mut record, JobRequest::Analyze(document_id.to_string()))
            .await?;
        Ok(AnalysisHandle {
            analysis_id: record.id,
            status,
        })
    }

    // ============ Question answering ============

    /// Answer `query` from the best-matching chunk of `document_ids`.
    pub async fn ask(&self, query: &str, document_ids: &[String]) -> ServiceResult<Answer> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ServiceError::InvalidInput("query is required".into()));
        }
        if document_ids.is_empty() {
            return Err(ServiceError::NoRelevantSections);
        }

        let mut documents = Vec::new();
        for id in document_ids {
            match self.store.get_document(id).await? {
                Some(doc) if doc.metadata.extraction_method != PLACEHOLDER_METHOD => {
                    documents.push(doc)
                }
                Some(_) => {}
                None => tracing::debug!(document_id = %id, "ask: unknown document skipped"),
            }
        }

        let index = retrieval_index(&self.registry, &self.config).await;
        let results = index
            .retrieve(query, &documents, self.config.retrieval.top_k)
            .await?;
        let Some(best) = results.into_iter().next() else {
            return Err(ServiceError::NoRelevantSections);
        };

        let model_answer = match self.registry.question_answerer().await {
            Some(qa) => match qa.answer(query, &best.text).await {
                Ok(a) if !a.answer.trim().is_empty() => Some(a.answer.trim().to_string()),
                Ok(_) => None,
                Err(e) => {
                    tracing::warn!(model = qa.model_name(), error = %e, "question answering failed, using extractive answer");
                    None
                }
            },
            None => None,
        };
        let answer = model_answer.unwrap_or_else(|| extractive_answer(query, &best.text));

        Ok(Answer {
            answer,
            source: AnswerSource {
                document_id: best.document_id,
                document_title: best.document_title,
                relevance_score: best.score,
            },
        })
    }

    // ============ Query analysis ============

    /// Read the intent of `query`: reply kind, whether it asks for a new
    /// document, and clarifying questions. A text generator, when one is
    /// available, writes the questions; the rule-based ones stand when it
    /// is absent, fails or lists none.
    pub async fn analyze_query(&self, query: &str) -> ServiceResult<QueryAnalysis> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ServiceError::InvalidInput("query is required".into()));
        }
        let mut analysis = query::analyze_query(query);
        let Some(generator) = self.registry.generator().await else {
            return Ok(analysis);
        };

        let prompt = format!(
            "A user sent this request to a document assistant:\n\n{}\n\n\
             List up to {} short clarifying questions that would help fulfil it, \
             one per line, numbered.",
            query, MAX_CLARIFYING_QUESTIONS
        );
        let params = SamplingParams::from(&self.config.generation);
        match generator.generate(&prompt, &params).await {
            Ok(text) => {
                let questions: Vec<String> = listed_questions(&text)
                    .into_iter()
                    .take(MAX_CLARIFYING_QUESTIONS)
                    .collect();
                if questions.is_empty() {
                    tracing::debug!(model = generator.model_name(), "generator listed no questions, keeping rule-based ones");
                } else {
                    analysis.clarifying_questions = questions;
                    analysis.questions_model = Some(generator.model_name().to_string());
                }
            }
            Err(e) => {
                tracing::warn!(model = generator.model_name(), error = %e, "clarifying questions failed, keeping rule-based ones");
            }
        }
        Ok(analysis)
    }

    // ============ Generation ============

    /// Validate and queue a generation. Returns the generated document id.
    pub async fn generate(&self, request: GenerateRequest) -> ServiceResult<String> {
        let prompt = request.prompt.trim();
        if prompt.is_empty() && request.document_ids.is_empty() {
            return Err(ServiceError::InvalidInput(
                "a prompt or at least one reference document is required".into(),
            ));
        }

        let mut document_ids: Vec<String> = Vec::new();
        for id in request.document_ids {
            if !document_ids.contains(&id) {
                document_ids.push(id);
            }
        }
        let title = request
            .title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| {
                format!(
                    "Generated Document {}",
                    chrono::Utc::now().format("%Y-%m-%d %H:%M")
                )
            });

        let generated = GeneratedDocument::new(
            title.trim(),
            prompt,
            request.output_format,
            request.template_id,
            document_ids,
        );
        self.store.save_generated(&generated).await?;
        tracing::info!(
            generated_id = %generated.id,
            format = %generated.output_format,
            references = generated.reference_document_ids.len(),
            "generation requested"
        );
        self.dispatch(JobRequest::Generate(generated.id.clone()))
            .await?;
        Ok(generated.id)
    }

    pub async fn get_generated(&self, id: &str) -> ServiceResult<GeneratedDocument> {
        self.store
            .get_generated(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("generated document", id))
    }

    pub async fn list_generated(&self) -> ServiceResult<Vec<GeneratedDocument>> {
        Ok(self.store.list_generated().await?)
    }

    /// Run generation again with the same parameters, replacing the
    /// previous artifact.
    pub async fn regenerate(&self, id: &str) -> ServiceResult<JobStatus> {
        let mut generated = self.get_generated(id).await?;
        let previous = generated.file_reference.clone();
        let status = self
            .redispatch(&mut generated, JobRequest::Generate(id.to_string()))
            .await?;
        if status == JobStatus::Pending {
            if let Some(reference) = previous {
                if let Err(e) = self.artifacts.remove(&reference).await {
                    tracing::warn!(generated_id = id, error = %e, "failed to remove previous artifact");
                }
            }
        }
        Ok(status)
    }

    pub async fn download_generated(&self, id: &str) -> ServiceResult<Download> {
        let generated = self.get_generated(id).await?;
        let reference = match (&generated.state.status, &generated.file_reference) {
            (JobStatus::Completed, Some(r)) => r.clone(),
            (status, _) => {
                return Err(ServiceError::NotReady(format!(
                    "generated document {} is {}, no file available",
                    id, status
                )))
            }
        };
        let bytes = self.artifacts.read(&reference).await.map_err(|e| match e {
            StorageError::Missing(_) => ServiceError::not_found("generated file", id),
            other => other.into(),
        })?;
        let format = generated.rendered_format();
        Ok(Download {
            bytes,
            content_type: format.content_type(),
            file_name: format!("{}.{}", generated.title, format.extension()),
        })
    }

    // ============ Templates ============

    pub async fn create_template(
        &self,
        name: &str,
        body: &str,
        default_values: BTreeMap<String, String>,
    ) -> ServiceResult<Template> {
        if name.trim().is_empty() {
            return Err(ServiceError::InvalidInput("template name is required".into()));
        }
        if body.trim().is_empty() {
            return Err(ServiceError::InvalidInput("template body is required".into()));
        }
        let template = Template::new(name.trim(), body, default_values);
        self.store.save_template(&template).await?;
        tracing::info!(template_id = %template.id, placeholders = template.placeholders().len(), "template created");
        Ok(template)
    }

    pub async fn get_template(&self, id: &str) -> ServiceResult<Template> {
        self.store
            .get_template(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("template", id))
    }

    pub async fn list_templates(&self) -> ServiceResult<Vec<Template>> {
        Ok(self.store.list_templates().await?)
    }

    // ============ Conversations ============

    pub async fn create_conversation(
        &self,
        title: &str,
        document_id: Option<&str>,
    ) -> ServiceResult<Conversation> {
        if let Some(id) = document_id {
            self.get_document(id).await?;
        }
        let title = match title.trim() {
            "" => "New conversation",
            t => t,
        };
        let conversation = Conversation::new(title, document_id.map(str::to_string));
        self.store.save_conversation(&conversation).await?;
        Ok(conversation)
    }

    pub async fn get_conversation(&self, id: &str) -> ServiceResult<Conversation> {
        self.store
            .get_conversation(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("conversation", id))
    }

    /// Append a message to the conversation log.
    pub async fn add_message(
        &self,
        conversation_id: &str,
        role: Role,
        content: &str,
    ) -> ServiceResult<Message> {
        if content.trim().is_empty() {
            return Err(ServiceError::InvalidInput("message content is required".into()));
        }
        self.get_conversation(conversation_id).await?;
        let message = Message::new(conversation_id, role, content.trim());
        self.store.append_message(&message).await?;
        Ok(message)
    }

    pub async fn list_messages(&self, conversation_id: &str) -> ServiceResult<Vec<Message>> {
        self.get_conversation(conversation_id).await?;
        Ok(self.store.list_messages(conversation_id).await?)
    }

    /// Record a user message and reply to it. Returns the assistant's
    /// message.
    ///
    /// A request for a new document starts a generation over the attached
    /// document. Otherwise the reply comes from the attached document: its
    /// completed analysis summary for summary requests, else [`ask`](Self::ask),
    /// with clarifying questions when nothing relevant was found.
    pub async fn chat(&self, conversation_id: &str, content: &str) -> ServiceResult<Message> {
        let conversation = self.get_conversation(conversation_id).await?;
        self.add_message(conversation_id, Role::User, content).await?;
        let intent = query::analyze_query(content);

        let reply = match (&intent.generation, &conversation.document_id) {
            (Some(hint), document_id) => {
                let request = GenerateRequest {
                    title: hint.title.clone(),
                    prompt: content.trim().to_string(),
                    output_format: hint.format,
                    template_id: None,
                    document_ids: document_id.iter().cloned().collect(),
                };
                let generated = self.get_generated(&self.generate(request).await?).await?;
                let started = format!(
                    "I've started generating a new {} document titled '{}' (id {}). Download it once it completes.",
                    generated.output_format.as_str().to_uppercase(),
                    generated.title,
                    generated.id
                );
                let questions = self.analyze_query(content).await?.clarifying_questions;
                with_questions(&started, &questions)
            }
            (None, Some(document_id)) => self.reply_from_document(document_id, content, intent.kind).await?,
            (None, None) => NO_DOCUMENT_REPLY.to_string(),
        };
        self.add_message(conversation_id, Role::Assistant, &reply)
            .await
    }

    async fn reply_from_document(
        &self,
        document_id: &str,
        content: &str,
        kind: QueryKind,
    ) -> ServiceResult<String> {
        if kind == QueryKind::Summarize {
            if let Some(record) = self.store.get_analysis_for_document(document_id).await? {
                if record.state.status == JobStatus::Completed {
                    return Ok(record.summary);
                }
            }
        }
        match self.ask(content, &[document_id.to_string()]).await {
            Ok(answer) => Ok(answer.answer),
            Err(ServiceError::NoRelevantSections) => {
                let questions = self.analyze_query(content).await?.clarifying_questions;
                Ok(with_questions(NO_ANSWER_REPLY, &questions))
            }
            Err(e) => Err(e),
        }
    }
}

/// `reply` followed by a numbered list of `questions`.
fn with_questions(reply: &str, questions: &[String]) -> String {
    let mut out = reply.to_string();
    if !questions.is_empty() {
        out.push_str("\n\nTo help me, could you tell me:");
        for (i, q) in questions.iter().enumerate() {
            out.push_str(&format!("\n{}. {}", i + 1, q));
        }
    }
    out
}

/// MIME type of an uploaded file, from its declared type and extension.
fn upload_content_type(doc: &Document) -> &'static str {
    let ext = file_extension(&doc.original_filename).unwrap_or_default();
    match doc.declared_type {
        DocumentType::Pdf => "application/pdf",
        DocumentType::Docx if ext == "doc" => "application/msword",
        DocumentType::Docx => {
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
        }
        DocumentType::Txt => "text/plain",
        DocumentType::Image => match ext.as_str() {
            "png" => "image/png",
            "jpg" | "jpeg" => "image/jpeg",
            "gif" => "image/gif",
            "bmp" => "image/bmp",
            "webp" => "image/webp",
            "tif" | "tiff" => "image/tiff",
            _ => "application/octet-stream",
        },
        DocumentType::Other => "application/octet-stream",
    }
}
