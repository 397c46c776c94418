//! Job state machine shared by extraction, analysis, and generation.
//!
//! # States
//!
//! ```text
//!            start              complete
//! pending ─────────▶ processing ─────────▶ completed
//!    │                   │
//!    │ fail              │ fail
//!    └──────────▶ failed ◀┘
//!
//! reset: completed | failed | processing | pending ─────▶ pending
//! ```
//!
//! `completed` and `failed` are terminal; the only way out is an explicit
//! [`reset`](JobState::reset) issued by reprocess/regenerate. Resetting a
//! `processing` record is how an interrupted job is recovered; callers
//! must make sure no worker still owns it. Illegal transitions are
//! rejected with a [`TransitionError`].
//!
//! `error_message` is `Some` (and non-empty) if and only if the status is
//! `failed`.
//!
//! # Persistence contract
//!
//! [`JobTracker`] applies the result payload, checks that it is complete,
//! flips the status, and saves the record in a single store write before
//! returning. A reader therefore never observes `completed` without its
//! payload, and a crash between the payload being computed and the write
//! leaves the record visibly `processing`.
//!
//! Persisting only updates the columns a job owns, and only on a row that
//! still exists. A record deleted while its job runs stays deleted; the
//! tracker reports it as [`JobError::Vanished`].

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{
    now_millis, AnalysisOutput, AnalysisRecord, Document, ExtractionMetadata, GeneratedDocument,
    GenerationMetadata,
};
use crate::store::Store;

/// Message stored when a failure is recorded without a description.
pub const UNKNOWN_ERROR: &str = "unknown error";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => anyhow::bail!("unknown job status: {}", other),
        }
    }
}

/// The four operations of the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Start,
    Complete,
    Fail,
    Reset,
}

impl Transition {
    /// Transition table: the target state, or `None` if `from` does not
    /// allow this transition.
    pub fn apply(self, from: JobStatus) -> Option<JobStatus> {
        use JobStatus::*;
        match (self, from) {
            (Transition::Start, Pending) => Some(Processing),
            (Transition::Complete, Processing) => Some(Completed),
            (Transition::Fail, Pending | Processing) => Some(Failed),
            (Transition::Reset, _) => Some(Pending),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("illegal transition {transition:?} from status '{from}'")]
pub struct TransitionError {
    pub from: JobStatus,
    pub transition: Transition,
}

/// Status plus error message, embedded in every job record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobState {
    pub status: JobStatus,
    pub error_message: Option<String>,
}

impl Default for JobState {
    fn default() -> Self {
        Self::pending()
    }
}

impl JobState {
    pub fn pending() -> Self {
        Self {
            status: JobStatus::Pending,
            error_message: None,
        }
    }

    fn transition(&mut self, t: Transition) -> Result<(), TransitionError> {
        let next = t.apply(self.status).ok_or(TransitionError {
            from: self.status,
            transition: t,
        })?;
        self.status = next;
        if next != JobStatus::Failed {
            self.error_message = None;
        }
        Ok(())
    }

    pub fn start(&mut self) -> Result<(), TransitionError> {
        self.transition(Transition::Start)
    }

    pub fn complete(&mut self) -> Result<(), TransitionError> {
        self.transition(Transition::Complete)
    }

    /// Move to `failed`. A blank message is replaced by [`UNKNOWN_ERROR`].
    pub fn fail(&mut self, message: &str) -> Result<(), TransitionError> {
        self.transition(Transition::Fail)?;
        let message = message.trim();
        self.error_message = Some(if message.is_empty() {
            UNKNOWN_ERROR.to_string()
        } else {
            message.to_string()
        });
        Ok(())
    }

    pub fn reset(&mut self) -> Result<(), TransitionError> {
        self.transition(Transition::Reset)
    }
}

/// A record driven by the [`JobTracker`].
#[async_trait]
pub trait Job: Send + Sync {
    /// Result payload written on completion.
    type Output: Send;

    /// Short name used in logs and error messages (`extraction`, ...).
    fn kind(&self) -> &'static str;
    fn id(&self) -> &str;
    fn state(&self) -> &JobState;
    fn state_mut(&mut self) -> &mut JobState;
    fn touch(&mut self, at: i64);

    /// Write the payload fields.
    fn apply(&mut self, output: Self::Output);
    /// Drop payload fields (used on reset).
    fn clear_payload(&mut self);
    /// Whether every required result field is populated.
    fn payload_complete(&self) -> bool;

    /// Write the job-owned fields to an existing row. Returns `false`
    /// when the row is gone.
    async fn persist(&self, store: &dyn Store) -> anyhow::Result<bool>;
}

#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error("{kind} {id} produced an incomplete result")]
    IncompletePayload { kind: &'static str, id: String },
    #[error("{kind} {id} was deleted while its job ran")]
    Vanished { kind: &'static str, id: String },
    #[error("failed to persist job state: {0}")]
    Storage(#[source] anyhow::Error),
}

/// Drives [`Job`] records through the state machine, saving every
/// transition before returning.
#[derive(Clone)]
pub struct JobTracker {
    store: Arc<dyn Store>,
}

impl JobTracker {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    async fn save<J: Job>(&self, job: &mut J) -> Result<(), JobError> {
        job.touch(now_millis());
        let saved = job
            .persist(self.store.as_ref())
            .await
            .map_err(JobError::Storage)?;
        if !saved {
            return Err(JobError::Vanished {
                kind: job.kind(),
                id: job.id().to_string(),
            });
        }
        Ok(())
    }

    pub async fn start<J: Job>(&self, job: &mut J) -> Result<(), JobError> {
        job.state_mut().start()?;
        tracing::debug!(kind = job.kind(), id = job.id(), "job started");
        self.save(job).await
    }

    /// Apply `output` and mark the job completed in one write.
    ///
    /// If the payload turns out incomplete the job is failed instead and
    /// [`JobError::IncompletePayload`] is returned.
    pub async fn complete<J: Job>(&self, job: &mut J, output: J::Output) -> Result<(), JobError> {
        if job.state().status != JobStatus::Processing {
            return Err(TransitionError {
                from: job.state().status,
                transition: Transition::Complete,
            }
            .into());
        }
        job.apply(output);
        if !job.payload_complete() {
            let err = JobError::IncompletePayload {
                kind: job.kind(),
                id: job.id().to_string(),
            };
            job.state_mut().fail(&err.to_string())?;
            self.save(job).await?;
            return Err(err);
        }
        job.state_mut().complete()?;
        tracing::debug!(kind = job.kind(), id = job.id(), "job completed");
        self.save(job).await
    }

    pub async fn fail<J: Job>(&self, job: &mut J, message: &str) -> Result<(), JobError> {
        job.state_mut().fail(message)?;
        tracing::warn!(kind = job.kind(), id = job.id(), error = message, "job failed");
        self.save(job).await
    }

    /// Explicit external reset to `pending`, clearing the previous payload.
    pub async fn reset<J: Job>(&self, job: &mut J) -> Result<(), JobError> {
        job.state_mut().reset()?;
        job.clear_payload();
        self.save(job).await
    }
}

/// Payload of a finished extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionOutput {
    pub text: String,
    pub metadata: ExtractionMetadata,
}

#[async_trait]
impl Job for Document {
    type Output = ExtractionOutput;

    fn kind(&self) -> &'static str {
        "extraction"
    }
    fn id(&self) -> &str {
        &self.id
    }
    fn state(&self) -> &JobState {
        &self.state
    }
    fn state_mut(&mut self) -> &mut JobState {
        &mut self.state
    }
    fn touch(&mut self, at: i64) {
        self.updated_at = at;
    }

    fn apply(&mut self, output: ExtractionOutput) {
        self.extracted_text = output.text;
        self.metadata = output.metadata;
    }

    fn clear_payload(&mut self) {
        self.extracted_text.clear();
        self.metadata = ExtractionMetadata::default();
    }

    fn payload_complete(&self) -> bool {
        self.has_text() && !self.metadata.extraction_method.is_empty()
    }

    async fn persist(&self, store: &dyn Store) -> anyhow::Result<bool> {
        store.update_document_job(self).await
    }
}

#[async_trait]
impl Job for AnalysisRecord {
    type Output = AnalysisOutput;

    fn kind(&self) -> &'static str {
        "analysis"
    }
    fn id(&self) -> &str {
        &self.id
    }
    fn state(&self) -> &JobState {
        &self.state
    }
    fn state_mut(&mut self) -> &mut JobState {
        &mut self.state
    }
    fn touch(&mut self, at: i64) {
        self.updated_at = at;
    }

    fn apply(&mut self, output: AnalysisOutput) {
        self.summary = output.summary;
        self.keywords = output.keywords;
        self.sentiment = output.sentiment;
        self.entities = output.entities;
        self.topics = output.topics;
    }

    fn clear_payload(&mut self) {
        self.summary.clear();
        self.keywords.clear();
        self.sentiment = 0.0;
        self.entities.clear();
        self.topics.clear();
    }

    fn payload_complete(&self) -> bool {
        !self.summary.trim().is_empty() && (-1.0..=1.0).contains(&self.sentiment)
    }

    async fn persist(&self, store: &dyn Store) -> anyhow::Result<bool> {
        store.update_analysis_job(self).await
    }
}

/// Payload of a finished generation.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOutput {
    pub content: String,
    pub file_reference: String,
    pub metadata: GenerationMetadata,
}

#[async_trait]
impl Job for GeneratedDocument {
    type Output = GenerationOutput;

    fn kind(&self) -> &'static str {
        "generation"
    }
    fn id(&self) -> &str {
        &self.id
    }
    fn state(&self) -> &JobState {
        &self.state
    }
    fn state_mut(&mut self) -> &mut JobState {
        &mut self.state
    }
    fn touch(&mut self, at: i64) {
        self.updated_at = at;
    }

    fn apply(&mut self, output: GenerationOutput) {
        self.content = output.content;
        self.file_reference = Some(output.file_reference);
        self.metadata = Some(output.metadata);
    }

    fn clear_payload(&mut self) {
        self.content.clear();
        self.file_reference = None;
        self.metadata = None;
    }

    fn payload_complete(&self) -> bool {
        !self.content.trim().is_empty()
            && self.file_reference.as_deref().is_some_and(|f| !f.is_empty())
            && self.metadata.is_some()
    }

    async fn persist(&self, store: &dyn Store) -> anyhow::Result<bool> {
        store.update_generated_job(self).await
    }
}
