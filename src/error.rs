//! Error taxonomy surfaced by the service layer.
//!
//! Component errors ([`ExtractionError`](crate::extraction::ExtractionError),
//! [`GenerationError`](crate::generation::GenerationError),
//! [`RenderError`](crate::generation::render::RenderError),
//! [`StorageError`](crate::storage::StorageError)) live beside their
//! components. Degraded outcomes (extraction unavailable, analysis model
//! unavailable, unsupported render format) are not errors at all: they
//! are logged and recorded in metadata.
//!
//! [`ServiceError`] is what callers of [`DocflowService`](crate::service::DocflowService)
//! see. Submission only fails on malformed input; job failures are
//! reported through the record's `status`/`error_message`.

use thiserror::Error;

use docflow_core::job::JobError;

use crate::storage::StorageError;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The operation needs a record in a state it is not in yet.
    #[error("{0}")]
    NotReady(String),

    /// Retrieval found nothing to answer from.
    #[error("no_relevant_sections")]
    NoRelevantSections,

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Job(#[from] JobError),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ServiceError {
    pub fn not_found(kind: &'static str, id: &str) -> Self {
        ServiceError::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;
