//! Storage abstraction for docflow.
//!
//! The [`Store`] trait covers every record the pipeline reads or writes,
//! enabling pluggable backends (SQLite in the application crate,
//! [`memory::InMemoryStore`] here).
//!
//! Implementations must be `Send + Sync` to work with async runtimes.
//!
//! # Operations
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`save_document`](Store::save_document) | Insert or replace a document |
//! | [`delete_document`](Store::delete_document) | Delete with explicit dependent-record handling |
//! | [`create_analysis_if_absent`](Store::create_analysis_if_absent) | Atomic one-per-document analysis creation |
//! | [`save_generated`](Store::save_generated) | Insert or replace a generated document |
//! | `update_*_job` | Update-only write of the job-owned columns of an existing row |
//! | [`append_message`](Store::append_message) | Append to a conversation log, advancing `updated_at` |
//!
//! # Deleting documents
//!
//! Dependent records are never left dangling:
//! - analysis records of the document are deleted (cascade);
//! - the id is removed from generated documents' reference lists;
//! - conversations attached to the document are detached (`document_id = NULL`).
//!
//! Jobs write through the `update_*_job` methods, which never insert and
//! never touch a generated document's reference list, so a job still
//! running on a deleted record cannot bring it (or a removed reference)
//! back.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{
    AnalysisRecord, Conversation, Document, GeneratedDocument, Message, Template,
};

#[async_trait]
pub trait Store: Send + Sync {
    /// Insert or replace a document by id.
    async fn save_document(&self, doc: &Document) -> Result<()>;
    async fn get_document(&self, id: &str) -> Result<Option<Document>>;
    /// All documents, oldest first.
    async fn list_documents(&self) -> Result<Vec<Document>>;
    /// Delete a document (see module docs). Returns `false` if absent.
    async fn delete_document(&self, id: &str) -> Result<bool>;
    /// Update text, metadata and job state of an existing document.
    /// Returns `false` if it is gone.
    async fn update_document_job(&self, doc: &Document) -> Result<bool>;

    /// Insert or replace an analysis record by id.
    async fn save_analysis(&self, record: &AnalysisRecord) -> Result<()>;
    async fn get_analysis_for_document(&self, document_id: &str)
        -> Result<Option<AnalysisRecord>>;
    /// Insert `record` unless the document already has one; returns the
    /// stored record and whether it was newly created.
    async fn create_analysis_if_absent(
        &self,
        record: &AnalysisRecord,
    ) -> Result<(AnalysisRecord, bool)>;
    /// Update the result fields and job state of an existing analysis.
    async fn update_analysis_job(&self, record: &AnalysisRecord) -> Result<bool>;

    /// Insert or replace a generated document by id.
    async fn save_generated(&self, doc: &GeneratedDocument) -> Result<()>;
    async fn get_generated(&self, id: &str) -> Result<Option<GeneratedDocument>>;
    /// All generated documents, newest first.
    async fn list_generated(&self) -> Result<Vec<GeneratedDocument>>;
    /// Update content, file, metadata and job state of an existing
    /// generated document. The reference list is left as stored.
    async fn update_generated_job(&self, doc: &GeneratedDocument) -> Result<bool>;

    async fn save_template(&self, template: &Template) -> Result<()>;
    async fn get_template(&self, id: &str) -> Result<Option<Template>>;
    async fn list_templates(&self) -> Result<Vec<Template>>;

    async fn save_conversation(&self, conversation: &Conversation) -> Result<()>;
    async fn get_conversation(&self, id: &str) -> Result<Option<Conversation>>;
    /// Append a message and advance the conversation's `updated_at`.
    async fn append_message(&self, message: &Message) -> Result<()>;
    /// Messages of a conversation in creation order.
    async fn list_messages(&self, conversation_id: &str) -> Result<Vec<Message>>;
}
