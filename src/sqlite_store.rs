//! SQLite-backed [`Store`] implementation.
//!
//! Structured payloads (metadata, keywords, entities, topics, template
//! defaults) are stored as JSON text columns. Upserts use
//! `ON CONFLICT(id) DO UPDATE` rather than `INSERT OR REPLACE`, which
//! would delete the row first and fire `ON DELETE CASCADE` on dependents.
//! Job writes are plain `UPDATE`s of the columns the job owns.

use std::str::FromStr;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use docflow_core::job::{JobState, JobStatus};
use docflow_core::models::{
    AnalysisRecord, Conversation, Document, DocumentType, GeneratedDocument, Message,
    OutputFormat, Role, Template,
};
use docflow_core::store::Store;

/// SQLite implementation of the [`Store`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn reference_ids(&self, generated_id: &str) -> Result<Vec<String>> {
        let rows = sqlx::query(
            "SELECT document_id FROM generated_references WHERE generated_id = ? ORDER BY position",
        )
        .bind(generated_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(|r| r.get("document_id")).collect())
    }

    async fn generated_from_row(&self, row: &SqliteRow) -> Result<GeneratedDocument> {
        let id: String = row.get("id");
        let metadata_json: Option<String> = row.get("metadata_json");
        let metadata = match metadata_json {
            Some(json) => Some(serde_json::from_str(&json).context("corrupt generation metadata")?),
            None => None,
        };
        let format: String = row.get("output_format");
        Ok(GeneratedDocument {
            reference_document_ids: self.reference_ids(&id).await?,
            id,
            title: row.get("title"),
            prompt: row.get("prompt"),
            output_format: OutputFormat::from_str(&format)?,
            template_id: row.get("template_id"),
            content: row.get("content"),
            file_reference: row.get("file_reference"),
            metadata,
            state: job_state(row)?,
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }
}

fn job_state(row: &SqliteRow) -> Result<JobState> {
    let status: String = row.get("status");
    Ok(JobState {
        status: JobStatus::from_str(&status)?,
        error_message: row.get("error_message"),
    })
}

fn document_from_row(row: &SqliteRow) -> Result<Document> {
    let declared: String = row.get("declared_type");
    let metadata_json: String = row.get("metadata_json");
    Ok(Document {
        id: row.get("id"),
        title: row.get("title"),
        file_reference: row.get("file_reference"),
        original_filename: row.get("original_filename"),
        declared_type: DocumentType::from_str(&declared)?,
        extracted_text: row.get("extracted_text"),
        metadata: serde_json::from_str(&metadata_json).context("corrupt document metadata")?,
        state: job_state(row)?,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn analysis_from_row(row: &SqliteRow) -> Result<AnalysisRecord> {
    let keywords: String = row.get("keywords_json");
    let entities: String = row.get("entities_json");
    let topics: String = row.get("topics_json");
    Ok(AnalysisRecord {
        id: row.get("id"),
        document_id: row.get("document_id"),
        summary: row.get("summary"),
        keywords: serde_json::from_str(&keywords)?,
        sentiment: row.get("sentiment"),
        entities: serde_json::from_str(&entities)?,
        topics: serde_json::from_str(&topics)?,
        state: job_state(row)?,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn template_from_row(row: &SqliteRow) -> Result<Template> {
    let defaults: String = row.get("default_values_json");
    Ok(Template {
        id: row.get("id"),
        name: row.get("name"),
        body: row.get("body"),
        default_values: serde_json::from_str(&defaults)?,
        created_at: row.get("created_at"),
    })
}

fn conversation_from_row(row: &SqliteRow) -> Conversation {
    Conversation {
        id: row.get("id"),
        title: row.get("title"),
        document_id: row.get("document_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn message_from_row(row: &SqliteRow) -> Result<Message> {
    let role: String = row.get("role");
    Ok(Message {
        id: row.get("id"),
        conversation_id: row.get("conversation_id"),
        role: Role::from_str(&role)?,
        content: row.get("content"),
        created_at: row.get("created_at"),
    })
}

#[async_trait]
impl Store for SqliteStore {
    async fn save_document(&self, doc: &Document) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO documents (id, title, file_reference, original_filename, declared_type,
                                   extracted_text, metadata_json, status, error_message,
                                   created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                file_reference = excluded.file_reference,
                extracted_text = excluded.extracted_text,
                metadata_json = excluded.metadata_json,
                status = excluded.status,
                error_message = excluded.error_message,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&doc.id)
        .bind(&doc.title)
        .bind(&doc.file_reference)
        .bind(&doc.original_filename)
        .bind(doc.declared_type.as_str())
        .bind(&doc.extracted_text)
        .bind(serde_json::to_string(&doc.metadata)?)
        .bind(doc.state.status.as_str())
        .bind(&doc.state.error_message)
        .bind(doc.created_at)
        .bind(doc.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        let row = sqlx::query("SELECT * FROM documents WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(document_from_row).transpose()
    }

    async fn list_documents(&self) -> Result<Vec<Document>> {
        let rows = sqlx::query("SELECT * FROM documents ORDER BY created_at, rowid")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(document_from_row).collect()
    }

    async fn delete_document(&self, id: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM generated_references WHERE document_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        // analyses cascade and conversations are detached via foreign keys;
        // issue both explicitly so the outcome does not depend on PRAGMA state.
        sqlx::query("DELETE FROM analyses WHERE document_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE conversations SET document_id = NULL WHERE document_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn update_document_job(&self, doc: &Document) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE documents
            SET extracted_text = ?, metadata_json = ?, status = ?, error_message = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&doc.extracted_text)
        .bind(serde_json::to_string(&doc.metadata)?)
        .bind(doc.state.status.as_str())
        .bind(&doc.state.error_message)
        .bind(doc.updated_at)
        .bind(&doc.id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn save_analysis(&self, record: &AnalysisRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO analyses (id, document_id, summary, keywords_json, sentiment,
                                  entities_json, topics_json, status, error_message,
                                  created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                summary = excluded.summary,
                keywords_json = excluded.keywords_json,
                sentiment = excluded.sentiment,
                entities_json = excluded.entities_json,
                topics_json = excluded.topics_json,
                status = excluded.status,
                error_message = excluded.error_message,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&record.id)
        .bind(&record.document_id)
        .bind(&record.summary)
        .bind(serde_json::to_string(&record.keywords)?)
        .bind(record.sentiment)
        .bind(serde_json::to_string(&record.entities)?)
        .bind(serde_json::to_string(&record.topics)?)
        .bind(record.state.status.as_str())
        .bind(&record.state.error_message)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_analysis_for_document(
        &self,
        document_id: &str,
    ) -> Result<Option<AnalysisRecord>> {
        let row = sqlx::query("SELECT * FROM analyses WHERE document_id = ?")
            .bind(document_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(analysis_from_row).transpose()
    }

    async fn create_analysis_if_absent(
        &self,
        record: &AnalysisRecord,
    ) -> Result<(AnalysisRecord, bool)> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO analyses (id, document_id, status, error_message, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(document_id) DO NOTHING
            "#,
        )
        .bind(&record.id)
        .bind(&record.document_id)
        .bind(record.state.status.as_str())
        .bind(&record.state.error_message)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?
        .rows_affected()
            > 0;

        let stored = self
            .get_analysis_for_document(&record.document_id)
            .await?
            .ok_or_else(|| anyhow!("analysis for {} vanished", record.document_id))?;
        Ok((stored, inserted))
    }

    async fn update_analysis_job(&self, record: &AnalysisRecord) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE analyses
            SET summary = ?, keywords_json = ?, sentiment = ?, entities_json = ?, topics_json = ?,
                status = ?, error_message = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&record.summary)
        .bind(serde_json::to_string(&record.keywords)?)
        .bind(record.sentiment)
        .bind(serde_json::to_string(&record.entities)?)
        .bind(serde_json::to_string(&record.topics)?)
        .bind(record.state.status.as_str())
        .bind(&record.state.error_message)
        .bind(record.updated_at)
        .bind(&record.id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn save_generated(&self, doc: &GeneratedDocument) -> Result<()> {
        let metadata = doc
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO generated_documents (id, title, prompt, output_format, template_id,
                                             content, file_reference, metadata_json, status,
                                             error_message, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                content = excluded.content,
                file_reference = excluded.file_reference,
                metadata_json = excluded.metadata_json,
                status = excluded.status,
                error_message = excluded.error_message,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&doc.id)
        .bind(&doc.title)
        .bind(&doc.prompt)
        .bind(doc.output_format.as_str())
        .bind(&doc.template_id)
        .bind(&doc.content)
        .bind(&doc.file_reference)
        .bind(metadata)
        .bind(doc.state.status.as_str())
        .bind(&doc.state.error_message)
        .bind(doc.created_at)
        .bind(doc.updated_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM generated_references WHERE generated_id = ?")
            .bind(&doc.id)
            .execute(&mut *tx)
            .await?;
        for (position, document_id) in doc.reference_document_ids.iter().enumerate() {
            sqlx::query(
                "INSERT OR IGNORE INTO generated_references (generated_id, document_id, position) VALUES (?, ?, ?)",
            )
            .bind(&doc.id)
            .bind(document_id)
            .bind(position as i64)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn get_generated(&self, id: &str) -> Result<Option<GeneratedDocument>> {
        let row = sqlx::query("SELECT * FROM generated_documents WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(Some(self.generated_from_row(&row).await?)),
            None => Ok(None),
        }
    }

    async fn list_generated(&self) -> Result<Vec<GeneratedDocument>> {
        let rows = sqlx::query("SELECT * FROM generated_documents ORDER BY created_at DESC, id")
            .fetch_all(&self.pool)
            .await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            out.push(self.generated_from_row(row).await?);
        }
        Ok(out)
    }

    async fn update_generated_job(&self, doc: &GeneratedDocument) -> Result<bool> {
        let metadata = doc
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let result = sqlx::query(
            r#"
            UPDATE generated_documents
            SET content = ?, file_reference = ?, metadata_json = ?, status = ?,
                error_message = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&doc.content)
        .bind(&doc.file_reference)
        .bind(metadata)
        .bind(doc.state.status.as_str())
        .bind(&doc.state.error_message)
        .bind(doc.updated_at)
        .bind(&doc.id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn save_template(&self, template: &Template) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO templates (id, name, body, default_values_json, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                body = excluded.body,
                default_values_json = excluded.default_values_json
            "#,
        )
        .bind(&template.id)
        .bind(&template.name)
        .bind(&template.body)
        .bind(serde_json::to_string(&template.default_values)?)
        .bind(template.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_template(&self, id: &str) -> Result<Option<Template>> {
        let row = sqlx::query("SELECT * FROM templates WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(template_from_row).transpose()
    }

    async fn list_templates(&self) -> Result<Vec<Template>> {
        let rows = sqlx::query("SELECT * FROM templates ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(template_from_row).collect()
    }

    async fn save_conversation(&self, conversation: &Conversation) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO conversations (id, title, document_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                document_id = excluded.document_id,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&conversation.id)
        .bind(&conversation.title)
        .bind(&conversation.document_id)
        .bind(conversation.created_at)
        .bind(conversation.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_conversation(&self, id: &str) -> Result<Option<Conversation>> {
        let row = sqlx::query("SELECT * FROM conversations WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(conversation_from_row))
    }

    async fn append_message(&self, message: &Message) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let updated = sqlx::query(
            "UPDATE conversations SET updated_at = MAX(updated_at, ?) WHERE id = ?",
        )
        .bind(message.created_at)
        .bind(&message.conversation_id)
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() == 0 {
            return Err(anyhow!("conversation {} not found", message.conversation_id));
        }
        sqlx::query(
            "INSERT INTO messages (id, conversation_id, role, content, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&message.id)
        .bind(&message.conversation_id)
        .bind(message.role.as_str())
        .bind(&message.content)
        .bind(message.created_at)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn list_messages(&self, conversation_id: &str) -> Result<Vec<Message>> {
        let rows = sqlx::query(
            "SELECT * FROM messages WHERE conversation_id = ? ORDER BY created_at, rowid",
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(message_from_row).collect()
    }
}
