//! In-memory [`Store`] implementation for tests and embedding hosts.
//!
//! Uses `HashMap` and `Vec` behind `std::sync::RwLock`. Insertion order
//! is tracked so listings are stable.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use crate::models::{
    AnalysisRecord, Conversation, Document, GeneratedDocument, Message, Template,
};

use super::Store;

#[derive(Default)]
struct Tables {
    documents: HashMap<String, Document>,
    document_order: Vec<String>,
    analyses: HashMap<String, AnalysisRecord>,
    generated: HashMap<String, GeneratedDocument>,
    templates: HashMap<String, Template>,
    conversations: HashMap<String, Conversation>,
    messages: Vec<Message>,
}

/// In-memory store.
#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn save_document(&self, doc: &Document) -> Result<()> {
        let mut t = self.write()?;
        if t.documents.insert(doc.id.clone(), doc.clone()).is_none() {
            t.document_order.push(doc.id.clone());
        }
        Ok(())
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        Ok(self.read()?.documents.get(id).cloned())
    }

    async fn list_documents(&self) -> Result<Vec<Document>> {
        let t = self.read()?;
        Ok(t.document_order
            .iter()
            .filter_map(|id| t.documents.get(id).cloned())
            .collect())
    }

    async fn delete_document(&self, id: &str) -> Result<bool> {
        let mut t = self.write()?;
        if t.documents.remove(id).is_none() {
            return Ok(false);
        }
        t.document_order.retain(|d| d != id);
        t.analyses.retain(|_, a| a.document_id != id);
        for g in t.generated.values_mut() {
            g.reference_document_ids.retain(|r| r != id);
        }
        for c in t.conversations.values_mut() {
            if c.document_id.as_deref() == Some(id) {
                c.document_id = None;
            }
        }
        Ok(true)
    }

    async fn update_document_job(&self, doc: &Document) -> Result<bool> {
        let mut t = self.write()?;
        let Some(stored) = t.documents.get_mut(&doc.id) else {
            return Ok(false);
        };
        stored.extracted_text = doc.extracted_text.clone();
        stored.metadata = doc.metadata.clone();
        stored.state = doc.state.clone();
        stored.updated_at = doc.updated_at;
        Ok(true)
    }

    async fn save_analysis(&self, record: &AnalysisRecord) -> Result<()> {
        let mut t = self.write()?;
        if let Some(existing) = t
            .analyses
            .values()
            .find(|a| a.document_id == record.document_id && a.id != record.id)
        {
            bail!(
                "document {} already has analysis {}",
                record.document_id,
                existing.id
            );
        }
        t.analyses.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn get_analysis_for_document(
        &self,
        document_id: &str,
    ) -> Result<Option<AnalysisRecord>> {
        Ok(self
            .read()?
            .analyses
            .values()
            .find(|a| a.document_id == document_id)
            .cloned())
    }

    async fn create_analysis_if_absent(
        &self,
        record: &AnalysisRecord,
    ) -> Result<(AnalysisRecord, bool)> {
        let mut t = self.write()?;
        if let Some(existing) = t
            .analyses
            .values()
            .find(|a| a.document_id == record.document_id)
        {
            return Ok((existing.clone(), false));
        }
        t.analyses.insert(record.id.clone(), record.clone());
        Ok((record.clone(), true))
    }

    async fn update_analysis_job(&self, record: &AnalysisRecord) -> Result<bool> {
        let mut t = self.write()?;
        let Some(stored) = t.analyses.get_mut(&record.id) else {
            return Ok(false);
        };
        stored.summary = record.summary.clone();
        stored.keywords = record.keywords.clone();
        stored.sentiment = record.sentiment;
        stored.entities = record.entities.clone();
        stored.topics = record.topics.clone();
        stored.state = record.state.clone();
        stored.updated_at = record.updated_at;
        Ok(true)
    }

    async fn save_generated(&self, doc: &GeneratedDocument) -> Result<()> {
        self.write()?.generated.insert(doc.id.clone(), doc.clone());
        Ok(())
    }

    async fn get_generated(&self, id: &str) -> Result<Option<GeneratedDocument>> {
        Ok(self.read()?.generated.get(id).cloned())
    }

    async fn list_generated(&self) -> Result<Vec<GeneratedDocument>> {
        let mut all: Vec<GeneratedDocument> = self.read()?.generated.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(all)
    }

    async fn update_generated_job(&self, doc: &GeneratedDocument) -> Result<bool> {
        let mut t = self.write()?;
        let Some(stored) = t.generated.get_mut(&doc.id) else {
            return Ok(false);
        };
        stored.content = doc.content.clone();
        stored.file_reference = doc.file_reference.clone();
        stored.metadata = doc.metadata.clone();
        stored.state = doc.state.clone();
        stored.updated_at = doc.updated_at;
        Ok(true)
    }

    async fn save_template(&self, template: &Template) -> Result<()> {
        self.write()?
            .templates
            .insert(template.id.clone(), template.clone());
        Ok(())
    }

    async fn get_template(&self, id: &str) -> Result<Option<Template>> {
        Ok(self.read()?.templates.get(id).cloned())
    }

    async fn list_templates(&self) -> Result<Vec<Template>> {
        let mut all: Vec<Template> = self.read()?.templates.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(all)
    }

    async fn save_conversation(&self, conversation: &Conversation) -> Result<()> {
        self.write()?
            .conversations
            .insert(conversation.id.clone(), conversation.clone());
        Ok(())
    }

    async fn get_conversation(&self, id: &str) -> Result<Option<Conversation>> {
        Ok(self.read()?.conversations.get(id).cloned())
    }

    async fn append_message(&self, message: &Message) -> Result<()> {
        let mut t = self.write()?;
        let conversation = t
            .conversations
            .get_mut(&message.conversation_id)
            .ok_or_else(|| anyhow!("conversation {} not found", message.conversation_id))?;
        conversation.updated_at = conversation.updated_at.max(message.created_at);
        t.messages.push(message.clone());
        Ok(())
    }

    async fn list_messages(&self, conversation_id: &str) -> Result<Vec<Message>> {
        Ok(self
            .read()?
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OutputFormat, Role};

    #[tokio::test]
    async fn test_create_analysis_is_idempotent() {
        let store = InMemoryStore::new();
        let first = AnalysisRecord::new("doc-1");
        let (a, created) = store.create_analysis_if_absent(&first).await.unwrap();
        assert!(created);
        let (b, created) = store
            .create_analysis_if_absent(&AnalysisRecord::new("doc-1"))
            .await
            .unwrap();
        assert!(!created);
        assert_eq!(a.id, b.id);
    }

    #[tokio::test]
    async fn test_delete_document_handles_dependents() {
        let store = InMemoryStore::new();
        let doc = Document::new("Doc", "a.txt", "uploads/documents/a.txt");
        store.save_document(&doc).await.unwrap();
        store
            .save_analysis(&AnalysisRecord::new(&doc.id))
            .await
            .unwrap();
        let gen = GeneratedDocument::new(
            "Gen",
            "prompt",
            OutputFormat::Txt,
            None,
            vec![doc.id.clone(), "other".to_string()],
        );
        store.save_generated(&gen).await.unwrap();
        let conv = Conversation::new("Chat", Some(doc.id.clone()));
        store.save_conversation(&conv).await.unwrap();

        assert!(store.delete_document(&doc.id).await.unwrap());
        assert!(!store.delete_document(&doc.id).await.unwrap());

        assert!(store
            .get_analysis_for_document(&doc.id)
            .await
            .unwrap()
            .is_none());
        let gen = store.get_generated(&gen.id).await.unwrap().unwrap();
        assert_eq!(gen.reference_document_ids, vec!["other".to_string()]);
        let conv = store.get_conversation(&conv.id).await.unwrap().unwrap();
        assert!(conv.document_id.is_none());
    }

    #[tokio::test]
    async fn test_job_updates_keep_references_and_skip_missing_rows() {
        let store = InMemoryStore::new();
        let mut gen = GeneratedDocument::new(
            "Gen",
            "prompt",
            OutputFormat::Txt,
            None,
            vec!["doc-1".to_string(), "doc-2".to_string()],
        );
        store.save_generated(&gen).await.unwrap();
        store
            .save_generated(&GeneratedDocument {
                reference_document_ids: vec!["doc-2".to_string()],
                ..gen.clone()
            })
            .await
            .unwrap();

        gen.content = "body".to_string();
        assert!(store.update_generated_job(&gen).await.unwrap());
        let stored = store.get_generated(&gen.id).await.unwrap().unwrap();
        assert_eq!(stored.content, "body");
        assert_eq!(stored.reference_document_ids, vec!["doc-2".to_string()]);

        let doc = Document::new("Doc", "a.txt", "uploads/documents/a.txt");
        assert!(!store.update_document_job(&doc).await.unwrap());
        assert!(store.get_document(&doc.id).await.unwrap().is_none());
        assert!(!store
            .update_analysis_job(&AnalysisRecord::new("doc-1"))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_append_message_orders_and_touches_conversation() {
        let store = InMemoryStore::new();
        let mut conv = Conversation::new("Chat", None);
        conv.updated_at = 0;
        store.save_conversation(&conv).await.unwrap();

        let m1 = Message::new(&conv.id, Role::User, "hi");
        let m2 = Message::new(&conv.id, Role::Assistant, "hello");
        store.append_message(&m1).await.unwrap();
        store.append_message(&m2).await.unwrap();

        let log = store.list_messages(&conv.id).await.unwrap();
        assert_eq!(
            log.iter().map(|m| m.content.as_str()).collect::<Vec<_>>(),
            vec!["hi", "hello"]
        );
        let conv = store.get_conversation(&conv.id).await.unwrap().unwrap();
        assert_eq!(conv.updated_at, m2.created_at);

        let orphan = Message::new("missing", Role::User, "x");
        assert!(store.append_message(&orphan).await.is_err());
    }
}
