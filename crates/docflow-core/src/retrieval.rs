//! Similarity retrieval over document chunks.
//!
//! [`RetrievalIndex::retrieve`] chunks each document's extracted text,
//! embeds the query and every chunk with the same [`Embedder`], and ranks
//! chunks by cosine similarity.
//!
//! # Guarantees
//!
//! - At most `k` results.
//! - Documents with empty extracted text contribute no chunks.
//! - Results are sorted by descending score; ties keep input document
//!   order, then chunk order (stable sort over the generation order).
//! - An empty list (never an error) when there is nothing to rank.
//!
//! The same ranking feeds question answering (best chunk becomes the
//! answer context) and generation (top chunks grouped per document by
//! [`build_context`]).

use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::Serialize;

use crate::analysis::text::{split_sentences, tokenize_words};
use crate::chunk::{chunk_text, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
use crate::embedding::{cosine_similarity, Embedder};
use crate::models::Document;

/// Chunking parameters used when indexing documents for retrieval.
#[derive(Debug, Clone, Copy)]
pub struct RetrievalParams {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for RetrievalParams {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

/// One ranked chunk.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedChunk {
    pub text: String,
    pub document_id: String,
    pub document_title: String,
    pub chunk_id: String,
    pub chunk_index: i64,
    pub score: f32,
}

pub struct RetrievalIndex {
    embedder: Arc<dyn Embedder>,
    params: RetrievalParams,
}

impl RetrievalIndex {
    pub fn new(embedder: Arc<dyn Embedder>, params: RetrievalParams) -> Self {
        Self { embedder, params }
    }

    pub fn embedder_name(&self) -> &str {
        self.embedder.model_name()
    }

    /// Rank chunks of `documents` against `query`, returning at most `k`.
    ///
    /// Errors only when the embedder itself fails.
    pub async fn retrieve(
        &self,
        query: &str,
        documents: &[Document],
        k: usize,
    ) -> Result<Vec<RetrievedChunk>> {
        if k == 0 || query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let mut candidates = Vec::new();
        for doc in documents.iter().filter(|d| d.has_text()) {
            for chunk in chunk_text(
                &doc.id,
                &doc.extracted_text,
                self.params.chunk_size,
                self.params.chunk_overlap,
            ) {
                candidates.push(RetrievedChunk {
                    text: chunk.text,
                    document_id: doc.id.clone(),
                    document_title: doc.title.clone(),
                    chunk_id: chunk.id,
                    chunk_index: chunk.chunk_index,
                    score: 0.0,
                });
            }
        }
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let query_vec = self
            .embedder
            .embed(&[query.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("Empty embedding response"))?;

        let texts: Vec<String> = candidates.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embedder.embed(&texts).await?;
        if vectors.len() != candidates.len() {
            bail!(
                "embedder returned {} vectors for {} chunks",
                vectors.len(),
                candidates.len()
            );
        }

        for (candidate, vector) in candidates.iter_mut().zip(vectors.iter()) {
            candidate.score = cosine_similarity(&query_vec, vector);
        }

        // Stable: equal scores keep document order, then chunk order.
        candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
        candidates.truncate(k);
        Ok(candidates)
    }
}

/// A per-document excerpt assembled from ranked chunks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextExcerpt {
    pub document_id: String,
    pub document_title: String,
    pub text: String,
}

/// Group ranked chunks by document (in order of each document's best
/// chunk) and cap each document's concatenated excerpt at `max_chars`
/// characters. A cut landing on a chunk separator leaves no trailing
/// whitespace.
pub fn build_context(results: &[RetrievedChunk], max_chars: usize) -> Vec<ContextExcerpt> {
    let mut out: Vec<ContextExcerpt> = Vec::new();
    for r in results {
        let entry = match out.iter().position(|e| e.document_id == r.document_id) {
            Some(i) => &mut out[i],
            None => {
                out.push(ContextExcerpt {
                    document_id: r.document_id.clone(),
                    document_title: r.document_title.clone(),
                    text: String::new(),
                });
                let last = out.len() - 1;
                &mut out[last]
            }
        };
        if !entry.text.is_empty() {
            entry.text.push_str("\n\n");
        }
        entry.text.push_str(&r.text);
    }
    for e in &mut out {
        e.text = truncate_chars(&e.text, max_chars).trim_end().to_string();
    }
    out
}

/// Leading excerpt of each document with text, capped at `max_chars`.
pub fn leading_excerpts(documents: &[Document], max_chars: usize) -> Vec<ContextExcerpt> {
    documents
        .iter()
        .filter(|d| d.has_text())
        .map(|d| ContextExcerpt {
            document_id: d.id.clone(),
            document_title: d.title.clone(),
            text: truncate_chars(d.extracted_text.trim(), max_chars),
        })
        .collect()
}

/// First `max_chars` characters of `s`.
pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

/// Answer span produced by a question-answering model.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelAnswer {
    pub answer: String,
    pub score: f64,
}

/// Extractive question answering over a single context passage.
#[async_trait]
pub trait QuestionAnswerer: Send + Sync {
    fn model_name(&self) -> &str;
    async fn answer(&self, question: &str, context: &str) -> Result<ModelAnswer>;
}

/// Rule-based answer: the sentence of `context` sharing the most words
/// with `question` (first such sentence on ties). Falls back to the
/// leading sentence when nothing overlaps.
pub fn extractive_answer(question: &str, context: &str) -> String {
    let q_terms: Vec<String> = tokenize_words(question)
        .into_iter()
        .filter(|t| t.chars().count() > 2)
        .collect();
    let sentences = split_sentences(context);
    let mut best: Option<(&str, usize)> = None;
    for s in &sentences {
        let terms = tokenize_words(s);
        let overlap = q_terms.iter().filter(|q| terms.contains(q)).count();
        if best.map_or(true, |(_, b)| overlap > b) {
            best = Some((s, overlap));
        }
    }
    best.map(|(s, _)| s.trim().to_string())
        .unwrap_or_else(|| context.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingEmbedder;
    use crate::job::JobStatus;

    fn doc(id: &str, title: &str, text: &str) -> Document {
        let mut d = Document::new(title, "x.txt", "uploads/documents/x.txt");
        d.id = id.to_string();
        d.extracted_text = text.to_string();
        d.state.status = JobStatus::Completed;
        d
    }

    fn index() -> RetrievalIndex {
        RetrievalIndex::new(Arc::new(HashingEmbedder::default()), RetrievalParams::default())
    }

    #[tokio::test]
    async fn test_ranks_relevant_document_first() {
        let docs = vec![
            doc("a", "Weather", "Snow falls in the mountains during winter."),
            doc("b", "Billing", "The invoice payment terms are thirty days."),
        ];
        let results = index().retrieve("invoice payment terms", &docs, 3).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].document_id, "b");
        assert_eq!(results[0].document_title, "Billing");
        assert!(results[0].score >= results[1].score);
    }

    #[tokio::test]
    async fn test_never_more_than_k() {
        let long = (0..200)
            .map(|i| format!("Line {} about retrieval.", i))
            .collect::<Vec<_>>()
            .join("\n");
        let docs = vec![doc("a", "A", &long)];
        let results = index().retrieve("retrieval", &docs, 3).await.unwrap();
        assert_eq!(results.len(), 3);
        assert!(index().retrieve("retrieval", &docs, 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_skips_documents_without_text() {
        let docs = vec![doc("empty", "Empty", "   "), doc("full", "Full", "alpha beta")];
        let results = index().retrieve("alpha", &docs, 5).await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(results.iter().all(|r| r.document_id == "full"));

        let none = index().retrieve("alpha", &docs[..1], 5).await.unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_ties_keep_document_then_chunk_order() {
        let docs = vec![
            doc("first", "First", "identical text"),
            doc("second", "Second", "identical text"),
        ];
        let results = index().retrieve("identical text", &docs, 5).await.unwrap();
        assert_eq!(results[0].document_id, "first");
        assert_eq!(results[1].document_id, "second");
        assert_eq!(results[0].score, results[1].score);
    }

    #[test]
    fn test_build_context_groups_and_truncates() {
        let chunk = |doc: &str, text: &str| RetrievedChunk {
            text: text.to_string(),
            document_id: doc.to_string(),
            document_title: doc.to_uppercase(),
            chunk_id: format!("{}:0", doc),
            chunk_index: 0,
            score: 0.5,
        };
        let ctx = build_context(
            &[chunk("b", "bbbb"), chunk("a", "aaaa"), chunk("b", "more")],
            6,
        );
        assert_eq!(ctx.len(), 2);
        assert_eq!(ctx[0].document_id, "b");
        assert_eq!(ctx[0].text, "bbbb");
        assert_eq!(ctx[1].text, "aaaa");

        let ctx = build_context(&[chunk("b", "bbbb"), chunk("b", "more")], 5);
        assert_eq!(ctx[0].text, "bbbb");
        let ctx = build_context(&[chunk("b", "bbbb"), chunk("b", "more")], 8);
        assert_eq!(ctx[0].text, "bbbb\n\nmo");
    }

    #[test]
    fn test_extractive_answer_picks_overlapping_sentence() {
        let context = "The office opens at nine. Payment is due within thirty days. Parking is free.";
        assert_eq!(
            extractive_answer("When is payment due?", context),
            "Payment is due within thirty days."
        );
    }

    #[test]
    fn test_truncate_chars_is_char_safe() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("hi", 10), "hi");
    }
}
