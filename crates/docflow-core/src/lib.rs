//! # Docflow Core
//!
//! Side-effect-free logic shared by the docflow pipeline: the data model,
//! the job state machine, the recursive chunker, the embedding trait,
//! similarity ranking, analysis heuristics, and the store abstraction.
//!
//! This crate contains no tokio runtime, sqlx, filesystem, process, or
//! HTTP dependencies. Model-backed capabilities are expressed as traits
//! here and implemented by the application crate.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`models`] | Records: documents, analyses, generated documents, templates, conversations |
//! | [`job`] | Status enum, transition table, and the [`job::JobTracker`] |
//! | [`chunk`] | Overlapping, boundary-preserving text splitter |
//! | [`embedding`] | [`embedding::Embedder`] trait, cosine similarity, hashing embedder |
//! | [`retrieval`] | Chunk ranking against a query, context assembly |
//! | [`analysis`] | Summary, keywords, sentiment, entities, topics |
//! | [`query`] | Rule-based intent, generation hints and clarifying questions for chat queries |
//! | [`store`] | [`store::Store`] trait and the in-memory backend |

pub mod analysis;
pub mod chunk;
pub mod embedding;
pub mod job;
pub mod models;
pub mod query;
pub mod retrieval;
pub mod store;
