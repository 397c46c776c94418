//! # Docflow
//!
//! An asynchronous document enrichment pipeline: uploaded files are
//! converted to text through a fallback cascade of extractors, analyzed
//! (summary, keywords, sentiment, entities, topics), made searchable for
//! question answering, and used as reference material for generating new
//! documents.
//!
//! ## Architecture
//!
//! ```text
//!  upload ──▶ ┌────────────┐   ┌──────────────┐   ┌────────────┐
//!             │ Extraction │──▶│   Analysis   │   │ Generation │──▶ docx/pdf/txt/md/html
//!             └─────┬──────┘   └──────┬───────┘   └─────┬──────┘
//!                   │    JobTracker   │   WorkerPool    │
//!                   ▼                 ▼                 ▼
//!             ┌───────────────────────────────────────────────┐
//!             │      Store (SQLite / in-memory) + artifacts    │
//!             └───────────────────────────────────────────────┘
//!                   ▲                                   ▲
//!                   └──── ModelRegistry (lazy, once) ───┘
//! ```
//!
//! The side-effect-free parts (records, state machine, chunking,
//! retrieval ranking, analysis heuristics, store trait) live in the
//! `docflow-core` crate. This crate adds I/O: file parsing, model
//! providers, SQLite persistence, the worker pool and the service.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`registry`] | Lazily initialized model capabilities |
//! | [`providers`] | HTTP and local model backends |
//! | [`ocr`] | Tesseract OCR |
//! | [`extraction`] | Strategy cascade from file to text |
//! | [`generation`] | Prompt assembly, fallback document, rendering |
//! | [`worker`] | Bounded background worker pool |
//! | [`pipeline`] | Extraction, analysis and generation jobs |
//! | [`service`] | Operation surface |
//! | [`storage`] | Upload and generated artifact files |
//! | [`sqlite_store`] | SQLite [`Store`](docflow_core::store::Store) |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`commands`] | CLI command implementations |

pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod extraction;
pub mod generation;
pub mod migrate;
pub mod ocr;
pub mod pipeline;
pub mod providers;
pub mod registry;
pub mod service;
pub mod sqlite_store;
pub mod storage;
pub mod worker;

pub use docflow_core as core;
