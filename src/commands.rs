//! CLI command implementations.
//!
//! Each `run_*` function drives one [`DocflowService`] operation and
//! prints the outcome to stdout. Commands that dispatch background work
//! poll the record until it reaches a terminal status, because the
//! worker pool lives in this process.

use std::collections::BTreeMap;
use std::future::Future;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use docflow_core::job::{JobState, JobStatus};
use docflow_core::models::{AnalysisRecord, Document, GeneratedDocument, OutputFormat};

use crate::config::Config;
use crate::error::{ServiceError, ServiceResult};
use crate::migrate;
use crate::service::{DocflowService, GenerateRequest};

const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Poll `status` until it reports a terminal state.
pub async fn wait_until_terminal<F, Fut>(mut status: F) -> ServiceResult<JobStatus>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ServiceResult<JobStatus>>,
{
    loop {
        let current = status().await?;
        if current.is_terminal() {
            return Ok(current);
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

fn format_ts(ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(ms)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| ms.to_string())
}

fn print_state(state: &JobState) {
    println!("status:       {}", state.status);
    if let Some(ref e) = state.error_message {
        println!("error:        {}", e);
    }
}

// ============ Setup ============

pub async fn run_init(config: &Config) -> Result<()> {
    migrate::run_migrations(config).await?;
    std::fs::create_dir_all(&config.storage.root).with_context(|| {
        format!("Failed to create storage root {}", config.storage.root.display())
    })?;
    println!("Database initialized at {}", config.db.path.display());
    println!("Artifacts stored under {}", config.storage.root.display());
    Ok(())
}

pub async fn run_models(svc: &DocflowService) -> Result<()> {
    println!("{:<20} {:<14} {:<14} MODEL", "CAPABILITY", "PROVIDER", "STATUS");
    for row in svc.model_status().await {
        println!(
            "{:<20} {:<14} {:<14} {}",
            row.capability.as_str(),
            row.provider,
            row.readiness.as_str(),
            row.model.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

// ============ Documents ============

fn print_document(doc: &Document) {
    println!("--- Document ---");
    println!("id:           {}", doc.id);
    println!("title:        {}", doc.title);
    println!("file:         {}", doc.original_filename);
    println!("type:         {}", doc.declared_type);
    print_state(&doc.state);
    if !doc.metadata.extraction_method.is_empty() {
        println!("method:       {}", doc.metadata.extraction_method);
    }
    if doc.metadata.ocr_processed {
        println!("ocr:          yes");
    }
    if let Some(pages) = doc.metadata.pages {
        println!("pages:        {}", pages);
    }
    if let Some(ref enc) = doc.metadata.encoding {
        println!("encoding:     {}", enc);
    }
    for (k, v) in &doc.metadata.properties {
        println!("{:<13} {}", format!("{}:", k), v);
    }
    println!("created_at:   {}", format_ts(doc.created_at));
    println!("updated_at:   {}", format_ts(doc.updated_at));
}

async fn wait_for_document(svc: &DocflowService, id: &str) -> Result<Document> {
    wait_until_terminal(move || async move { Ok(svc.get_document(id).await?.state.status) }).await?;
    Ok(svc.get_document(id).await?)
}

pub async fn run_upload(svc: &DocflowService, file: &Path, title: Option<&str>) -> Result<()> {
    let bytes = tokio::fs::read(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let file_name = file
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let id = svc
        .submit_document(title.unwrap_or(""), &file_name, &bytes)
        .await?;
    let doc = wait_for_document(svc, &id).await?;
    print_document(&doc);
    Ok(())
}

pub async fn run_list(svc: &DocflowService) -> Result<()> {
    let docs = svc.list_documents().await?;
    if docs.is_empty() {
        println!("No documents.");
    }
    for doc in docs {
        println!(
            "{}  {:<10} {:<6} {}",
            doc.id,
            doc.state.status.as_str(),
            doc.declared_type.as_str(),
            doc.title
        );
    }
    Ok(())
}

fn print_analysis(record: &AnalysisRecord) {
    println!("--- Analysis ---");
    println!("id:           {}", record.id);
    print_state(&record.state);
    if record.state.status != JobStatus::Completed {
        return;
    }
    println!("sentiment:    {:.3}", record.sentiment);
    println!("summary:      {}", record.summary);
    let keywords: Vec<String> = record
        .keywords
        .iter()
        .map(|k| format!("{} ({})", k.term, k.weight))
        .collect();
    println!("keywords:     {}", keywords.join(", "));
    let topics: Vec<String> = record
        .topics
        .iter()
        .map(|t| format!("{} ({:.2})", t.topic, t.score))
        .collect();
    println!("topics:       {}", topics.join(", "));
    for e in &record.entities {
        println!("entity:       {} [{:?}, {:.2}]", e.text, e.kind, e.confidence);
    }
}

fn print_generated(generated: &GeneratedDocument) {
    println!("--- Generated document ---");
    println!("id:           {}", generated.id);
    println!("title:        {}", generated.title);
    println!("format:       {}", generated.output_format);
    print_state(&generated.state);
    if let Some(ref meta) = generated.metadata {
        println!("generator:    {:?}", meta.generator);
        if let Some(ref model) = meta.model {
            println!("model:        {}", model);
        }
        if meta.substituted {
            println!("rendered as:  {} (substituted)", meta.rendered_format);
        }
        if !meta.skipped_references.is_empty() {
            println!("skipped refs: {}", meta.skipped_references.join(", "));
        }
        if meta.template_missing {
            println!("template:     missing, generated without it");
        }
    }
    println!("created_at:   {}", format_ts(generated.created_at));
}

/// Show a document (with its analysis, if any) or a generated document.
pub async fn run_show(svc: &DocflowService, id: &str) -> Result<()> {
    match svc.get_document(id).await {
        Ok(doc) => {
            print_document(&doc);
            match svc.get_analysis(id).await {
                Ok(record) => print_analysis(&record),
                Err(ServiceError::NotFound { .. }) => {}
                Err(e) => return Err(e.into()),
            }
            Ok(())
        }
        Err(ServiceError::NotFound { .. }) => {
            print_generated(&svc.get_generated(id).await?);
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn run_text(svc: &DocflowService, id: &str) -> Result<()> {
    let text = svc.get_extracted_text(id).await?;
    if text.status != JobStatus::Completed {
        bail!("document {} is {}, no text yet", id, text.status);
    }
    println!("{}", text.text);
    Ok(())
}

pub async fn run_reprocess(svc: &DocflowService, id: &str) -> Result<()> {
    svc.reprocess(id).await?;
    print_document(&wait_for_document(svc, id).await?);
    Ok(())
}

pub async fn run_delete(svc: &DocflowService, id: &str) -> Result<()> {
    svc.delete_document(id).await?;
    println!("Deleted {}", id);
    Ok(())
}

// ============ Analysis & QA ============

pub async fn run_analyze(svc: &DocflowService, document_id: &str, again: bool) -> Result<()> {
    if again {
        svc.reanalyze(document_id).await?;
    } else {
        svc.analyze(document_id).await?;
    }
    wait_until_terminal(move || async move {
        Ok(svc.get_analysis(document_id).await?.state.status)
    })
    .await?;
    print_analysis(&svc.get_analysis(document_id).await?);
    Ok(())
}

pub async fn run_ask(svc: &DocflowService, query: &str, document_ids: &[String]) -> Result<()> {
    match svc.ask(query, document_ids).await {
        Ok(answer) => {
            println!("{}", answer.answer);
            println!();
            println!(
                "source: {} ({}) relevance {:.3}",
                answer.source.document_title, answer.source.document_id, answer.source.relevance_score
            );
            Ok(())
        }
        Err(ServiceError::NoRelevantSections) => {
            println!("No relevant sections found.");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn run_intent(svc: &DocflowService, query: &str) -> Result<()> {
    let analysis = svc.analyze_query(query).await?;
    println!("kind:         {:?}", analysis.kind);
    println!("intent:       {:?}", analysis.intent);
    if let Some(ref hint) = analysis.generation {
        println!("format:       {}", hint.format);
        if let Some(ref title) = hint.title {
            println!("title:        {}", title);
        }
    }
    if !analysis.document_types.is_empty() {
        println!("doc types:    {}", analysis.document_types.join(", "));
    }
    if let Some(ref model) = analysis.questions_model {
        println!("model:        {}", model);
    }
    for (i, q) in analysis.clarifying_questions.iter().enumerate() {
        println!("{}. {}", i + 1, q);
    }
    Ok(())
}

/// Send one chat message; starts a conversation when `conversation` is
/// not given.
pub async fn run_chat(
    svc: &DocflowService,
    message: &str,
    conversation: Option<&str>,
    document_id: Option<&str>,
) -> Result<()> {
    let conversation_id = match conversation {
        Some(id) => id.to_string(),
        None => {
            let title: String = message.chars().take(50).collect();
            let conv = svc.create_conversation(&title, document_id).await?;
            println!("conversation: {}", conv.id);
            conv.id
        }
    };
    let reply = svc.chat(&conversation_id, message).await?;
    println!("{}", reply.content);
    Ok(())
}

// ============ Generation ============

async fn wait_for_generated(svc: &DocflowService, id: &str) -> Result<GeneratedDocument> {
    wait_until_terminal(move || async move { Ok(svc.get_generated(id).await?.state.status) }).await?;
    Ok(svc.get_generated(id).await?)
}

pub async fn run_generate(svc: &DocflowService, request: GenerateRequest) -> Result<()> {
    let id = svc.generate(request).await?;
    print_generated(&wait_for_generated(svc, &id).await?);
    Ok(())
}

pub async fn run_regenerate(svc: &DocflowService, id: &str) -> Result<()> {
    svc.regenerate(id).await?;
    print_generated(&wait_for_generated(svc, id).await?);
    Ok(())
}

pub async fn run_download(svc: &DocflowService, id: &str, out: &Path, generated: bool) -> Result<()> {
    let download = if generated {
        svc.download_generated(id).await?
    } else {
        svc.download_document(id).await?
    };
    tokio::fs::write(out, &download.bytes)
        .await
        .with_context(|| format!("Failed to write {}", out.display()))?;
    println!(
        "Wrote {} ({} bytes, {}) to {}",
        download.file_name,
        download.bytes.len(),
        download.content_type,
        out.display()
    );
    Ok(())
}

// ============ Templates ============

pub async fn run_template_add(
    svc: &DocflowService,
    name: &str,
    file: &Path,
    vars: Vec<(String, String)>,
) -> Result<()> {
    let body = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let defaults: BTreeMap<String, String> = vars.into_iter().collect();
    let template = svc.create_template(name, &body, defaults).await?;
    println!("Template {} created ({})", template.name, template.id);
    let placeholders = template.placeholders();
    if !placeholders.is_empty() {
        println!("placeholders: {}", placeholders.join(", "));
    }
    Ok(())
}

pub async fn run_template_list(svc: &DocflowService) -> Result<()> {
    let templates = svc.list_templates().await?;
    if templates.is_empty() {
        println!("No templates.");
    }
    for t in templates {
        println!("{}  {}", t.id, t.name);
    }
    Ok(())
}

/// Parse the `--format` flag.
pub fn parse_format(s: &str) -> Result<OutputFormat, String> {
    s.parse::<OutputFormat>().map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_wait_until_terminal_polls() {
        let calls = AtomicUsize::new(0);
        let counter = &calls;
        let status = wait_until_terminal(move || async move {
            match counter.fetch_add(1, Ordering::SeqCst) {
                0 => Ok(JobStatus::Pending),
                1 => Ok(JobStatus::Processing),
                _ => Ok(JobStatus::Completed),
            }
        })
        .await
        .unwrap();
        assert_eq!(status, JobStatus::Completed);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_format_ts() {
        assert_eq!(format_ts(0), "1970-01-01T00:00:00Z");
    }

    #[test]
    fn test_parse_format() {
        assert_eq!(parse_format("md").unwrap(), OutputFormat::Markdown);
        assert!(parse_format("rtf").is_err());
    }
}
