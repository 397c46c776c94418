//! End-to-end scenarios through `DocflowService` with an in-memory store,
//! the hashing embedder and OCR switched off.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use docflow::commands::wait_until_terminal;
use docflow::config::Config;
use docflow::core::job::JobStatus;
use docflow::core::models::{
    AnalysisRecord, Document, DocumentType, GeneratedDocument, GeneratorKind, OutputFormat, Role,
};
use docflow::core::query::{QueryIntent, QueryKind};
use docflow::core::retrieval::{ModelAnswer, QuestionAnswerer};
use docflow::core::store::memory::InMemoryStore;
use docflow::core::store::Store;
use docflow::error::ServiceError;
use docflow::extraction::PLACEHOLDER_METHOD;
use docflow::generation::render::{RenderError, Renderer};
use docflow::generation::{SamplingParams, TextGenerator};
use docflow::registry::{Capability, ModelRegistry, RegistryBuilder};
use docflow::service::{
    DocflowService, GenerateRequest, INTERRUPTED_MESSAGE, NO_ANSWER_REPLY, NO_DOCUMENT_REPLY,
};

const PNG_HEADER: &[u8] = &[
    0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 0, 0, 0, 0x0d, b'I', b'H', b'D', b'R', 0, 0, 0,
    1, 0, 0, 0, 1, 8, 2, 0, 0, 0,
];

fn registry(config: &Config) -> RegistryBuilder {
    ModelRegistry::builder(config.models.clone(), config.extraction.clone())
        .without(Capability::Ocr)
}

fn service(dir: &TempDir) -> DocflowService {
    service_with(dir, Arc::new(InMemoryStore::new()), |r| r)
}

/// Service over `store` with the registry adjusted by `seed`.
fn service_with(
    dir: &TempDir,
    store: Arc<InMemoryStore>,
    seed: impl FnOnce(RegistryBuilder) -> RegistryBuilder,
) -> DocflowService {
    let config = Config::minimal(dir.path());
    let registry = seed(registry(&config)).build();
    DocflowService::new(config, store, Arc::new(registry))
}

/// Generator that sleeps before answering and records that it was called.
struct SlowGenerator {
    called: AtomicBool,
    reply: String,
    delay: Duration,
}

impl SlowGenerator {
    fn new(reply: &str, delay_ms: u64) -> Arc<Self> {
        Arc::new(Self {
            called: AtomicBool::new(false),
            reply: reply.to_string(),
            delay: Duration::from_millis(delay_ms),
        })
    }
}

#[async_trait]
impl TextGenerator for SlowGenerator {
    fn model_name(&self) -> &str {
        "scripted"
    }
    async fn generate(&self, _prompt: &str, _params: &SamplingParams) -> anyhow::Result<String> {
        self.called.store(true, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Ok(self.reply.clone())
    }
}

#[derive(Default)]
struct CountingAnswerer {
    calls: AtomicUsize,
}

#[async_trait]
impl QuestionAnswerer for CountingAnswerer {
    fn model_name(&self) -> &str {
        "counting"
    }
    async fn answer(&self, _question: &str, _context: &str) -> anyhow::Result<ModelAnswer> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ModelAnswer {
            answer: "from the model".to_string(),
            score: 0.9,
        })
    }
}

struct RefusingRenderer;

impl Renderer for RefusingRenderer {
    fn render(&self, _content: &str, _title: &str, format: OutputFormat) -> Result<Vec<u8>, RenderError> {
        Err(RenderError::UnsupportedFormat(format))
    }
}

fn docx_with_text(phrase: &str) -> Vec<u8> {
    use std::io::Write;
    let mut buf = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
        zip.start_file("word/document.xml", zip::write::SimpleFileOptions::default())
            .unwrap();
        let xml = format!(
            "<?xml version=\"1.0\"?><w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"><w:body><w:p><w:r><w:t>{}</w:t></w:r></w:p></w:body></w:document>",
            phrase
        );
        zip.write_all(xml.as_bytes()).unwrap();
        zip.finish().unwrap();
    }
    buf
}

async fn upload(svc: &DocflowService, title: &str, name: &str, bytes: &[u8]) -> Document {
    let id = svc.submit_document(title, name, bytes).await.unwrap();
    let doc_id = id.as_str();
    wait_until_terminal(move || svc_status(svc, doc_id)).await.unwrap();
    svc.get_document(&id).await.unwrap()
}

async fn svc_status(svc: &DocflowService, id: &str) -> Result<JobStatus, ServiceError> {
    Ok(svc.get_document(id).await?.state.status)
}

async fn analysis(svc: &DocflowService, document_id: &str) -> AnalysisRecord {
    wait_until_terminal(move || async move { Ok(svc.get_analysis(document_id).await?.state.status) })
        .await
        .unwrap();
    svc.get_analysis(document_id).await.unwrap()
}

async fn generated(svc: &DocflowService, id: &str) -> GeneratedDocument {
    wait_until_terminal(move || async move { Ok(svc.get_generated(id).await?.state.status) })
        .await
        .unwrap();
    svc.get_generated(id).await.unwrap()
}

// ============ Extraction ============

#[tokio::test]
async fn test_plain_text_upload_completes() {
    let dir = TempDir::new().unwrap();
    let svc = service(&dir);

    let doc = upload(&svc, "Doc1", "a.txt", b"Hello world").await;
    assert_eq!(doc.title, "Doc1");
    assert_eq!(doc.declared_type, DocumentType::Txt);
    assert_eq!(doc.state.status, JobStatus::Completed);
    assert_eq!(doc.extracted_text, "Hello world");
    assert_eq!(doc.metadata.encoding.as_deref(), Some("utf-8"));

    let text = svc.get_extracted_text(&doc.id).await.unwrap();
    assert_eq!(text.text, "Hello world");
    assert_eq!(text.status, JobStatus::Completed);
    svc.shutdown().await;
}

#[tokio::test]
async fn test_docx_upload_extracts_paragraphs() {
    let dir = TempDir::new().unwrap();
    let svc = service(&dir);

    let doc = upload(&svc, "", "report.docx", &docx_with_text("office test phrase")).await;
    assert_eq!(doc.title, "report.docx");
    assert_eq!(doc.state.status, JobStatus::Completed);
    assert!(doc.extracted_text.contains("office test phrase"));
    assert!(!doc.metadata.ocr_processed);
    svc.shutdown().await;
}

#[tokio::test]
async fn test_image_without_ocr_stores_placeholder() {
    let dir = TempDir::new().unwrap();
    let svc = service(&dir);

    let doc = upload(&svc, "Scan", "scan.png", PNG_HEADER).await;
    assert_eq!(doc.declared_type, DocumentType::Image);
    assert_eq!(doc.state.status, JobStatus::Completed);
    assert_eq!(doc.metadata.extraction_method, PLACEHOLDER_METHOD);
    assert!(doc.metadata.extraction_unavailable);
    assert!(doc.extracted_text.contains("scan.png"));
    svc.shutdown().await;
}

#[tokio::test]
async fn test_submit_rejects_empty_upload() {
    let dir = TempDir::new().unwrap();
    let svc = service(&dir);

    let err = svc.submit_document("t", "a.txt", b"").await.unwrap_err();
    assert!(matches!(err, ServiceError::InvalidInput(_)));
    let err = svc.submit_document("t", "  ", b"x").await.unwrap_err();
    assert!(matches!(err, ServiceError::InvalidInput(_)));
    assert!(svc.list_documents().await.unwrap().is_empty());
    svc.shutdown().await;
}

#[tokio::test]
async fn test_reprocess_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let svc = service(&dir);

    let doc = upload(&svc, "Doc1", "a.txt", b"Hello world").await;
    for _ in 0..2 {
        svc.reprocess(&doc.id).await.unwrap();
    }
    let (svc_ref, doc_id) = (&svc, doc.id.as_str());
    wait_until_terminal(move || svc_status(svc_ref, doc_id)).await.unwrap();

    let again = svc.get_document(&doc.id).await.unwrap();
    assert_eq!(again.state.status, JobStatus::Completed);
    assert_eq!(again.extracted_text, doc.extracted_text);
    assert_eq!(again.metadata.extraction_method, doc.metadata.extraction_method);
    svc.shutdown().await;
}

#[tokio::test]
async fn test_download_returns_original_bytes() {
    let dir = TempDir::new().unwrap();
    let svc = service(&dir);

    let doc = upload(&svc, "Doc1", "a.txt", b"Hello world").await;
    let download = svc.download_document(&doc.id).await.unwrap();
    assert_eq!(download.bytes, b"Hello world");
    assert_eq!(download.content_type, "text/plain");
    assert_eq!(download.file_name, "a.txt");

    let err = svc.download_document("nope").await.unwrap_err();
    assert!(matches!(err, ServiceError::NotFound { .. }));
    svc.shutdown().await;
}

// ============ Analysis ============

#[tokio::test]
async fn test_analysis_completes_with_heuristics() {
    let dir = TempDir::new().unwrap();
    let svc = service(&dir);

    let text = "Rust is a fast and reliable systems language. Engineers at Mozilla \
                started Rust. The Rust compiler checks memory safety. Teams love Rust \
                for its great tooling.";
    let doc = upload(&svc, "Rust", "rust.txt", text.as_bytes()).await;

    let handle = svc.analyze(&doc.id).await.unwrap();
    let record = analysis(&svc, &doc.id).await;
    assert_eq!(record.id, handle.analysis_id);
    assert_eq!(record.state.status, JobStatus::Completed);
    assert!(!record.summary.is_empty());
    assert!(record.keywords.iter().any(|k| k.term == "rust"));
    assert!((-1.0..=1.0).contains(&record.sentiment));

    // A second request returns the same record without re-running.
    let again = svc.analyze(&doc.id).await.unwrap();
    assert_eq!(again.analysis_id, record.id);
    assert_eq!(again.status, JobStatus::Completed);
    svc.shutdown().await;
}

#[tokio::test]
async fn test_analysis_without_text_fails() {
    let dir = TempDir::new().unwrap();
    let svc = service(&dir);

    let doc = upload(&svc, "Scan", "scan.png", PNG_HEADER).await;
    svc.analyze(&doc.id).await.unwrap();
    let record = analysis(&svc, &doc.id).await;
    assert_eq!(record.state.status, JobStatus::Failed);
    assert_eq!(record.state.error_message.as_deref(), Some("no_extracted_text"));
    assert!(record.summary.is_empty());
    assert!(record.keywords.is_empty());
    assert!(record.entities.is_empty());
    svc.shutdown().await;
}

#[tokio::test]
async fn test_reanalyze_resets_and_reruns() {
    let dir = TempDir::new().unwrap();
    let svc = service(&dir);

    let doc = upload(&svc, "Doc1", "a.txt", b"Hello world. This is a good day.").await;
    svc.analyze(&doc.id).await.unwrap();
    let first = analysis(&svc, &doc.id).await;

    let handle = svc.reanalyze(&doc.id).await.unwrap();
    assert_eq!(handle.analysis_id, first.id);
    let second = analysis(&svc, &doc.id).await;
    assert_eq!(second.state.status, JobStatus::Completed);
    assert_eq!(second.summary, first.summary);
    svc.shutdown().await;
}

// ============ Question answering ============

#[tokio::test]
async fn test_ask_answers_from_best_document() {
    let dir = TempDir::new().unwrap();
    let svc = service(&dir);

    let a = upload(&svc, "Cats", "cats.txt", b"Cats sleep for most of the day.").await;
    let b = upload(&svc, "Rockets", "rockets.txt", b"Rockets burn fuel to reach orbit.").await;

    let answer = svc
        .ask("how do rockets reach orbit", &[a.id.clone(), b.id.clone()])
        .await
        .unwrap();
    assert_eq!(answer.source.document_id, b.id);
    assert_eq!(answer.source.document_title, "Rockets");
    assert!(answer.answer.contains("orbit"));
    svc.shutdown().await;
}

#[tokio::test]
async fn test_ask_without_documents_finds_nothing() {
    let dir = TempDir::new().unwrap();
    let svc = service(&dir);

    let err = svc.ask("anything", &[]).await.unwrap_err();
    assert!(matches!(err, ServiceError::NoRelevantSections));
    let err = svc.ask("anything", &["unknown".to_string()]).await.unwrap_err();
    assert!(matches!(err, ServiceError::NoRelevantSections));
    let err = svc.ask("   ", &["unknown".to_string()]).await.unwrap_err();
    assert!(matches!(err, ServiceError::InvalidInput(_)));
    svc.shutdown().await;
}

#[tokio::test]
async fn test_ask_calls_model_only_with_a_passage() {
    let dir = TempDir::new().unwrap();
    let qa = Arc::new(CountingAnswerer::default());
    let svc = service_with(&dir, Arc::new(InMemoryStore::new()), |r| {
        r.with_question_answerer(qa.clone())
    });

    assert!(matches!(
        svc.ask("anything", &[]).await.unwrap_err(),
        ServiceError::NoRelevantSections
    ));
    assert!(matches!(
        svc.ask("anything", &["unknown".to_string()]).await.unwrap_err(),
        ServiceError::NoRelevantSections
    ));
    let scan = upload(&svc, "Scan", "scan.png", PNG_HEADER).await;
    assert!(matches!(
        svc.ask("anything", &[scan.id.clone()]).await.unwrap_err(),
        ServiceError::NoRelevantSections
    ));
    assert_eq!(qa.calls.load(Ordering::SeqCst), 0);

    let doc = upload(&svc, "Cats", "cats.txt", b"Cats sleep for most of the day.").await;
    let answer = svc.ask("when do cats sleep", &[doc.id.clone()]).await.unwrap();
    assert_eq!(answer.answer, "from the model");
    assert_eq!(qa.calls.load(Ordering::SeqCst), 1);
    svc.shutdown().await;
}

// ============ Generation ============

#[tokio::test]
async fn test_generate_rejects_empty_request() {
    let dir = TempDir::new().unwrap();
    let svc = service(&dir);

    let err = svc
        .generate(GenerateRequest::new("  ", OutputFormat::Txt))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidInput(_)));
    assert!(svc.list_generated().await.unwrap().is_empty());
    svc.shutdown().await;
}

#[tokio::test]
async fn test_generate_docx_from_references() {
    let dir = TempDir::new().unwrap();
    let svc = service(&dir);

    let doc = upload(&svc, "Budget", "budget.txt", b"The budget for 2024 is ten million.").await;
    let mut request = GenerateRequest::new("Summarize the budget", OutputFormat::Docx);
    request.title = Some("Budget Brief".into());
    request.document_ids = vec![doc.id.clone(), doc.id.clone()];
    let id = svc.generate(request).await.unwrap();

    let out = generated(&svc, &id).await;
    assert_eq!(out.state.status, JobStatus::Completed);
    assert_eq!(out.reference_document_ids, vec![doc.id.clone()]);
    assert!(out.content.contains("# Budget Brief"));
    assert!(out.content.contains("Budget"));
    let meta = out.metadata.clone().unwrap();
    assert_eq!(meta.generator, GeneratorKind::Template);
    assert_eq!(meta.rendered_format, OutputFormat::Docx);
    assert!(!meta.substituted);

    let download = svc.download_generated(&id).await.unwrap();
    assert_eq!(
        download.content_type,
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
    );
    assert_eq!(download.file_name, "Budget Brief.docx");
    assert!(download.bytes.starts_with(b"PK"));
    svc.shutdown().await;
}

#[tokio::test]
async fn test_generate_with_template_fills_defaults() {
    let dir = TempDir::new().unwrap();
    let svc = service(&dir);

    let defaults = BTreeMap::from([("client".to_string(), "Acme".to_string())]);
    let template = svc
        .create_template("Letter", "Dear {{client}}, regarding {{topic}}.", defaults)
        .await
        .unwrap();
    assert_eq!(template.placeholders(), vec!["client", "topic"]);

    let mut request = GenerateRequest::new("Write a letter", OutputFormat::Markdown);
    request.template_id = Some(template.id.clone());
    let out = generated(&svc, &svc.generate(request).await.unwrap()).await;
    assert_eq!(out.state.status, JobStatus::Completed);
    assert!(out.content.contains("Dear Acme"));
    assert!(!out.metadata.unwrap().template_missing);

    let download = svc.download_generated(&out.id).await.unwrap();
    assert_eq!(download.content_type, "text/plain");
    assert!(download.file_name.ends_with(".md"));
    svc.shutdown().await;
}

#[tokio::test]
async fn test_generate_with_missing_template_still_completes() {
    let dir = TempDir::new().unwrap();
    let svc = service(&dir);

    let mut request = GenerateRequest::new("Write a memo", OutputFormat::Txt);
    request.template_id = Some("gone".into());
    let out = generated(&svc, &svc.generate(request).await.unwrap()).await;
    assert_eq!(out.state.status, JobStatus::Completed);
    assert!(out.metadata.unwrap().template_missing);
    svc.shutdown().await;
}

#[tokio::test]
async fn test_generate_with_only_missing_references_fails() {
    let dir = TempDir::new().unwrap();
    let svc = service(&dir);

    let mut request = GenerateRequest::new("Summarize", OutputFormat::Txt);
    request.document_ids = vec!["missing-1".into()];
    let out = generated(&svc, &svc.generate(request).await.unwrap()).await;
    assert_eq!(out.state.status, JobStatus::Failed);
    let message = out.state.error_message.unwrap();
    assert!(message.contains("reference documents not found"), "{}", message);
    assert!(message.contains("missing-1"));

    let err = svc.download_generated(&out.id).await.unwrap_err();
    assert!(matches!(err, ServiceError::NotReady(_)));
    svc.shutdown().await;
}

#[tokio::test]
async fn test_regenerate_replaces_artifact() {
    let dir = TempDir::new().unwrap();
    let svc = service(&dir);

    let id = svc
        .generate(GenerateRequest::new("Write a haiku", OutputFormat::Html))
        .await
        .unwrap();
    let first = generated(&svc, &id).await;
    let first_ref = first.file_reference.clone().unwrap();

    svc.regenerate(&id).await.unwrap();
    let second = generated(&svc, &id).await;
    assert_eq!(second.state.status, JobStatus::Completed);
    assert_ne!(second.file_reference.clone().unwrap(), first_ref);
    assert!(!dir.path().join("artifacts").join(&first_ref).exists());
    assert_eq!(svc.download_generated(&id).await.unwrap().content_type, "text/html");
    svc.shutdown().await;
}

#[tokio::test]
async fn test_render_failure_substitutes_plain_text() {
    let dir = TempDir::new().unwrap();
    let config = Config::minimal(dir.path());
    let registry = registry(&config).build();
    let svc = DocflowService::with_renderer(
        config,
        Arc::new(InMemoryStore::new()),
        Arc::new(registry),
        Arc::new(RefusingRenderer),
    );

    let mut request = GenerateRequest::new("Write a memo", OutputFormat::Docx);
    request.title = Some("Memo".into());
    let out = generated(&svc, &svc.generate(request).await.unwrap()).await;
    assert_eq!(out.state.status, JobStatus::Completed);
    assert_eq!(out.output_format, OutputFormat::Docx);
    let meta = out.metadata.clone().unwrap();
    assert!(meta.substituted);
    assert_eq!(meta.rendered_format, OutputFormat::Txt);

    let download = svc.download_generated(&out.id).await.unwrap();
    assert_eq!(download.content_type, "text/plain");
    assert_eq!(download.file_name, "Memo.txt");
    assert_eq!(download.bytes, out.content.as_bytes());
    svc.shutdown().await;
}

// ============ Recovery ============

#[tokio::test]
async fn test_reprocess_recovers_interrupted_extraction() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(InMemoryStore::new());
    let svc = service_with(&dir, store.clone(), |r| r);

    let mut doc = upload(&svc, "Doc1", "a.txt", b"Hello world").await;
    // What a crash mid-extraction leaves behind.
    doc.state.status = JobStatus::Processing;
    doc.extracted_text.clear();
    store.save_document(&doc).await.unwrap();

    assert_eq!(svc.reprocess(&doc.id).await.unwrap(), JobStatus::Pending);
    let (svc_ref, doc_id) = (&svc, doc.id.as_str());
    let status = tokio::time::timeout(
        Duration::from_secs(10),
        wait_until_terminal(move || svc_status(svc_ref, doc_id)),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(status, JobStatus::Completed);
    assert_eq!(svc.get_document(&doc.id).await.unwrap().extracted_text, "Hello world");
    svc.shutdown().await;
}

#[tokio::test]
async fn test_recover_interrupted_fails_orphaned_jobs() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(InMemoryStore::new());

    let mut doc = Document::new("Doc1", "a.txt", "uploads/documents/a.txt");
    doc.state.status = JobStatus::Processing;
    store.save_document(&doc).await.unwrap();
    let mut gen = GeneratedDocument::new("Gen", "prompt", OutputFormat::Txt, None, vec![]);
    gen.state.status = JobStatus::Processing;
    store.save_generated(&gen).await.unwrap();
    let done = GeneratedDocument::new("Done", "prompt", OutputFormat::Txt, None, vec![]);
    store.save_generated(&done).await.unwrap();

    let svc = service_with(&dir, store, |r| r);
    assert_eq!(svc.recover_interrupted().await.unwrap(), 2);

    let doc = svc.get_document(&doc.id).await.unwrap();
    assert_eq!(doc.state.status, JobStatus::Failed);
    assert_eq!(doc.state.error_message.as_deref(), Some(INTERRUPTED_MESSAGE));
    assert_eq!(svc.get_generated(&gen.id).await.unwrap().state.status, JobStatus::Failed);
    assert_eq!(svc.get_generated(&done.id).await.unwrap().state.status, JobStatus::Pending);
    assert_eq!(svc.recover_interrupted().await.unwrap(), 0);
    svc.shutdown().await;
}

// ============ Deletion & conversations ============

#[tokio::test]
async fn test_delete_document_detaches_dependents() {
    let dir = TempDir::new().unwrap();
    let svc = service(&dir);

    let doc = upload(&svc, "Doc1", "a.txt", b"Hello world").await;
    svc.analyze(&doc.id).await.unwrap();
    analysis(&svc, &doc.id).await;
    let mut request = GenerateRequest::new("Summarize", OutputFormat::Txt);
    request.document_ids = vec![doc.id.clone()];
    let gen_id = svc.generate(request).await.unwrap();
    generated(&svc, &gen_id).await;
    let conversation = svc.create_conversation("About doc", Some(&doc.id)).await.unwrap();

    svc.delete_document(&doc.id).await.unwrap();

    assert!(matches!(
        svc.get_document(&doc.id).await.unwrap_err(),
        ServiceError::NotFound { .. }
    ));
    assert!(matches!(
        svc.get_analysis(&doc.id).await.unwrap_err(),
        ServiceError::NotFound { .. }
    ));
    let gen = svc.get_generated(&gen_id).await.unwrap();
    assert!(gen.reference_document_ids.is_empty());
    assert_eq!(gen.state.status, JobStatus::Completed);
    let conversation = svc.get_conversation(&conversation.id).await.unwrap();
    assert_eq!(conversation.document_id, None);
    svc.shutdown().await;
}

#[tokio::test]
async fn test_delete_during_generation_keeps_reference_removed() {
    let dir = TempDir::new().unwrap();
    let slow = SlowGenerator::new("# Brief\n\nThe budget is set.", 300);
    let svc = service_with(&dir, Arc::new(InMemoryStore::new()), |r| {
        r.with_generator(slow.clone())
    });

    let doc = upload(&svc, "Budget", "budget.txt", b"The budget for 2024 is ten million.").await;
    let mut request = GenerateRequest::new("Summarize the budget", OutputFormat::Txt);
    request.document_ids = vec![doc.id.clone()];
    let id = svc.generate(request).await.unwrap();

    while !slow.called.load(Ordering::SeqCst) {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    svc.delete_document(&doc.id).await.unwrap();

    let out = generated(&svc, &id).await;
    assert_eq!(out.state.status, JobStatus::Completed);
    assert!(out.reference_document_ids.is_empty());
    assert!(out.content.contains("The budget is set."));
    assert!(matches!(
        svc.get_document(&doc.id).await.unwrap_err(),
        ServiceError::NotFound { .. }
    ));
    svc.shutdown().await;
}

#[tokio::test]
async fn test_chat_answers_from_attached_document() {
    let dir = TempDir::new().unwrap();
    let svc = service(&dir);

    let doc = upload(&svc, "Cats", "cats.txt", b"Cats sleep for most of the day.").await;
    let conversation = svc.create_conversation("", Some(&doc.id)).await.unwrap();
    assert_eq!(conversation.title, "New conversation");

    let reply = svc.chat(&conversation.id, "when do cats sleep").await.unwrap();
    assert_eq!(reply.role, Role::Assistant);
    assert!(reply.content.contains("sleep"));

    let detached = svc.create_conversation("Loose", None).await.unwrap();
    let reply = svc.chat(&detached.id, "hello").await.unwrap();
    assert_eq!(reply.content, NO_DOCUMENT_REPLY);

    let messages = svc.list_messages(&conversation.id).await.unwrap();
    let roles: Vec<Role> = messages.iter().map(|m| m.role).collect();
    assert_eq!(roles, vec![Role::User, Role::Assistant]);
    svc.shutdown().await;
}

#[tokio::test]
async fn test_chat_without_answer_asks_back() {
    let dir = TempDir::new().unwrap();
    let svc = service(&dir);

    let scan = upload(&svc, "Scan", "scan.png", PNG_HEADER).await;
    let conversation = svc.create_conversation("Scan", Some(&scan.id)).await.unwrap();
    let reply = svc.chat(&conversation.id, "when is the invoice due?").await.unwrap();
    assert!(reply.content.starts_with(NO_ANSWER_REPLY));
    assert!(reply
        .content
        .contains("1. What specific information are you looking for?"));
    svc.shutdown().await;
}

#[tokio::test]
async fn test_chat_summary_uses_completed_analysis() {
    let dir = TempDir::new().unwrap();
    let svc = service(&dir);

    let doc = upload(&svc, "Rust", "rust.txt", b"Rust is a systems language. It is fast.").await;
    svc.analyze(&doc.id).await.unwrap();
    let record = analysis(&svc, &doc.id).await;
    let conversation = svc.create_conversation("", Some(&doc.id)).await.unwrap();

    let reply = svc.chat(&conversation.id, "summarize this").await.unwrap();
    assert_eq!(reply.content, record.summary);
    svc.shutdown().await;
}

#[tokio::test]
async fn test_chat_creation_request_starts_generation() {
    let dir = TempDir::new().unwrap();
    let svc = service(&dir);

    let doc = upload(&svc, "Budget", "budget.txt", b"The budget for 2024 is ten million.").await;
    let conversation = svc.create_conversation("Budget", Some(&doc.id)).await.unwrap();
    let reply = svc
        .chat(&conversation.id, "Please write a text report for the board")
        .await
        .unwrap();

    let all = svc.list_generated().await.unwrap();
    assert_eq!(all.len(), 1);
    let started = &all[0];
    assert_eq!(started.output_format, OutputFormat::Txt);
    assert_eq!(started.title, "Document for The board");
    assert_eq!(started.reference_document_ids, vec![doc.id.clone()]);
    assert!(reply.content.contains("TXT document titled 'Document for The board'"));
    assert!(reply.content.contains(&started.id));
    assert!(reply.content.contains("To help me, could you tell me:"));

    let out = generated(&svc, &started.id).await;
    assert_eq!(out.state.status, JobStatus::Completed);
    svc.shutdown().await;
}

#[tokio::test]
async fn test_analyze_query_rules_and_model_questions() {
    let dir = TempDir::new().unwrap();
    let svc = service(&dir);
    let analysis = svc.analyze_query("Can you draft a PDF contract?").await.unwrap();
    assert_eq!(analysis.kind, QueryKind::Question);
    assert_eq!(analysis.intent, QueryIntent::DocumentCreation);
    assert_eq!(analysis.generation.unwrap().format, OutputFormat::Pdf);
    assert_eq!(analysis.document_types, vec!["contract"]);
    assert_eq!(analysis.questions_model, None);
    assert!(matches!(
        svc.analyze_query("  ").await.unwrap_err(),
        ServiceError::InvalidInput(_)
    ));
    svc.shutdown().await;

    let dir = TempDir::new().unwrap();
    let scripted = SlowGenerator::new("Here you go:\n1. Who signs it?\n2. Which jurisdiction?", 0);
    let svc = service_with(&dir, Arc::new(InMemoryStore::new()), |r| {
        r.with_generator(scripted.clone())
    });
    let analysis = svc.analyze_query("draft a contract").await.unwrap();
    assert_eq!(
        analysis.clarifying_questions,
        vec!["Who signs it?", "Which jurisdiction?"]
    );
    assert_eq!(analysis.questions_model.as_deref(), Some("scripted"));
    svc.shutdown().await;
}
