//! Built-in extraction strategies, in default cascade order.
//!
//! | Name | Stage | Handles |
//! |------|-------|---------|
//! | `pdf-text` | Structured | pdf (pdf-extract) |
//! | `docx-xml` | Structured | docx (body, headers, footers, footnotes, core properties) |
//! | `ooxml` | Structured | other files named `.pptx` / `.xlsx` |
//! | `tesseract-ocr` | Ocr | images, pdf (one raster per page) |
//! | `plain-text` | Basic | txt, other (UTF-8, else Latin-1; binary rejected) |
//! | `docx-paragraphs` | Basic | docx (lenient paragraph join) |

use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;

use docflow_core::models::DocumentType;

use super::{ooxml, Candidate, ExtractionInput, ExtractionStrategy, Stage};
use crate::registry::ModelRegistry;

pub fn default_strategies(registry: Arc<ModelRegistry>) -> Vec<Arc<dyn ExtractionStrategy>> {
    vec![
        Arc::new(PdfText),
        Arc::new(DocxXml),
        Arc::new(Ooxml),
        Arc::new(TesseractOcr::new(registry)),
        Arc::new(PlainText),
        Arc::new(DocxParagraphs),
    ]
}

/// Run a parser over the input bytes on the blocking pool. A panicking
/// parser surfaces as an error rather than taking the worker down.
async fn blocking<F>(input: &ExtractionInput, f: F) -> Result<Candidate>
where
    F: FnOnce(&[u8]) -> Result<Candidate> + Send + 'static,
{
    let bytes = input.bytes.clone();
    match tokio::task::spawn_blocking(move || f(&bytes)).await {
        Ok(result) => result,
        Err(e) if e.is_panic() => bail!("parser panicked"),
        Err(e) => Err(e.into()),
    }
}

pub struct PdfText;

#[async_trait]
impl ExtractionStrategy for PdfText {
    fn name(&self) -> &'static str {
        "pdf-text"
    }
    fn stage(&self) -> Stage {
        Stage::Structured
    }
    fn supports(&self, input: &ExtractionInput) -> bool {
        input.declared_type == DocumentType::Pdf
    }
    async fn try_extract(&self, input: &ExtractionInput) -> Result<Candidate> {
        blocking(input, |bytes| {
            let text = pdf_extract::extract_text_from_mem(bytes)
                .map_err(|e| anyhow::anyhow!("PDF extraction failed: {}", e))?;
            Ok(Candidate::text(text))
        })
        .await
    }
}

pub struct DocxXml;

#[async_trait]
impl ExtractionStrategy for DocxXml {
    fn name(&self) -> &'static str {
        "docx-xml"
    }
    fn stage(&self) -> Stage {
        Stage::Structured
    }
    fn supports(&self, input: &ExtractionInput) -> bool {
        input.declared_type == DocumentType::Docx
    }
    async fn try_extract(&self, input: &ExtractionInput) -> Result<Candidate> {
        blocking(input, |bytes| {
            let text = ooxml::docx_text(bytes)?;
            Ok(Candidate {
                text,
                properties: ooxml::core_properties(bytes),
                ..Default::default()
            })
        })
        .await
    }
}

pub struct Ooxml;

#[async_trait]
impl ExtractionStrategy for Ooxml {
    fn name(&self) -> &'static str {
        "ooxml"
    }
    fn stage(&self) -> Stage {
        Stage::Structured
    }
    fn supports(&self, input: &ExtractionInput) -> bool {
        input.declared_type == DocumentType::Other
            && matches!(input.extension().as_deref(), Some("pptx" | "xlsx"))
    }
    async fn try_extract(&self, input: &ExtractionInput) -> Result<Candidate> {
        let is_pptx = input.extension().as_deref() == Some("pptx");
        blocking(input, move |bytes| {
            let text = if is_pptx {
                ooxml::pptx_text(bytes)?
            } else {
                ooxml::xlsx_text(bytes)?
            };
            Ok(Candidate {
                text,
                properties: ooxml::core_properties(bytes),
                ..Default::default()
            })
        })
        .await
    }
}

/// OCR through the registry's `Ocr` capability.
pub struct TesseractOcr {
    registry: Arc<ModelRegistry>,
}

impl TesseractOcr {
    pub fn new(registry: Arc<ModelRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl ExtractionStrategy for TesseractOcr {
    fn name(&self) -> &'static str {
        "tesseract-ocr"
    }
    fn stage(&self) -> Stage {
        Stage::Ocr
    }
    fn supports(&self, input: &ExtractionInput) -> bool {
        matches!(input.declared_type, DocumentType::Image | DocumentType::Pdf)
    }
    async fn is_available(&self) -> bool {
        self.registry.ocr().await.is_some()
    }
    async fn try_extract(&self, input: &ExtractionInput) -> Result<Candidate> {
        let Some(engine) = self.registry.ocr().await else {
            bail!("OCR capability unavailable");
        };
        let path = input.path.clone();
        let paged = input.declared_type == DocumentType::Pdf;
        let candidate = tokio::task::spawn_blocking(move || -> Result<Candidate> {
            if !paged {
                return Ok(Candidate {
                    text: engine.ocr_image(&path)?,
                    pages: Some(1),
                    ocr: true,
                    ..Default::default()
                });
            }
            let pages = engine.ocr_pdf(&path)?;
            Ok(Candidate {
                text: join_pages(&pages),
                pages: Some(pages.len() as u32),
                ocr: true,
                ..Default::default()
            })
        })
        .await??;
        Ok(candidate)
    }
}

/// Concatenate per-page OCR output with `--- Page N ---` markers,
/// skipping pages that produced nothing.
pub fn join_pages(pages: &[String]) -> String {
    pages
        .iter()
        .enumerate()
        .filter(|(_, text)| !text.trim().is_empty())
        .map(|(i, text)| format!("--- Page {} ---\n{}", i + 1, text.trim()))
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub struct PlainText;

/// Heuristic binary check over the first 8 KiB: any NUL byte, or more
/// than 10% control characters other than common whitespace.
fn looks_binary(bytes: &[u8]) -> bool {
    let head = &bytes[..bytes.len().min(8192)];
    if head.contains(&0) {
        return true;
    }
    let control = head
        .iter()
        .filter(|b| b.is_ascii_control() && !matches!(b, b'\n' | b'\r' | b'\t' | 0x0c))
        .count();
    !head.is_empty() && control * 10 > head.len()
}

/// UTF-8 (BOM stripped) or Latin-1, with the encoding used.
pub fn decode_text(bytes: &[u8]) -> Result<(String, &'static str)> {
    if looks_binary(bytes) {
        bail!("content looks binary");
    }
    let body = bytes.strip_prefix(b"\xef\xbb\xbf").unwrap_or(bytes);
    match std::str::from_utf8(body) {
        Ok(s) => Ok((s.to_string(), "utf-8")),
        Err(_) => Ok((body.iter().map(|&b| b as char).collect(), "latin-1")),
    }
}

#[async_trait]
impl ExtractionStrategy for PlainText {
    fn name(&self) -> &'static str {
        "plain-text"
    }
    fn stage(&self) -> Stage {
        Stage::Basic
    }
    fn supports(&self, input: &ExtractionInput) -> bool {
        matches!(input.declared_type, DocumentType::Txt | DocumentType::Other)
    }
    async fn try_extract(&self, input: &ExtractionInput) -> Result<Candidate> {
        let (text, encoding) = decode_text(&input.bytes)?;
        Ok(Candidate {
            text,
            encoding: Some(encoding.to_string()),
            ..Default::default()
        })
    }
}

pub struct DocxParagraphs;

#[async_trait]
impl ExtractionStrategy for DocxParagraphs {
    fn name(&self) -> &'static str {
        "docx-paragraphs"
    }
    fn stage(&self) -> Stage {
        Stage::Basic
    }
    fn supports(&self, input: &ExtractionInput) -> bool {
        input.declared_type == DocumentType::Docx
    }
    async fn try_extract(&self, input: &ExtractionInput) -> Result<Candidate> {
        blocking(input, |bytes| Ok(Candidate::text(ooxml::docx_paragraphs(bytes)?))).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ExtractionConfig, ModelsConfig};
    use crate::extraction::ooxml::fixtures;
    use crate::ocr::OcrEngine;
    use crate::registry::Capability;
    use std::path::{Path, PathBuf};

    fn input(name: &str, bytes: &[u8]) -> ExtractionInput {
        ExtractionInput {
            path: PathBuf::from(name),
            file_name: name.to_string(),
            declared_type: DocumentType::from_file_name(name),
            bytes: Arc::new(bytes.to_vec()),
        }
    }

    #[test]
    fn test_decode_utf8_latin1_and_binary() {
        assert_eq!(decode_text(b"Hello world").unwrap(), ("Hello world".to_string(), "utf-8"));
        assert_eq!(
            decode_text(b"\xef\xbb\xbfwith bom").unwrap().0,
            "with bom"
        );
        let (text, enc) = decode_text(b"caf\xe9 au lait").unwrap();
        assert_eq!(text, "café au lait");
        assert_eq!(enc, "latin-1");
        assert!(decode_text(b"PK\x03\x04\x00\x00binary").is_err());
    }

    #[tokio::test]
    async fn test_plain_text_supports_txt_and_other() {
        assert!(PlainText.supports(&input("notes.txt", b"")));
        assert!(PlainText.supports(&input("README.md", b"")));
        assert!(!PlainText.supports(&input("a.pdf", b"")));
        let c = PlainText.try_extract(&input("notes.txt", b"Hello world")).await.unwrap();
        assert_eq!(c.text, "Hello world");
        assert_eq!(c.encoding.as_deref(), Some("utf-8"));
    }

    #[tokio::test]
    async fn test_docx_strategies() {
        let bytes = fixtures::docx(&["Quarterly results improved.", "Costs fell."]);
        let doc = input("report.docx", &bytes);
        assert!(DocxXml.supports(&doc));
        let c = DocxXml.try_extract(&doc).await.unwrap();
        assert_eq!(c.text, "Quarterly results improved.\nCosts fell.");
        let c = DocxParagraphs.try_extract(&doc).await.unwrap();
        assert_eq!(c.text, "Quarterly results improved.\nCosts fell.");
        assert!(DocxXml.try_extract(&input("old.doc", b"\xd0\xcf\x11\xe0")).await.is_err());
    }

    #[tokio::test]
    async fn test_ooxml_only_for_pptx_and_xlsx() {
        assert!(Ooxml.supports(&input("deck.pptx", b"")));
        assert!(Ooxml.supports(&input("book.xlsx", b"")));
        assert!(!Ooxml.supports(&input("notes.md", b"")));
        assert!(!Ooxml.supports(&input("report.docx", b"")));
    }

    #[tokio::test]
    async fn test_pdf_text_rejects_garbage() {
        let doc = input("a.pdf", b"not a pdf");
        assert!(PdfText.try_extract(&doc).await.is_err());
    }

    struct PagedOcr;

    impl OcrEngine for PagedOcr {
        fn name(&self) -> &str {
            "paged"
        }
        fn ocr_image(&self, _image: &Path) -> Result<String> {
            Ok("image text".to_string())
        }
        fn ocr_pdf(&self, _pdf: &Path) -> Result<Vec<String>> {
            Ok(vec!["first page".to_string(), "  ".to_string(), "third page".to_string()])
        }
    }

    #[tokio::test]
    async fn test_ocr_marks_pages() {
        let registry = Arc::new(
            ModelRegistry::builder(ModelsConfig::default(), ExtractionConfig::default())
                .with_ocr(Arc::new(PagedOcr))
                .build(),
        );
        let ocr = TesseractOcr::new(registry);
        assert!(ocr.is_available().await);

        let c = ocr.try_extract(&input("scan.pdf", b"%PDF")).await.unwrap();
        assert_eq!(c.text, "--- Page 1 ---\nfirst page\n\n--- Page 3 ---\nthird page");
        assert_eq!(c.pages, Some(3));
        assert!(c.ocr);

        let c = ocr.try_extract(&input("photo.png", b"\x89PNG")).await.unwrap();
        assert_eq!(c.text, "image text");
    }

    #[tokio::test]
    async fn test_ocr_unavailable_when_disabled() {
        let registry = Arc::new(
            ModelRegistry::builder(ModelsConfig::default(), ExtractionConfig::default())
                .without(Capability::Ocr)
                .build(),
        );
        assert!(!TesseractOcr::new(registry).is_available().await);
    }
}
