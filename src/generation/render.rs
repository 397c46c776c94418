//! Rendering generated content into output files.
//!
//! Content is read as a sequence of blocks: lines starting with one to
//! six `#` followed by a space are headings (the marker count is the
//! level), every other non-blank line is a paragraph.
//!
//! | Format | Renderer |
//! |--------|----------|
//! | `docx` | WordprocessingML package (`zip` + `quick-xml`), `Heading1..6` styles |
//! | `pdf` | `printpdf`, A4, Helvetica, wrapped lines, automatic page breaks |
//! | `txt`, `markdown`, `html` | UTF-8 pass-through |
//!
//! The pipeline renders through the [`Renderer`] trait; [`NativeRenderer`]
//! is the table above.

use std::io::{Cursor, Write};

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use thiserror::Error;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use docflow_core::models::OutputFormat;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("no renderer for format '{0}'")]
    UnsupportedFormat(OutputFormat),
    #[error("failed to render {format}: {message}")]
    Failed {
        format: OutputFormat,
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Heading { level: u8, text: String },
    Paragraph(String),
}

pub fn parse_blocks(content: &str) -> Vec<Block> {
    content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(|line| {
            let hashes = line.chars().take_while(|&c| c == '#').count();
            match line[hashes..].strip_prefix(' ') {
                Some(rest) if (1..=6).contains(&hashes) => Block::Heading {
                    level: hashes as u8,
                    text: rest.trim().to_string(),
                },
                _ => Block::Paragraph(line.to_string()),
            }
        })
        .collect()
}

/// A rendered artifact.
#[derive(Debug, Clone)]
pub struct Rendered {
    pub bytes: Vec<u8>,
    pub format: OutputFormat,
    /// `true` when the requested format could not be produced and a
    /// plain-text artifact was written instead.
    pub substituted: bool,
}

pub fn render(content: &str, title: &str, format: OutputFormat) -> Result<Vec<u8>, RenderError> {
    match format {
        OutputFormat::Docx => render_docx(&parse_blocks(content), title),
        OutputFormat::Pdf => render_pdf(&parse_blocks(content), title),
        OutputFormat::Txt | OutputFormat::Markdown | OutputFormat::Html => {
            Ok(content.as_bytes().to_vec())
        }
    }
}

/// Turns generated content into the bytes of one output format.
pub trait Renderer: Send + Sync {
    fn render(&self, content: &str, title: &str, format: OutputFormat) -> Result<Vec<u8>, RenderError>;
}

/// The built-in renderers.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeRenderer;

impl Renderer for NativeRenderer {
    fn render(&self, content: &str, title: &str, format: OutputFormat) -> Result<Vec<u8>, RenderError> {
        render(content, title, format)
    }
}

/// Render, substituting a plain-text artifact when the renderer fails.
pub fn render_or_fallback(
    renderer: &dyn Renderer,
    content: &str,
    title: &str,
    format: OutputFormat,
) -> Rendered {
    match renderer.render(content, title, format) {
        Ok(bytes) => Rendered {
            bytes,
            format,
            substituted: false,
        },
        Err(e) => {
            tracing::warn!(requested = %format, error = %e, "rendering failed, writing plain text");
            Rendered {
                bytes: content.as_bytes().to_vec(),
                format: OutputFormat::Txt,
                substituted: true,
            }
        }
    }
}

// ============ DOCX ============

const W_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/><Override PartName="/word/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.styles+xml"/><Override PartName="/docProps/core.xml" ContentType="application/vnd.openxmlformats-package.core-properties+xml"/></Types>"#;

const ROOT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/><Relationship Id="rId2" Type="http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties" Target="docProps/core.xml"/></Relationships>"#;

const DOCUMENT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/></Relationships>"#;

/// Heading font sizes in half-points, level 1 first.
const HEADING_HALF_POINTS: [u32; 6] = [32, 28, 26, 24, 22, 22];

impl RenderError {
    fn failed(format: OutputFormat, e: impl std::fmt::Display) -> Self {
        RenderError::Failed {
            format,
            message: e.to_string(),
        }
    }
}

fn docx_err(e: impl std::fmt::Display) -> RenderError {
    RenderError::failed(OutputFormat::Docx, e)
}

fn styles_xml() -> String {
    let mut s = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:styles xmlns:w="{W_NS}"><w:style w:type="paragraph" w:default="1" w:styleId="Normal"><w:name w:val="Normal"/><w:pPr><w:spacing w:after="160"/></w:pPr><w:rPr><w:sz w:val="22"/></w:rPr></w:style>"#
    );
    for (i, size) in HEADING_HALF_POINTS.iter().enumerate() {
        let level = i + 1;
        s.push_str(&format!(
            r#"<w:style w:type="paragraph" w:styleId="Heading{level}"><w:name w:val="heading {level}"/><w:basedOn w:val="Normal"/><w:next w:val="Normal"/><w:pPr><w:keepNext/><w:spacing w:before="240" w:after="80"/><w:outlineLvl w:val="{}"/></w:pPr><w:rPr><w:b/><w:sz w:val="{size}"/></w:rPr></w:style>"#,
            level - 1
        ));
    }
    s.push_str("</w:styles>");
    s
}

fn core_xml(title: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties" xmlns:dc="http://purl.org/dc/elements/1.1/"><dc:title>{}</dc:title><dc:creator>docflow</dc:creator></cp:coreProperties>"#,
        quick_xml::escape::escape(title)
    )
}

fn document_xml(blocks: &[Block]) -> Result<Vec<u8>, RenderError> {
    let mut w = Writer::new(Vec::new());
    w.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))
        .map_err(docx_err)?;
    w.write_event(Event::Start(
        BytesStart::new("w:document").with_attributes([("xmlns:w", W_NS)]),
    ))
    .map_err(docx_err)?;
    w.write_event(Event::Start(BytesStart::new("w:body")))
        .map_err(docx_err)?;

    for block in blocks {
        let (style, text) = match block {
            Block::Heading { level, text } => (Some(format!("Heading{}", level)), text),
            Block::Paragraph(text) => (None, text),
        };
        w.write_event(Event::Start(BytesStart::new("w:p")))
            .map_err(docx_err)?;
        if let Some(style) = &style {
            w.write_event(Event::Start(BytesStart::new("w:pPr")))
                .map_err(docx_err)?;
            w.write_event(Event::Empty(
                BytesStart::new("w:pStyle").with_attributes([("w:val", style.as_str())]),
            ))
            .map_err(docx_err)?;
            w.write_event(Event::End(BytesEnd::new("w:pPr")))
                .map_err(docx_err)?;
        }
        w.write_event(Event::Start(BytesStart::new("w:r")))
            .map_err(docx_err)?;
        w.write_event(Event::Start(
            BytesStart::new("w:t").with_attributes([("xml:space", "preserve")]),
        ))
        .map_err(docx_err)?;
        w.write_event(Event::Text(BytesText::new(text)))
            .map_err(docx_err)?;
        w.write_event(Event::End(BytesEnd::new("w:t")))
            .map_err(docx_err)?;
        w.write_event(Event::End(BytesEnd::new("w:r")))
            .map_err(docx_err)?;
        w.write_event(Event::End(BytesEnd::new("w:p")))
            .map_err(docx_err)?;
    }

    w.write_event(Event::End(BytesEnd::new("w:body")))
        .map_err(docx_err)?;
    w.write_event(Event::End(BytesEnd::new("w:document")))
        .map_err(docx_err)?;
    Ok(w.into_inner())
}

fn render_docx(blocks: &[Block], title: &str) -> Result<Vec<u8>, RenderError> {
    let document = document_xml(blocks)?;
    let styles = styles_xml();
    let core = core_xml(title);
    let parts: [(&str, &[u8]); 6] = [
        ("[Content_Types].xml", CONTENT_TYPES.as_bytes()),
        ("_rels/.rels", ROOT_RELS.as_bytes()),
        ("word/_rels/document.xml.rels", DOCUMENT_RELS.as_bytes()),
        ("word/document.xml", &document),
        ("word/styles.xml", styles.as_bytes()),
        ("docProps/core.xml", core.as_bytes()),
    ];

    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, body) in parts {
        zip.start_file(name, options).map_err(docx_err)?;
        zip.write_all(body).map_err(docx_err)?;
    }
    let cursor = zip.finish().map_err(docx_err)?;
    Ok(cursor.into_inner())
}

// ============ PDF ============

#[cfg(feature = "pdf-render")]
fn render_pdf(blocks: &[Block], title: &str) -> Result<Vec<u8>, RenderError> {
    use printpdf::{BuiltinFont, Mm, PdfDocument};
    use std::io::BufWriter;

    const PAGE_W: f32 = 210.0;
    const PAGE_H: f32 = 297.0;
    const MARGIN: f32 = 20.0;
    const PT_TO_MM: f32 = 0.3528;

    let (doc, page1, layer1) = PdfDocument::new(title, Mm(PAGE_W), Mm(PAGE_H), "Layer 1");
    let font = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(|e| RenderError::failed(OutputFormat::Pdf, e))?;
    let bold = doc
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(|e| RenderError::failed(OutputFormat::Pdf, e))?;

    let mut layer = doc.get_page(page1).get_layer(layer1);
    let mut y = PAGE_H - MARGIN;

    for block in blocks {
        let (text, size, face) = match block {
            Block::Heading { level, text } => (text, heading_points(*level), &bold),
            Block::Paragraph(text) => (text, 11.0, &font),
        };
        let line_height = size * PT_TO_MM * 1.4;
        // Helvetica averages roughly half an em per glyph.
        let max_chars = ((PAGE_W - 2.0 * MARGIN) / (size * PT_TO_MM * 0.5)) as usize;

        if matches!(block, Block::Heading { .. }) {
            y -= line_height * 0.5;
        }
        for line in wrap_text(text, max_chars) {
            if y - line_height < MARGIN {
                let (page, layer_idx) = doc.add_page(Mm(PAGE_W), Mm(PAGE_H), "Layer 1");
                layer = doc.get_page(page).get_layer(layer_idx);
                y = PAGE_H - MARGIN;
            }
            y -= line_height;
            layer.use_text(line, size, Mm(MARGIN), Mm(y), face);
        }
        y -= line_height * 0.4;
    }

    let mut buf = BufWriter::new(Vec::new());
    doc.save(&mut buf).map_err(|e| RenderError::failed(OutputFormat::Pdf, e))?;
    buf.into_inner().map_err(|e| RenderError::failed(OutputFormat::Pdf, e))
}

#[cfg(not(feature = "pdf-render"))]
fn render_pdf(_blocks: &[Block], _title: &str) -> Result<Vec<u8>, RenderError> {
    Err(RenderError::UnsupportedFormat(OutputFormat::Pdf))
}

#[cfg(feature = "pdf-render")]
fn heading_points(level: u8) -> f32 {
    match level {
        1 => 18.0,
        2 => 15.0,
        3 => 13.0,
        _ => 12.0,
    }
}

/// Greedy word wrap at `max_chars` characters; words longer than a line
/// are split.
pub fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for word in text.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();
        while word.len() > max_chars {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
                current_len = 0;
            }
            lines.push(word.drain(..max_chars).collect());
        }
        if word.is_empty() {
            continue;
        }
        if current_len > 0 && current_len + 1 + word.len() > max_chars {
            lines.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if current_len > 0 {
            current.push(' ');
            current_len += 1;
        }
        current_len += word.len();
        current.extend(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::ooxml;

    const CONTENT: &str = "# Quarterly Report\n\nRevenue grew & costs fell.\n\n## Outlook\n\n#hashtag stays a paragraph\n####### seven is too deep";

    #[test]
    fn test_parse_blocks() {
        let blocks = parse_blocks(CONTENT);
        assert_eq!(
            blocks,
            vec![
                Block::Heading { level: 1, text: "Quarterly Report".into() },
                Block::Paragraph("Revenue grew & costs fell.".into()),
                Block::Heading { level: 2, text: "Outlook".into() },
                Block::Paragraph("#hashtag stays a paragraph".into()),
                Block::Paragraph("####### seven is too deep".into()),
            ]
        );
    }

    #[test]
    fn test_docx_is_readable_package() {
        let bytes = render(CONTENT, "Q3 <draft>", OutputFormat::Docx).unwrap();
        let text = ooxml::docx_text(&bytes).unwrap();
        assert!(text.starts_with("Quarterly Report\nRevenue grew & costs fell.\nOutlook"));
        let props = ooxml::core_properties(&bytes);
        assert_eq!(props.get("title").map(String::as_str), Some("Q3 <draft>"));

        let document = String::from_utf8(document_xml(&parse_blocks(CONTENT)).unwrap()).unwrap();
        assert!(document.contains(r#"<w:pStyle w:val="Heading1"/>"#));
        assert!(document.contains(r#"<w:pStyle w:val="Heading2"/>"#));
        assert!(document.contains("costs fell"));
    }

    #[cfg(feature = "pdf-render")]
    #[test]
    fn test_pdf_paginates() {
        let mut content = String::from("# Long Document\n\n");
        for i in 0..120 {
            content.push_str(&format!("Paragraph number {} with enough words to wrap onto a second line when rendered at eleven points on A4.\n\n", i));
        }
        let bytes = render(&content, "Long", OutputFormat::Pdf).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
        let pdf = lopdf::Document::load_mem(&bytes).unwrap();
        assert!(pdf.get_pages().len() > 1);
    }

    #[test]
    fn test_text_formats_pass_through() {
        for format in [OutputFormat::Txt, OutputFormat::Markdown, OutputFormat::Html] {
            let r = render_or_fallback(&NativeRenderer, "<p>héllo</p>", "t", format);
            assert_eq!(r.bytes, "<p>héllo</p>".as_bytes());
            assert_eq!(r.format, format);
            assert!(!r.substituted);
        }
    }

    struct Refusing;

    impl Renderer for Refusing {
        fn render(&self, _content: &str, _title: &str, format: OutputFormat) -> Result<Vec<u8>, RenderError> {
            Err(RenderError::UnsupportedFormat(format))
        }
    }

    #[test]
    fn test_failed_render_substitutes_plain_text() {
        let r = render_or_fallback(&Refusing, "# Title\n\nBody", "t", OutputFormat::Docx);
        assert!(r.substituted);
        assert_eq!(r.format, OutputFormat::Txt);
        assert_eq!(r.bytes, b"# Title\n\nBody");
    }

    #[test]
    fn test_wrap_text() {
        assert_eq!(wrap_text("aaa bbb ccc", 7), vec!["aaa bbb", "ccc"]);
        assert_eq!(wrap_text("abcdefghij", 4), vec!["abcd", "efgh", "ij"]);
        assert!(wrap_text("   ", 10).is_empty());
    }
}
