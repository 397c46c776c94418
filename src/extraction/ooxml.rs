//! Office Open XML readers (docx, pptx, xlsx).
//!
//! All readers work on the in-memory ZIP package and cap every XML entry
//! at [`MAX_XML_ENTRY_BYTES`] decompressed bytes.

use std::collections::BTreeMap;
use std::io::{Cursor, Read};

use quick_xml::events::Event;
use quick_xml::Reader;
use thiserror::Error;

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
pub const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;
const XLSX_MAX_SHEETS: usize = 100;
const XLSX_MAX_CELLS_PER_SHEET: usize = 100_000;

#[derive(Debug, Error)]
pub enum OoxmlError {
    #[error("not a valid OOXML package: {0}")]
    Zip(String),
    #[error("{0} not found in package")]
    MissingPart(String),
    #[error("ZIP entry {name} exceeds size limit ({limit} bytes)")]
    TooLarge { name: String, limit: u64 },
    #[error("malformed XML in {part}: {message}")]
    Xml { part: String, message: String },
}

type Archive<'a> = zip::ZipArchive<Cursor<&'a [u8]>>;

fn open(bytes: &[u8]) -> Result<Archive<'_>, OoxmlError> {
    zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| OoxmlError::Zip(e.to_string()))
}

fn read_entry(archive: &mut Archive<'_>, name: &str) -> Result<Vec<u8>, OoxmlError> {
    let entry = archive.by_name(name).map_err(|e| match e {
        zip::result::ZipError::FileNotFound => OoxmlError::MissingPart(name.to_string()),
        other => OoxmlError::Zip(other.to_string()),
    })?;
    let mut out = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut out)
        .map_err(|e| OoxmlError::Zip(e.to_string()))?;
    if out.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(OoxmlError::TooLarge {
            name: name.to_string(),
            limit: MAX_XML_ENTRY_BYTES,
        });
    }
    Ok(out)
}

/// Part names starting with `prefix` and ending in `.xml`, ordered by the
/// number between them (`slide2` before `slide10`).
fn numbered_parts(archive: &Archive<'_>, prefix: &str) -> Vec<String> {
    let mut names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with(prefix) && n.ends_with(".xml"))
        .map(|s| s.to_string())
        .collect();
    names.sort_by_key(|name| {
        name.trim_start_matches(prefix)
            .trim_end_matches(".xml")
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });
    names
}

/// Text of a WordprocessingML part: `w:t` runs, one line per `w:p`,
/// `w:tab` as a tab and `w:br` as a newline.
///
/// With `lenient`, malformed XML ends the scan and returns what was read
/// so far instead of an error.
fn paragraph_text(xml: &[u8], part: &str, lenient: bool) -> Result<String, OoxmlError> {
    let mut out = String::new();
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut in_t = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_t = true,
            Ok(Event::Text(te)) if in_t => match te.unescape() {
                Ok(text) => out.push_str(&text),
                Err(_) => out.push_str(&String::from_utf8_lossy(&te)),
            },
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_t = false,
                b"p" => out.push('\n'),
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"tab" => out.push('\t'),
                b"br" | b"cr" => out.push('\n'),
                b"p" => out.push('\n'),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) if lenient => {
                tracing::debug!(part, error = %e, "stopping at malformed XML");
                break;
            }
            Err(e) => {
                return Err(OoxmlError::Xml {
                    part: part.to_string(),
                    message: e.to_string(),
                })
            }
            _ => {}
        }
        buf.clear();
    }
    Ok(normalize_lines(&out))
}

/// Trim trailing spaces per line and collapse runs of blank lines.
fn normalize_lines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut blank_run = 0;
    for line in text.lines() {
        let line = line.trim_end();
        if line.is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(line);
        out.push('\n');
    }
    out.trim().to_string()
}

/// Full docx text: body, then headers, footers, and footnotes.
pub fn docx_text(bytes: &[u8]) -> Result<String, OoxmlError> {
    let mut archive = open(bytes)?;
    let body = read_entry(&mut archive, "word/document.xml")?;
    let mut sections = vec![paragraph_text(&body, "word/document.xml", false)?];

    let mut extra: Vec<String> = Vec::new();
    for prefix in ["word/header", "word/footer"] {
        extra.extend(numbered_parts(&archive, prefix));
    }
    if archive.file_names().any(|n| n == "word/footnotes.xml") {
        extra.push("word/footnotes.xml".to_string());
    }
    for part in extra {
        let xml = read_entry(&mut archive, &part)?;
        let text = paragraph_text(&xml, &part, true)?;
        if !text.is_empty() {
            sections.push(text);
        }
    }
    Ok(sections
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n"))
}

/// Body paragraphs only, tolerant of malformed XML.
pub fn docx_paragraphs(bytes: &[u8]) -> Result<String, OoxmlError> {
    let mut archive = open(bytes)?;
    let body = read_entry(&mut archive, "word/document.xml")?;
    let text = paragraph_text(&body, "word/document.xml", true)?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n"))
}

/// Core document properties from `docProps/core.xml`, keyed by local
/// element name (`title`, `creator`, `subject`, ...). Missing part → empty.
pub fn core_properties(bytes: &[u8]) -> BTreeMap<String, String> {
    let mut props = BTreeMap::new();
    let Ok(mut archive) = open(bytes) else {
        return props;
    };
    let Ok(xml) = read_entry(&mut archive, "docProps/core.xml") else {
        return props;
    };

    const KEYS: &[&str] = &[
        "title",
        "subject",
        "creator",
        "keywords",
        "description",
        "lastModifiedBy",
        "created",
        "modified",
    ];
    let mut reader = Reader::from_reader(xml.as_slice());
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut current: Option<String> = None;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                current = KEYS.contains(&name.as_str()).then_some(name);
            }
            Ok(Event::Text(te)) => {
                if let Some(key) = current.take() {
                    let value = te.unescape().map(|v| v.trim().to_string()).unwrap_or_default();
                    if !value.is_empty() {
                        props.insert(key, value);
                    }
                }
            }
            Ok(Event::End(_)) => current = None,
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
        buf.clear();
    }
    props
}

/// `a:t` runs of every slide, slides separated by blank lines.
pub fn pptx_text(bytes: &[u8]) -> Result<String, OoxmlError> {
    let mut archive = open(bytes)?;
    let mut slides = Vec::new();
    for name in numbered_parts(&archive, "ppt/slides/slide") {
        let xml = read_entry(&mut archive, &name)?;
        let text = paragraph_text(&xml, &name, false)?;
        if !text.is_empty() {
            slides.push(text);
        }
    }
    Ok(slides.join("\n\n"))
}

/// Shared-string cell values of every worksheet, one line per sheet.
pub fn xlsx_text(bytes: &[u8]) -> Result<String, OoxmlError> {
    let mut archive = open(bytes)?;
    let shared = match read_entry(&mut archive, "xl/sharedStrings.xml") {
        Ok(xml) => shared_strings(&xml)?,
        Err(OoxmlError::MissingPart(_)) => Vec::new(),
        Err(e) => return Err(e),
    };
    let mut sheets = Vec::new();
    for name in numbered_parts(&archive, "xl/worksheets/sheet")
        .into_iter()
        .take(XLSX_MAX_SHEETS)
    {
        let xml = read_entry(&mut archive, &name)?;
        let cells = sheet_cells(&xml, &name, &shared)?;
        if !cells.is_empty() {
            sheets.push(cells);
        }
    }
    Ok(sheets.join("\n"))
}

fn shared_strings(xml: &[u8]) -> Result<Vec<String>, OoxmlError> {
    let mut strings = Vec::new();
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut current: Option<String> = None;
    let mut in_t = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"si" => current = Some(String::new()),
                b"t" => in_t = true,
                _ => {}
            },
            Ok(Event::Text(te)) if in_t => {
                if let Some(s) = current.as_mut() {
                    s.push_str(&te.unescape().unwrap_or_default());
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_t = false,
                b"si" => strings.extend(current.take()),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(OoxmlError::Xml {
                    part: "xl/sharedStrings.xml".to_string(),
                    message: e.to_string(),
                })
            }
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

fn sheet_cells(xml: &[u8], part: &str, shared: &[String]) -> Result<String, OoxmlError> {
    let mut cells: Vec<String> = Vec::new();
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut in_v = false;
    let mut shared_cell = false;
    while cells.len() < XLSX_MAX_CELLS_PER_SHEET {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"c" => {
                    shared_cell = e.attributes().flatten().any(|a| {
                        a.key.as_ref() == b"t" && a.value.as_ref() == b"s"
                    });
                }
                b"v" => in_v = true,
                _ => {}
            },
            Ok(Event::Text(te)) if in_v => {
                let v = te.unescape().unwrap_or_default();
                let v = v.trim();
                if shared_cell {
                    if let Some(s) = v.parse::<usize>().ok().and_then(|i| shared.get(i)) {
                        cells.push(s.clone());
                    }
                } else if !v.is_empty() {
                    cells.push(v.to_string());
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"v" => in_v = false,
                b"c" => shared_cell = false,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(OoxmlError::Xml {
                    part: part.to_string(),
                    message: e.to_string(),
                })
            }
            _ => {}
        }
        buf.clear();
    }
    Ok(cells.join(" "))
}
