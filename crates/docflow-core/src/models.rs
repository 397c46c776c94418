//! Core data records.
//!
//! Every record that moves through the pipeline (documents, analysis
//! records, generated documents) embeds a [`JobState`] so the generic
//! [`JobTracker`](crate::job::JobTracker) can drive it. Templates and
//! conversations are plain inputs.
//!
//! Timestamps are Unix epoch milliseconds (see [`now_millis`]).

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::job::JobState;

/// Current time in Unix epoch milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Fresh record identifier.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Declared type of an uploaded file, derived once from its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    Pdf,
    Docx,
    Txt,
    Image,
    Other,
}

impl DocumentType {
    /// Map a file extension (without the dot, any case) to a type.
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => DocumentType::Pdf,
            "doc" | "docx" => DocumentType::Docx,
            "txt" => DocumentType::Txt,
            "jpg" | "jpeg" | "png" | "tiff" | "tif" | "bmp" | "gif" | "webp" => DocumentType::Image,
            _ => DocumentType::Other,
        }
    }

    /// Map a file name to a type using its last extension.
    pub fn from_file_name(name: &str) -> Self {
        Self::from_extension(file_extension(name).unwrap_or_default().as_str())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Pdf => "pdf",
            DocumentType::Docx => "docx",
            DocumentType::Txt => "txt",
            DocumentType::Image => "image",
            DocumentType::Other => "other",
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pdf" => Ok(DocumentType::Pdf),
            "docx" => Ok(DocumentType::Docx),
            "txt" => Ok(DocumentType::Txt),
            "image" => Ok(DocumentType::Image),
            "other" => Ok(DocumentType::Other),
            other => anyhow::bail!("unknown document type: {}", other),
        }
    }
}

/// Lowercased extension of a file name, if any.
pub fn file_extension(name: &str) -> Option<String> {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let (stem, ext) = base.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Provenance of a document's extracted text.
///
/// `extraction_method` names the strategy that produced the final text
/// (or `placeholder` when every strategy was exhausted).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionMetadata {
    #[serde(default)]
    pub extraction_method: String,
    #[serde(default)]
    pub ocr_processed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pages: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
    #[serde(default)]
    pub binary_file: bool,
    #[serde(default)]
    pub extraction_unavailable: bool,
    /// Document properties reported by a structured parser (title, author, ...).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,
    /// Strategy names attempted, in order.
    #[serde(default)]
    pub attempts: Vec<String>,
}

/// An uploaded file and its extraction job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub title: String,
    /// Storage-relative path of the uploaded bytes (UUID-named).
    pub file_reference: String,
    /// Name the file was uploaded under; informational only.
    pub original_filename: String,
    pub declared_type: DocumentType,
    pub extracted_text: String,
    pub metadata: ExtractionMetadata,
    #[serde(flatten)]
    pub state: JobState,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Document {
    pub fn new(title: &str, original_filename: &str, file_reference: &str) -> Self {
        let now = now_millis();
        Self {
            id: new_id(),
            title: title.to_string(),
            file_reference: file_reference.to_string(),
            original_filename: original_filename.to_string(),
            declared_type: DocumentType::from_file_name(original_filename),
            extracted_text: String::new(),
            metadata: ExtractionMetadata::default(),
            state: JobState::pending(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_text(&self) -> bool {
        !self.extracted_text.trim().is_empty()
    }
}

/// A ranked keyword with its occurrence weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keyword {
    pub term: String,
    pub weight: f64,
}

/// Closed set of entity kinds produced by model and rule-based recognizers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityKind {
    Person,
    Organization,
    Location,
    Miscellaneous,
    Email,
    Phone,
    Url,
    Date,
}

impl EntityKind {
    /// Map a token-classification label (`B-PER`, `I-ORG`, `LOC`, ...) to a kind.
    pub fn from_label(label: &str) -> Self {
        let tag = label
            .strip_prefix("B-")
            .or_else(|| label.strip_prefix("I-"))
            .unwrap_or(label)
            .to_ascii_uppercase();
        match tag.as_str() {
            "PER" | "PERSON" => EntityKind::Person,
            "ORG" | "ORGANIZATION" => EntityKind::Organization,
            "LOC" | "LOCATION" | "GPE" => EntityKind::Location,
            "EMAIL" => EntityKind::Email,
            "PHONE" => EntityKind::Phone,
            "URL" => EntityKind::Url,
            "DATE" => EntityKind::Date,
            _ => EntityKind::Miscellaneous,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub text: String,
    pub kind: EntityKind,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topic {
    pub topic: String,
    pub score: f64,
}

/// Result payload of the analysis engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisOutput {
    pub summary: String,
    pub keywords: Vec<Keyword>,
    pub sentiment: f64,
    pub entities: Vec<Entity>,
    pub topics: Vec<Topic>,
}

/// Analysis of one document. At most one record exists per document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub id: String,
    pub document_id: String,
    pub summary: String,
    pub keywords: Vec<Keyword>,
    pub sentiment: f64,
    pub entities: Vec<Entity>,
    pub topics: Vec<Topic>,
    #[serde(flatten)]
    pub state: JobState,
    pub created_at: i64,
    pub updated_at: i64,
}

impl AnalysisRecord {
    pub fn new(document_id: &str) -> Self {
        let now = now_millis();
        Self {
            id: new_id(),
            document_id: document_id.to_string(),
            summary: String::new(),
            keywords: Vec::new(),
            sentiment: 0.0,
            entities: Vec::new(),
            topics: Vec::new(),
            state: JobState::pending(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Output format of a generated document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Docx,
    Pdf,
    Txt,
    Markdown,
    Html,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Docx => "docx",
            OutputFormat::Pdf => "pdf",
            OutputFormat::Txt => "txt",
            OutputFormat::Markdown => "markdown",
            OutputFormat::Html => "html",
        }
    }

    /// File extension used for rendered artifacts.
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Docx => "docx",
            OutputFormat::Pdf => "pdf",
            OutputFormat::Txt => "txt",
            OutputFormat::Markdown => "md",
            OutputFormat::Html => "html",
        }
    }

    /// MIME type served on download.
    pub fn content_type(&self) -> &'static str {
        match self {
            OutputFormat::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            OutputFormat::Pdf => "application/pdf",
            OutputFormat::Txt | OutputFormat::Markdown => "text/plain",
            OutputFormat::Html => "text/html",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "docx" => Ok(OutputFormat::Docx),
            "pdf" => Ok(OutputFormat::Pdf),
            "txt" | "text" => Ok(OutputFormat::Txt),
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            "html" => Ok(OutputFormat::Html),
            other => anyhow::bail!(
                "unknown output format: '{}'. Must be docx, pdf, txt, markdown, or html.",
                other
            ),
        }
    }
}

/// Which generator produced a document's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeneratorKind {
    Model,
    Template,
}

/// How a generated document was produced and rendered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationMetadata {
    pub generator: GeneratorKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Format actually rendered; differs from the requested one on substitution.
    pub rendered_format: OutputFormat,
    #[serde(default)]
    pub substituted: bool,
    /// Reference ids that no longer resolved and were skipped.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped_references: Vec<String>,
    /// Set when the template id did not resolve.
    #[serde(default)]
    pub template_missing: bool,
}

/// A document produced by the generation engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedDocument {
    pub id: String,
    pub title: String,
    pub prompt: String,
    pub output_format: OutputFormat,
    pub template_id: Option<String>,
    pub reference_document_ids: Vec<String>,
    pub content: String,
    pub file_reference: Option<String>,
    pub metadata: Option<GenerationMetadata>,
    #[serde(flatten)]
    pub state: JobState,
    pub created_at: i64,
    pub updated_at: i64,
}

impl GeneratedDocument {
    pub fn new(
        title: &str,
        prompt: &str,
        output_format: OutputFormat,
        template_id: Option<String>,
        reference_document_ids: Vec<String>,
    ) -> Self {
        let now = now_millis();
        Self {
            id: new_id(),
            title: title.to_string(),
            prompt: prompt.to_string(),
            output_format,
            template_id,
            reference_document_ids,
            content: String::new(),
            file_reference: None,
            metadata: None,
            state: JobState::pending(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Format of the stored artifact (the requested one unless substituted).
    pub fn rendered_format(&self) -> OutputFormat {
        self.metadata
            .as_ref()
            .map(|m| m.rendered_format)
            .unwrap_or(self.output_format)
    }
}

/// A reusable generation template with `{{name}}` placeholders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub id: String,
    pub name: String,
    pub body: String,
    pub default_values: BTreeMap<String, String>,
    pub created_at: i64,
}

impl Template {
    pub fn new(name: &str, body: &str, default_values: BTreeMap<String, String>) -> Self {
        Self {
            id: new_id(),
            name: name.to_string(),
            body: body.to_string(),
            default_values,
            created_at: now_millis(),
        }
    }

    /// Placeholder names in order of first appearance.
    pub fn placeholders(&self) -> Vec<String> {
        let re = placeholder_regex();
        let mut names: Vec<String> = Vec::new();
        for cap in re.captures_iter(&self.body) {
            let name = cap[1].to_string();
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }

    /// Substitute default values into the body; unknown placeholders stay as-is.
    pub fn fill(&self) -> String {
        placeholder_regex()
            .replace_all(&self.body, |cap: &regex::Captures<'_>| {
                self.default_values
                    .get(&cap[1])
                    .cloned()
                    .unwrap_or_else(|| cap[0].to_string())
            })
            .into_owned()
    }
}

fn placeholder_regex() -> &'static regex::Regex {
    static RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| {
        regex::Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").expect("valid placeholder regex")
    })
}

/// Chat conversation, optionally attached to one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub title: String,
    pub document_id: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Conversation {
    pub fn new(title: &str, document_id: Option<String>) -> Self {
        let now = now_millis();
        Self {
            id: new_id(),
            title: title.to_string(),
            document_id,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            "system" => Ok(Role::System),
            other => anyhow::bail!("unknown message role: {}", other),
        }
    }
}

/// One entry of a conversation's append-only log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub role: Role,
    pub content: String,
    pub created_at: i64,
}

impl Message {
    pub fn new(conversation_id: &str, role: Role, content: &str) -> Self {
        Self {
            id: new_id(),
            conversation_id: conversation_id.to_string(),
            role,
            content: content.to_string(),
            created_at: now_millis(),
        }
    }
}

/// A chunk of a document's extracted text.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Deterministic id: `<document_id>:<chunk_index>`.
    pub id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub text: String,
    /// SHA-256 of `text`, hex encoded.
    pub hash: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declared_type_from_extension() {
        assert_eq!(DocumentType::from_file_name("report.PDF"), DocumentType::Pdf);
        assert_eq!(DocumentType::from_file_name("letter.doc"), DocumentType::Docx);
        assert_eq!(DocumentType::from_file_name("notes.txt"), DocumentType::Txt);
        assert_eq!(DocumentType::from_file_name("scan.jpeg"), DocumentType::Image);
        assert_eq!(DocumentType::from_file_name("deck.pptx"), DocumentType::Other);
        assert_eq!(DocumentType::from_file_name("README"), DocumentType::Other);
        assert_eq!(DocumentType::from_file_name(".bashrc"), DocumentType::Other);
    }

    #[test]
    fn test_output_format_content_types() {
        assert_eq!(
            OutputFormat::Docx.content_type(),
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
        );
        assert_eq!(OutputFormat::Pdf.content_type(), "application/pdf");
        assert_eq!(OutputFormat::Markdown.content_type(), "text/plain");
        assert_eq!(OutputFormat::Txt.content_type(), "text/plain");
        assert_eq!(OutputFormat::Html.content_type(), "text/html");
        assert_eq!("md".parse::<OutputFormat>().unwrap(), OutputFormat::Markdown);
        assert!("rtf".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_entity_kind_from_label() {
        assert_eq!(EntityKind::from_label("B-PER"), EntityKind::Person);
        assert_eq!(EntityKind::from_label("I-ORG"), EntityKind::Organization);
        assert_eq!(EntityKind::from_label("LOC"), EntityKind::Location);
        assert_eq!(EntityKind::from_label("B-MISC"), EntityKind::Miscellaneous);
    }

    #[test]
    fn test_template_placeholders_and_fill() {
        let mut defaults = BTreeMap::new();
        defaults.insert("client".to_string(), "Acme".to_string());
        let t = Template::new(
            "letter",
            "Dear {{client}},\nRe: {{ subject }}\nThanks, {{client}}",
            defaults,
        );
        assert_eq!(t.placeholders(), vec!["client", "subject"]);
        assert_eq!(t.fill(), "Dear Acme,\nRe: {{ subject }}\nThanks, Acme");
    }

    #[test]
    fn test_job_state_flattened_in_json() {
        let doc = Document::new("Doc1", "a.txt", "uploads/documents/x.txt");
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["status"], "pending");
        assert_eq!(json["declared_type"], "txt");
    }
}
