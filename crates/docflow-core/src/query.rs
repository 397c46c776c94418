//! Rule-based reading of a chat query.
//!
//! | Signal | Result |
//! |--------|--------|
//! | `?` or a question word | [`QueryKind::Question`] |
//! | summarize / summary / overview / brief | [`QueryKind::Summarize`] |
//! | a creation verb and a document noun | [`QueryIntent::DocumentCreation`] plus a [`GenerationHint`] |
//!
//! Words are matched whole, so `md` inside `command` does not count as a
//! markdown request. Clarifying questions come from the intent and the
//! document types named in the query.

use serde::Serialize;

use crate::analysis::text::tokenize_words;
use crate::models::OutputFormat;

const QUESTION_WORDS: &[&str] = &["what", "how", "why", "who", "when", "where"];
const SUMMARY_WORDS: &[&str] = &["summarize", "summarise", "summary", "overview", "brief"];
const CREATION_VERBS: &[&str] = &["create", "generate", "make", "produce", "write", "draft"];
const DOCUMENT_NOUNS: &[&str] = &[
    "document", "file", "pdf", "docx", "text", "report", "letter", "draft", "memo", "proposal",
    "contract", "agreement",
];

/// Document types picked out of a query.
pub const DOCUMENT_TYPES: &[&str] = &["contract", "agreement", "letter", "memo", "report", "proposal"];

/// How many words after `for` make up a suggested title.
const TITLE_WORDS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryKind {
    Question,
    Summarize,
    General,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryIntent {
    InformationRequest,
    DocumentCreation,
    Unclear,
}

/// What a creation request asked for.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationHint {
    pub format: OutputFormat,
    /// `Document for <subject>` when the query says what it is for.
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryAnalysis {
    pub kind: QueryKind,
    pub intent: QueryIntent,
    pub generation: Option<GenerationHint>,
    pub document_types: Vec<String>,
    pub clarifying_questions: Vec<String>,
    /// Model that wrote `clarifying_questions`; `None` for the rule-based set.
    pub questions_model: Option<String>,
}

pub fn analyze_query(query: &str) -> QueryAnalysis {
    let words = tokenize_words(query);
    let has = |set: &[&str]| words.iter().any(|w| set.contains(&w.as_str()));

    let kind = if query.contains('?') || has(QUESTION_WORDS) {
        QueryKind::Question
    } else if has(SUMMARY_WORDS) {
        QueryKind::Summarize
    } else {
        QueryKind::General
    };

    let generation = (has(CREATION_VERBS) && has(DOCUMENT_NOUNS)).then(|| GenerationHint {
        format: requested_format(&words),
        title: subject_title(query),
    });
    let intent = match (&generation, kind) {
        (Some(_), _) => QueryIntent::DocumentCreation,
        (None, QueryKind::Question | QueryKind::Summarize) => QueryIntent::InformationRequest,
        (None, QueryKind::General) => QueryIntent::Unclear,
    };

    let document_types: Vec<String> = DOCUMENT_TYPES
        .iter()
        .filter(|t| words.iter().any(|w| w == *t))
        .map(|t| t.to_string())
        .collect();
    let clarifying_questions = clarifying_questions(intent, &document_types);

    QueryAnalysis {
        kind,
        intent,
        generation,
        document_types,
        clarifying_questions,
        questions_model: None,
    }
}

/// Output format named in the query, docx when none is.
fn requested_format(words: &[String]) -> OutputFormat {
    let named = |names: &[&str]| words.iter().any(|w| names.contains(&w.as_str()));
    if named(&["pdf"]) {
        OutputFormat::Pdf
    } else if named(&["txt", "text", "plain"]) {
        OutputFormat::Txt
    } else if named(&["markdown", "md"]) {
        OutputFormat::Markdown
    } else if named(&["html"]) {
        OutputFormat::Html
    } else {
        OutputFormat::Docx
    }
}

/// `Document for <up to three words after "for">`.
fn subject_title(query: &str) -> Option<String> {
    let words: Vec<&str> = query.split_whitespace().collect();
    let at = words.iter().position(|w| w.eq_ignore_ascii_case("for"))?;
    let subject: Vec<&str> = words[at + 1..]
        .iter()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|w| !w.is_empty())
        .take(TITLE_WORDS)
        .collect();
    if subject.is_empty() {
        return None;
    }
    let subject = subject.join(" ");
    let mut chars = subject.chars();
    let first = chars.next()?;
    Some(format!("Document for {}{}", first.to_uppercase(), chars.as_str()))
}

pub fn clarifying_questions(intent: QueryIntent, document_types: &[String]) -> Vec<String> {
    let questions: &[&str] = match intent {
        QueryIntent::DocumentCreation if document_types.is_empty() => &[
            "What type of document would you like to create?",
            "Could you provide more details about the content you need in this document?",
            "Is there a specific format or template you'd like to use?",
        ],
        QueryIntent::DocumentCreation => &[
            "Could you provide more details about the content you need in this document?",
            "Is there a specific format or template you'd like to use?",
        ],
        QueryIntent::InformationRequest => &[
            "What specific information are you looking for?",
            "Would you like me to search in any particular documents?",
        ],
        QueryIntent::Unclear => &[
            "Could you please clarify what you're looking for?",
            "Are you looking to create a document or extract information from existing documents?",
        ],
    };
    questions.iter().map(|q| q.to_string()).collect()
}

/// Questions listed one per line as `1. ...`, `2) ...` or `- ...` items.
pub fn listed_questions(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter_map(|line| {
            let rest = match line.strip_prefix(['-', '*']) {
                Some(rest) => rest,
                None => {
                    let digits = line.chars().take_while(char::is_ascii_digit).count();
                    if digits == 0 {
                        return None;
                    }
                    let rest = &line[digits..];
                    rest.strip_prefix(['.', ')']).unwrap_or(rest)
                }
            };
            let question = rest.trim();
            (!question.is_empty()).then(|| question.to_string())
        })
        .collect()
}
