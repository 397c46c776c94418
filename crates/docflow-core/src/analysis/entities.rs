//! Named-entity helpers: sub-word merging for model output and regex
//! recognizers used when no model is available.

use std::sync::OnceLock;

use regex::Regex;

use crate::models::{Entity, EntityKind};

/// One token-classification prediction from a model.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenEntity {
    pub word: String,
    pub label: String,
    pub score: f64,
}

/// Merge `##`-prefixed continuation pieces into the preceding entity.
///
/// A continuation with no preceding entity starts a new one with the
/// marker stripped. Confidence of a merged entity is the minimum of its
/// pieces.
pub fn merge_subword_tokens(tokens: &[TokenEntity]) -> Vec<Entity> {
    let mut out: Vec<Entity> = Vec::new();
    for t in tokens {
        if let Some(rest) = t.word.strip_prefix("##") {
            if let Some(last) = out.last_mut() {
                last.text.push_str(rest);
                last.confidence = last.confidence.min(t.score);
                continue;
            }
            push_entity(&mut out, rest, &t.label, t.score);
            continue;
        }
        push_entity(&mut out, &t.word, &t.label, t.score);
    }
    out.retain(|e| !e.text.trim().is_empty());
    out
}

fn push_entity(out: &mut Vec<Entity>, word: &str, label: &str, score: f64) {
    out.push(Entity {
        text: word.trim().to_string(),
        kind: EntityKind::from_label(label),
        confidence: score,
    });
}

struct Recognizer {
    kind: EntityKind,
    confidence: f64,
    pattern: Regex,
}

fn recognizers() -> &'static [Recognizer] {
    static RECOGNIZERS: OnceLock<Vec<Recognizer>> = OnceLock::new();
    RECOGNIZERS.get_or_init(|| {
        let build = |kind, confidence, pattern: &str| Recognizer {
            kind,
            confidence,
            pattern: Regex::new(pattern).expect("valid entity pattern"),
        };
        vec![
            build(
                EntityKind::Email,
                0.9,
                r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b",
            ),
            build(
                EntityKind::Phone,
                0.8,
                r"(?:\+\d{1,2}\s?)?\(?\b\d{3}\)?[\s.-]?\d{3}[\s.-]?\d{4}\b",
            ),
            build(EntityKind::Url, 0.9, r"https?://(?:[-\w.]|%[\da-fA-F]{2})+(?:/[^\s]*)?"),
            build(
                EntityKind::Date,
                0.7,
                r"(?i)\b(?:\d{1,2}[-/]\d{1,2}[-/]\d{2,4}|(?:jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.? \d{1,2},? \d{4})\b",
            ),
        ]
    })
}

/// Regex-based entities: email (0.9), phone (0.8), URL (0.9), date (0.7).
///
/// Results are grouped by recognizer in that order, each in match order;
/// repeated `(text, kind)` pairs are reported once.
pub fn regex_entities(text: &str) -> Vec<Entity> {
    let mut out: Vec<Entity> = Vec::new();
    for r in recognizers() {
        for m in r.pattern.find_iter(text) {
            let value = m.as_str().trim_end_matches(['.', ',', ')', ';']);
            if out.iter().any(|e| e.kind == r.kind && e.text == value) {
                continue;
            }
            out.push(Entity {
                text: value.to_string(),
                kind: r.kind,
                confidence: r.confidence,
            });
        }
    }
    out
}
