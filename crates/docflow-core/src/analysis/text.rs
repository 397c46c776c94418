//! Rule-based text statistics: tokenization, sentence splitting,
//! extractive summaries, keywords, lexicon sentiment, and topics.

use std::collections::HashMap;

use crate::models::{Keyword, Topic};

/// English stopwords excluded from keyword and summary scoring.
pub const STOPWORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "am", "an", "and", "any", "are",
    "aren", "as", "at", "be", "because", "been", "before", "being", "below", "between", "both",
    "but", "by", "can", "couldn", "d", "did", "didn", "do", "does", "doesn", "doing", "don",
    "down", "during", "each", "few", "for", "from", "further", "had", "hadn", "has", "hasn",
    "have", "haven", "having", "he", "her", "here", "hers", "herself", "him", "himself", "his",
    "how", "i", "if", "in", "into", "is", "isn", "it", "its", "itself", "just", "ll", "m", "ma",
    "me", "mightn", "more", "most", "mustn", "my", "myself", "needn", "no", "nor", "not", "now",
    "o", "of", "off", "on", "once", "only", "or", "other", "our", "ours", "ourselves", "out",
    "over", "own", "re", "s", "same", "shan", "she", "should", "shouldn", "so", "some", "such",
    "t", "than", "that", "the", "their", "theirs", "them", "themselves", "then", "there", "these",
    "they", "this", "those", "through", "to", "too", "under", "until", "up", "ve", "very", "was",
    "wasn", "we", "were", "weren", "what", "when", "where", "which", "while", "who", "whom",
    "why", "will", "with", "won", "wouldn", "y", "you", "your", "yours", "yourself",
    "yourselves",
];

/// Words counted as positive by the lexicon fallback.
pub const POSITIVE_WORDS: &[&str] = &[
    "good", "great", "excellent", "best", "happy", "positive", "nice", "love", "perfect",
    "recommend",
];

/// Words counted as negative by the lexicon fallback.
pub const NEGATIVE_WORDS: &[&str] = &[
    "bad", "worst", "terrible", "awful", "poor", "negative", "hate", "horrible", "disappointing",
    "avoid",
];

pub fn is_stopword(word: &str) -> bool {
    STOPWORDS.contains(&word)
}

/// Lowercased alphanumeric tokens.
pub fn tokenize_words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Split into sentences after `.`, `!` or `?` followed by whitespace.
/// Terminal punctuation stays with its sentence; blank sentences are dropped.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?') {
            if let Some(&(j, next)) = chars.peek() {
                if next.is_whitespace() {
                    let s = text[start..j].trim();
                    if !s.is_empty() {
                        out.push(s);
                    }
                    start = j;
                }
            } else {
                let s = text[start..i + c.len_utf8()].trim();
                if !s.is_empty() {
                    out.push(s);
                }
                start = text.len();
            }
        }
    }
    if start < text.len() {
        let s = text[start..].trim();
        if !s.is_empty() {
            out.push(s);
        }
    }
    out
}

fn content_words(text: &str) -> impl Iterator<Item = String> + '_ {
    tokenize_words(text)
        .into_iter()
        .filter(|w| !is_stopword(w))
}

/// Frequency-weighted extractive summary.
///
/// Word frequencies over non-stopword tokens are normalized by the
/// maximum frequency; each sentence scores the sum of its words'
/// frequencies divided by `max(1, token count)`. The `max_sentences`
/// best sentences (earlier sentence wins ties) are restored to document
/// order and joined by a space.
pub fn extractive_summary(text: &str, max_sentences: usize) -> String {
    let sentences = split_sentences(text);
    if sentences.is_empty() {
        return String::new();
    }

    let mut freq: HashMap<String, f64> = HashMap::new();
    for w in content_words(text) {
        *freq.entry(w).or_insert(0.0) += 1.0;
    }
    let max_freq = freq.values().cloned().fold(0.0, f64::max);
    if max_freq > 0.0 {
        for v in freq.values_mut() {
            *v /= max_freq;
        }
    }

    let mut scored: Vec<(usize, f64)> = sentences
        .iter()
        .enumerate()
        .map(|(i, s)| {
            let words = tokenize_words(s);
            let total: f64 = words.iter().filter_map(|w| freq.get(w)).sum();
            (i, total / words.len().max(1) as f64)
        })
        .collect();
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored.truncate(max_sentences.max(1));
    scored.sort_by_key(|(i, _)| *i);

    scored
        .iter()
        .map(|(i, _)| sentences[*i])
        .collect::<Vec<_>>()
        .join(" ")
}

/// Top `k` non-stopword alphanumeric tokens longer than 2 characters,
/// by descending count (first occurrence breaks ties).
pub fn keywords(text: &str, k: usize) -> Vec<Keyword> {
    let mut counts: Vec<(String, usize)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for w in content_words(text).filter(|w| w.chars().count() > 2) {
        match index.get(&w) {
            Some(&i) => counts[i].1 += 1,
            None => {
                index.insert(w.clone(), counts.len());
                counts.push((w, 1));
            }
        }
    }
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts
        .into_iter()
        .take(k)
        .map(|(term, count)| Keyword {
            term,
            weight: count as f64,
        })
        .collect()
}

/// `(positive_hits - negative_hits) / max(1, positive_hits + negative_hits)`;
/// exactly 0 when no lexicon word occurs.
pub fn lexicon_sentiment(text: &str) -> f64 {
    let mut pos = 0usize;
    let mut neg = 0usize;
    for w in tokenize_words(text) {
        if POSITIVE_WORDS.contains(&w.as_str()) {
            pos += 1;
        } else if NEGATIVE_WORDS.contains(&w.as_str()) {
            neg += 1;
        }
    }
    (pos as f64 - neg as f64) / (pos + neg).max(1) as f64
}

/// Top-3 keywords as topics, scored `1 - index / len(keywords)`.
pub fn topics_from_keywords(keywords: &[Keyword]) -> Vec<Topic> {
    let n = keywords.len();
    keywords
        .iter()
        .take(3)
        .enumerate()
        .map(|(i, k)| Topic {
            topic: k.term.clone(),
            score: 1.0 - i as f64 / n as f64,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_sentences() {
        let s = split_sentences("First one. Second one!  Third? trailing");
        assert_eq!(s, vec!["First one.", "Second one!", "Third?", "trailing"]);
        assert_eq!(split_sentences("v1.2 is out."), vec!["v1.2 is out."]);
        assert!(split_sentences("   ").is_empty());
    }

    #[test]
    fn test_keywords_counts_and_filters() {
        let kws = keywords("The cat and the dog. The cat sat on a mat by the cat.", 10);
        assert_eq!(kws[0].term, "cat");
        assert_eq!(kws[0].weight, 3.0);
        assert!(kws.iter().all(|k| k.term.len() > 2));
        assert!(kws.iter().all(|k| !is_stopword(&k.term)));
        assert_eq!(
            kws.iter().map(|k| k.term.as_str()).collect::<Vec<_>>(),
            vec!["cat", "dog", "sat", "mat"]
        );
    }

    #[test]
    fn test_keywords_top_k() {
        let text = "alpha beta gamma delta epsilon alpha beta alpha";
        let kws = keywords(text, 2);
        assert_eq!(kws.len(), 2);
        assert_eq!(kws[0].term, "alpha");
        assert_eq!(kws[1].term, "beta");
    }

    #[test]
    fn test_lexicon_sentiment() {
        assert_eq!(lexicon_sentiment("The meeting is on Tuesday."), 0.0);
        assert_eq!(lexicon_sentiment("great product, I love it"), 1.0);
        assert_eq!(lexicon_sentiment("terrible and awful"), -1.0);
        assert_eq!(lexicon_sentiment("good but bad"), 0.0);
        assert!((lexicon_sentiment("good great bad") - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_topics_scores() {
        let kws: Vec<Keyword> = ["a", "b", "c", "d"]
            .iter()
            .map(|t| Keyword {
                term: t.to_string(),
                weight: 1.0,
            })
            .collect();
        let topics = topics_from_keywords(&kws);
        let scores: Vec<f64> = topics.iter().map(|t| t.score).collect();
        assert_eq!(scores, vec![1.0, 0.75, 0.5]);
        assert!(topics_from_keywords(&[]).is_empty());
    }

    #[test]
    fn test_extractive_summary_keeps_document_order() {
        let text = "Rust is fast. Bananas are yellow. Rust is safe and Rust is fast. \
                    Clouds drift. Rust compiles.";
        let summary = extractive_summary(text, 2);
        let first = summary.find("Rust is fast.").unwrap();
        let second = summary.find("Rust compiles.").unwrap();
        assert!(first < second);
        assert!(!summary.contains("Bananas"));
    }

    #[test]
    fn test_extractive_summary_short_text_is_whole_text() {
        assert_eq!(extractive_summary("Only one sentence.", 5), "Only one sentence.");
    }
}
