//! Overlapping, boundary-preserving text chunker.
//!
//! Splits extracted document text into [`Chunk`]s of at most
//! `chunk_size` characters, carrying up to `chunk_overlap` characters of
//! trailing context into the next chunk so retrieval does not lose
//! sentences that straddle a boundary.
//!
//! # Algorithm
//!
//! 1. Pick the first separator from `["\n\n", "\n", " ", ""]` that occurs
//!    in the text (the empty separator splits into characters).
//! 2. Split on it. Pieces shorter than `chunk_size` are collected; a piece
//!    that is too long is recursively split with the remaining separators.
//! 3. Collected pieces are merged greedily, joined by the separator, until
//!    adding the next piece would exceed `chunk_size`. The merged chunk is
//!    emitted and pieces are dropped from the front until at most
//!    `chunk_overlap` characters remain as the start of the next chunk.
//!
//! Lengths are measured in characters, not bytes, so multi-byte text is
//! never split inside a code point.
//!
//! Each chunk gets a deterministic id (`<document_id>:<index>`) and a
//! SHA-256 hash of its text.
//!
//! # Example
//!
//! ```rust
//! use docflow_core::chunk::chunk_text;
//!
//! let chunks = chunk_text("doc-123", "Hello world.\n\nSecond paragraph.", 1000, 200);
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].id, "doc-123:0");
//! ```

use std::collections::VecDeque;

use sha2::{Digest, Sha256};

use crate::models::Chunk;

/// Default target chunk size in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;
/// Default overlap between consecutive chunks in characters.
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

const SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

/// Split text into overlapping chunks.
///
/// Returns an empty vector for empty or whitespace-only text. Chunk
/// indices are contiguous from 0. `chunk_overlap` is clamped below
/// `chunk_size`.
pub fn chunk_text(
    document_id: &str,
    text: &str,
    chunk_size: usize,
    chunk_overlap: usize,
) -> Vec<Chunk> {
    split_text(text, chunk_size, chunk_overlap)
        .into_iter()
        .enumerate()
        .map(|(i, piece)| make_chunk(document_id, i as i64, &piece))
        .collect()
}

/// Split text into overlapping string pieces (see module docs).
pub fn split_text(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    if text.trim().is_empty() {
        return Vec::new();
    }
    let size = chunk_size.max(1);
    let overlap = chunk_overlap.min(size - 1);
    split_recursive(text, &SEPARATORS, size, overlap)
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn split_recursive(text: &str, separators: &[&str], size: usize, overlap: usize) -> Vec<String> {
    let (pos, separator) = separators
        .iter()
        .enumerate()
        .find(|(_, s)| s.is_empty() || text.contains(**s))
        .map(|(i, s)| (i, *s))
        .unwrap_or((separators.len().saturating_sub(1), ""));
    let remaining = &separators[(pos + 1).min(separators.len())..];

    let pieces: Vec<String> = if separator.is_empty() {
        text.chars().map(|c| c.to_string()).collect()
    } else {
        text.split(separator)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect()
    };

    let mut out = Vec::new();
    let mut pending: Vec<String> = Vec::new();
    for piece in pieces {
        if char_len(&piece) < size {
            pending.push(piece);
            continue;
        }
        if !pending.is_empty() {
            out.extend(merge_pieces(&pending, separator, size, overlap));
            pending.clear();
        }
        if remaining.is_empty() {
            let trimmed = piece.trim();
            if !trimmed.is_empty() {
                out.push(trimmed.to_string());
            }
        } else {
            out.extend(split_recursive(&piece, remaining, size, overlap));
        }
    }
    if !pending.is_empty() {
        out.extend(merge_pieces(&pending, separator, size, overlap));
    }
    out
}

fn merge_pieces(pieces: &[String], separator: &str, size: usize, overlap: usize) -> Vec<String> {
    let sep_len = char_len(separator);
    let mut docs = Vec::new();
    let mut current: VecDeque<&str> = VecDeque::new();
    let mut total = 0usize;

    for piece in pieces {
        let len = char_len(piece);
        let joiner = if current.is_empty() { 0 } else { sep_len };
        if total + len + joiner > size && !current.is_empty() {
            push_joined(&mut docs, &current, separator);
            // Shrink the window to the overlap budget, or further if the
            // next piece still would not fit.
            while total > overlap
                || (total > 0 && total + len + if current.is_empty() { 0 } else { sep_len } > size)
            {
                let Some(front) = current.pop_front() else {
                    break;
                };
                total -= char_len(front) + if current.is_empty() { 0 } else { sep_len };
            }
        }
        let joiner = if current.is_empty() { 0 } else { sep_len };
        current.push_back(piece);
        total += len + joiner;
    }
    push_joined(&mut docs, &current, separator);
    docs
}

fn push_joined(docs: &mut Vec<String>, current: &VecDeque<&str>, separator: &str) {
    let joined = current.iter().copied().collect::<Vec<_>>().join(separator);
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        docs.push(trimmed.to_string());
    }
}

/// Create a single [`Chunk`] with a deterministic id and SHA-256 content hash.
fn make_chunk(document_id: &str, index: i64, text: &str) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        id: format!("{}:{}", document_id, index),
        document_id: document_id.to_string(),
        chunk_index: index,
        text: text.to_string(),
        hash,
    }
}
