//! Separator-based text splitter with overlapping chunks.
//!
//! Splits document text into bounded-size [`Chunk`]s that share context
//! with their neighbours. Lengths are measured in characters, not bytes.
//!
//! # Algorithm
//!
//! 1. Split the text on `separator` and drop empty pieces. An empty
//!    separator splits into single characters.
//! 2. Greedily pack consecutive pieces (re-joined with `separator`) into a
//!    window until adding the next piece would exceed `chunk_size`.
//! 3. Emit the window (trimmed) as a chunk, then drop pieces from its
//!    front until at most `overlap` characters remain and the next piece
//!    fits. The surviving pieces open the next chunk.
//! 4. A single piece longer than `chunk_size` is emitted on its own; it is
//!    never cut mid-piece.
//!
//! # Example
//!
//! ```rust
//! use docchat_core::chunk::split;
//!
//! let chunks = split("alpha\nbeta\ngamma", "\n", 10, 5);
//! assert_eq!(chunks, vec!["alpha\nbeta", "beta\ngamma"]);
//! ```

use std::collections::VecDeque;

use tracing::warn;

use crate::models::Chunk;

/// Split `text` into overlapping chunks of at most `chunk_size` characters.
///
/// Deterministic: identical input always yields identical output. A chunk
/// only exceeds `chunk_size` when a single separator-delimited piece does.
pub fn split(text: &str, separator: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let pieces: Vec<&str> = if separator.is_empty() {
        text.char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect()
    } else {
        text.split(separator).filter(|p| !p.is_empty()).collect()
    };
    merge_pieces(&pieces, separator, chunk_size, overlap)
}

/// Split a document and tag each piece with its owner and position.
pub fn chunk_document(
    document: &str,
    text: &str,
    separator: &str,
    chunk_size: usize,
    overlap: usize,
) -> Vec<Chunk> {
    split(text, separator, chunk_size, overlap)
        .into_iter()
        .enumerate()
        .map(|(index, text)| Chunk {
            document: document.to_string(),
            index,
            text,
        })
        .collect()
}

fn merge_pieces(
    pieces: &[&str],
    separator: &str,
    chunk_size: usize,
    overlap: usize,
) -> Vec<String> {
    let sep_len = char_len(separator);
    let joiner = |window: &VecDeque<&str>| if window.is_empty() { 0 } else { sep_len };

    let mut chunks = Vec::new();
    let mut window: VecDeque<&str> = VecDeque::new();
    let mut total = 0usize;

    for &piece in pieces {
        let len = char_len(piece);

        if total + len + joiner(&window) > chunk_size {
            if total > chunk_size {
                warn!(
                    size = total,
                    chunk_size, "created a chunk longer than the configured chunk size"
                );
            }
            if !window.is_empty() {
                if let Some(chunk) = join(&window, separator) {
                    chunks.push(chunk);
                }
                while total > overlap || (total > 0 && total + len + joiner(&window) > chunk_size)
                {
                    let Some(front) = window.pop_front() else {
                        break;
                    };
                    total -= char_len(front) + joiner(&window);
                }
            }
        }

        total += len + joiner(&window);
        window.push_back(piece);
    }

    if let Some(chunk) = join(&window, separator) {
        chunks.push(chunk);
    }

    chunks
}

fn join(window: &VecDeque<&str>, separator: &str) -> Option<String> {
    let joined = window.iter().copied().collect::<Vec<_>>().join(separator);
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}
