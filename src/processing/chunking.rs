//! Overlapping character-window splitter.
//!
//! Windows are measured in characters, not bytes, so multi-byte text never splits inside a code
//! point. Each window is pulled back to the nearest sentence terminator (`.` or newline) within
//! [`SENTENCE_LOOKBACK`] characters of its proposed end; when none exists the cut lands
//! mid-sentence. Consecutive chunks share exactly `overlap` characters.

use super::types::{Chunk, ChunkingError};

/// How far back from a proposed cut the splitter searches for a sentence terminator.
pub const SENTENCE_LOOKBACK: usize = 500;

/// Split `text` into ordered chunks of at most `chunk_size` characters sharing `overlap`
/// characters with their predecessor.
///
/// Returns an empty vector for empty input and a single chunk when the text is shorter than
/// `chunk_size`.
pub fn split_text(
    text: &str,
    chunk_size: usize,
    overlap: usize,
) -> Result<Vec<Chunk>, ChunkingError> {
    if chunk_size <= overlap {
        return Err(ChunkingError::InvalidWindow {
            chunk_size,
            overlap,
        });
    }

    let chars: Vec<char> = text.chars().collect();
    let byte_offsets: Vec<usize> = text
        .char_indices()
        .map(|(offset, _)| offset)
        .chain(std::iter::once(text.len()))
        .collect();
    let len = chars.len();

    let mut chunks = Vec::new();
    let mut start = 0;
    while start < len {
        let mut end = (start + chunk_size).min(len);
        if end < len {
            // Terminators before `start + overlap` would stop the next window from advancing.
            end = sentence_boundary(&chars, start + overlap, end).unwrap_or(end);
        }

        chunks.push(Chunk {
            index: chunks.len(),
            start,
            end,
            text: text[byte_offsets[start]..byte_offsets[end]].to_string(),
        });

        if end == len {
            break;
        }
        start = end - overlap;
    }

    Ok(chunks)
}

/// Offset just past the last terminator in `[max(end - lookback, floor), end)`.
fn sentence_boundary(chars: &[char], floor: usize, end: usize) -> Option<usize> {
    let window_start = end.saturating_sub(SENTENCE_LOOKBACK).max(floor);
    (window_start..end)
        .rev()
        .find(|&index| matches!(chars[index], '.' | '\n'))
        .map(|index| index + 1)
}
