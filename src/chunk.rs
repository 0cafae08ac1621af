//! Sliding-window text chunker.
//!
//! Splits a document's text into [`Chunk`]s of at most `chunk_size`
//! characters. Each window starts `chunk_size - overlap` characters after
//! the previous one, so consecutive chunks share exactly `overlap`
//! characters. The final chunk may be shorter.
//!
//! Offsets are counted in Unicode scalar values, never bytes, so a window
//! boundary can never split a multi-byte character.
//!
//! Each chunk receives a deterministic id derived from its document id and
//! index, plus a SHA-256 hash of its text.

use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::models::{Chunk, Document};

/// Split a document into overlapping character windows.
///
/// Returns chunks with contiguous indices starting at 0. Empty text yields
/// no chunks.
///
/// # Errors
///
/// [`Error::Configuration`] unless `chunk_size > 0` and `overlap < chunk_size`.
pub fn chunk_document(document: &Document, chunk_size: usize, overlap: usize) -> Result<Vec<Chunk>> {
    chunk_text(&document.id, &document.source, &document.text, chunk_size, overlap)
}

/// Like [`chunk_document`], operating on raw parts.
pub fn chunk_text(
    document_id: &str,
    source: &str,
    text: &str,
    chunk_size: usize,
    overlap: usize,
) -> Result<Vec<Chunk>> {
    if chunk_size == 0 {
        return Err(Error::config("chunk_size must be > 0"));
    }
    if overlap >= chunk_size {
        return Err(Error::config(format!(
            "overlap ({}) must be < chunk_size ({})",
            overlap, chunk_size
        )));
    }

    // Byte offset of every char boundary, plus the end of the string.
    let boundaries: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let char_len = boundaries.len() - 1;
    if char_len == 0 {
        return Ok(Vec::new());
    }

    let step = chunk_size - overlap;
    let mut chunks = Vec::new();
    let mut start = 0usize;

    loop {
        let end = (start + chunk_size).min(char_len);
        let piece = &text[boundaries[start]..boundaries[end]];
        chunks.push(make_chunk(document_id, source, chunks.len(), start, end, piece));
        if end >= char_len {
            break;
        }
        start += step;
    }

    Ok(chunks)
}

fn make_chunk(
    document_id: &str,
    source: &str,
    index: usize,
    start: usize,
    end: usize,
    text: &str,
) -> Chunk {
    Chunk {
        id: format!("{}:{}", document_id, index),
        document_id: document_id.to_string(),
        source: source.to_string(),
        chunk_index: index,
        start,
        end,
        text: text.to_string(),
        hash: sha256_hex(text.as_bytes()),
    }
}

pub(crate) fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunks(text: &str, size: usize, overlap: usize) -> Vec<Chunk> {
        chunk_text("doc1", "doc1.txt", text, size, overlap).unwrap()
    }

    #[test]
    fn test_fifty_chars_size_twenty_overlap_five() {
        let text: String = ('a'..='z').chain('A'..='X').collect();
        assert_eq!(text.chars().count(), 50);

        let c = chunks(&text, 20, 5);
        assert_eq!(c.len(), 3);
        assert_eq!((c[0].start, c[0].end), (0, 20));
        assert_eq!((c[1].start, c[1].end), (15, 35));
        assert_eq!((c[2].start, c[2].end), (30, 50));
        assert_eq!(c[0].text, &text[0..20]);
        assert_eq!(c[2].text, &text[30..50]);
    }

    #[test]
    fn test_short_text_single_chunk() {
        let c = chunks("Hello, world!", 800, 100);
        assert_eq!(c.len(), 1);
        assert_eq!(c[0].chunk_index, 0);
        assert_eq!(c[0].text, "Hello, world!");
    }

    #[test]
    fn test_empty_text_no_chunks() {
        assert!(chunks("", 20, 5).is_empty());
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(matches!(
            chunk_text("d", "s", "abc", 0, 0),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(
            chunk_text("d", "s", "abc", 10, 10),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(
            chunk_text("d", "s", "abc", 10, 25),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_coverage_overlap_and_length() {
        let text: String = (0..997).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
        for (size, overlap) in [(100, 0), (100, 10), (64, 63), (7, 3), (1000, 50)] {
            let c = chunks(&text, size, overlap);

            assert_eq!(c.first().unwrap().start, 0);
            assert_eq!(c.last().unwrap().end, 997);
            for chunk in &c {
                assert!(chunk.text.chars().count() <= size);
                assert_eq!(chunk.text.chars().count(), chunk.end - chunk.start);
            }
            for pair in c.windows(2) {
                assert_eq!(pair[0].end - pair[1].start, overlap, "size={} overlap={}", size, overlap);
                let tail: String = pair[0].text.chars().skip(size - overlap).collect();
                let head: String = pair[1].text.chars().take(overlap).collect();
                assert_eq!(tail, head);
            }
        }
    }

    #[test]
    fn test_multibyte_characters() {
        let text = "äöü€😀".repeat(10);
        let c = chunks(&text, 8, 2);
        let rebuilt: String = c
            .iter()
            .enumerate()
            .map(|(i, ch)| {
                if i == 0 {
                    ch.text.clone()
                } else {
                    ch.text.chars().skip(2).collect()
                }
            })
            .collect();
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn test_indices_ids_and_hashes() {
        let text = "x".repeat(100);
        let c = chunks(&text, 30, 10);
        for (i, chunk) in c.iter().enumerate() {
            assert_eq!(chunk.chunk_index, i);
            assert_eq!(chunk.id, format!("doc1:{}", i));
            assert_eq!(chunk.source, "doc1.txt");
            assert_eq!(chunk.hash.len(), 64);
        }
        assert_eq!(c[0].hash, c[1].hash, "identical text hashes identically");
    }

    #[test]
    fn test_deterministic() {
        let text = "Alpha beta gamma delta epsilon zeta eta theta";
        let a = chunks(text, 10, 3);
        let b = chunks(text, 10, 3);
        assert_eq!(a, b);
    }
}
