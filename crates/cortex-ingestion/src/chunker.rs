//! The fixed-size-by-line chunker (spec §4.3.3): splits a file's text into
//! chunks of at most `N` lines with `K` lines of overlap between
//! consecutive chunks, each carrying its own content hash.

use sha2::{Digest, Sha256};

/// Default chunk size in lines.
pub const DEFAULT_CHUNK_LINES: usize = 120;
/// Default overlap in lines between consecutive chunks.
pub const DEFAULT_OVERLAP_LINES: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineChunk {
    pub chunk_num: u32,
    /// 1-based, inclusive.
    pub start_line: u32,
    /// 1-based, inclusive.
    pub end_line: u32,
    pub text: String,
    pub content_hash: String,
}

pub fn hash_text(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Splits `text` into chunks of at most `max_lines` lines, overlapping by
/// `overlap` lines. `overlap` is clamped below `max_lines` so the window
/// always advances.
///
/// Invariant (spec §8.3): the union of `[start_line, end_line]` across the
/// returned chunks covers `[1, total_lines]`, and
/// `chunk_count == ceil((total_lines - overlap) / (max_lines - overlap))`
/// for `total_lines > 0`.
pub fn chunk_lines(text: &str, max_lines: usize, overlap: usize) -> Vec<LineChunk> {
    let max_lines = max_lines.max(1);
    let overlap = overlap.min(max_lines.saturating_sub(1));
    let lines: Vec<&str> = text.lines().collect();
    let total = lines.len();
    if total == 0 {
        return vec![];
    }

    let mut chunks = Vec::new();
    let mut start = 1usize; // 1-based
    let mut chunk_num = 0u32;
    loop {
        let end = (start + max_lines - 1).min(total);
        let body = lines[start - 1..end].join("\n");
        chunks.push(LineChunk {
            chunk_num,
            start_line: start as u32,
            end_line: end as u32,
            content_hash: hash_text(&body),
            text: body,
        });
        chunk_num += 1;
        if end >= total {
            break;
        }
        start = end - overlap + 1;
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines_of(n: usize) -> String {
        (1..=n).map(|i| format!("line {i}")).collect::<Vec<_>>().join("\n")
    }

    #[test]
    fn single_chunk_when_file_fits() {
        let text = lines_of(50);
        let chunks = chunk_lines(&text, 120, 20);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].start_line, 1);
        assert_eq!(chunks[0].end_line, 50);
    }

    #[test]
    fn chunk_count_matches_the_closed_form() {
        let total = 500;
        let (n, k) = (120, 20);
        let text = lines_of(total);
        let chunks = chunk_lines(&text, n, k);
        let expected = ((total - k) as f64 / (n - k) as f64).ceil() as usize;
        assert_eq!(chunks.len(), expected);
    }

    #[test]
    fn chunks_cover_every_line_with_declared_overlap() {
        let total = 300;
        let text = lines_of(total);
        let chunks = chunk_lines(&text, 120, 20);

        assert_eq!(chunks[0].start_line, 1);
        assert_eq!(chunks.last().unwrap().end_line, total as u32);

        for window in chunks.windows(2) {
            let (a, b) = (&window[0], &window[1]);
            assert_eq!(a.end_line - b.start_line + 1, 20);
            assert!(b.start_line <= a.end_line + 1);
        }
    }

    #[test]
    fn chunk_numbers_are_sequential_from_zero() {
        let chunks = chunk_lines(&lines_of(400), 120, 20);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_num, i as u32);
        }
    }

    #[test]
    fn empty_file_yields_no_chunks() {
        assert!(chunk_lines("", 120, 20).is_empty());
    }

    #[test]
    fn identical_text_hashes_identically() {
        let a = chunk_lines(&lines_of(10), 120, 20);
        let b = chunk_lines(&lines_of(10), 120, 20);
        assert_eq!(a[0].content_hash, b[0].content_hash);
    }
}
