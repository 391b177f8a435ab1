//! crates/autofix_core/src/chunk.rs
//!
//! Splits uploaded document text into fixed-size overlapping windows for
//! embedding. Windows are measured in characters, not bytes, so multi-byte
//! text never splits inside a code point.

/// Splits `text` into windows of `chunk_size` characters, each overlapping
/// the previous one by `overlap` characters. An overlap at or above the
/// chunk size is clamped so the window always advances.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    if chunk_size == 0 {
        return Vec::new();
    }

    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return Vec::new();
    }

    let step = chunk_size.saturating_sub(overlap).max(1);
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let end = (start + chunk_size).min(chars.len());
        chunks.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += step;
    }

    chunks
}
