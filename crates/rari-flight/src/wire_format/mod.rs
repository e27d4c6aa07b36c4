pub mod row;
pub mod tokens;

#[cfg(test)]
pub(crate) mod decode;

pub use row::{Chunk, RowTag};

/// Row id on the wire, written in lowercase hex.
pub type ChunkId = u64;

/// Strings at least this long (in UTF-16 units) get their own text row.
pub const LARGE_STRING_THRESHOLD: usize = 1024;

/// Length of `text` as a JavaScript string.
pub fn utf16_len(text: &str) -> usize {
    text.chars().map(char::len_utf16).sum()
}
