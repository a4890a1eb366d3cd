//! Pattern buffer with tail-search optimization.
//!
//! Only the last N bytes of the buffer are searched for prompt patterns,
//! rather than the entire output. For large outputs (full BGP tables,
//! `show tech`), this keeps prompt detection cost constant per read.

use bytes::BytesMut;
use regex::bytes::Regex;

/// Accumulates the output of one channel operation and searches its tail.
///
/// A buffer lives for a single operation; nothing is carried over to the
/// next one.
#[derive(Debug)]
pub struct PatternBuffer {
    /// The accumulated output buffer.
    buffer: BytesMut,

    /// How many bytes from the end to search for patterns.
    search_depth: usize,
}

impl PatternBuffer {
    /// Create a new pattern buffer with the specified search depth.
    pub fn new(search_depth: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
            search_depth,
        }
    }

    /// Append data to the buffer.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// The searchable tail: the last `search_depth` bytes.
    pub fn tail(&self) -> &[u8] {
        let start = self.buffer.len().saturating_sub(self.search_depth);
        &self.buffer[start..]
    }

    /// Search only the tail of the buffer for the pattern.
    ///
    /// Offsets in the returned match are relative to the tail, not the
    /// full buffer.
    pub fn search_tail<'a>(&'a self, pattern: &Regex) -> Option<regex::bytes::Match<'a>> {
        pattern.find(self.tail())
    }

    /// Search the entire buffer for a pattern.
    ///
    /// Use sparingly - prefer `search_tail` for prompt detection.
    pub fn search_full<'a>(&'a self, pattern: &Regex) -> Option<regex::bytes::Match<'a>> {
        pattern.find(&self.buffer)
    }

    /// Check if the tail contains a pattern match.
    pub fn tail_contains(&self, pattern: &Regex) -> bool {
        pattern.is_match(self.tail())
    }

    /// Check if the whole buffer contains a literal byte string.
    pub fn contains_literal(&self, needle: &[u8]) -> bool {
        memchr::memmem::find(&self.buffer, needle).is_some()
    }

    /// Take ownership of the buffer contents and reset.
    pub fn take(&mut self) -> Vec<u8> {
        self.buffer.split().to_vec()
    }

    /// Get a reference to the buffer contents.
    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    /// Get the buffer contents as a string (lossy UTF-8 conversion).
    pub fn as_str_lossy(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.buffer)
    }

    /// Get the current buffer length.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Clear the buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Get the search depth setting.
    pub fn search_depth(&self) -> usize {
        self.search_depth
    }
}

impl Default for PatternBuffer {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_basic_extend() {
        let mut buffer = PatternBuffer::new(100);
        buffer.extend(b"Hello, world!");
        assert_eq!(buffer.as_slice(), b"Hello, world!");
        assert_eq!(buffer.len(), 13);
    }

    #[test]
    fn test_tail_search() {
        let mut buffer = PatternBuffer::new(20);

        buffer.extend(&[b'x'; 100]);
        buffer.extend(b"\nrouter#");

        let pattern = Regex::new(r"router#").unwrap();
        assert!(buffer.search_tail(&pattern).is_some());
    }

    #[test]
    fn test_tail_search_not_in_tail() {
        let mut buffer = PatternBuffer::new(10);

        buffer.extend(b"router#");
        buffer.extend(&[b'x'; 100]);

        let pattern = Regex::new(r"router#").unwrap();
        assert!(buffer.search_tail(&pattern).is_none());
        assert!(buffer.search_full(&pattern).is_some());
    }

    #[test]
    fn test_take_clears_buffer() {
        let mut buffer = PatternBuffer::new(100);
        buffer.extend(b"test data");
        assert_eq!(buffer.take(), b"test data");
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_contains_literal() {
        let mut buffer = PatternBuffer::new(4);
        buffer.extend(b"--More-- trailing");
        // Literal search covers the whole buffer, not just the tail
        assert!(buffer.contains_literal(b"--More--"));
        assert!(!buffer.contains_literal(b"--Less--"));
    }

    proptest! {
        #[test]
        fn prompt_outside_depth_never_matches(depth in 1usize..64, filler in 0usize..256) {
            let mut buffer = PatternBuffer::new(depth);
            buffer.extend(b"router#");
            buffer.extend(&vec![b'.'; depth + filler]);

            let pattern = Regex::new(r"router#").unwrap();
            prop_assert!(!buffer.tail_contains(&pattern));
        }

        #[test]
        fn prompt_inside_depth_always_matches(depth in 7usize..64, lead in 0usize..256) {
            let mut buffer = PatternBuffer::new(depth);
            buffer.extend(&vec![b'.'; lead]);
            buffer.extend(b"router#");

            let pattern = Regex::new(r"router#").unwrap();
            prop_assert!(buffer.tail_contains(&pattern));
        }
    }
}
