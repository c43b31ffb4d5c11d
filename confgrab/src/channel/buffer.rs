//! Append-only receive buffer with a consumption cursor.
//!
//! Everything a device sends is appended here; nothing is ever removed
//! except by an explicit [`ExpectBuffer::reset`]. A cursor marks how far
//! earlier expects have consumed, and pattern searches only look at the
//! bytes after it, so a byte can be matched at most once.

use std::ops::Range;

use bytes::Bytes;

use super::patterns::Pattern;

/// Receive buffer scoped to one expect engine.
#[derive(Debug)]
pub struct ExpectBuffer {
    /// Everything received since the last reset.
    buffer: Vec<u8>,

    /// Offset of the first unconsumed byte.
    cursor: usize,

    /// Escape-sequence filter, present when ANSI stripping is enabled.
    stripper: Option<AnsiStripper>,
}

impl ExpectBuffer {
    /// Create an empty buffer, optionally stripping ANSI escape codes.
    pub fn new(strip_ansi: bool) -> Self {
        Self {
            buffer: Vec::with_capacity(4096),
            cursor: 0,
            stripper: strip_ansi.then(AnsiStripper::new),
        }
    }

    /// Append newly received bytes. Returns how many bytes were appended
    /// after filtering.
    pub fn extend(&mut self, data: &[u8]) -> usize {
        let before = self.buffer.len();
        match self.stripper.as_mut() {
            Some(stripper) => stripper.strip_into(data, &mut self.buffer),
            None => self.buffer.extend_from_slice(data),
        }
        self.buffer.len() - before
    }

    /// Bytes not yet consumed by a match.
    pub fn unconsumed(&self) -> &[u8] {
        &self.buffer[self.cursor..]
    }

    /// Find the earliest match of any pattern in the unconsumed region.
    ///
    /// Returns the index of the winning pattern and the match span as
    /// absolute buffer offsets. When two patterns match at the same
    /// position, the one listed first wins.
    pub fn find(&self, patterns: &[&Pattern]) -> Option<(usize, Range<usize>)> {
        let haystack = self.unconsumed();
        patterns
            .iter()
            .enumerate()
            .filter_map(|(index, pattern)| pattern.find(haystack).map(|span| (index, span)))
            .min_by_key(|(index, span)| (span.start, *index))
            .map(|(index, span)| (index, span.start + self.cursor..span.end + self.cursor))
    }

    /// Consume everything up to `end` (absolute offset) and return it.
    pub fn consume_through(&mut self, end: usize) -> Bytes {
        let end = end.clamp(self.cursor, self.buffer.len());
        let consumed = Bytes::copy_from_slice(&self.buffer[self.cursor..end]);
        self.cursor = end;
        consumed
    }

    /// Copy of the unconsumed bytes, for diagnostics.
    pub fn snapshot(&self) -> Bytes {
        Bytes::copy_from_slice(self.unconsumed())
    }

    /// Everything received since the last reset, consumed or not.
    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    /// Get the unconsumed contents as a string (lossy UTF-8 conversion).
    pub fn as_str_lossy(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(self.unconsumed())
    }

    /// Offset of the consumption cursor.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Total bytes held.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if nothing has been received since the last reset.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Drop all data and rewind the cursor.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.cursor = 0;
    }
}

impl Default for ExpectBuffer {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Incremental ANSI escape remover.
///
/// The vte parser keeps its state between calls, so an escape sequence
/// split over two reads is still removed completely.
struct AnsiStripper {
    parser: vte::Parser,
}

impl AnsiStripper {
    fn new() -> Self {
        Self {
            parser: vte::Parser::new(),
        }
    }

    fn strip_into(&mut self, data: &[u8], out: &mut Vec<u8>) {
        let mut sink = PrintSink { out };
        self.parser.advance(&mut sink, data);
    }
}

impl std::fmt::Debug for AnsiStripper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AnsiStripper")
    }
}

/// Keeps printable characters and line-structure controls only.
struct PrintSink<'a> {
    out: &'a mut Vec<u8>,
}

impl vte::Perform for PrintSink<'_> {
    fn print(&mut self, c: char) {
        let mut utf8 = [0u8; 4];
        self.out.extend_from_slice(c.encode_utf8(&mut utf8).as_bytes());
    }

    fn execute(&mut self, byte: u8) {
        if matches!(byte, b'\n' | b'\r' | b'\t') {
            self.out.push(byte);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prompt() -> Pattern {
        Pattern::regex(r"router#\s*$").unwrap()
    }

    #[test]
    fn test_basic_extend() {
        let mut buffer = ExpectBuffer::new(false);
        assert_eq!(buffer.extend(b"Hello, world!"), 13);
        assert_eq!(buffer.as_slice(), b"Hello, world!");
        assert_eq!(buffer.unconsumed(), b"Hello, world!");
    }

    #[test]
    fn test_ansi_stripping() {
        let mut buffer = ExpectBuffer::new(true);
        // Typical ANSI color code: \x1b[32m (green)
        buffer.extend(b"\x1b[32mGreen text\x1b[0m\r\n");
        assert_eq!(buffer.as_slice(), b"Green text\r\n");
    }

    #[test]
    fn test_ansi_sequence_split_across_reads() {
        let mut buffer = ExpectBuffer::new(true);
        buffer.extend(b"before\x1b[");
        buffer.extend(b"2Kafter");
        assert_eq!(buffer.as_slice(), b"beforeafter");
    }

    #[test]
    fn test_find_and_consume() {
        let mut buffer = ExpectBuffer::new(false);
        buffer.extend(b"show version\r\nIOS 15.2\r\nrouter#");

        let pattern = prompt();
        let (index, span) = buffer.find(&[&pattern]).unwrap();
        assert_eq!(index, 0);
        assert_eq!(&buffer.as_slice()[span.clone()], b"router#");

        let consumed = buffer.consume_through(span.end);
        assert_eq!(&consumed[..], b"show version\r\nIOS 15.2\r\nrouter#");
        assert!(buffer.unconsumed().is_empty());
        assert_eq!(buffer.cursor(), buffer.len());
    }

    #[test]
    fn test_consumed_bytes_never_match_again() {
        let mut buffer = ExpectBuffer::new(false);
        buffer.extend(b"router#");
        let pattern = prompt();

        let (_, span) = buffer.find(&[&pattern]).unwrap();
        buffer.consume_through(span.end);
        assert!(buffer.find(&[&pattern]).is_none());

        buffer.extend(b"\r\nrouter#");
        let (_, span) = buffer.find(&[&pattern]).unwrap();
        assert_eq!(span, 9..16);
    }

    #[test]
    fn test_earliest_match_wins() {
        let mut buffer = ExpectBuffer::new(false);
        buffer.extend(b"% Login invalid\r\nPassword: ");

        let password = Pattern::regex(r"(?i)password:\s*$").unwrap();
        let rejected = Pattern::literal("% Login invalid");
        let (index, _) = buffer.find(&[&password, &rejected]).unwrap();
        assert_eq!(index, 1);
    }

    #[test]
    fn test_snapshot_and_reset() {
        let mut buffer = ExpectBuffer::new(false);
        buffer.extend(b"abc");
        buffer.consume_through(1);
        assert_eq!(&buffer.snapshot()[..], b"bc");

        buffer.reset();
        assert!(buffer.is_empty());
        assert_eq!(buffer.cursor(), 0);
    }
}
