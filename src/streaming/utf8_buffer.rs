//! UTF-8 Boundary Handler
//!
//! Envoy hands the filter raw body bytes, and a multi-byte character can be
//! split between two of them. The rewriter works on characters, so the tail
//! of an incomplete sequence is held until the next chunk arrives.
//!
//! A UTF-8 character can be 1-4 bytes:
//! - 1 byte:  0xxxxxxx (ASCII)
//! - 2 bytes: 110xxxxx 10xxxxxx
//! - 3 bytes: 1110xxxx 10xxxxxx 10xxxxxx
//! - 4 bytes: 11110xxx 10xxxxxx 10xxxxxx 10xxxxxx

use log::debug;

/// Decodes byte chunks to text, carrying split sequences across chunks.
pub struct Utf8Buffer {
    /// Leftover bytes from previous chunk (at most 3 for a split sequence)
    leftover: [u8; 4],
    /// Number of leftover bytes
    leftover_len: usize,
}

impl Utf8Buffer {
    pub fn new() -> Self {
        Self {
            leftover: [0u8; 4],
            leftover_len: 0,
        }
    }

    /// Decode a chunk, prefixed with whatever was held from the previous one.
    ///
    /// Invalid sequences become U+FFFD. An incomplete sequence at the very
    /// end is held back rather than replaced.
    pub fn decode_chunk(&mut self, chunk: &[u8]) -> String {
        if self.leftover_len == 0 {
            return self.decode_complete(chunk);
        }

        let mut joined = Vec::with_capacity(self.leftover_len + chunk.len());
        joined.extend_from_slice(&self.leftover[..self.leftover_len]);
        joined.extend_from_slice(chunk);
        self.leftover_len = 0;
        self.decode_complete(&joined)
    }

    /// Flush held bytes at end of stream. They can no longer be completed,
    /// so they decode to U+FFFD.
    pub fn finish(&mut self) -> String {
        let tail = String::from_utf8_lossy(&self.leftover[..self.leftover_len]).into_owned();
        self.leftover_len = 0;
        tail
    }

    /// Bytes currently held back
    pub fn held(&self) -> usize {
        self.leftover_len
    }

    fn decode_complete(&mut self, bytes: &[u8]) -> String {
        let end = Self::find_valid_boundary(bytes);
        let tail = &bytes[end..];
        self.leftover[..tail.len()].copy_from_slice(tail);
        self.leftover_len = tail.len();

        match std::str::from_utf8(&bytes[..end]) {
            Ok(text) => text.to_owned(),
            Err(e) => {
                debug!("Body chunk is not valid UTF-8 ({}), decoding lossily", e);
                String::from_utf8_lossy(&bytes[..end]).into_owned()
            }
        }
    }

    /// Check if byte is a UTF-8 continuation byte (10xxxxxx)
    #[inline]
    pub fn is_continuation(byte: u8) -> bool {
        (byte & 0b11000000) == 0b10000000
    }

    /// Get expected length of UTF-8 sequence from first byte
    #[inline]
    pub fn sequence_length(first_byte: u8) -> usize {
        match first_byte {
            0x00..=0x7F => 1, // ASCII
            0xC0..=0xDF => 2, // 2-byte sequence
            0xE0..=0xEF => 3, // 3-byte sequence
            0xF0..=0xF7 => 4, // 4-byte sequence
            _ => 1,           // Invalid, treat as single byte
        }
    }

    /// Index where an incomplete trailing sequence starts, or `bytes.len()`
    fn find_valid_boundary(bytes: &[u8]) -> usize {
        let mut i = bytes.len();
        while i > 0 && i > bytes.len().saturating_sub(4) {
            i -= 1;
            if !Self::is_continuation(bytes[i]) {
                let available = bytes.len() - i;
                if available < Self::sequence_length(bytes[i]) {
                    return i;
                }
                break;
            }
        }

        bytes.len()
    }
}

impl Default for Utf8Buffer {
    fn default() -> Self {
        Self::new()
    }
}
