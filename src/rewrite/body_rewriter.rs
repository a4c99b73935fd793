//! Streaming Response Body Rewriter
//!
//! Rewrites each body buffer as Envoy delivers it and forgets it.
//! Only a split UTF-8 sequence and a partial `https://` match are carried
//! between buffers, so memory use does not grow with body size.

use log::debug;

use crate::config::{FilterConfig, TrailingPolicy};
use crate::streaming::{SchemeRewriter, Utf8Buffer};

/// Per-response body rewriter - one output buffer per input buffer
pub struct ResponseBodyRewriter {
    decoder: Utf8Buffer,
    machine: SchemeRewriter,
    trailing_policy: TrailingPolicy,
    stats: BodyStats,
    complete: bool,
}

/// Counters for the audit log
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BodyStats {
    pub chunks: usize,
    pub bytes_in: usize,
    pub bytes_out: usize,
    pub rewrites: usize,
}

impl ResponseBodyRewriter {
    /// Create a rewriter from configuration
    pub fn new(config: &FilterConfig) -> Self {
        Self::with_policy(config.trailing_policy)
    }

    /// Create a rewriter with an explicit trailing-match policy
    pub fn with_policy(trailing_policy: TrailingPolicy) -> Self {
        Self {
            decoder: Utf8Buffer::new(),
            machine: SchemeRewriter::new(),
            trailing_policy,
            stats: BodyStats::default(),
            complete: false,
        }
    }

    /// Rewrite one body buffer.
    ///
    /// Returns the bytes that replace `chunk` downstream. They may include
    /// text held back from earlier buffers and may omit a partial match at
    /// the end of this one.
    pub fn on_body_chunk(&mut self, chunk: &[u8], end_of_stream: bool) -> Vec<u8> {
        if self.complete {
            return chunk.to_vec();
        }

        self.stats.chunks += 1;
        self.stats.bytes_in += chunk.len();

        let text = self.decoder.decode_chunk(chunk);
        let mut out = self.machine.rewrite_chunk(&text);

        if end_of_stream {
            self.complete = true;
            let tail = self.decoder.finish();
            if !tail.is_empty() {
                out.push_str(&self.machine.rewrite_chunk(&tail));
            }
            self.finish_trailing(&mut out);
        }

        self.stats.rewrites = self.machine.rewrites();
        self.stats.bytes_out += out.len();
        out.into_bytes()
    }

    fn finish_trailing(&mut self, out: &mut String) {
        let pending = self.machine.take_pending();
        if pending.is_empty() {
            return;
        }

        match self.trailing_policy {
            TrailingPolicy::Flush => out.push_str(&pending),
            TrailingPolicy::Drop => {
                debug!("Dropping partial match {:?} at end of body", pending);
            }
        }
    }

    /// Check if the final buffer has been seen
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Counters so far
    pub fn stats(&self) -> BodyStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(rewriter: &mut ResponseBodyRewriter, chunks: &[&[u8]]) -> Vec<u8> {
        let mut out = Vec::new();
        for (i, chunk) in chunks.iter().enumerate() {
            let end = i + 1 == chunks.len();
            out.extend(rewriter.on_body_chunk(chunk, end));
        }
        out
    }

    #[test]
    fn test_rewrites_across_buffers() {
        let mut rewriter = ResponseBodyRewriter::new(&FilterConfig::default());
        let out = run(&mut rewriter, &[b"<a href=\"htt", b"ps://example.com\">", b"</a>"]);

        assert_eq!(out, b"<a href=\"http://example.com\"></a>");
        let stats = rewriter.stats();
        assert_eq!(stats.chunks, 3);
        assert_eq!(stats.rewrites, 1);
        assert_eq!(stats.bytes_in, stats.bytes_out + 1);
    }

    #[test]
    fn test_split_utf8_and_scheme() {
        let mut rewriter = ResponseBodyRewriter::new(&FilterConfig::default());
        let body = "é https://ü.example".as_bytes();
        let out = run(&mut rewriter, &[&body[..1], &body[1..6], &body[6..]]);

        assert_eq!(String::from_utf8(out).unwrap(), "é http://ü.example");
    }

    #[test]
    fn test_trailing_match_dropped_by_default() {
        let mut rewriter = ResponseBodyRewriter::new(&FilterConfig::default());
        let out = run(&mut rewriter, &[b"see ", b"http"]);

        assert_eq!(out, b"see ");
        assert!(rewriter.is_complete());
    }

    #[test]
    fn test_trailing_match_flushed_when_configured() {
        let mut rewriter = ResponseBodyRewriter::with_policy(TrailingPolicy::Flush);
        let out = run(&mut rewriter, &[b"see ", b"http"]);

        assert_eq!(out, b"see http");
    }

    #[test]
    fn test_after_completion_passes_through() {
        let mut rewriter = ResponseBodyRewriter::new(&FilterConfig::default());
        rewriter.on_body_chunk(b"done", true);

        assert_eq!(rewriter.on_body_chunk(b"https://late", false), b"https://late");
        assert_eq!(rewriter.stats().chunks, 1);
    }
}
