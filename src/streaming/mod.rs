//! Streaming primitives for scheme rewriting
//!
//! This module provides:
//! - The `https://` -> `http://` state machine, stateful across chunks
//! - Lazy iterator adapters over chunk sources
//! - UTF-8 boundary handling for byte chunks

pub mod scheme_fsm;
pub mod stream_rewriter;
pub mod utf8_buffer;

pub use scheme_fsm::{MatchState, SchemeRewriter, PLAIN_SCHEME, SECURE_SCHEME};
pub use stream_rewriter::{rewrite_stream, StreamRewriter, TryStreamRewriter};
pub use utf8_buffer::Utf8Buffer;
