//! Response rewriting for the insecure proxy
//!
//! This module provides:
//! - Streaming body rewriter (one output buffer per input buffer)
//! - Response header policy (which bodies, which headers)

pub mod body_rewriter;
pub mod headers;

pub use body_rewriter::{BodyStats, ResponseBodyRewriter};
pub use headers::{rewrite_header_value, should_rewrite, strip_secure, ResponseHeaderPlan, SkipReason};
