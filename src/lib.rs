//! Insecure Proxy Wasm Filter for Envoy
//!
//! Lets HTTPS-only sites be browsed over plain HTTP. Envoy terminates the
//! plain connection and talks TLS upstream; this filter rewrites every
//! `https://` in textual response bodies to `http://` as the body streams
//! through, and strips the response headers that would push the client
//! back onto HTTPS.
//!
//! Targets: wasm32-wasi (Envoy proxy-wasm ABI)

pub mod config;
pub mod rewrite;
pub mod streaming;
pub mod telemetry;

use log::{debug, info, warn};
use proxy_wasm::traits::{Context, HttpContext, RootContext};
use proxy_wasm::types::{Action, ContextType, LogLevel};
use std::cell::RefCell;

use crate::config::FilterConfig;
use crate::rewrite::{ResponseBodyRewriter, ResponseHeaderPlan, SkipReason};
use crate::telemetry::RewriteEvent;

// Thread-local storage for filter configuration
thread_local! {
    static CONFIG: RefCell<FilterConfig> = RefCell::new(FilterConfig::default());
}

/// Root context for filter lifecycle management
struct InsecureProxyRootContext {
    config: FilterConfig,
}

impl InsecureProxyRootContext {
    fn new() -> Self {
        Self {
            config: FilterConfig::default(),
        }
    }
}

impl Context for InsecureProxyRootContext {}

impl RootContext for InsecureProxyRootContext {
    fn on_configure(&mut self, _plugin_configuration_size: usize) -> bool {
        if let Some(config_bytes) = self.get_plugin_configuration() {
            match FilterConfig::from_bytes(&config_bytes) {
                Ok(config) => self.config = config,
                Err(e) => {
                    // keep serving with the previous configuration
                    telemetry::audit_config_rejected(&e.to_string()).emit();
                }
            }
        }

        CONFIG.with(|c| {
            *c.borrow_mut() = self.config.clone();
        });

        info!(
            "Insecure proxy filter initialized, rewriting {} MIME types",
            self.config.rewritten_mime_types.len()
        );

        true
    }

    fn create_http_context(&self, context_id: u32) -> Option<Box<dyn HttpContext>> {
        Some(Box::new(InsecureProxyHttpContext::new(context_id)))
    }

    fn get_type(&self) -> Option<ContextType> {
        Some(ContextType::HttpContext)
    }
}

/// HTTP context for per-request processing
struct InsecureProxyHttpContext {
    context_id: u32,
    /// Present only when the response body is being rewritten
    body_rewriter: Option<ResponseBodyRewriter>,
    path: Option<String>,
    content_type: Option<String>,
    /// Why the body was passed through, once response headers are seen
    skip_reason: Option<SkipReason>,
    /// Header names removed from the response
    removed_headers: Vec<String>,
    /// Configuration snapshot for this request
    config: FilterConfig,
}

impl InsecureProxyHttpContext {
    fn new(context_id: u32) -> Self {
        let config = CONFIG.with(|c| c.borrow().clone());

        Self {
            context_id,
            body_rewriter: None,
            path: None,
            content_type: None,
            skip_reason: None,
            removed_headers: Vec::new(),
            config,
        }
    }

    /// Decide whether the body goes through the rewriter
    fn select_body(&mut self, plan: ResponseHeaderPlan, end_of_stream: bool) {
        match plan.skip_reason(end_of_stream) {
            None => {
                debug!("[context_id={}] Rewriting response body", self.context_id);
                self.body_rewriter = Some(ResponseBodyRewriter::new(&self.config));
            }
            Some(reason) => {
                debug!(
                    "[context_id={}] Passing response body through: {}",
                    self.context_id,
                    reason.as_str()
                );
                self.skip_reason = Some(reason);
            }
        }
        self.content_type = plan.content_type;
        self.removed_headers = plan.removed;
    }

    fn audit_event(&self) -> RewriteEvent {
        let mut event = match (&self.body_rewriter, self.skip_reason) {
            (Some(rewriter), _) => {
                if !rewriter.is_complete() {
                    warn!(
                        "[context_id={}] Response ended before the final body chunk",
                        self.context_id
                    );
                }
                telemetry::audit_rewritten(rewriter.stats())
            }
            (None, Some(reason)) => telemetry::audit_skipped(reason.as_str()),
            (None, None) => telemetry::audit_skipped("no response headers"),
        };

        event = event
            .with_context_id(self.context_id)
            .with_removed_headers(&self.removed_headers);
        if let Some(path) = &self.path {
            event = event.with_path(path);
        }
        if let Some(content_type) = &self.content_type {
            event = event.with_content_type(content_type);
        }
        event
    }
}

impl Context for InsecureProxyHttpContext {}

impl HttpContext for InsecureProxyHttpContext {
    fn on_http_request_headers(&mut self, _num_headers: usize, _end_of_stream: bool) -> Action {
        self.path = self.get_http_request_header(":path");
        debug!(
            "[context_id={}] Request path: {:?}",
            self.context_id, self.path
        );

        // the rewriter only understands identity-encoded text
        if self.config.strip_accept_encoding {
            self.set_http_request_header("accept-encoding", None);
        }

        Action::Continue
    }

    fn on_http_response_headers(&mut self, _num_headers: usize, end_of_stream: bool) -> Action {
        let plan = ResponseHeaderPlan::new(self.get_http_response_headers(), &self.config);

        if !plan.removed.is_empty() {
            debug!(
                "[context_id={}] Removing response headers: {:?}",
                self.context_id, plan.removed
            );
        }
        self.set_http_response_headers(plan.as_pairs());
        self.select_body(plan, end_of_stream);

        Action::Continue
    }

    fn on_http_response_body(&mut self, body_size: usize, end_of_stream: bool) -> Action {
        if self.body_rewriter.is_none() {
            return Action::Continue;
        }

        let chunk = self
            .get_http_response_body(0, body_size)
            .unwrap_or_default();
        let rewritten = match self.body_rewriter.as_mut() {
            Some(rewriter) => rewriter.on_body_chunk(&chunk, end_of_stream),
            None => return Action::Continue,
        };

        debug!(
            "[context_id={}] Rewrote body chunk: {} -> {} bytes, end_of_stream: {}",
            self.context_id,
            chunk.len(),
            rewritten.len(),
            end_of_stream
        );

        self.set_http_response_body(0, body_size, &rewritten);
        Action::Continue
    }

    fn on_log(&mut self) {
        if !self.config.log_rewrites {
            return;
        }

        self.audit_event().emit();
    }
}

// Register the filter with proxy-wasm runtime
proxy_wasm::main! {{
    proxy_wasm::set_log_level(LogLevel::Info);
    proxy_wasm::set_root_context(|_| -> Box<dyn RootContext> {
        Box::new(InsecureProxyRootContext::new())
    });
}}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_context_snapshots_config() {
        CONFIG.with(|c| {
            c.borrow_mut().trailing_policy = config::TrailingPolicy::Flush;
        });

        let context = InsecureProxyHttpContext::new(1);
        assert_eq!(context.config.trailing_policy, config::TrailingPolicy::Flush);
        assert!(context.body_rewriter.is_none());

        CONFIG.with(|c| *c.borrow_mut() = FilterConfig::default());
    }

    fn plan_for(pairs: &[(&str, &str)]) -> ResponseHeaderPlan {
        let headers = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ResponseHeaderPlan::new(headers, &FilterConfig::default())
    }

    #[test]
    fn test_headers_only_response_reports_no_body() {
        let mut context = InsecureProxyHttpContext::new(2);
        context.select_body(
            plan_for(&[(":status", "304"), ("content-type", "text/html")]),
            true,
        );

        assert!(context.body_rewriter.is_none());
        let event = context.audit_event();
        assert_eq!(event.event_type, telemetry::RewriteEventType::BodySkipped);
        assert_eq!(event.reason.as_deref(), Some("response has no body"));
        assert_eq!(event.content_type.as_deref(), Some("text/html"));
    }

    #[test]
    fn test_skipped_body_reports_content_type() {
        let mut context = InsecureProxyHttpContext::new(3);
        context.select_body(plan_for(&[("content-type", "image/png")]), false);

        let event = context.audit_event();
        assert_eq!(event.reason.as_deref(), Some("content-type not rewritable"));
        assert_eq!(event.content_type.as_deref(), Some("image/png"));
    }

    #[test]
    fn test_rewritten_body_event() {
        let mut context = InsecureProxyHttpContext::new(4);
        context.select_body(
            plan_for(&[("content-type", "text/css"), ("content-length", "9")]),
            false,
        );

        let event = context.audit_event();
        assert_eq!(event.event_type, telemetry::RewriteEventType::BodyRewritten);
        assert!(event.reason.is_none());
        assert_eq!(event.content_type.as_deref(), Some("text/css"));
        assert_eq!(event.removed_headers, vec!["content-length"]);
    }
}
