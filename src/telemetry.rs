//! Telemetry Module
//!
//! In Wasm we emit structured JSON log lines that Envoy's log sink or an
//! external collector can pick up.

use log::{info, warn};
use serde::Serialize;

use crate::rewrite::BodyStats;

/// Audit event types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RewriteEventType {
    /// Body went through the scheme rewriter
    BodyRewritten,
    /// Body passed through untouched
    BodySkipped,
    /// Plugin configuration was rejected
    ConfigRejected,
}

/// Audit event for logging
#[derive(Debug, Clone, Serialize)]
pub struct RewriteEvent {
    pub event_type: RewriteEventType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_id: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunks: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes_in: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes_out: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rewrites: Option<usize>,
    /// Headers removed from the response
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub removed_headers: Vec<String>,
}

impl RewriteEvent {
    pub fn new(event_type: RewriteEventType) -> Self {
        Self {
            event_type,
            context_id: None,
            path: None,
            content_type: None,
            reason: None,
            chunks: None,
            bytes_in: None,
            bytes_out: None,
            rewrites: None,
            removed_headers: Vec::new(),
        }
    }

    pub fn with_context_id(mut self, id: u32) -> Self {
        self.context_id = Some(id);
        self
    }

    pub fn with_path(mut self, path: &str) -> Self {
        self.path = Some(path.to_string());
        self
    }

    pub fn with_content_type(mut self, content_type: &str) -> Self {
        self.content_type = Some(content_type.to_string());
        self
    }

    pub fn with_reason(mut self, reason: &str) -> Self {
        self.reason = Some(reason.to_string());
        self
    }

    /// Attach body counters
    pub fn with_stats(mut self, stats: BodyStats) -> Self {
        self.chunks = Some(stats.chunks);
        self.bytes_in = Some(stats.bytes_in);
        self.bytes_out = Some(stats.bytes_out);
        self.rewrites = Some(stats.rewrites);
        self
    }

    pub fn with_removed_headers(mut self, removed: &[String]) -> Self {
        self.removed_headers = removed.to_vec();
        self
    }

    /// Log the event
    pub fn emit(&self) {
        match serde_json::to_string(self) {
            Ok(json) => match self.event_type {
                RewriteEventType::ConfigRejected => warn!("[INSECURE-PROXY-AUDIT] {}", json),
                _ => info!("[INSECURE-PROXY-AUDIT] {}", json),
            },
            Err(e) => {
                warn!("Failed to serialize audit event: {}", e);
            }
        }
    }
}

/// Create a rewritten-body audit event
pub fn audit_rewritten(stats: BodyStats) -> RewriteEvent {
    RewriteEvent::new(RewriteEventType::BodyRewritten).with_stats(stats)
}

/// Create a skipped-body audit event
pub fn audit_skipped(reason: &str) -> RewriteEvent {
    RewriteEvent::new(RewriteEventType::BodySkipped).with_reason(reason)
}

/// Create a rejected-configuration audit event
pub fn audit_config_rejected(error: &str) -> RewriteEvent {
    RewriteEvent::new(RewriteEventType::ConfigRejected).with_reason(error)
}
