//! Configuration module for the insecure proxy filter
//!
//! Configuration is loaded from the Envoy plugin configuration (JSON),
//! not from external files. Every field has a default, so `{}` is valid.

use serde::Deserialize;

/// What to do with a partial `https://` match still held when the body ends
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrailingPolicy {
    /// Discard it (the established behaviour)
    #[default]
    Drop,
    /// Append it as literal text to the final chunk
    Flush,
}

/// Filter configuration loaded from Envoy plugin configuration
#[derive(Clone, Debug, Deserialize)]
pub struct FilterConfig {
    /// Response MIME types whose bodies get rewritten
    #[serde(default = "default_rewritten_mime_types")]
    pub rewritten_mime_types: Vec<String>,

    /// Handling of a partial match at end of body
    #[serde(default)]
    pub trailing_policy: TrailingPolicy,

    /// Rewrite `https://` in every kept response header value
    #[serde(default = "default_true")]
    pub rewrite_header_values: bool,

    /// Remove the `Secure` attribute from `set-cookie`
    #[serde(default = "default_true")]
    pub strip_secure_cookies: bool,

    /// Remove `strict-transport-security`
    #[serde(default = "default_true")]
    pub drop_hsts: bool,

    /// Remove `link` (preload hints point at https origins)
    #[serde(default = "default_true")]
    pub drop_link_header: bool,

    /// Remove `accept-encoding` from requests so bodies come back uncompressed
    #[serde(default = "default_true")]
    pub strip_accept_encoding: bool,

    /// Emit an audit line per rewritten body
    #[serde(default = "default_true")]
    pub log_rewrites: bool,
}

fn default_rewritten_mime_types() -> Vec<String> {
    vec![
        "text/html".to_string(),
        "image/svg".to_string(),
        "application/javascript".to_string(),
        "application/rss+xml".to_string(),
        "application/xml".to_string(),
        "application/xhtml+xml".to_string(),
        "text/css".to_string(),
        "text/javascript".to_string(),
    ]
}

fn default_true() -> bool {
    true
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            rewritten_mime_types: default_rewritten_mime_types(),
            trailing_policy: TrailingPolicy::default(),
            rewrite_header_values: true,
            strip_secure_cookies: true,
            drop_hsts: true,
            drop_link_header: true,
            strip_accept_encoding: true,
            log_rewrites: true,
        }
    }
}

impl FilterConfig {
    /// Parse configuration from JSON bytes (from Envoy plugin configuration)
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ConfigError> {
        let config_str =
            std::str::from_utf8(bytes).map_err(|e| ConfigError::InvalidUtf8(e.to_string()))?;

        serde_json::from_str(config_str).map_err(|e| ConfigError::InvalidJson(e.to_string()))
    }
}

/// Configuration parsing errors
#[derive(Debug)]
pub enum ConfigError {
    InvalidUtf8(String),
    InvalidJson(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidUtf8(e) => write!(f, "Invalid UTF-8: {}", e),
            ConfigError::InvalidJson(e) => write!(f, "Invalid JSON: {}", e),
        }
    }
}
