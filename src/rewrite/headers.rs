//! Response Header Policy
//!
//! Decides whether a response body gets rewritten and adjusts the headers
//! that would otherwise pin the client to HTTPS or describe the original
//! body size.

use crate::config::FilterConfig;
use crate::streaming::{PLAIN_SCHEME, SECURE_SCHEME};

/// Why a response body is passed through untouched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoContentType,
    MimeType,
    ContentEncoding,
    /// Headers arrived with end of stream set (HEAD, 204, 304)
    NoBody,
}

impl SkipReason {
    pub fn as_str(self) -> &'static str {
        match self {
            SkipReason::NoContentType => "no content-type",
            SkipReason::MimeType => "content-type not rewritable",
            SkipReason::ContentEncoding => "content-encoding not identity",
            SkipReason::NoBody => "response has no body",
        }
    }
}

/// Outcome of applying the policy to a response header block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHeaderPlan {
    /// Rewritten header list, in original order
    pub headers: Vec<(String, String)>,
    /// Whether the body should go through the scheme rewriter
    pub rewrite_body: bool,
    /// Set whenever `rewrite_body` is false
    pub skip: Option<SkipReason>,
    /// Original `content-type` value
    pub content_type: Option<String>,
    /// Names of headers that were removed
    pub removed: Vec<String>,
}

impl ResponseHeaderPlan {
    /// Build the plan for one response
    pub fn new(headers: Vec<(String, String)>, config: &FilterConfig) -> Self {
        let header = |wanted: &str| {
            headers
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(wanted))
                .map(|(_, value)| value.as_str())
        };

        let content_type = header("content-type").map(str::to_string);
        // encoded bodies are opaque to the rewriter
        let skip = match content_type.as_deref() {
            None => Some(SkipReason::NoContentType),
            Some(value) if !should_rewrite(value, &config.rewritten_mime_types) => {
                Some(SkipReason::MimeType)
            }
            Some(_) if !header("content-encoding").map_or(true, is_identity) => {
                Some(SkipReason::ContentEncoding)
            }
            Some(_) => None,
        };
        let rewrite_body = skip.is_none();

        let mut kept = Vec::with_capacity(headers.len());
        let mut removed = Vec::new();

        for (name, value) in headers {
            let lower = name.to_ascii_lowercase();
            let drop = match lower.as_str() {
                // size changes once https:// becomes http://
                "content-length" => rewrite_body,
                "strict-transport-security" => config.drop_hsts,
                "link" => config.drop_link_header,
                _ => false,
            };
            if drop {
                removed.push(name);
                continue;
            }

            let value = if config.rewrite_header_values {
                rewrite_header_value(&value)
            } else {
                value
            };
            let value = match lower.as_str() {
                "set-cookie" if config.strip_secure_cookies => strip_secure(&value),
                _ => value,
            };
            kept.push((name, value));
        }

        Self {
            headers: kept,
            rewrite_body,
            skip,
            content_type,
            removed,
        }
    }

    /// Reason the body is not rewritten, given whether headers ended the stream
    pub fn skip_reason(&self, end_of_stream: bool) -> Option<SkipReason> {
        match self.skip {
            Some(reason) => Some(reason),
            None if end_of_stream => Some(SkipReason::NoBody),
            None => None,
        }
    }

    /// Header list borrowed in the shape proxy-wasm expects
    pub fn as_pairs(&self) -> Vec<(&str, &str)> {
        self.headers
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
            .collect()
    }
}

/// Check a `content-type` value against the configured MIME list.
///
/// Parameters after `;` are ignored and the comparison is case-insensitive.
pub fn should_rewrite(content_type: &str, mimes: &[String]) -> bool {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or(content_type)
        .trim();

    mimes.iter().any(|m| mime.eq_ignore_ascii_case(m))
}

fn is_identity(content_encoding: &str) -> bool {
    let encoding = content_encoding.trim();
    encoding.is_empty() || encoding.eq_ignore_ascii_case("identity")
}

/// Replace every `https://` in a header value with `http://`.
///
/// Applied to all kept headers, not only `location`: `refresh`,
/// `content-location` and CORS origins carry absolute URLs too.
pub fn rewrite_header_value(value: &str) -> String {
    value.replace(SECURE_SCHEME, PLAIN_SCHEME)
}

/// Remove the `Secure` attribute from a `set-cookie` value
pub fn strip_secure(cookie: &str) -> String {
    let mut parts = cookie.split(';');
    let mut out = parts.next().unwrap_or_default().to_string();

    for attr in parts {
        if attr.trim().eq_ignore_ascii_case("secure") {
            continue;
        }
        out.push(';');
        out.push_str(attr);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_should_rewrite() {
        let mimes = FilterConfig::default().rewritten_mime_types;

        assert!(should_rewrite("text/html", &mimes));
        assert!(should_rewrite("text/html; charset=utf-8", &mimes));
        assert!(should_rewrite(" Text/CSS ", &mimes));
        assert!(!should_rewrite("image/png", &mimes));
        assert!(!should_rewrite("application/json", &mimes));
    }

    #[test]
    fn test_strip_secure() {
        assert_eq!(
            strip_secure("id=a3fWa; Secure; HttpOnly"),
            "id=a3fWa; HttpOnly"
        );
        assert_eq!(strip_secure("id=1;secure"), "id=1");
        assert_eq!(strip_secure("secure=1; Path=/"), "secure=1; Path=/");
    }

    #[test]
    fn test_rewrite_header_value() {
        assert_eq!(
            rewrite_header_value("https://example.com/next?u=https://x"),
            "http://example.com/next?u=http://x"
        );
    }

    #[test]
    fn test_plan_for_html_response() {
        let plan = ResponseHeaderPlan::new(
            headers(&[
                (":status", "302"),
                ("content-type", "text/html; charset=utf-8"),
                ("content-length", "120"),
                ("location", "https://example.com/"),
                ("refresh", "5; url=https://example.com/next"),
                ("content-location", "https://example.com/index.html"),
                ("access-control-allow-origin", "https://app.example.com"),
                ("set-cookie", "a=1; Secure"),
                ("set-cookie", "b=2; Path=/; secure"),
                ("set-cookie", "c=https://example.com/cb; Secure"),
                ("strict-transport-security", "max-age=31536000"),
                ("link", "<https://cdn.example.com>; rel=preconnect"),
            ]),
            &FilterConfig::default(),
        );

        assert!(plan.rewrite_body);
        assert_eq!(plan.skip, None);
        assert_eq!(plan.content_type.as_deref(), Some("text/html; charset=utf-8"));
        assert_eq!(
            plan.headers,
            headers(&[
                (":status", "302"),
                ("content-type", "text/html; charset=utf-8"),
                ("location", "http://example.com/"),
                ("refresh", "5; url=http://example.com/next"),
                ("content-location", "http://example.com/index.html"),
                ("access-control-allow-origin", "http://app.example.com"),
                ("set-cookie", "a=1"),
                ("set-cookie", "b=2; Path=/"),
                ("set-cookie", "c=http://example.com/cb"),
            ])
        );
        assert_eq!(
            plan.removed,
            vec!["content-length", "strict-transport-security", "link"]
        );
    }

    #[test]
    fn test_plan_keeps_length_for_binary_body() {
        let plan = ResponseHeaderPlan::new(
            headers(&[("Content-Type", "image/png"), ("Content-Length", "5")]),
            &FilterConfig::default(),
        );

        assert!(!plan.rewrite_body);
        assert_eq!(plan.skip, Some(SkipReason::MimeType));
        assert_eq!(plan.content_type.as_deref(), Some("image/png"));
        assert_eq!(plan.as_pairs(), vec![("Content-Type", "image/png"), ("Content-Length", "5")]);
    }

    #[test]
    fn test_plan_skips_compressed_body() {
        let plan = ResponseHeaderPlan::new(
            headers(&[
                ("content-type", "text/html"),
                ("content-encoding", "gzip"),
                ("content-length", "80"),
            ]),
            &FilterConfig::default(),
        );

        assert!(!plan.rewrite_body);
        assert_eq!(plan.skip, Some(SkipReason::ContentEncoding));
        assert_eq!(plan.headers.len(), 3);

        let identity = ResponseHeaderPlan::new(
            headers(&[("content-type", "text/html"), ("content-encoding", "identity")]),
            &FilterConfig::default(),
        );
        assert!(identity.rewrite_body);
    }

    #[test]
    fn test_plan_without_content_type() {
        let plan = ResponseHeaderPlan::new(headers(&[("content-length", "5")]), &FilterConfig::default());
        assert!(!plan.rewrite_body);
        assert_eq!(plan.skip_reason(false), Some(SkipReason::NoContentType));
        assert!(plan.removed.is_empty());
    }

    #[test]
    fn test_rewritable_response_without_body() {
        let plan = ResponseHeaderPlan::new(
            headers(&[(":status", "304"), ("content-type", "text/html")]),
            &FilterConfig::default(),
        );

        assert!(plan.rewrite_body);
        assert_eq!(plan.skip_reason(false), None);
        assert_eq!(plan.skip_reason(true), Some(SkipReason::NoBody));
        assert_eq!(SkipReason::NoBody.as_str(), "response has no body");
    }

    #[test]
    fn test_plan_respects_config() {
        let config = FilterConfig {
            strip_secure_cookies: false,
            drop_hsts: false,
            rewrite_header_values: false,
            ..Default::default()
        };
        let plan = ResponseHeaderPlan::new(
            headers(&[
                ("set-cookie", "a=1; Secure"),
                ("strict-transport-security", "max-age=1"),
                ("location", "https://example.com/"),
            ]),
            &config,
        );

        assert_eq!(plan.headers.len(), 3);
        assert_eq!(plan.headers[0].1, "a=1; Secure");
        assert_eq!(plan.headers[2].1, "https://example.com/");
    }
}
