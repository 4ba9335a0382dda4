//! HTTP header constants and dump helpers for the proxy
//!
//! Centralizes the header names the proxy touches, plus the helpers that
//! render a header map into a single log-friendly line.

use ::http::HeaderMap;

/// Forwarding headers set on every outbound request
pub const X_FORWARDED_FOR: &str = "x-forwarded-for";
pub const X_FORWARDED_PROTO: &str = "x-forwarded-proto";
pub const X_FORWARDED_HOST: &str = "x-forwarded-host";

/// Header name for request ID used for tracing and correlation
pub const X_REQUEST_ID: &str = "x-request-id";

/// Authorization header prefix for bearer tokens
pub const BEARER_PREFIX: &str = "Bearer ";

/// Fixed marker substituted for the `Authorization` value in request dumps,
/// independent of the generic redaction sweep.
pub const AUTH_PLACEHOLDER: &str = "[redacted]";

/// Standard header re-exports for convenience
pub use ::http::header::{
    AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, HOST, TRANSFER_ENCODING,
};

/// Well-known paths
pub mod paths {
    /// Liveness endpoint, answered locally and never forwarded
    pub const HEALTH: &str = "/healthz";

    /// Suffix identifying the upstream version endpoint eligible for patching
    pub const VERSION_SUFFIX: &str = "/api/version";
}

/// Render headers as `name: value; name: value` for diagnostics.
pub fn dump(headers: &HeaderMap) -> String {
    headers
        .iter()
        .map(|(name, value)| format!("{}: {}", name, value.to_str().unwrap_or("<binary>")))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Like [`dump`], but the `Authorization` value is replaced with
/// [`AUTH_PLACEHOLDER`] before rendering.
pub fn dump_sanitized(headers: &HeaderMap) -> String {
    headers
        .iter()
        .map(|(name, value)| {
            if name == AUTHORIZATION {
                format!("{name}: {AUTH_PLACEHOLDER}")
            } else {
                format!("{}: {}", name, value.to_str().unwrap_or("<binary>"))
            }
        })
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use ::http::HeaderValue;

    #[test]
    fn dump_joins_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("x-one", HeaderValue::from_static("1"));
        headers.insert("x-two", HeaderValue::from_static("2"));
        assert_eq!(dump(&headers), "x-one: 1; x-two: 2");
    }

    #[test]
    fn sanitized_dump_masks_authorization_only() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer real-token"));
        headers.insert("x-other", HeaderValue::from_static("kept"));
        let dumped = dump_sanitized(&headers);
        assert!(!dumped.contains("real-token"));
        assert!(dumped.contains("authorization: [redacted]"));
        assert!(dumped.contains("x-other: kept"));
    }
}
