//! Inbound response rewriting
//!
//! Three concerns, applied in order before a response reaches the client:
//!
//! 1. Framing sanitation: a chunked upstream response must not carry a
//!    `Content-Length` header, or clients abort with a length mismatch.
//! 2. The version patch: the upstream's version endpoint sometimes reports
//!    a sentinel like `0.0.0`, which breaks clients that validate it. The
//!    body is small and bounded, so it is the one place full buffering is
//!    allowed.
//! 3. Diagnostic capture for error responses, using the eager capped-prefix
//!    strategy. Chunked and verbose-mode responses use the streaming
//!    decorator in [`crate::proxy::capture`] instead, wired up by the
//!    service.

use crate::proxy::capture::{read_prefix, MAX_CAPTURE_BYTES};
use crate::proxy::headers::{self, CONTENT_LENGTH, CONTENT_TYPE, TRANSFER_ENCODING};
use crate::proxy::redact::redact;
use crate::proxy::sink::{DiagnosticRecord, DiagnosticSink, Direction};
use crate::proxy::types::*;
use axum::body::Body;
use http::response::Parts;
use http::{HeaderMap, HeaderValue};
use http_body_util::BodyExt;
use std::sync::Arc;

/// Version values the upstream is known to report erroneously
pub const BAD_VERSION_SENTINELS: [&str; 2] = ["0.0.0", "0.0.0.0"];

/// Whether the headers declare chunked transfer encoding.
pub fn is_chunked(headers: &HeaderMap) -> bool {
    headers.get_all(TRANSFER_ENCODING).iter().any(|value| {
        value
            .to_str()
            .map(|v| v.to_ascii_lowercase().contains("chunked"))
            .unwrap_or(false)
    })
}

/// Drop `Content-Length` from a chunked response so the two framings never
/// conflict. Returns whether the response was chunked.
pub fn strip_conflicting_length(parts: &mut Parts) -> bool {
    if is_chunked(&parts.headers) {
        parts.headers.remove(CONTENT_LENGTH);
        true
    } else {
        false
    }
}

/// Whether the response declares a JSON content type.
pub fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.contains("application/json"))
        .unwrap_or(false)
}

/// Buffer the body and, if its `version` field is a known-bad sentinel,
/// replace it with the fallback and reframe the response. Anything else --
/// a healthy version, a missing field, invalid JSON -- passes through with
/// the original bytes restored.
pub async fn patch_version(
    parts: &mut Parts,
    body: Body,
    fallback: &VersionFallback,
) -> ProxyResult<Body> {
    let bytes = body
        .collect()
        .await
        .map_err(|e| ProxyError::BodyRead(e.to_string()))?
        .to_bytes();

    let Ok(mut value) = serde_json::from_slice::<serde_json::Value>(&bytes) else {
        return Ok(Body::from(bytes));
    };

    let is_bad = value
        .as_object()
        .and_then(|map| map.get("version"))
        .and_then(|v| v.as_str())
        .map(|v| BAD_VERSION_SENTINELS.contains(&v))
        .unwrap_or(false);
    if !is_bad {
        return Ok(Body::from(bytes));
    }

    if let Some(map) = value.as_object_mut() {
        map.insert(
            "version".to_string(),
            serde_json::Value::String(fallback.as_ref().to_string()),
        );
    }
    let patched = serde_json::to_vec(&value)?;

    // The body is now fully buffered: frame it by length and drop any
    // chunked marker so the two never conflict.
    parts
        .headers
        .insert(CONTENT_LENGTH, HeaderValue::from(patched.len()));
    parts.headers.remove(TRANSFER_ENCODING);

    tracing::info!(version = %fallback, "patched version field in upstream response");
    Ok(Body::from(patched))
}

/// Capture a capped snippet of an error response for diagnostics, then hand
/// back a body that still delivers every byte to the client.
pub async fn capture_error_snippet(
    parts: &Parts,
    body: Body,
    method: &str,
    uri: &str,
    sink: &Arc<dyn DiagnosticSink>,
    secret: &str,
) -> ProxyResult<Body> {
    let (snippet, truncated, body) = read_prefix(body, MAX_CAPTURE_BYTES)
        .await
        .map_err(|e| ProxyError::BodyRead(e.to_string()))?;

    sink.record(DiagnosticRecord {
        direction: Direction::Response,
        method: method.to_string(),
        uri: uri.to_string(),
        status: Some(parts.status.as_u16()),
        headers: redact(secret, &headers::dump(&parts.headers)),
        body: redact(secret, &String::from_utf8_lossy(&snippet)),
        truncated,
    });

    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::sink::MemorySink;
    use http::{Response, StatusCode};
    use rstest::rstest;

    fn response_parts(status: StatusCode, headers: &[(&'static str, &'static str)]) -> Parts {
        let mut builder = Response::builder().status(status);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let (parts, ()) = builder.body(()).unwrap().into_parts();
        parts
    }

    async fn body_string(body: Body) -> String {
        let bytes = body.collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn chunked_detection_is_case_insensitive() {
        let parts = response_parts(StatusCode::OK, &[("transfer-encoding", "Chunked")]);
        assert!(is_chunked(&parts.headers));

        let parts = response_parts(StatusCode::OK, &[("transfer-encoding", "gzip, chunked")]);
        assert!(is_chunked(&parts.headers));

        let parts = response_parts(StatusCode::OK, &[("content-length", "5")]);
        assert!(!is_chunked(&parts.headers));
    }

    #[test]
    fn chunked_response_loses_content_length() {
        let mut parts = response_parts(
            StatusCode::OK,
            &[("transfer-encoding", "chunked"), ("content-length", "123")],
        );

        assert!(strip_conflicting_length(&mut parts));
        assert!(!parts.headers.contains_key(CONTENT_LENGTH));
        assert!(parts.headers.contains_key(TRANSFER_ENCODING));
    }

    #[test]
    fn sized_response_is_left_alone() {
        let mut parts = response_parts(StatusCode::OK, &[("content-length", "123")]);
        assert!(!strip_conflicting_length(&mut parts));
        assert_eq!(parts.headers.get(CONTENT_LENGTH).unwrap(), "123");
    }

    #[rstest]
    #[case(r#"{"version":"0.0.0"}"#, r#"{"version":"0.15.2"}"#)]
    #[case(r#"{"version":"0.0.0.0"}"#, r#"{"version":"0.15.2"}"#)]
    #[case(r#"{"version":"1.2.3"}"#, r#"{"version":"1.2.3"}"#)]
    #[case(r#"{"other":"0.0.0"}"#, r#"{"other":"0.0.0"}"#)]
    #[case("not json at all", "not json at all")]
    #[tokio::test]
    async fn version_patch_table(#[case] upstream_body: &str, #[case] expected: &str) {
        let mut parts = response_parts(StatusCode::OK, &[("content-type", "application/json")]);
        let body = patch_version(
            &mut parts,
            Body::from(upstream_body.to_string()),
            &VersionFallback::default(),
        )
        .await
        .unwrap();

        assert_eq!(body_string(body).await, expected);
    }

    #[tokio::test]
    async fn version_patch_uses_configured_fallback() {
        let mut parts = response_parts(StatusCode::OK, &[("content-type", "application/json")]);
        let fallback = VersionFallback::try_new("9.9.9".to_string()).unwrap();
        let body = patch_version(&mut parts, Body::from(r#"{"version":"0.0.0"}"#), &fallback)
            .await
            .unwrap();

        assert_eq!(body_string(body).await, r#"{"version":"9.9.9"}"#);
    }

    #[tokio::test]
    async fn version_patch_reframes_by_length() {
        let mut parts = response_parts(
            StatusCode::OK,
            &[
                ("content-type", "application/json"),
                ("transfer-encoding", "chunked"),
            ],
        );
        let body = patch_version(
            &mut parts,
            Body::from(r#"{"version":"0.0.0"}"#),
            &VersionFallback::default(),
        )
        .await
        .unwrap();

        let delivered = body_string(body).await;
        assert_eq!(
            parts.headers.get(CONTENT_LENGTH).unwrap(),
            &delivered.len().to_string()
        );
        assert!(!parts.headers.contains_key(TRANSFER_ENCODING));
    }

    #[tokio::test]
    async fn error_snippet_is_captured_and_body_preserved() {
        let memory = Arc::new(MemorySink::new());
        let sink: Arc<dyn DiagnosticSink> = memory.clone();
        let parts = response_parts(
            StatusCode::TOO_MANY_REQUESTS,
            &[("x-ratelimit-reset", "60")],
        );

        let body = capture_error_snippet(
            &parts,
            Body::from("rate limited; token Bearer leak-me"),
            "POST",
            "https://api.example.com/api/chat",
            &sink,
            "",
        )
        .await
        .unwrap();

        assert_eq!(
            body_string(body).await,
            "rate limited; token Bearer leak-me"
        );

        let records = memory.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, Some(429));
        assert!(records[0].headers.contains("x-ratelimit-reset"));
        assert!(!records[0].body.contains("leak-me"));
    }
}
