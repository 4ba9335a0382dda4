//! Outbound request rewriting
//!
//! Mutates a request in place before it is handed to the transport: routing
//! target, `Host`, the `X-Forwarded-*` trio, and the injected bearer
//! credential. This stage performs no I/O and cannot fail at request time;
//! a malformed upstream URL is caught when the service is constructed.

use crate::proxy::capture::{read_prefix, MAX_CAPTURE_BYTES};
use crate::proxy::headers::{
    self, AUTHORIZATION, BEARER_PREFIX, HOST, X_FORWARDED_FOR, X_FORWARDED_HOST,
    X_FORWARDED_PROTO,
};
use crate::proxy::redact::redact;
use crate::proxy::sink::{DiagnosticRecord, DiagnosticSink, Direction};
use crate::proxy::types::*;
use axum::body::Body;
use http::request::Parts;
use http::HeaderValue;
use hyper::Uri;
use std::sync::Arc;

/// Upstream origin split into the pieces the rewriter needs, parsed once at
/// construction time.
#[derive(Clone, Debug)]
pub struct Upstream {
    pub scheme: String,
    pub authority: String,
}

impl Upstream {
    pub fn parse(url: &UpstreamUrl) -> ProxyResult<Self> {
        let uri: Uri = url
            .as_ref()
            .parse()
            .map_err(|_| ProxyError::InvalidUpstreamUrl(url.as_ref().to_string()))?;

        let scheme = uri.scheme_str().unwrap_or("https").to_string();
        let authority = uri
            .authority()
            .ok_or_else(|| ProxyError::InvalidUpstreamUrl(url.as_ref().to_string()))?
            .to_string();

        Ok(Self { scheme, authority })
    }
}

/// Rewrite `parts` so the request targets the upstream, carries forwarding
/// headers, and holds the injected credential.
pub fn rewrite_request(
    parts: &mut Parts,
    config: &ProxyConfig,
    upstream: &Upstream,
    client_addr: &str,
) -> ProxyResult<()> {
    // Original scheme/host before anything is overwritten.
    let original_scheme = parts.uri.scheme_str().unwrap_or("http").to_string();
    let original_host = parts
        .headers
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| parts.uri.authority().map(|a| a.to_string()));

    // Retarget to the upstream, preserving path and query verbatim.
    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let target = format!(
        "{}://{}{}",
        upstream.scheme, upstream.authority, path_and_query
    );
    parts.uri = target
        .parse()
        .map_err(|_| ProxyError::InvalidUpstreamUrl(target))?;

    parts.headers.insert(
        HOST,
        HeaderValue::from_str(&upstream.authority)
            .map_err(|_| ProxyError::InvalidHeader("host"))?,
    );

    // X-Forwarded-For: append to an existing chain, otherwise start one.
    let forwarded_for = match parts.headers.get(X_FORWARDED_FOR) {
        Some(prior) => match prior.to_str() {
            Ok(prior) => format!("{prior}, {client_addr}"),
            Err(_) => client_addr.to_string(),
        },
        None => client_addr.to_string(),
    };
    parts.headers.insert(
        X_FORWARDED_FOR,
        HeaderValue::from_str(&forwarded_for)
            .map_err(|_| ProxyError::InvalidHeader("x-forwarded-for"))?,
    );

    parts.headers.insert(
        X_FORWARDED_PROTO,
        HeaderValue::from_str(&original_scheme)
            .map_err(|_| ProxyError::InvalidHeader("x-forwarded-proto"))?,
    );
    if let Some(host) = original_host {
        parts.headers.insert(
            X_FORWARDED_HOST,
            HeaderValue::from_str(&host)
                .map_err(|_| ProxyError::InvalidHeader("x-forwarded-host"))?,
        );
    }

    inject_authorization(parts, config)
}

/// Force `Authorization: Bearer <key>` unless preserve-mode keeps a
/// client-supplied header. A key that already starts with `Bearer ` is used
/// verbatim rather than double-prefixed.
fn inject_authorization(parts: &mut Parts, config: &ProxyConfig) -> ProxyResult<()> {
    let Some(key) = &config.api_key else {
        return Ok(());
    };

    let client_supplied_auth = parts.headers.contains_key(AUTHORIZATION);
    if config.preserve_auth && client_supplied_auth {
        return Ok(());
    }

    let value = if key.as_ref().starts_with(BEARER_PREFIX) {
        key.as_ref().to_string()
    } else {
        format!("{}{}", BEARER_PREFIX, key.as_ref())
    };
    parts.headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&value).map_err(|_| ProxyError::InvalidHeader("authorization"))?,
    );
    Ok(())
}

/// Emit a diagnostic record for the rewritten request, reading a capped body
/// snippet and handing back a body that still delivers every captured byte.
pub async fn snapshot_request(
    parts: &Parts,
    body: Body,
    sink: &Arc<dyn DiagnosticSink>,
    secret: &str,
) -> ProxyResult<Body> {
    let (snippet, truncated, body) = read_prefix(body, MAX_CAPTURE_BYTES)
        .await
        .map_err(|e| ProxyError::BodyRead(e.to_string()))?;

    sink.record(DiagnosticRecord {
        direction: Direction::Request,
        method: parts.method.to_string(),
        uri: parts.uri.to_string(),
        status: None,
        // Authorization gets the fixed marker; the redaction sweep still
        // runs over the rest of the dump as a second layer.
        headers: redact(secret, &headers::dump_sanitized(&parts.headers)),
        body: redact(secret, &String::from_utf8_lossy(&snippet)),
        truncated,
    });

    Ok(body)
}
