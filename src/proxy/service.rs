//! The proxy service: routing, the forward pipeline, and error mapping
//!
//! One service instance owns the parsed upstream target, the pooled client,
//! and the diagnostic sink. Every request that is not the health check goes
//! through [`ProxyService::forward`]:
//!
//! 1. rewrite the request (target, `Host`, `X-Forwarded-*`, credential),
//! 2. in verbose mode, snapshot the outbound request,
//! 3. send it upstream with a timeout on time-to-response-headers,
//! 4. sanitize response framing,
//! 5. patch the version endpoint body if it carries a bad sentinel,
//! 6. attach diagnostic capture without buffering streamed bodies.
//!
//! Any failure surfaces to the client as a plain `502 Bad Gateway`; the
//! detail goes to the logs, never over the wire.

use crate::proxy::capture::{CaptureBody, CaptureMeta, MAX_CAPTURE_BYTES};
use crate::proxy::client::{build_client, UpstreamClient};
use crate::proxy::headers::{self, paths};
use crate::proxy::middleware::{access_log_middleware, request_id_middleware};
use crate::proxy::response;
use crate::proxy::rewrite::{self, Upstream};
use crate::proxy::sink::{DiagnosticSink, TracingSink};
use crate::proxy::types::{ProxyConfig, ProxyError, ProxyResult};
use axum::{
    body::Body,
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    middleware::from_fn,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Reverse proxy with credential injection and streaming-safe diagnostics
pub struct ProxyService {
    config: ProxyConfig,
    upstream: Upstream,
    client: UpstreamClient,
    sink: Arc<dyn DiagnosticSink>,
}

impl ProxyService {
    /// Build a service from configuration, emitting diagnostics as tracing
    /// events.
    pub fn new(config: ProxyConfig) -> ProxyResult<Self> {
        Self::with_sink(config, Arc::new(TracingSink))
    }

    /// Build a service with a caller-provided diagnostic sink.
    pub fn with_sink(config: ProxyConfig, sink: Arc<dyn DiagnosticSink>) -> ProxyResult<Self> {
        let upstream = Upstream::parse(&config.upstream)?;
        Ok(Self {
            config,
            upstream,
            client: build_client(),
            sink,
        })
    }

    /// Assemble the router: health endpoint plus a catch-all forward route,
    /// wrapped in request-id, access-log, and trace layers.
    pub fn into_router(self) -> Router {
        Router::new()
            .route(paths::HEALTH, get(health_handler))
            .fallback(proxy_handler)
            .with_state(Arc::new(self))
            .layer(from_fn(access_log_middleware))
            .layer(from_fn(request_id_middleware))
            .layer(TraceLayer::new_for_http())
    }

    async fn forward(
        &self,
        request: Request<Body>,
        client_addr: &str,
    ) -> ProxyResult<Response<Body>> {
        let (mut parts, mut body) = request.into_parts();
        rewrite::rewrite_request(&mut parts, &self.config, &self.upstream, client_addr)?;

        let method = parts.method.to_string();
        let uri = parts.uri.to_string();
        let request_path = parts.uri.path().to_string();
        let secret = self
            .config
            .api_key
            .as_ref()
            .map(|key| key.as_ref().to_string())
            .unwrap_or_default();

        if self.config.verbose {
            body = rewrite::snapshot_request(&parts, body, &self.sink, &secret).await?;
        }

        let outgoing = Request::from_parts(parts, body);
        let response = tokio::time::timeout(
            self.config.request_timeout,
            self.client.request(outgoing),
        )
        .await
        .map_err(|_| ProxyError::UpstreamTimeout(self.config.request_timeout))?
        .map_err(|e| ProxyError::Upstream(e.to_string()))?;

        let (mut parts, incoming) = response.into_parts();
        let mut body = Body::new(incoming);

        response::strip_conflicting_length(&mut parts);

        if request_path.ends_with(paths::VERSION_SUFFIX) && response::is_json(&parts.headers) {
            body = response::patch_version(&mut parts, body, &self.config.version_fallback).await?;
        }

        // Error bodies are small enough to read eagerly; everything still
        // chunked (or anything in verbose mode) is observed as it streams.
        let still_chunked = response::is_chunked(&parts.headers);
        if parts.status.as_u16() >= 400 && !still_chunked {
            body = response::capture_error_snippet(
                &parts,
                body,
                &method,
                &uri,
                &self.sink,
                &secret,
            )
            .await?;
        } else if still_chunked || self.config.verbose {
            let meta = CaptureMeta {
                method,
                uri,
                status: parts.status.as_u16(),
                headers: headers::dump(&parts.headers),
            };
            body = Body::new(CaptureBody::new(
                body,
                meta,
                self.sink.clone(),
                secret,
                MAX_CAPTURE_BYTES,
            ));
        }

        Ok(Response::from_parts(parts, body))
    }
}

/// Catch-all handler: forward everything that is not the health check.
async fn proxy_handler(
    State(service): State<Arc<ProxyService>>,
    request: Request<Body>,
) -> Result<Response<Body>, ProxyError> {
    let client_addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    service.forward(request, &client_addr).await
}

/// Liveness probe answered locally, never forwarded upstream.
async fn health_handler() -> &'static str {
    "ok"
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        // The detail stays in the logs; the client sees a uniform 502.
        tracing::error!(error = %self, "proxy error");
        (StatusCode::BAD_GATEWAY, "Bad Gateway").into_response()
    }
}
