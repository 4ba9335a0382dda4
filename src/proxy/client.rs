//! Upstream transport
//!
//! A pooled hyper client over a rustls connector. All tuning lives here:
//! dial timeout, TLS handshake deadline, keep-alive, pool bounds, and a
//! pinned minimum TLS version. One attempt per request; failures propagate
//! to the service layer.

use axum::body::Body;
use hyper::Uri;
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

/// Per-dial timeout
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
/// Margin allowed for the TLS handshake beyond the dial
pub const TLS_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
/// TCP keep-alive interval
pub const TCP_KEEPALIVE: Duration = Duration::from_secs(30);
/// How long an idle pooled connection is kept around
pub const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);
/// Idle connections retained per upstream host
pub const MAX_IDLE_PER_HOST: usize = 32;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Client type used for all upstream requests
pub type UpstreamClient = Client<HandshakeTimeout<HttpsConnector<HttpConnector>>, Body>;

/// Build the upstream client. TLS verification is always on, rooted in the
/// webpki bundle, with TLS 1.2 as the floor.
pub fn build_client() -> UpstreamClient {
    let mut roots = rustls::RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let tls = rustls::ClientConfig::builder_with_protocol_versions(&[
        &rustls::version::TLS13,
        &rustls::version::TLS12,
    ])
    .with_root_certificates(roots)
    .with_no_client_auth();

    let mut http = HttpConnector::new();
    http.enforce_http(false);
    http.set_connect_timeout(Some(CONNECT_TIMEOUT));
    http.set_keepalive(Some(TCP_KEEPALIVE));

    let https = hyper_rustls::HttpsConnectorBuilder::new()
        .with_tls_config(tls)
        .https_or_http()
        .enable_http1()
        .wrap_connector(http);

    // The inner connector bounds the TCP dial; the outer deadline covers
    // dial plus TLS handshake, so a peer that accepts the connection but
    // stalls mid-handshake cannot hold the slot open indefinitely.
    let connector = HandshakeTimeout::new(https, CONNECT_TIMEOUT + TLS_HANDSHAKE_TIMEOUT);

    Client::builder(TokioExecutor::new())
        .pool_idle_timeout(POOL_IDLE_TIMEOUT)
        .pool_max_idle_per_host(MAX_IDLE_PER_HOST)
        .build(connector)
}

/// Connector wrapper that puts a deadline on the whole connection attempt,
/// including the TLS handshake the inner connector's dial timeout does not
/// cover.
#[derive(Clone)]
pub struct HandshakeTimeout<C> {
    inner: C,
    timeout: Duration,
}

impl<C> HandshakeTimeout<C> {
    pub fn new(inner: C, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

impl<C> tower::Service<Uri> for HandshakeTimeout<C>
where
    C: tower::Service<Uri>,
    C::Future: Send + 'static,
    C::Error: Into<BoxError>,
{
    type Response = C::Response;
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<C::Response, BoxError>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, dst: Uri) -> Self::Future {
        let deadline = self.timeout;
        let connecting = self.inner.call(dst);
        Box::pin(async move {
            match tokio::time::timeout(deadline, connecting).await {
                Ok(result) => result.map_err(Into::into),
                Err(_) => Err(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    format!("connection attempt exceeded {deadline:?} (TLS handshake stalled?)"),
                )
                .into()),
            }
        })
    }
}
