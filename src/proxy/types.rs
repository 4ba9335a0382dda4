//! Type definitions for the proxy module

use nutype::nutype;
use std::time::Duration;
use thiserror::Error;

/// Upstream origin the proxy forwards to
#[nutype(
    derive(Clone, Debug, Display, PartialEq, Eq, TryFrom, AsRef),
    validate(predicate = |s: &str| s.starts_with("http://") || s.starts_with("https://")),
)]
pub struct UpstreamUrl(String);

/// API key injected as a bearer credential.
///
/// Deliberately carries no `Debug` or `Display` derive: the key is a secret
/// and must never reach log output through a formatting shortcut.
#[nutype(
    derive(Clone, PartialEq, Eq, TryFrom, AsRef),
    validate(predicate = |s: &str| !s.is_empty()),
)]
pub struct ApiKey(String);

/// Version string substituted when the upstream reports a bad sentinel
#[nutype(
    derive(Clone, Debug, Display, PartialEq, Eq, TryFrom, AsRef, Default),
    validate(predicate = |s: &str| !s.is_empty()),
    default = "0.15.2",
)]
pub struct VersionFallback(String);

/// Proxy configuration, immutable once the service is constructed
#[derive(Clone)]
pub struct ProxyConfig {
    /// Upstream origin; path and query of each request are preserved
    pub upstream: UpstreamUrl,
    /// Credential to inject; `None` leaves requests untouched
    pub api_key: Option<ApiKey>,
    /// Keep a client-supplied `Authorization` header instead of overwriting
    pub preserve_auth: bool,
    /// Emit request/response diagnostics to the sink
    pub verbose: bool,
    /// Replacement value for the version patch
    pub version_fallback: VersionFallback,
    /// Time allowed until upstream response headers arrive. Body streaming
    /// is not bounded by this.
    pub request_timeout: Duration,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            upstream: UpstreamUrl::try_new("https://ollama.com".to_string())
                .expect("default upstream is a valid URL"),
            api_key: None,
            preserve_auth: false,
            verbose: false,
            version_fallback: VersionFallback::default(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Errors that can occur in the proxy
#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("invalid upstream URL: {0}")]
    InvalidUpstreamUrl(String),

    #[error("upstream request timed out after {0:?}")]
    UpstreamTimeout(Duration),

    #[error("upstream request failed: {0}")]
    Upstream(String),

    #[error("failed to read body: {0}")]
    BodyRead(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid value for header {0}")]
    InvalidHeader(&'static str),
}

/// Result type for proxy operations
pub type ProxyResult<T> = Result<T, ProxyError>;
