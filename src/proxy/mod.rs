//! Reverse proxy core
//!
//! Forwards HTTP traffic to a single configured upstream, injecting a bearer
//! credential, maintaining forwarding headers, sanitizing response framing,
//! patching the upstream's broken version endpoint, and capturing redacted
//! diagnostics without ever buffering a streamed response.

pub mod capture;
pub mod client;
pub mod headers;
pub mod middleware;
pub mod redact;
pub mod response;
pub mod rewrite;
pub mod service;
pub mod sink;
pub mod types;


pub use service::ProxyService;
pub use types::{ProxyConfig, ProxyError, ProxyResult};
