//! bearer-relay - a credential-injecting reverse proxy for Ollama-style APIs
//!
//! Forwards local HTTP traffic to a single configured upstream, attaching a
//! bearer credential, repairing the upstream's broken version endpoint, and
//! logging redacted diagnostics without buffering streamed responses.

pub mod application;
pub mod config;
pub mod error;
pub mod proxy;

pub use application::Application;
pub use error::{Error, Result};
