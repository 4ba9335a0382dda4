use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub application: ApplicationSettings,
    pub upstream: UpstreamSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApplicationSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct UpstreamSettings {
    /// Origin the proxy forwards to; scheme and authority only
    pub url: String,
    /// Bearer credential injected on outbound requests. No default: the
    /// value never appears in files checked into the repo.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Keep a client-supplied `Authorization` header instead of overwriting
    pub preserve_auth: bool,
    /// Replacement for known-bad upstream version sentinels
    #[serde(default)]
    pub version_fallback: Option<String>,
    /// Seconds allowed until upstream response headers arrive
    pub request_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSettings {
    /// Emit redacted request/response diagnostics
    pub verbose: bool,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Start with default values
            .set_default("application.host", "127.0.0.1")?
            .set_default("application.port", 11434)?
            .set_default("upstream.url", "https://ollama.com")?
            .set_default("upstream.preserve_auth", false)?
            .set_default("upstream.request_timeout_secs", 30)?
            .set_default("logging.verbose", false)?
            // Add configuration file if it exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{environment}")).required(false))
            .add_source(File::with_name("config/local").required(false))
            // Add environment variables with prefix
            .add_source(Environment::with_prefix("BEARER_RELAY").separator("__"))
            .build()?;

        config.try_deserialize()
    }

    /// Socket address string the server binds to.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.application.host, self.application.port)
    }
}
