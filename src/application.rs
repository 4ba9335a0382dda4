use crate::config::Settings;
use crate::error::Error;
use crate::proxy::types::{ApiKey, UpstreamUrl, VersionFallback};
use crate::proxy::{ProxyConfig, ProxyService};
use crate::Result;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, instrument};

/// Main application struct that wires configuration to the proxy server
pub struct Application {
    settings: Settings,
    router: axum::Router,
}

impl Application {
    #[instrument]
    pub fn new() -> Result<Self> {
        let settings = Settings::new()?;
        let config = proxy_config(&settings)?;

        // The key itself must never be logged; presence is enough.
        info!(
            upstream = %settings.upstream.url,
            api_key_present = config.api_key.is_some(),
            preserve_auth = config.preserve_auth,
            verbose = config.verbose,
            "proxy configured"
        );

        let router = ProxyService::new(config)?.into_router();
        Ok(Self { settings, router })
    }

    #[instrument(skip(self))]
    pub async fn run(self) -> Result<()> {
        let address = self.settings.bind_address();
        let listener = TcpListener::bind(&address).await?;
        info!("Listening on {address}");

        axum::serve(
            listener,
            self.router
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await?;

        info!("Server shut down");
        Ok(())
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }
}

fn proxy_config(settings: &Settings) -> Result<ProxyConfig> {
    let upstream = UpstreamUrl::try_new(settings.upstream.url.clone())
        .map_err(|e| Error::InvalidConfig(format!("upstream.url: {e}")))?;

    let api_key = settings
        .upstream
        .api_key
        .clone()
        .map(ApiKey::try_new)
        .transpose()
        .map_err(|e| Error::InvalidConfig(format!("upstream.api_key: {e}")))?;

    let version_fallback = match settings.upstream.version_fallback.clone() {
        Some(value) => VersionFallback::try_new(value)
            .map_err(|e| Error::InvalidConfig(format!("upstream.version_fallback: {e}")))?,
        None => VersionFallback::default(),
    };

    Ok(ProxyConfig {
        upstream,
        api_key,
        preserve_auth: settings.upstream.preserve_auth,
        verbose: settings.logging.verbose,
        version_fallback,
        request_timeout: Duration::from_secs(settings.upstream.request_timeout_secs),
    })
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => tracing::error!("Failed to listen for shutdown signal: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn application_can_be_created_from_defaults() {
        let app = Application::new().expect("Failed to create application");
        assert!(app.settings().application.port > 0);
    }

    #[test]
    fn invalid_upstream_url_is_rejected() {
        let mut settings = Settings::new().unwrap();
        settings.upstream.url = "not-a-url".to_string();
        assert!(matches!(
            proxy_config(&settings),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn empty_api_key_is_rejected() {
        let mut settings = Settings::new().unwrap();
        settings.upstream.api_key = Some(String::new());
        assert!(matches!(
            proxy_config(&settings),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn missing_fallback_uses_default() {
        let settings = Settings::new().unwrap();
        let config = proxy_config(&settings).unwrap();
        assert_eq!(config.version_fallback.as_ref(), "0.15.2");
    }
}
