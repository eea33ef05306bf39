//! Client construction with environment-variable defaults.
//!
//! The environment is consulted only here, at the construction edge; the
//! clients themselves receive a finished [`ClientConfig`]. Explicit builder
//! settings always win over the environment.

use std::env;
use std::time::Duration;

use url::Url;

use crate::client::{blocking, Client};
use crate::config::ClientConfig;
use crate::Result;

/// Builder for both client flavors.
///
/// Recognized environment defaults: `SKYINFER_DSN` (base URL),
/// `SKYINFER_MAX_RETRIES`, `SKYINFER_CONNECT_TIMEOUT`,
/// `SKYINFER_READ_TIMEOUT`, `SKYINFER_POOL_TIMEOUT` (all timeouts in
/// seconds).
pub struct ClientBuilder {
    api_key: String,
    model: Option<String>,
    base_url: Option<String>,
    connect_timeout: Option<Duration>,
    request_timeout: Option<Duration>,
    pool_idle_timeout: Option<Duration>,
    max_retries: Option<u32>,
}

impl ClientBuilder {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: None,
            base_url: None,
            connect_timeout: None,
            request_timeout: None,
            pool_idle_timeout: None,
            max_retries: None,
        }
    }

    /// Target model as `<owner username>/<project>`.
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Override the service base URL (primarily for tests against mock
    /// servers).
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Total timeout for buffered calls; streaming calls are unaffected.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn pool_idle_timeout(mut self, timeout: Duration) -> Self {
        self.pool_idle_timeout = Some(timeout);
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub(crate) fn resolve_config(&self) -> Result<ClientConfig> {
        let mut config = ClientConfig::default();
        if let Some(dsn) = self
            .base_url
            .clone()
            .or_else(|| env::var("SKYINFER_DSN").ok())
        {
            config.base_url = Url::parse(&dsn)?;
        }
        config.max_retries = self
            .max_retries
            .or_else(|| {
                env::var("SKYINFER_MAX_RETRIES")
                    .ok()
                    .and_then(|raw| raw.parse().ok())
            })
            .unwrap_or(config.max_retries);
        config.connect_timeout = self
            .connect_timeout
            .or_else(|| env_secs("SKYINFER_CONNECT_TIMEOUT"))
            .or(config.connect_timeout);
        config.request_timeout = self
            .request_timeout
            .or_else(|| env_secs("SKYINFER_READ_TIMEOUT"));
        config.pool_idle_timeout = self
            .pool_idle_timeout
            .or_else(|| env_secs("SKYINFER_POOL_TIMEOUT"))
            .or(config.pool_idle_timeout);
        Ok(config)
    }

    pub fn build(self) -> Result<Client> {
        let config = self.resolve_config()?;
        Client::new(&self.api_key, self.model.as_deref(), config)
    }

    pub fn build_blocking(self) -> Result<blocking::Client> {
        let config = self.resolve_config()?;
        blocking::Client::new(&self.api_key, self.model.as_deref(), config)
    }
}

fn env_secs(name: &str) -> Option<Duration> {
    env::var(name)
        .ok()
        .and_then(|raw| raw.parse::<u64>().ok())
        .map(Duration::from_secs)
}
