//! Construction-time configuration.

use std::time::Duration;

use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://api.skyinfer.ai/";
pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// Fully-resolved configuration handed to client construction.
///
/// The core never consults ambient state; environment defaults are applied
/// by [`crate::ClientBuilder`] at the construction edge.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: Url,
    pub connect_timeout: Option<Duration>,
    /// Applied to buffered calls only; streaming bodies stay open for as
    /// long as the server keeps producing frames.
    pub request_timeout: Option<Duration>,
    pub pool_idle_timeout: Option<Duration>,
    /// Default attempt budget for retried operations; overridable per call.
    pub max_retries: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: Url::parse(DEFAULT_BASE_URL).expect("default base url is well-formed"),
            connect_timeout: Some(Duration::from_secs(10)),
            request_timeout: None,
            pool_idle_timeout: Some(Duration::from_secs(90)),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}
