//! HTTP client with connection pooling

use kiln_config::NetworkConfig;
use kiln_errors::{Error, NetworkError};
use reqwest::header::RANGE;
use reqwest::{Client, Response};
use std::time::Duration;

use crate::download::RetryConfig;

/// Network client configuration
#[derive(Debug, Clone)]
pub struct NetConfig {
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub pool_idle_timeout: Duration,
    pub pool_max_idle_per_host: usize,
    /// Stall limit for a single body chunk
    pub chunk_timeout: Duration,
    pub retry: RetryConfig,
    pub user_agent: String,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300), // 5 minutes for large archives
            connect_timeout: Duration::from_secs(30),
            pool_idle_timeout: Duration::from_secs(90),
            pool_max_idle_per_host: 10,
            chunk_timeout: Duration::from_secs(30),
            retry: RetryConfig::default(),
            user_agent: format!("kiln/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl From<&NetworkConfig> for NetConfig {
    fn from(config: &NetworkConfig) -> Self {
        Self {
            timeout: Duration::from_secs(config.timeout),
            retry: RetryConfig {
                max_retries: config.retries,
                initial_delay: Duration::from_millis(config.retry_delay),
                ..RetryConfig::default()
            },
            user_agent: config.user_agent.clone(),
            ..Self::default()
        }
    }
}

/// Thin wrapper over a pooled `reqwest::Client`
///
/// Each call sends exactly one request; retry policy lives with the caller,
/// which knows how much of the body it already holds.
#[derive(Clone, Debug)]
pub struct NetClient {
    client: Client,
    config: NetConfig,
}

impl NetClient {
    /// Create a new network client
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying reqwest client fails to initialize.
    pub fn new(config: NetConfig) -> Result<Self, Error> {
        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(config.pool_idle_timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| NetworkError::ConnectionRefused(e.to_string()))?;

        Ok(Self { client, config })
    }

    /// Create with default configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn with_defaults() -> Result<Self, Error> {
        Self::new(NetConfig::default())
    }

    #[must_use]
    pub fn config(&self) -> &NetConfig {
        &self.config
    }

    /// Send a GET, optionally asking for the body from `offset` onwards
    ///
    /// # Errors
    ///
    /// Returns a network error if the request cannot be sent.
    pub async fn get_from(&self, url: &str, offset: Option<u64>) -> Result<Response, Error> {
        let mut request = self.client.get(url);
        if let Some(offset) = offset {
            request = request.header(RANGE, format!("bytes={offset}-"));
        }
        request.send().await.map_err(|e| map_reqwest_error(url, &e))
    }
}

pub(crate) fn map_reqwest_error(url: &str, error: &reqwest::Error) -> Error {
    if error.is_timeout() {
        NetworkError::Timeout {
            url: url.to_string(),
        }
        .into()
    } else if error.is_connect() {
        NetworkError::ConnectionRefused(error.to_string()).into()
    } else {
        NetworkError::DownloadFailed(error.to_string()).into()
    }
}
