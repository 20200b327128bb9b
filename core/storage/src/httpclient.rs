//! HTTP transport settings for network backends.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use polystore_common::{Error, Result};

/// Transport tuning passed through the `http_client_options` pair.
///
/// Unset fields keep reqwest's defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpClientOptions {
    pub connect_timeout_ms: Option<u64>,
    /// Whole-request timeout, including reading the body.
    pub request_timeout_ms: Option<u64>,
    pub pool_idle_timeout_ms: Option<u64>,
    pub pool_max_idle_per_host: Option<usize>,
    pub user_agent: Option<String>,
}

impl HttpClientOptions {
    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_ms.map(Duration::from_millis)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }

    /// Build a client with these settings.
    pub fn build(&self) -> Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder();

        if let Some(timeout) = self.connect_timeout() {
            builder = builder.connect_timeout(timeout);
        }
        if let Some(timeout) = self.request_timeout() {
            builder = builder.timeout(timeout);
        }
        if let Some(ms) = self.pool_idle_timeout_ms {
            builder = builder.pool_idle_timeout(Duration::from_millis(ms));
        }
        if let Some(n) = self.pool_max_idle_per_host {
            builder = builder.pool_max_idle_per_host(n);
        }
        if let Some(agent) = &self.user_agent {
            builder = builder.user_agent(agent.as_str());
        }

        builder.build().map_err(Error::unexpected)
    }
}
