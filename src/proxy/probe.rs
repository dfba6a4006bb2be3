use std::time::{Duration, Instant};

use super::record::ProxyRecord;

/// Lightweight reachability check for a single proxy.
///
/// The pool only depends on this trait, so health checks can be
/// exercised without real network access.
#[async_trait::async_trait]
pub trait ProxyProbe: Send + Sync {
    /// Returns the round-trip latency on success, a short reason on failure.
    async fn probe(&self, proxy: &ProxyRecord) -> Result<Duration, String>;
}

/// Probes a proxy by fetching a small URL through it.
pub struct HttpProbe {
    url: String,
    timeout: Duration,
    user_agent: String,
}

impl HttpProbe {
    pub fn new(url: impl Into<String>, timeout: Duration, user_agent: impl Into<String>) -> Self {
        crate::install_crypto_provider();
        Self {
            url: url.into(),
            timeout,
            user_agent: user_agent.into(),
        }
    }
}

#[async_trait::async_trait]
impl ProxyProbe for HttpProbe {
    async fn probe(&self, proxy: &ProxyRecord) -> Result<Duration, String> {
        let client = reqwest::Client::builder()
            .proxy(proxy.to_reqwest().map_err(|e| e.to_string())?)
            .timeout(self.timeout)
            .user_agent(self.user_agent.as_str())
            .build()
            .map_err(|e| e.to_string())?;

        let started = Instant::now();
        let response = client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if response.status().is_success() {
            Ok(started.elapsed())
        } else {
            Err(format!("probe returned HTTP {}", response.status()))
        }
    }
}
