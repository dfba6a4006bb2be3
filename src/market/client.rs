use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use reqwest::{StatusCode, Url};

use super::adapter::{MarketAdapter, PriceQuote};
use crate::config::Config;
use crate::error::{CollectorError, Result};
use crate::limiter::RateLimiter;
use crate::metrics::RuntimeMetrics;
use crate::proxy::{ProxyOutcome, ProxyPool, ProxyRecord};
use crate::schema::{PriceResult, WorkUnit, WorkUnitId};
use crate::shutdown::Shutdown;

/// Retry and transport settings of the market client.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub request_timeout: Duration,
    /// Cooldown applied to the limiter after an HTTP 429
    pub rate_limit_backoff: Duration,
    /// 429 responses tolerated per unit
    pub rate_limit_max_attempts: u32,
    /// Transient failures tolerated per unit
    pub max_retries: u32,
    /// Flat delay between transient retries
    pub retry_delay: Duration,
    pub currency: String,
    pub user_agent: String,
}

impl ClientSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            request_timeout: config.request_timeout(),
            rate_limit_backoff: config.rate_limit_backoff(),
            rate_limit_max_attempts: config.rate_limit_max_attempts,
            max_retries: config.max_retries,
            retry_delay: config.retry_delay(),
            currency: config.currency.clone(),
            user_agent: config.user_agent.clone(),
        }
    }
}

/// Classified outcome of a single HTTP attempt.
enum Attempt {
    Quote(PriceQuote),
    RateLimited,
    Failed {
        reason: String,
        /// No HTTP response at all (connect error, timeout, reset)
        transport: bool,
    },
}

/// ============================================================
/// MarketClient
/// ============================================================
///
/// Performs price lookups for work units.
///
/// Every attempt:
/// 1. waits for admission from the rate limiter
/// 2. picks an egress route from the proxy pool (if enabled)
/// 3. issues the HTTP call with a per-request timeout
/// 4. reports the route's outcome back to the pool
///
/// Outcome handling per unit:
/// - 200 + price        -> Found
/// - 200 + no listings  -> NotFound
/// - 429                -> limiter cooldown, retried up to
///                         `rate_limit_max_attempts` responses
/// - proxied transport error -> proxy reported, one immediate
///                         fallback via another route
/// - anything else      -> flat-delay retry up to `max_retries`
///
/// A spent budget yields an `Unavailable` result, never an error.
/// The only error returned is `Interrupted`, when shutdown is
/// requested while the client is waiting.
pub struct MarketClient {
    adapter: Arc<dyn MarketAdapter>,
    limiter: Arc<RateLimiter>,
    pool: Option<Arc<ProxyPool>>,
    settings: ClientSettings,
    metrics: Arc<RuntimeMetrics>,
    shutdown: Shutdown,
    direct: reqwest::Client,
    /// One client per proxy address, built on first use
    proxied: Mutex<HashMap<String, reqwest::Client>>,
}

impl MarketClient {
    pub fn new(
        adapter: Arc<dyn MarketAdapter>,
        limiter: Arc<RateLimiter>,
        pool: Option<Arc<ProxyPool>>,
        settings: ClientSettings,
        metrics: Arc<RuntimeMetrics>,
        shutdown: Shutdown,
    ) -> Result<Self> {
        crate::install_crypto_provider();

        // Fail at startup rather than on every lookup
        Url::parse(adapter.endpoint()).map_err(|e| {
            CollectorError::Config(format!("invalid market endpoint {}: {}", adapter.endpoint(), e))
        })?;

        let direct = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .user_agent(settings.user_agent.as_str())
            .build()?;

        Ok(Self {
            adapter,
            limiter,
            pool,
            settings,
            metrics,
            shutdown,
            direct,
            proxied: Mutex::new(HashMap::new()),
        })
    }

    pub fn currency(&self) -> &str {
        &self.settings.currency
    }

    /// Looks up the price of one work unit.
    pub async fn fetch_price(&self, unit: &WorkUnit) -> Result<PriceResult> {
        let id = unit.id();
        let mut rate_limited = 0u32;
        let mut failures = 0u32;
        let mut fallback_used = false;
        let mut excluded: Vec<String> = Vec::new();

        loop {
            self.interruptible(self.limiter.admit()).await?;

            let proxy = match &self.pool {
                Some(pool) => pool.select_excluding(&excluded).await,
                None => None,
            };

            let started = Instant::now();
            let attempt = self
                .interruptible(self.attempt(id.as_str(), proxy.as_ref()))
                .await?;
            let latency = started.elapsed();

            match attempt {
                Attempt::Quote(quote) => {
                    self.report(proxy.as_ref(), ProxyOutcome::Success, latency).await;

                    let result = match quote {
                        PriceQuote::Listed { price, median, volume } => {
                            PriceResult::found(id, price, median, volume, &self.settings.currency)
                        }
                        PriceQuote::NoListings => PriceResult::not_found(id, &self.settings.currency),
                    };
                    return Ok(result);
                }

                Attempt::RateLimited => {
                    // The route delivered an answer; the 429 is about us, not the proxy
                    self.report(proxy.as_ref(), ProxyOutcome::Success, latency).await;
                    RuntimeMetrics::incr(&self.metrics.rate_limited);
                    rate_limited += 1;

                    log::warn!(
                        "Rate limited on {} ({}/{}), cooling down for {}s",
                        id,
                        rate_limited,
                        self.settings.rate_limit_max_attempts,
                        self.settings.rate_limit_backoff.as_secs()
                    );
                    self.limiter.penalize(self.settings.rate_limit_backoff).await;

                    if rate_limited >= self.settings.rate_limit_max_attempts {
                        return Ok(self.give_up(&id, "rate limited"));
                    }
                }

                Attempt::Failed { reason, transport } => {
                    RuntimeMetrics::incr(&self.metrics.transient_errors);

                    let proxy_failed = transport && proxy.is_some();
                    if let Some(p) = &proxy {
                        let outcome = if transport {
                            ProxyOutcome::Failure
                        } else {
                            ProxyOutcome::Success
                        };
                        self.report(Some(p), outcome, latency).await;
                        if transport {
                            RuntimeMetrics::incr(&self.metrics.proxy_failures);
                            excluded.push(p.address());
                        }
                    }

                    // First proxy failure: retry right away through another route
                    if proxy_failed && !fallback_used {
                        fallback_used = true;
                        log::debug!("Proxy failure on {} ({}), falling back", id, reason);
                        continue;
                    }

                    failures += 1;
                    log::debug!(
                        "Lookup failed for {} ({}/{}): {}",
                        id,
                        failures,
                        self.settings.max_retries,
                        reason
                    );

                    if failures >= self.settings.max_retries {
                        return Ok(self.give_up(&id, &reason));
                    }

                    self.interruptible(tokio::time::sleep(self.settings.retry_delay))
                        .await?;
                }
            }
        }
    }

    /// Issues one HTTP call and classifies the response.
    async fn attempt(&self, market_hash_name: &str, proxy: Option<&ProxyRecord>) -> Attempt {
        let client = match proxy {
            Some(p) => match self.client_for(p) {
                Ok(c) => c,
                Err(e) => {
                    return Attempt::Failed {
                        reason: e.to_string(),
                        transport: true,
                    };
                }
            },
            None => self.direct.clone(),
        };

        let url = match Url::parse_with_params(
            self.adapter.endpoint(),
            self.adapter.build_query(market_hash_name),
        ) {
            Ok(url) => url,
            Err(e) => {
                return Attempt::Failed {
                    reason: e.to_string(),
                    transport: false,
                };
            }
        };

        RuntimeMetrics::incr(&self.metrics.requests_sent);

        let response = match client.get(url).send().await {
            Ok(r) => r,
            Err(e) => {
                return Attempt::Failed {
                    reason: e.to_string(),
                    transport: true,
                };
            }
        };

        match response.status() {
            StatusCode::OK => match response.text().await {
                Ok(body) => match self.adapter.parse_response(&body) {
                    Some(quote) => Attempt::Quote(quote),
                    None => Attempt::Failed {
                        reason: "unparsable price payload".to_string(),
                        transport: false,
                    },
                },
                Err(e) => Attempt::Failed {
                    reason: e.to_string(),
                    transport: true,
                },
            },
            StatusCode::TOO_MANY_REQUESTS => Attempt::RateLimited,
            status => Attempt::Failed {
                reason: format!("HTTP {}", status),
                transport: false,
            },
        }
    }

    /// Returns the cached client routed through `proxy`.
    fn client_for(&self, proxy: &ProxyRecord) -> Result<reqwest::Client> {
        let mut clients = self
            .proxied
            .lock()
            .map_err(|_| CollectorError::Config("proxy client cache poisoned".to_string()))?;

        if let Some(client) = clients.get(&proxy.address()) {
            return Ok(client.clone());
        }

        let client = reqwest::Client::builder()
            .proxy(proxy.to_reqwest()?)
            .timeout(self.settings.request_timeout)
            .user_agent(self.settings.user_agent.as_str())
            .build()?;
        clients.insert(proxy.address(), client.clone());
        Ok(client)
    }

    async fn report(&self, proxy: Option<&ProxyRecord>, outcome: ProxyOutcome, latency: Duration) {
        if let (Some(pool), Some(p)) = (&self.pool, proxy) {
            pool.report(&p.address(), outcome, Some(latency)).await;
        }
    }

    fn give_up(&self, id: &WorkUnitId, reason: &str) -> PriceResult {
        log::warn!("Giving up on {}: {}", id, reason);
        PriceResult::unavailable(id.clone(), &self.settings.currency)
    }

    /// Runs `fut` unless shutdown is requested first.
    async fn interruptible<F: Future>(&self, fut: F) -> Result<F::Output> {
        tokio::select! {
            biased;
            _ = self.shutdown.wait() => Err(CollectorError::Interrupted),
            out = fut => Ok(out),
        }
    }
}
