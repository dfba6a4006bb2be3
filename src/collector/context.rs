use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::checkpoint::CheckpointStore;
use crate::config::Config;
use crate::error::{CollectorError, Result};
use crate::limiter::RateLimiter;
use crate::market::{get_adapter, ClientSettings, MarketClient};
use crate::metrics::RuntimeMetrics;
use crate::proxy::{load_proxies, HttpProbe, PoolSettings, ProxyPool};
use crate::shutdown::Shutdown;

/// Everything one collection run needs, built once at startup.
///
/// LIFECYCLE:
/// - `build`: checkpoint loaded first (no network), then the
///   proxy pool (may fetch a remote list), then the market client
/// - `finish`: stops proxy health monitoring, flushes the
///   checkpoint and logs the final statistics
///
/// The driver borrows the context mutably; the checkpoint store is
/// the only component it mutates directly.
pub struct CollectorContext {
    pub config: Config,
    pub limiter: Arc<RateLimiter>,
    pub pool: Option<Arc<ProxyPool>>,
    pub client: MarketClient,
    pub store: CheckpointStore,
    pub metrics: Arc<RuntimeMetrics>,
    pub shutdown: Shutdown,
    health_monitor: Option<JoinHandle<()>>,
}

impl CollectorContext {
    pub async fn build(config: Config, shutdown: Shutdown) -> Result<Self> {
        config.validate()?;

        let store = CheckpointStore::load(&config.checkpoint_path, config.resume).await?;

        let adapter = get_adapter(&config.market_adapter, &config).ok_or_else(|| {
            CollectorError::Config(format!("market adapter '{}' is not supported", config.market_adapter))
        })?;
        log::info!("Market adapter: {} ({})", adapter.name(), adapter.endpoint());

        let limiter = Arc::new(RateLimiter::new(
            config.rate_limit_count,
            config.rate_limit_window(),
        ));
        log::info!(
            "Rate limit: {} requests per {}s",
            limiter.max_requests(),
            limiter.window().as_secs()
        );

        let (pool, health_monitor) = if config.use_proxies {
            build_proxy_pool(&config, shutdown.clone()).await
        } else {
            (None, None)
        };

        let metrics = Arc::new(RuntimeMetrics::default());
        let client = MarketClient::new(
            adapter,
            limiter.clone(),
            pool.clone(),
            ClientSettings::from_config(&config),
            metrics.clone(),
            shutdown.clone(),
        )?;

        Ok(Self {
            config,
            limiter,
            pool,
            client,
            store,
            metrics,
            shutdown,
            health_monitor,
        })
    }

    /// Tears the context down. Always saves the checkpoint.
    pub async fn finish(mut self) -> Result<()> {
        if let Some(handle) = self.health_monitor.take() {
            handle.abort();
        }

        let saved = self.store.save().await;
        match &saved {
            Ok(()) => log::info!("Checkpoint saved to {}", self.store.path().display()),
            Err(e) => log::error!("Failed to save checkpoint: {}", e),
        }

        if let Some(pool) = &self.pool {
            let stats = pool.stats().await;
            log::info!(
                "Proxy pool: {} total, {} healthy, {} degraded, {} dead",
                stats.total,
                stats.healthy,
                stats.degraded,
                stats.dead
            );
            for p in &stats.proxies {
                log::debug!(
                    "  {} {:?} ok={} fail={} avg={:.0}ms",
                    p.address,
                    p.health,
                    p.success_count,
                    p.failure_count,
                    p.avg_latency_ms
                );
            }
        }

        let m = self.metrics.snapshot();
        log::info!(
            "Requests: {} sent for {} units, {} rate limited, {} transient errors, {} proxy failures",
            m.requests_sent,
            m.processed(),
            m.rate_limited,
            m.transient_errors,
            m.proxy_failures
        );

        let (found, not_found, unavailable) = self.store.status_counts();
        log::info!(
            "Checkpoint holds {} results: {} found, {} not found, {} unavailable",
            found + not_found + unavailable,
            found,
            not_found,
            unavailable
        );

        saved
    }
}

/// Loads proxies and starts the health monitor.
///
/// An empty pool is not an error: requests go out directly.
async fn build_proxy_pool(
    config: &Config,
    shutdown: Shutdown,
) -> (Option<Arc<ProxyPool>>, Option<JoinHandle<()>>) {
    let proxies = load_proxies(config).await;
    if proxies.is_empty() {
        return (None, None);
    }

    let probe = Arc::new(HttpProbe::new(
        config.proxy_probe_url.clone(),
        config.proxy_probe_timeout(),
        config.user_agent.clone(),
    ));
    let settings = PoolSettings {
        max_failures: config.proxy_max_failures,
        max_failed_checks: config.proxy_max_failed_checks,
    };
    let pool = Arc::new(ProxyPool::new(proxies, settings, probe));

    if config.proxy_validate_on_startup {
        pool.validate_all().await;
        if pool.is_empty().await {
            log::warn!("No proxy passed validation, using direct connections");
            return (None, None);
        }
    }

    let monitor = pool
        .clone()
        .spawn_health_monitor(config.proxy_health_check_interval(), shutdown);
    log::info!(
        "Proxy health monitor started (every {}s)",
        config.proxy_health_check_interval_seconds
    );

    (Some(pool), Some(monitor))
}
