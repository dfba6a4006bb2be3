use chrono::Utc;
use futures_util::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use super::probe::ProxyProbe;
use super::record::{ProxyHealth, ProxyRecord};
use crate::shutdown::Shutdown;

/// Result of one request routed through a proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyOutcome {
    Success,
    Failure,
}

/// Thresholds driving health transitions.
#[derive(Debug, Clone, Copy)]
pub struct PoolSettings {
    /// Consecutive failures that turn a proxy Dead
    pub max_failures: u32,
    /// Failed re-checks of a Dead proxy before it is removed
    pub max_failed_checks: u32,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_failures: 3,
            max_failed_checks: 1,
        }
    }
}

/// ============================================================
/// ProxyPool
/// ============================================================
///
/// Set of egress proxies with health state.
///
/// Selection:
/// - Round-robin over Healthy proxies
/// - Falls back to Degraded proxies when none is Healthy
/// - Returns `None` (direct connection) when nothing is usable
///
/// Health:
/// - Every routed request is reported back via `report`
/// - `max_failures` consecutive failures turn a proxy Dead
/// - `health_check` re-probes Degraded / Dead proxies, restoring
///   or removing them
///
/// All mutation goes through one async mutex. The rate limiter keeps
/// traffic low enough that contention is irrelevant.
pub struct ProxyPool {
    settings: PoolSettings,
    probe: Arc<dyn ProxyProbe>,
    inner: Mutex<PoolState>,
}

#[derive(Default)]
struct PoolState {
    proxies: Vec<ProxyRecord>,
    cursor: usize,
}

impl PoolState {
    fn find_mut(&mut self, address: &str) -> Option<&mut ProxyRecord> {
        self.proxies.iter_mut().find(|p| p.address() == address)
    }

    /// Next candidate of the given health in round-robin order.
    fn next_with(&mut self, health: ProxyHealth, exclude: &[String]) -> Option<ProxyRecord> {
        let candidates: Vec<usize> = self
            .proxies
            .iter()
            .enumerate()
            .filter(|(_, p)| p.health == health && !exclude.contains(&p.address()))
            .map(|(i, _)| i)
            .collect();

        if candidates.is_empty() {
            return None;
        }

        let idx = candidates[self.cursor % candidates.len()];
        self.cursor = self.cursor.wrapping_add(1);
        Some(self.proxies[idx].clone())
    }
}

/// Point-in-time view of the pool, for logs and reports.
#[derive(Debug, Clone, Serialize)]
pub struct PoolStats {
    pub total: usize,
    pub healthy: usize,
    pub degraded: usize,
    pub dead: usize,
    pub proxies: Vec<ProxyStat>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProxyStat {
    pub address: String,
    pub health: ProxyHealth,
    pub success_count: u64,
    pub failure_count: u64,
    pub avg_latency_ms: f64,
    pub last_checked: Option<String>,
}

impl ProxyPool {
    pub fn new(proxies: Vec<ProxyRecord>, settings: PoolSettings, probe: Arc<dyn ProxyProbe>) -> Self {
        Self {
            settings,
            probe,
            inner: Mutex::new(PoolState {
                proxies,
                cursor: 0,
            }),
        }
    }

    /// Picks an egress proxy, or `None` for a direct connection.
    pub async fn select(&self) -> Option<ProxyRecord> {
        self.select_excluding(&[]).await
    }

    /// Like `select`, skipping the given addresses. Used to fail over
    /// to a different route after a proxy error.
    pub async fn select_excluding(&self, exclude: &[String]) -> Option<ProxyRecord> {
        let mut state = self.inner.lock().await;
        state
            .next_with(ProxyHealth::Healthy, exclude)
            .or_else(|| state.next_with(ProxyHealth::Degraded, exclude))
    }

    /// Records the outcome of a request routed through `address`.
    ///
    /// Reports for proxies that were removed meanwhile are ignored.
    pub async fn report(&self, address: &str, outcome: ProxyOutcome, latency: Option<Duration>) {
        let max_failures = self.settings.max_failures;
        let mut state = self.inner.lock().await;
        let Some(proxy) = state.find_mut(address) else {
            return;
        };
        proxy.last_checked = Some(Utc::now());

        match outcome {
            ProxyOutcome::Success => {
                proxy.success_count += 1;
                proxy.consecutive_failures = 0;
                if let Some(latency) = latency {
                    proxy.record_latency(latency.as_micros() as f64 / 1000.0);
                }
                // Dead proxies only come back through a health check
                if proxy.health == ProxyHealth::Degraded {
                    proxy.health = ProxyHealth::Healthy;
                }
            }
            ProxyOutcome::Failure => {
                proxy.failure_count += 1;
                proxy.consecutive_failures += 1;

                if proxy.consecutive_failures >= max_failures {
                    if proxy.health != ProxyHealth::Dead {
                        log::warn!(
                            "Proxy {} marked dead after {} consecutive failures",
                            address,
                            proxy.consecutive_failures
                        );
                    }
                    proxy.health = ProxyHealth::Dead;
                } else if proxy.health == ProxyHealth::Healthy {
                    log::debug!("Proxy {} degraded", address);
                    proxy.health = ProxyHealth::Degraded;
                }
            }
        }
    }

    /// Re-probes every Degraded or Dead proxy.
    ///
    /// - Probe success: failures reset, proxy Healthy again
    /// - Probe failure on Degraded: counts as one more failure
    /// - Probe failure on Dead: counts a failed check; reaching
    ///   `max_failed_checks` removes the proxy permanently
    pub async fn health_check(&self) {
        let targets: Vec<ProxyRecord> = {
            let state = self.inner.lock().await;
            state
                .proxies
                .iter()
                .filter(|p| p.health != ProxyHealth::Healthy)
                .cloned()
                .collect()
        };

        if targets.is_empty() {
            log::debug!("Proxy health check: nothing to re-check");
            return;
        }

        log::info!("Proxy health check: probing {} proxies", targets.len());
        let results = join_all(targets.iter().map(|p| self.probe.probe(p))).await;

        let mut state = self.inner.lock().await;
        let mut removed = Vec::new();

        for (target, result) in targets.iter().zip(results) {
            let address = target.address();
            let Some(proxy) = state.find_mut(&address) else {
                continue;
            };
            proxy.last_checked = Some(Utc::now());

            match result {
                Ok(latency) => {
                    proxy.health = ProxyHealth::Healthy;
                    proxy.consecutive_failures = 0;
                    proxy.failed_checks = 0;
                    proxy.success_count += 1;
                    proxy.record_latency(latency.as_micros() as f64 / 1000.0);
                    log::info!("Proxy {} restored", address);
                }
                Err(reason) => {
                    proxy.failure_count += 1;
                    log::debug!("Proxy {} probe failed: {}", address, reason);

                    if proxy.health == ProxyHealth::Dead {
                        proxy.failed_checks += 1;
                        if proxy.failed_checks >= self.settings.max_failed_checks {
                            removed.push(address);
                        }
                    } else {
                        proxy.consecutive_failures += 1;
                        if proxy.consecutive_failures >= self.settings.max_failures {
                            proxy.health = ProxyHealth::Dead;
                        }
                    }
                }
            }
        }

        if !removed.is_empty() {
            state.proxies.retain(|p| !removed.contains(&p.address()));
            log::warn!("Removed {} dead proxies: {}", removed.len(), removed.join(", "));
        }

        let healthy = state
            .proxies
            .iter()
            .filter(|p| p.health == ProxyHealth::Healthy)
            .count();
        log::info!(
            "Proxy health check completed: {}/{} healthy",
            healthy,
            state.proxies.len()
        );
    }

    /// Probes every proxy once and drops the ones that fail.
    pub async fn validate_all(&self) {
        let targets: Vec<ProxyRecord> = self.inner.lock().await.proxies.clone();
        log::info!("Validating {} proxies...", targets.len());

        let results = join_all(targets.iter().map(|p| self.probe.probe(p))).await;
        let failed: Vec<String> = targets
            .iter()
            .zip(results)
            .filter(|(_, r)| r.is_err())
            .map(|(p, _)| p.address())
            .collect();

        let mut state = self.inner.lock().await;
        state.proxies.retain(|p| !failed.contains(&p.address()));
        log::info!(
            "Proxy validation: {} working, {} dropped",
            state.proxies.len(),
            failed.len()
        );
    }

    /// Spawns the periodic health check loop. Stops on shutdown.
    pub fn spawn_health_monitor(self: Arc<Self>, interval: Duration, shutdown: Shutdown) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // first tick fires immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => self.health_check().await,
                    _ = shutdown.wait() => break,
                }
            }
            log::debug!("Proxy health monitor stopped");
        })
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.proxies.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn get(&self, address: &str) -> Option<ProxyRecord> {
        let mut state = self.inner.lock().await;
        state.find_mut(address).map(|p| p.clone())
    }

    pub async fn stats(&self) -> PoolStats {
        let state = self.inner.lock().await;
        let count = |h: ProxyHealth| state.proxies.iter().filter(|p| p.health == h).count();

        PoolStats {
            total: state.proxies.len(),
            healthy: count(ProxyHealth::Healthy),
            degraded: count(ProxyHealth::Degraded),
            dead: count(ProxyHealth::Dead),
            proxies: state
                .proxies
                .iter()
                .map(|p| ProxyStat {
                    address: p.address(),
                    health: p.health,
                    success_count: p.success_count,
                    failure_count: p.failure_count,
                    avg_latency_ms: p.avg_latency_ms,
                    last_checked: p.last_checked.map(|t| t.to_rfc3339()),
                })
                .collect(),
        }
    }
}
