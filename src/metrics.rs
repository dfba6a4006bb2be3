use std::sync::atomic::{AtomicUsize, Ordering};

/// Runtime metrics for one collection run.
///
/// Purpose:
/// - Track request volume against the market
/// - Track unit outcomes (found / not found / unavailable / skipped)
/// - Track failure classes (429s, transient errors, proxy failures)
///
/// Design:
/// - Lock-free (Atomics)
/// - Owned by the collector context and shared via `Arc`
#[derive(Debug, Default)]
pub struct RuntimeMetrics {
    // Requests
    pub requests_sent: AtomicUsize,
    pub rate_limited: AtomicUsize,
    pub transient_errors: AtomicUsize,
    pub proxy_failures: AtomicUsize,

    // Units
    pub found: AtomicUsize,
    pub not_found: AtomicUsize,
    pub unavailable: AtomicUsize,
    pub skipped: AtomicUsize,
}

/// Plain copy of the counters, taken at one point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub requests_sent: usize,
    pub rate_limited: usize,
    pub transient_errors: usize,
    pub proxy_failures: usize,
    pub found: usize,
    pub not_found: usize,
    pub unavailable: usize,
    pub skipped: usize,
}

impl MetricsSnapshot {
    /// Units that went through the market client in this run.
    pub fn processed(&self) -> usize {
        self.found + self.not_found + self.unavailable
    }
}

impl RuntimeMetrics {
    pub fn incr(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests_sent: self.requests_sent.load(Ordering::Relaxed),
            rate_limited: self.rate_limited.load(Ordering::Relaxed),
            transient_errors: self.transient_errors.load(Ordering::Relaxed),
            proxy_failures: self.proxy_failures.load(Ordering::Relaxed),
            found: self.found.load(Ordering::Relaxed),
            not_found: self.not_found.load(Ordering::Relaxed),
            unavailable: self.unavailable.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
        }
    }
}
