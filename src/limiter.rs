use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep};

/// Sliding-window rate limiter shared by every request path.
///
/// Keeps the instants of past admissions. A new admission is
/// granted only while fewer than `max_requests` of them fall inside
/// the trailing `window`.
///
/// An explicit 429 from the market puts the limiter into a
/// cooldown: no admission is granted until it expires, regardless
/// of the window count.
///
/// The window is not persisted. A restarted process starts empty,
/// which can only under-count history.
#[derive(Debug)]
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    inner: Mutex<LimiterState>,
}

/// Why an admission was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Wait {
    /// Explicit 429 cooldown still running
    Cooldown(Duration),
    /// Window full
    Saturated(Duration),
}

#[derive(Debug, Default)]
struct LimiterState {
    admitted: VecDeque<Instant>,
    cooldown_until: Option<Instant>,
}

impl LimiterState {
    /// Drops admissions that left the window.
    fn trim(&mut self, now: Instant, window: Duration) {
        while let Some(&oldest) = self.admitted.front() {
            if now.duration_since(oldest) >= window {
                self.admitted.pop_front();
            } else {
                break;
            }
        }
    }
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests: max_requests.max(1),
            window,
            inner: Mutex::new(LimiterState::default()),
        }
    }

    /// Waits until a request may be issued, then records it.
    ///
    /// The check is repeated after every sleep: another caller may
    /// have taken the freed slot in the meantime.
    pub async fn admit(&self) {
        loop {
            let wait = match self.try_admit().await {
                None => return,
                Some(Wait::Cooldown(wait)) => {
                    log::debug!("Rate limit cooldown, waiting {:.1}s", wait.as_secs_f64());
                    wait
                }
                Some(Wait::Saturated(wait)) => {
                    log::debug!(
                        "Rate limit saturated ({} per {:?}), waiting {:.1}s",
                        self.max_requests,
                        self.window,
                        wait.as_secs_f64()
                    );
                    wait
                }
            };

            sleep(wait).await;
        }
    }

    /// Records an admission if one is available now, otherwise says
    /// why and for how long the caller has to wait.
    async fn try_admit(&self) -> Option<Wait> {
        let mut state = self.inner.lock().await;
        let now = Instant::now();

        if let Some(until) = state.cooldown_until {
            if until > now {
                return Some(Wait::Cooldown(until - now));
            }
            state.cooldown_until = None;
        }

        state.trim(now, self.window);
        if state.admitted.len() < self.max_requests {
            state.admitted.push_back(now);
            return None;
        }

        // Full window: wait for the oldest entry to expire
        let wait = match state.admitted.front() {
            Some(&oldest) => (oldest + self.window).saturating_duration_since(now),
            None => Duration::ZERO,
        };
        Some(Wait::Saturated(wait))
    }

    /// Blocks admissions for `cooldown` after an explicit rate-limit
    /// rejection. Overlapping penalties extend to the latest deadline.
    pub async fn penalize(&self, cooldown: Duration) {
        let mut state = self.inner.lock().await;
        let until = Instant::now() + cooldown;
        state.cooldown_until = Some(match state.cooldown_until {
            Some(existing) if existing > until => existing,
            _ => until,
        });
    }

    /// Admissions currently counted against the window.
    pub async fn in_window(&self) -> usize {
        let mut state = self.inner.lock().await;
        state.trim(Instant::now(), self.window);
        state.admitted.len()
    }

    pub fn max_requests(&self) -> usize {
        self.max_requests
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    /// No window of `window` length may contain more than `max` instants.
    fn assert_window_respected(stamps: &[Instant], max: usize, window: Duration) {
        for (i, start) in stamps.iter().enumerate() {
            let in_window = stamps[i..]
                .iter()
                .take_while(|t| t.duration_since(*start) < window)
                .count();
            assert!(
                in_window <= max,
                "{} admissions within one window (max {})",
                in_window,
                max
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn admits_immediately_below_ceiling() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        let start = Instant::now();
        for _ in 0..3 {
            limiter.admit().await;
        }
        assert_eq!(Instant::now(), start);
        assert_eq!(limiter.in_window().await, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn blocks_until_oldest_admission_leaves_window() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        let start = Instant::now();

        limiter.admit().await;
        tokio::time::advance(Duration::from_secs(10)).await;
        limiter.admit().await;

        limiter.admit().await;
        assert_eq!(Instant::now() - start, Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn sequential_admissions_never_exceed_ceiling() {
        let window = Duration::from_secs(60);
        let limiter = RateLimiter::new(20, window);
        let mut stamps = Vec::new();

        for i in 0..75u64 {
            limiter.admit().await;
            stamps.push(Instant::now());
            // irregular caller pacing
            tokio::time::advance(Duration::from_millis(700 * (i % 4))).await;
        }

        assert_window_respected(&stamps, 20, window);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_share_one_window() {
        let window = Duration::from_secs(10);
        let limiter = Arc::new(RateLimiter::new(4, window));
        let stamps = Arc::new(std::sync::Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for _ in 0..6 {
            let limiter = limiter.clone();
            let stamps = stamps.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..5 {
                    limiter.admit().await;
                    stamps.lock().unwrap().push(Instant::now());
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let mut stamps = stamps.lock().unwrap().clone();
        stamps.sort();
        assert_eq!(stamps.len(), 30);
        assert_window_respected(&stamps, 4, window);
    }

    #[tokio::test(start_paused = true)]
    async fn penalty_delays_next_admission() {
        let limiter = RateLimiter::new(10, Duration::from_secs(60));
        limiter.admit().await;

        let start = Instant::now();
        limiter.penalize(Duration::from_secs(30)).await;
        limiter.penalize(Duration::from_secs(5)).await;
        limiter.admit().await;

        assert_eq!(Instant::now() - start, Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn cooldown_is_reported_apart_from_saturation() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        assert_eq!(limiter.try_admit().await, None);
        assert_eq!(
            limiter.try_admit().await,
            Some(Wait::Saturated(Duration::from_secs(60)))
        );

        tokio::time::advance(Duration::from_secs(60)).await;
        limiter.penalize(Duration::from_secs(30)).await;
        assert_eq!(
            limiter.try_admit().await,
            Some(Wait::Cooldown(Duration::from_secs(30)))
        );

        // an expired cooldown falls back to the window
        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(limiter.try_admit().await, None);
        assert_eq!(limiter.in_window().await, 1);
    }
}
