//! Requests-per-window admission gate for the upstream provider.
//!
//! A counter is reset to zero once per window by a background task. Callers
//! poll until the counter is below capacity. The reset is periodic rather
//! than sliding, so a burst straddling a window boundary can exceed the
//! nominal rate by one slot.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::{sleep, sleep_until, Instant};
use tokio_util::sync::CancellationToken;

const MIN_TICK: Duration = Duration::from_millis(1);

/// Rate limiter settings.
#[derive(Clone, Debug)]
pub struct LimiterConfig {
    /// Nominal requests per window. Effective capacity is one less.
    pub requests: u32,
    /// Length of one accounting window.
    pub window: Duration,
    /// Interval between admission checks while the window is full.
    pub poll_interval: Duration,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            requests: 60,
            window: Duration::from_secs(1),
            poll_interval: Duration::from_millis(100),
        }
    }
}

#[derive(Debug)]
struct WindowState {
    count: u32,
    last_reset: Instant,
}

/// Process-wide outbound rate limiter, shared behind an `Arc`.
///
/// The reset task stops when the limiter is dropped.
#[derive(Debug)]
pub struct RpsLimiter {
    state: Arc<Mutex<WindowState>>,
    capacity: u32,
    poll_interval: Duration,
    shutdown: CancellationToken,
}

impl RpsLimiter {
    /// Creates the limiter and spawns its reset task.
    ///
    /// # Panics
    /// Panics if called outside a tokio runtime.
    pub fn new(config: LimiterConfig) -> Self {
        let capacity = config.requests.saturating_sub(1).max(1);
        let window = config.window.max(MIN_TICK);
        let state = Arc::new(Mutex::new(WindowState {
            count: 0,
            last_reset: Instant::now(),
        }));
        let shutdown = CancellationToken::new();

        tokio::spawn(reset_loop(state.clone(), window, shutdown.clone()));

        tracing::debug!(capacity, window_ms = window.as_millis() as u64, "rate limiter started");

        Self {
            state,
            capacity,
            poll_interval: config.poll_interval.max(MIN_TICK),
            shutdown,
        }
    }

    /// Waits until one more request fits in the current window and claims it.
    ///
    /// Cancellation-safe: dropping the future before it resolves claims nothing.
    pub async fn admit(&self) {
        while !self.try_admit() {
            sleep(self.poll_interval).await;
        }
    }

    /// Returns a claimed slot to the current window.
    pub fn rollback(&self) {
        let mut state = self.state.lock();
        state.count = state.count.saturating_sub(1);
    }

    /// Slots claimed in the current window.
    pub fn in_flight(&self) -> u32 {
        self.state.lock().count
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    fn try_admit(&self) -> bool {
        let mut state = self.state.lock();
        if state.count < self.capacity {
            state.count += 1;
            true
        } else {
            false
        }
    }
}

impl Drop for RpsLimiter {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn reset_loop(state: Arc<Mutex<WindowState>>, window: Duration, shutdown: CancellationToken) {
    loop {
        let next_reset = state.lock().last_reset + window;
        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::debug!("rate limiter reset loop stopped");
                return;
            }
            _ = sleep_until(next_reset) => {}
        }

        let mut state = state.lock();
        state.count = 0;
        state.last_reset = Instant::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(requests: u32) -> RpsLimiter {
        RpsLimiter::new(LimiterConfig {
            requests,
            window: Duration::from_secs(1),
            poll_interval: Duration::from_millis(10),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn admits_up_to_capacity_without_waiting() {
        let limiter = limiter(4);
        let start = Instant::now();
        for _ in 0..3 {
            limiter.admit().await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(limiter.in_flight(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn full_window_waits_for_reset() {
        let limiter = limiter(3);
        let start = Instant::now();
        limiter.admit().await;
        limiter.admit().await;
        limiter.admit().await;

        let waited = start.elapsed();
        assert!(waited >= Duration::from_secs(1), "waited only {waited:?}");
        assert!(waited < Duration::from_millis(1100), "waited {waited:?}");
        assert_eq!(limiter.in_flight(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn rollback_frees_a_slot() {
        let limiter = limiter(2);
        assert_eq!(limiter.capacity(), 1);

        let start = Instant::now();
        limiter.admit().await;
        limiter.rollback();
        limiter.admit().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn rollback_never_underflows() {
        let limiter = limiter(5);
        limiter.rollback();
        limiter.rollback();
        assert_eq!(limiter.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn single_request_budget_still_admits() {
        let limiter = limiter(1);
        assert_eq!(limiter.capacity(), 1);
        limiter.admit().await;
        assert_eq!(limiter.in_flight(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_waiter_claims_nothing() {
        let limiter = limiter(2);
        limiter.admit().await;

        let waited = tokio::time::timeout(Duration::from_millis(50), limiter.admit()).await;
        assert!(waited.is_err());
        assert_eq!(limiter.in_flight(), 1);
    }
}
