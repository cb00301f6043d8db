//! Sliding-window rate limiter
//!
//! Every upstream request, retries included, passes through [`RateLimiter::admit`].
//! The limiter keeps a FIFO ledger of admission instants and never lets more
//! than `max_requests` of them fall inside one trailing window.

use crate::config::RateLimitConfig;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Enforces a maximum request count within a trailing time window
///
/// The ledger is guarded by an async mutex so concurrent callers evict and
/// append atomically. The lock is never held while sleeping.
#[derive(Debug)]
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    ledger: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// Creates a limiter admitting `max_requests` per `window`
    ///
    /// A `max_requests` of zero is treated as one.
    pub fn new(max_requests: u32, window: Duration) -> Self {
        let max_requests = max_requests.max(1) as usize;
        Self {
            max_requests,
            window,
            ledger: Mutex::new(VecDeque::with_capacity(max_requests)),
        }
    }

    /// Creates a limiter from the `[rate-limit]` configuration section
    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.max_requests, Duration::from_secs(config.window_seconds))
    }

    /// Length of the trailing window
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Maximum admissions per window
    pub fn max_requests(&self) -> usize {
        self.max_requests
    }

    /// Waits until one more request fits in the window, then records it
    ///
    /// After every sleep the window is re-evaluated, since other callers may
    /// have been admitted in the meantime.
    pub async fn admit(&self) {
        loop {
            let wait = {
                let mut ledger = self.ledger.lock().await;
                let now = Instant::now();
                evict_expired(&mut ledger, now, self.window);

                if ledger.len() < self.max_requests {
                    ledger.push_back(now);
                    return;
                }

                match ledger.front() {
                    Some(oldest) => self.window.saturating_sub(now.duration_since(*oldest)),
                    None => Duration::ZERO,
                }
            };

            if wait > self.window / 2 {
                tracing::info!(
                    "Rate limit reached, sleeping for {} seconds",
                    wait.as_secs()
                );
            } else {
                tracing::trace!("Rate limit reached, sleeping for {:?}", wait);
            }

            tokio::time::sleep(wait).await;
        }
    }

    /// Number of admissions still inside the trailing window
    pub async fn in_window(&self) -> usize {
        let mut ledger = self.ledger.lock().await;
        evict_expired(&mut ledger, Instant::now(), self.window);
        ledger.len()
    }
}

/// Drops ledger entries that are a full window old or older
fn evict_expired(ledger: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(oldest) = ledger.front() {
        if now.duration_since(*oldest) >= window {
            ledger.pop_front();
        } else {
            break;
        }
    }
}
