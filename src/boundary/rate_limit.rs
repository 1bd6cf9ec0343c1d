//! Rate and daily-count boundary.

use crate::client::Clock;
use crate::error::Result;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Allowed hits per key over a trailing window.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub limit: u64,
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            limit: 10,
            window: Duration::from_secs(60),
        }
    }
}

impl RateLimitConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            limit: std::env::var("STREAKLINE_RATE_LIMIT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.limit),
            window: std::env::var("STREAKLINE_RATE_WINDOW_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.window),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    pub remaining: u64,
}

/// Counter service answering rate and daily-total questions.
pub trait RateLimiter: Send + Sync {
    /// Count one hit for `key` and say whether it is within the limit.
    fn check(&self, key: &str, config: &RateLimitConfig) -> Result<RateDecision>;

    /// Count one accepted report for `day`.
    fn record_report(&self, day: i64) -> Result<()>;

    /// Accepted reports counted for `day`.
    fn daily_total(&self, day: i64) -> Result<u64>;
}

/// Ask the limiter, treating an unreachable limiter as "allowed".
pub fn check_fail_open(
    limiter: &dyn RateLimiter,
    key: &str,
    config: &RateLimitConfig,
) -> RateDecision {
    match limiter.check(key, config) {
        Ok(decision) => decision,
        Err(e) => {
            warn!(key, error = %e, "rate limiter unavailable, allowing request");
            RateDecision {
                allowed: true,
                remaining: config.limit,
            }
        }
    }
}

struct Window {
    count: u64,
    expires_at_ms: u64,
}

#[derive(Default)]
struct Windows {
    by_key: HashMap<String, Window>,
    next_sweep_ms: u64,
}

impl Windows {
    /// Forget expired windows, at most once per window length.
    fn sweep(&mut self, now: u64, window_ms: u64) {
        if now < self.next_sweep_ms {
            return;
        }
        self.by_key.retain(|_, w| w.expires_at_ms > now);
        self.next_sweep_ms = now.saturating_add(window_ms);
    }
}

/// In-memory fixed-window counter. The window starts at a key's first hit.
pub struct FixedWindowLimiter {
    clock: Arc<dyn Clock>,
    windows: Mutex<Windows>,
    daily: Mutex<HashMap<i64, u64>>,
}

impl FixedWindowLimiter {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            windows: Mutex::new(Windows::default()),
            daily: Mutex::new(HashMap::new()),
        }
    }

    /// Keys with a window that has not been swept yet.
    pub fn tracked_keys(&self) -> usize {
        self.windows.lock().by_key.len()
    }
}

impl RateLimiter for FixedWindowLimiter {
    fn check(&self, key: &str, config: &RateLimitConfig) -> Result<RateDecision> {
        let now = self.clock.now_ms();
        let window_ms = config.window.as_millis() as u64;
        let mut windows = self.windows.lock();
        windows.sweep(now, window_ms);

        let window = windows.by_key.entry(key.to_string()).or_insert(Window {
            count: 0,
            expires_at_ms: 0,
        });
        if window.expires_at_ms <= now {
            window.count = 0;
            window.expires_at_ms = now.saturating_add(window_ms);
        }
        window.count += 1;

        Ok(RateDecision {
            allowed: window.count <= config.limit,
            remaining: config.limit.saturating_sub(window.count),
        })
    }

    fn record_report(&self, day: i64) -> Result<()> {
        *self.daily.lock().entry(day).or_insert(0) += 1;
        Ok(())
    }

    fn daily_total(&self, day: i64) -> Result<u64> {
        Ok(self.daily.lock().get(&day).copied().unwrap_or(0))
    }
}
