//! Time sources for the cooperative reconnect timer.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Monotonic milliseconds.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

/// Wall clock, measured from construction.
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

/// Clock that only moves when told to.
#[derive(Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// A scheduled reconnect.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PendingReconnect {
    pub due_ms: u64,
    pub delay: Duration,
    pub attempt: u32,
}

/// Holds at most one pending reconnect. Scheduling replaces whatever was
/// pending.
#[derive(Debug, Default)]
pub struct ReconnectTimer {
    pending: Option<PendingReconnect>,
}

impl ReconnectTimer {
    /// Returns the superseded schedule, if any.
    pub fn schedule(&mut self, now_ms: u64, delay: Duration, attempt: u32) -> Option<PendingReconnect> {
        self.pending.replace(PendingReconnect {
            due_ms: now_ms.saturating_add(delay.as_millis() as u64),
            delay,
            attempt,
        })
    }

    pub fn cancel(&mut self) -> Option<PendingReconnect> {
        self.pending.take()
    }

    /// Take the pending reconnect if it is due.
    pub fn take_due(&mut self, now_ms: u64) -> Option<PendingReconnect> {
        match self.pending {
            Some(p) if p.due_ms <= now_ms => self.pending.take(),
            _ => None,
        }
    }

    pub fn pending(&self) -> Option<&PendingReconnect> {
        self.pending.as_ref()
    }
}
