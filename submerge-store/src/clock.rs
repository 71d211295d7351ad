//! A monotonic-ish clock. The protocol only requires that comparisons
//! within one node are consistent, so a wall clock is fine as long as it
//! doesn't jump backwards under us; `SystemClock` uses
//! `Instant`, which on every supported platform is monotonic, and anchors
//! it to wall-clock epoch millis once at startup so lease expiries remain
//! human-meaningful.

use std::time::Instant;

use submerge_net::Millis;

pub trait Clock: Send + Sync {
    fn now_ms(&self) -> Millis;
}

pub struct SystemClock {
    epoch_ms_at_start: u64,
    started: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        let epoch_ms_at_start = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("system clock before epoch")
            .as_millis() as u64;
        SystemClock {
            epoch_ms_at_start,
            started: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> Millis {
        Millis(self.epoch_ms_at_start + self.started.elapsed().as_millis() as u64)
    }
}

/// A clock an operator can advance by hand, for deterministic lease/lock
/// expiry tests without sleeping.
#[cfg(test)]
pub struct FakeClock(std::sync::atomic::AtomicU64);

#[cfg(test)]
impl FakeClock {
    pub fn new(start_ms: u64) -> Self {
        FakeClock(std::sync::atomic::AtomicU64::new(start_ms))
    }

    pub fn advance(&self, ms: u64) {
        self.0.fetch_add(ms, std::sync::atomic::Ordering::SeqCst);
    }
}

#[cfg(test)]
impl Clock for FakeClock {
    fn now_ms(&self) -> Millis {
        Millis(self.0.load(std::sync::atomic::Ordering::SeqCst))
    }
}
