// src/clock.rs
//
// Monotonic device-time sources.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};
use std::time::Instant;

/// Output-device time in seconds.
///
/// Must be monotonic (never decreasing). The epoch is arbitrary but has to
/// match the time domain of the synthesis graph being driven.
pub trait Clock {
    fn now(&self) -> f64;
}

/// Wall-clock time since construction.
#[derive(Debug, Clone, Copy)]
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
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// A clock advanced explicitly by its owner.
///
/// Clones share the same time, so a test (or the dry-run player) can keep
/// one handle while a controller owns another. Stored as f64 bits since
/// there is no AtomicF64 in std.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now_bits: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start: f64) -> Self {
        Self {
            now_bits: Arc::new(AtomicU64::new(start.to_bits())),
        }
    }

    /// Move time to `time`. Earlier values are ignored to keep the clock
    /// monotonic.
    pub fn set(&self, time: f64) {
        let _ = self
            .now_bits
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
                (time > f64::from_bits(bits)).then(|| time.to_bits())
            });
    }

    pub fn advance(&self, seconds: f64) {
        self.set(self.now() + seconds.max(0.0));
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        f64::from_bits(self.now_bits.load(Ordering::Acquire))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_shared_and_monotonic() {
        let clock = ManualClock::new(1.0);
        let other = clock.clone();

        clock.advance(0.5);
        assert_eq!(other.now(), 1.5);

        other.set(1.0);
        assert_eq!(clock.now(), 1.5);

        other.set(2.25);
        assert_eq!(clock.now(), 2.25);
    }

    #[test]
    fn test_system_clock_never_decreases() {
        let clock = SystemClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
        assert!(a >= 0.0);
    }
}
