use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::{SystemTime, UNIX_EPOCH},
};

/// Reference time used when evaluating refills.
///
/// Exactly one source is used per call and applies uniformly to every bucket
/// in a batch.
pub trait TimeSource: Send + Sync {
    /// Fractional seconds since the Unix epoch, or `None` to defer to the
    /// Redis server's own clock inside the evaluation script.
    fn now(&self) -> Option<f64>;
}

/// Uses the Redis server's `TIME` as the reference clock.
///
/// This is the default: a single reference shared by every client.
#[derive(Debug, Default, Clone, Copy)]
pub struct ServerClock;

impl TimeSource for ServerClock {
    fn now(&self) -> Option<f64> {
        None
    }
}

/// Uses this process's system clock.
///
/// For callers that keep their own clocks synchronized and prefer not to
/// depend on the Redis server's time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl TimeSource for SystemClock {
    fn now(&self) -> Option<f64> {
        let elapsed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();

        Some(elapsed.as_secs_f64())
    }
}

/// A manually driven clock.
///
/// Reads are lock-free; the value is stored as IEEE-754 bits in an atomic.
/// Intended for tests that need deterministic refill arithmetic or clock
/// anomalies.
#[derive(Debug)]
pub struct ManualClock {
    bits: AtomicU64,
}

impl ManualClock {
    pub fn new(seconds: f64) -> Self {
        Self {
            bits: AtomicU64::new(seconds.to_bits()),
        }
    }

    /// Set the clock to an absolute time in seconds.
    pub fn set(&self, seconds: f64) {
        self.bits.store(seconds.to_bits(), Ordering::Relaxed);
    }

    /// Move the clock by `seconds`; negative values wind it backward.
    pub fn advance(&self, seconds: f64) {
        let current = f64::from_bits(self.bits.load(Ordering::Relaxed));
        self.set(current + seconds);
    }

    pub fn seconds(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Relaxed))
    }
}

impl TimeSource for ManualClock {
    fn now(&self) -> Option<f64> {
        Some(self.seconds())
    }
}
