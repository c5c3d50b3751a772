use crate::{BucketKey, BucketSize, RefillRate};

/// A named token reservoir.
///
/// The descriptor is caller-owned and immutable per call; the bucket's live
/// state (level and timestamp) lives in Redis under `key`.
#[derive(Debug, Clone, PartialEq)]
pub struct Bucket {
    /// Redis key holding the bucket state, used verbatim.
    pub key: BucketKey,
    /// Tokens added per second.
    pub rate: RefillRate,
    /// Maximum token capacity.
    pub size: BucketSize,
}

impl Bucket {
    pub fn new(key: BucketKey, rate: RefillRate, size: BucketSize) -> Self {
        Self { key, rate, size }
    }
}

/// Per-request policy flags.
///
/// `limit` governs the minimum post-charge level still considered a
/// successful charge:
/// - `limit > 0`: reservation — charge only if the level stays at or above
///   `limit`.
/// - `limit == 0`: standard — charge only if the level stays non-negative.
/// - `limit < 0`: debt allowed — the level may go down to `limit`.
///
/// With `allow_charge_adjustment`, a request that would fail on its own is
/// instead shrunk to whatever amount fits, landing exactly on `limit`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChargeOptions {
    pub limit: f64,
    pub allow_charge_adjustment: bool,
}

impl Default for ChargeOptions {
    fn default() -> Self {
        Self {
            limit: 0f64,
            allow_charge_adjustment: false,
        }
    }
}

/// One element of an atomic batch: a bucket, an amount, and policy flags.
///
/// A negative `amount` returns tokens to the bucket (never beyond its
/// capacity).
#[derive(Debug, Clone, PartialEq)]
pub struct ChargeRequest {
    pub bucket: Bucket,
    pub amount: f64,
    pub options: ChargeOptions,
}

impl ChargeRequest {
    /// A request with default options (`limit = 0`, no adjustment).
    pub fn new(bucket: Bucket, amount: f64) -> Self {
        Self {
            bucket,
            amount,
            options: ChargeOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ChargeOptions) -> Self {
        self.options = options;
        self
    }
}
