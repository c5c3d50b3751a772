use std::{borrow::Borrow, collections::HashMap, ops::Deref};

use crate::KadosError;

/// A validated newtype for bucket keys.
///
/// The string is used verbatim as the Redis key; the only constraint is that
/// it must not be empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BucketKey(String);

impl Deref for BucketKey {
    type Target = String;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Borrow<str> for BucketKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for BucketKey {
    type Error = KadosError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.is_empty() {
            Err(KadosError::InvalidBucketKey(
                "Bucket key must not be empty".to_string(),
            ))
        } else {
            Ok(Self(value))
        }
    }
}

impl TryFrom<&str> for BucketKey {
    type Error = KadosError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::try_from(value.to_string())
    }
}

/// Tokens added to a bucket per second.
///
/// Must be finite and non-negative. A zero rate describes a bucket that
/// never refills.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct RefillRate(f64);

impl Deref for RefillRate {
    type Target = f64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<f64> for RefillRate {
    type Error = String;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        if value.is_finite() && value >= 0f64 {
            Ok(Self(value))
        } else {
            Err("Refill rate must be finite and non-negative".to_string())
        }
    }
}

/// Maximum token capacity of a bucket.
///
/// Must be finite and greater than zero.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct BucketSize(f64);

impl Deref for BucketSize {
    type Target = f64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<f64> for BucketSize {
    type Error = String;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        if value.is_finite() && value > 0f64 {
            Ok(Self(value))
        } else {
            Err("Bucket size must be finite and greater than 0".to_string())
        }
    }
}

/// Outcome of charging a single bucket.
#[derive(Debug, Clone, PartialEq)]
pub enum ChargeDecision {
    /// The charge was committed.
    Committed {
        /// Bucket level after the charge.
        level: f64,
    },
    /// The charge was inadmissible; nothing was written.
    Rejected {
        /// Current (refilled) bucket level.
        level: f64,
    },
}

impl ChargeDecision {
    /// Whether the charge was committed.
    pub fn is_committed(&self) -> bool {
        matches!(self, ChargeDecision::Committed { .. })
    }

    /// The bucket level reported with the decision.
    pub fn level(&self) -> f64 {
        match self {
            ChargeDecision::Committed { level } | ChargeDecision::Rejected { level } => *level,
        }
    }
}

/// Outcome of an atomic multi-bucket charge.
///
/// Either every request in the batch committed, or none did. Both variants
/// carry the per-bucket levels observed by the script: post-charge levels on
/// commit, current (refilled) levels on rejection.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchDecision {
    /// Every request committed.
    Committed {
        /// Post-charge level per bucket key.
        levels: HashMap<BucketKey, f64>,
    },
    /// At least one request was inadmissible; no state changed.
    Rejected {
        /// Current (refilled) level per bucket key.
        levels: HashMap<BucketKey, f64>,
    },
}

impl BatchDecision {
    /// Whether the batch committed.
    pub fn is_committed(&self) -> bool {
        matches!(self, BatchDecision::Committed { .. })
    }

    /// The per-bucket levels reported with the decision.
    pub fn levels(&self) -> &HashMap<BucketKey, f64> {
        match self {
            BatchDecision::Committed { levels } | BatchDecision::Rejected { levels } => levels,
        }
    }

    /// Level for one bucket key, if it was part of the batch.
    pub fn level_of(&self, key: &str) -> Option<f64> {
        self.levels().get(key).copied()
    }
}
