//! Kados is a distributed token-bucket rate limiter backed by Redis.
//!
//! Many independent clients enforce coordinated throughput limits on
//! arbitrary resources (requests, jobs, credits) by atomically charging one
//! or more buckets in a single operation. The crate focuses on:
//! - multi-bucket charges that commit all-or-nothing (one server-side script
//!   invocation, atomic across every key it touches)
//! - continuous refill arithmetic on IEEE-754 doubles
//! - per-request admission policies: standard, reservation, debt, and charge
//!   adjustment
//! - clock-skew tolerance using the Redis server's own clock
//!
//! # Quick start
//!
//! ```no_run
//! use kados::{
//!     Bucket, BucketKey, BucketSize, ChargeDecision, ChargeOptions, RefillRate,
//!     TokenBucketLimiter, TokenBucketLimiterOptions,
//! };
//!
//! # async fn demo() -> Result<(), kados::KadosError> {
//! let client = redis::Client::open("redis://127.0.0.1/")?;
//! let connection_manager = client.get_connection_manager().await?;
//!
//! let limiter = TokenBucketLimiter::new(TokenBucketLimiterOptions {
//!     connection_manager,
//!     time_source: None, // use the Redis server's clock
//! });
//!
//! // 10-token bucket refilling at 2 tokens/second.
//! let bucket = Bucket {
//!     key: BucketKey::try_from("api:user:123")?,
//!     rate: RefillRate::try_from(2.0).unwrap(),
//!     size: BucketSize::try_from(10.0).unwrap(),
//! };
//!
//! match limiter.charge(&bucket, 1.0, ChargeOptions::default()).await? {
//!     ChargeDecision::Committed { level } => {
//!         // proceed; `level` tokens remain
//!         let _ = level;
//!     }
//!     ChargeDecision::Rejected { level } => {
//!         let _ = level;
//!         // reject / retry later
//!     }
//! }
//! # Ok(())
//! # }
//! ```

mod limiter;
pub use limiter::*;

mod bucket;
pub use bucket::*;

mod clock;
pub use clock::*;

mod common;
pub use common::*;

mod error;
pub use error::*;

#[cfg(test)]
mod tests;
