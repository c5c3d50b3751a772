use std::{collections::HashMap, sync::Arc};

use redis::{Script, Value, aio::ConnectionManager, from_redis_value};

use crate::{
    BatchDecision, Bucket, BucketKey, ChargeDecision, ChargeOptions, ChargeRequest, KadosError,
    ServerClock, TimeSource,
};

const BATCH_CHARGE_LUA: &str = r#"
    redis.replicate_commands()

    local now = tonumber(ARGV[1])
    if now == nil then
        local time_array = redis.call("TIME")
        now = tonumber(time_array[1]) + tonumber(time_array[2]) / 1000000
    end

    local n = tonumber(ARGV[2])

    local current_levels = {}
    local new_levels = {}
    local commit_timestamps = {}
    local success = 1

    -- plan: refill each bucket and decide admissibility, no writes
    for i = 1, n do
        local base = 2 + (i - 1) * 5
        local rate = tonumber(ARGV[base + 1])
        local size = tonumber(ARGV[base + 2])
        local amount = tonumber(ARGV[base + 3])
        local limit = tonumber(ARGV[base + 4])
        local adjust = tonumber(ARGV[base + 5]) == 1

        local state = redis.call("HMGET", KEYS[i], "level", "ts")
        local level = tonumber(state[1])
        local ts = tonumber(state[2])

        if level == nil or ts == nil then
            level = size
            ts = now
        end

        local elapsed = now - ts
        if elapsed < 0 then
            elapsed = 0
        end

        local current = level + rate * elapsed
        if current > size then
            current = size
        end

        local effective = amount
        if current - amount < limit then
            if adjust then
                effective = current - limit
            else
                success = 0
            end
        end

        local new_level = current - effective
        if new_level > size then
            new_level = size
        end

        current_levels[i] = current
        new_levels[i] = new_level

        -- the stored timestamp never retreats
        if ts > now then
            commit_timestamps[i] = ts
        else
            commit_timestamps[i] = now
        end
    end

    local result = {success}

    if success == 0 then
        for i = 1, n do
            result[i + 1] = string.format("%.17g", current_levels[i])
        end

        return result
    end

    -- commit: write every bucket, expire at the instant it would refill full
    for i = 1, n do
        local base = 2 + (i - 1) * 5
        local rate = tonumber(ARGV[base + 1])
        local size = tonumber(ARGV[base + 2])
        local new_level = new_levels[i]

        if new_level >= size then
            redis.call("DEL", KEYS[i])
        else
            redis.call("HSET", KEYS[i],
                "level", string.format("%.17g", new_level),
                "ts", string.format("%.17g", commit_timestamps[i]))

            if rate > 0 then
                redis.call("EXPIRE", KEYS[i], math.ceil((size - new_level) / rate))
            else
                redis.call("PERSIST", KEYS[i])
            end
        end

        result[i + 1] = string.format("%.17g", new_level)
    end

    return result
"#;

/// Marker telling the script to read the Redis server's own clock.
const SERVER_TIME_SENTINEL: &str = "server";

/// Configuration for [`TokenBucketLimiter`].
pub struct TokenBucketLimiterOptions {
    pub connection_manager: ConnectionManager,
    /// Reference clock. `None` uses the Redis server's time.
    pub time_source: Option<Arc<dyn TimeSource>>,
}

/// A distributed token-bucket rate limiter backed by Redis.
///
/// Buckets refill continuously at their [`RefillRate`](crate::RefillRate) up
/// to their [`BucketSize`](crate::BucketSize). One or more buckets are
/// charged in a single atomic batch: a server-side script reads every bucket,
/// refills it by elapsed time, and either commits all requested charges or
/// none of them.
///
/// Bucket state is a small Redis hash per key, expired once the bucket would
/// be fully refilled, so idle buckets cost nothing. Failure to charge is a
/// decision, not an error: transport problems surface as
/// [`KadosError`], admission is reported through [`BatchDecision`] and
/// [`ChargeDecision`].
#[derive(Clone)]
pub struct TokenBucketLimiter {
    connection_manager: ConnectionManager,
    charge_script: Script,
    time_source: Arc<dyn TimeSource>,
}

impl TokenBucketLimiter {
    pub fn new(options: TokenBucketLimiterOptions) -> Self {
        Self {
            connection_manager: options.connection_manager,
            charge_script: Script::new(BATCH_CHARGE_LUA),
            time_source: options
                .time_source
                .unwrap_or_else(|| Arc::new(ServerClock)),
        }
    }

    /// Current level of one bucket.
    ///
    /// Equivalent to a zero-amount charge: no state visible to other callers
    /// changes, and a bucket with no stored state reads as full.
    pub async fn read_level(&self, bucket: &Bucket) -> Result<f64, KadosError> {
        let request = ChargeRequest::new(bucket.clone(), 0f64);
        let decision = self.batch_charge(std::slice::from_ref(&request)).await?;

        let (BatchDecision::Committed { levels } | BatchDecision::Rejected { levels }) = decision;

        Ok(*levels
            .get(bucket.key.as_str())
            .expect("charged bucket should report a level"))
    }

    /// Current levels of several buckets, read in one round-trip.
    pub async fn read_levels(
        &self,
        buckets: &[Bucket],
    ) -> Result<HashMap<BucketKey, f64>, KadosError> {
        let requests: Vec<ChargeRequest> = buckets
            .iter()
            .map(|bucket| ChargeRequest::new(bucket.clone(), 0f64))
            .collect();

        let decision = self.batch_charge(&requests).await?;
        let (BatchDecision::Committed { levels } | BatchDecision::Rejected { levels }) = decision;

        Ok(levels)
    }

    /// Charge a single bucket.
    ///
    /// Convenience wrapper around a one-element [`batch_charge`](Self::batch_charge).
    pub async fn charge(
        &self,
        bucket: &Bucket,
        amount: f64,
        options: ChargeOptions,
    ) -> Result<ChargeDecision, KadosError> {
        let request = ChargeRequest::new(bucket.clone(), amount).with_options(options);
        let decision = self.batch_charge(std::slice::from_ref(&request)).await?;

        let level = |levels: &HashMap<BucketKey, f64>| {
            *levels
                .get(bucket.key.as_str())
                .expect("charged bucket should report a level")
        };

        Ok(match decision {
            BatchDecision::Committed { levels } => ChargeDecision::Committed {
                level: level(&levels),
            },
            BatchDecision::Rejected { levels } => ChargeDecision::Rejected {
                level: level(&levels),
            },
        })
    }

    /// Atomically charge a batch of buckets, all-or-nothing.
    ///
    /// Every request is refilled and checked against its own
    /// [`ChargeOptions`]; the batch commits only if every request is
    /// admissible (possibly after charge adjustment). A rejected batch writes
    /// nothing and reports each bucket's current level.
    ///
    /// An empty batch trivially commits without a Redis round-trip.
    pub async fn batch_charge(
        &self,
        requests: &[ChargeRequest],
    ) -> Result<BatchDecision, KadosError> {
        if requests.is_empty() {
            return Ok(BatchDecision::Committed {
                levels: HashMap::new(),
            });
        }

        validate_requests(requests)?;

        let now = self.reference_time()?;

        let mut invocation = self.charge_script.prepare_invoke();

        for request in requests {
            invocation.key(request.bucket.key.as_str());
        }

        for arg in charge_script_args(now, requests) {
            invocation.arg(arg);
        }

        let mut connection_manager = self.connection_manager.clone();
        let reply: Vec<Value> = invocation.invoke_async(&mut connection_manager).await?;

        let (committed, levels) = match parse_script_reply(&reply, requests) {
            Ok(parsed) => parsed,
            Err(err) => {
                tracing::error!(error = %err, "charge script returned a malformed reply");
                return Err(err);
            }
        };

        if committed {
            Ok(BatchDecision::Committed { levels })
        } else {
            Ok(BatchDecision::Rejected { levels })
        }
    } // end method batch_charge

    fn reference_time(&self) -> Result<Option<f64>, KadosError> {
        match self.time_source.now() {
            Some(now) if !now.is_finite() => Err(KadosError::InvalidChargeArgument(
                "Supplied reference time must be finite".to_string(),
            )),
            now => Ok(now),
        }
    }
}

fn validate_requests(requests: &[ChargeRequest]) -> Result<(), KadosError> {
    for request in requests {
        if !request.amount.is_finite() {
            return Err(KadosError::InvalidChargeArgument(format!(
                "Charge amount for bucket {:?} must be finite",
                &*request.bucket.key
            )));
        }

        if !request.options.limit.is_finite() {
            return Err(KadosError::InvalidChargeArgument(format!(
                "Charge limit for bucket {:?} must be finite",
                &*request.bucket.key
            )));
        }
    }

    Ok(())
}

/// Flat ARGV vector for the charge script:
/// `[now_or_sentinel, n, rate_1, size_1, amount_1, limit_1, adjust_1, …]`.
///
/// Floats go through `Display`, which prints the shortest representation that
/// round-trips the exact double.
pub(crate) fn charge_script_args(now: Option<f64>, requests: &[ChargeRequest]) -> Vec<String> {
    let mut args = Vec::with_capacity(2 + requests.len() * 5);

    args.push(match now {
        Some(now) => now.to_string(),
        None => SERVER_TIME_SENTINEL.to_string(),
    });
    args.push(requests.len().to_string());

    for request in requests {
        args.push(request.bucket.rate.to_string());
        args.push(request.bucket.size.to_string());
        args.push(request.amount.to_string());
        args.push(request.options.limit.to_string());
        args.push(if request.options.allow_charge_adjustment {
            "1".to_string()
        } else {
            "0".to_string()
        });
    }

    args
}

/// Parse `[success_int, level_1, …, level_n]`, zipping levels back with the
/// request keys.
pub(crate) fn parse_script_reply(
    reply: &[Value],
    requests: &[ChargeRequest],
) -> Result<(bool, HashMap<BucketKey, f64>), KadosError> {
    if reply.len() != requests.len() + 1 {
        return Err(KadosError::UnexpectedScriptReply(format!(
            "expected {} elements, got {}",
            requests.len() + 1,
            reply.len()
        )));
    }

    let success: i64 = from_redis_value(&reply[0]).map_err(|err| {
        KadosError::UnexpectedScriptReply(format!("success flag not an integer: {err}"))
    })?;

    let mut levels = HashMap::with_capacity(requests.len());

    for (value, request) in reply[1..].iter().zip(requests) {
        let level: f64 = from_redis_value(value).map_err(|err| {
            KadosError::UnexpectedScriptReply(format!(
                "level for bucket {:?} not a float: {err}",
                &*request.bucket.key
            ))
        })?;

        levels.insert(request.bucket.key.clone(), level);
    }

    Ok((success == 1, levels))
}
