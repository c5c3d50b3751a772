use std::{env, future::Future, sync::Arc, thread, time::Duration};

use crate::{
    Bucket, BucketKey, BucketSize, ChargeOptions, ManualClock, RefillRate, TokenBucketLimiter,
    TokenBucketLimiterOptions,
};

const T0: f64 = 1_700_000_000.0;

fn block_on<F, T>(f: F) -> T
where
    F: Future<Output = T>,
{
    tokio::runtime::Runtime::new().unwrap().block_on(f)
}

fn redis_url() -> Option<String> {
    env::var("REDIS_URL").ok()
}

fn unique_key(suffix: &str) -> BucketKey {
    let n: u64 = rand::random();
    BucketKey::try_from(format!("kados_test_{n}_{suffix}")).unwrap()
}

fn bucket(key: &BucketKey, rate: f64, size: f64) -> Bucket {
    Bucket {
        key: key.clone(),
        rate: RefillRate::try_from(rate).unwrap(),
        size: BucketSize::try_from(size).unwrap(),
    }
}

fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-7
}

async fn manual_limiter(url: &str, start: f64) -> (TokenBucketLimiter, Arc<ManualClock>) {
    let client = redis::Client::open(url).unwrap();
    let connection_manager = client.get_connection_manager().await.unwrap();
    let clock = Arc::new(ManualClock::new(start));

    let limiter = TokenBucketLimiter::new(TokenBucketLimiterOptions {
        connection_manager,
        time_source: Some(clock.clone()),
    });

    (limiter, clock)
}

async fn server_clock_limiter(url: &str) -> TokenBucketLimiter {
    let client = redis::Client::open(url).unwrap();
    let connection_manager = client.get_connection_manager().await.unwrap();

    TokenBucketLimiter::new(TokenBucketLimiterOptions {
        connection_manager,
        time_source: None,
    })
}

#[test]
fn fresh_buckets_read_full() {
    let Some(url) = redis_url() else { return };

    block_on(async {
        let (limiter, _clock) = manual_limiter(&url, T0).await;

        let key = unique_key("fresh");
        let a = bucket(&key, 2.0, 10.0);

        let level = limiter.read_level(&a).await.unwrap();
        assert!(approx(level, 10.0));
    });
}

#[test]
fn read_levels_zips_levels_back_with_their_keys() {
    let Some(url) = redis_url() else { return };

    block_on(async {
        let (limiter, _clock) = manual_limiter(&url, T0).await;

        let key_a = unique_key("a");
        let key_b = unique_key("b");
        let key_c = unique_key("c");
        let a = bucket(&key_a, 2.0, 10.0);
        let b = bucket(&key_b, 1.0, 100.0);
        let c = bucket(&key_c, 5.0, 50.0);

        limiter.charge(&a, 4.0, ChargeOptions::default()).await.unwrap();
        limiter.charge(&b, 25.0, ChargeOptions::default()).await.unwrap();

        let levels = limiter
            .read_levels(&[a.clone(), b.clone(), c.clone()])
            .await
            .unwrap();

        assert_eq!(levels.len(), 3);
        assert!(approx(levels[key_a.as_str()], 6.0));
        assert!(approx(levels[key_b.as_str()], 75.0));
        assert!(approx(levels[key_c.as_str()], 50.0));
    });
}

#[test]
fn reads_observe_the_refill_law() {
    let Some(url) = redis_url() else { return };

    block_on(async {
        let (limiter, clock) = manual_limiter(&url, T0).await;

        let key = unique_key("a");
        let a = bucket(&key, 2.0, 10.0);

        limiter.charge(&a, 10.0, ChargeOptions::default()).await.unwrap();
        assert!(approx(limiter.read_level(&a).await.unwrap(), 0.0));

        clock.advance(2.0);
        assert!(approx(limiter.read_level(&a).await.unwrap(), 4.0));

        // Far past full: the capacity cap dominates.
        clock.advance(100.0);
        assert!(approx(limiter.read_level(&a).await.unwrap(), 10.0));
    });
}

#[test]
fn empty_read_returns_empty_map_without_redis_state() {
    let Some(url) = redis_url() else { return };

    block_on(async {
        let (limiter, _clock) = manual_limiter(&url, T0).await;

        let levels = limiter.read_levels(&[]).await.unwrap();
        assert!(levels.is_empty());
    });
}

#[test]
fn server_clock_refills_with_real_time() {
    let Some(url) = redis_url() else { return };

    block_on(async {
        let limiter = server_clock_limiter(&url).await;

        let key = unique_key("a");
        let a = bucket(&key, 2.0, 10.0);

        limiter.charge(&a, 10.0, ChargeOptions::default()).await.unwrap();

        thread::sleep(Duration::from_millis(1100));

        // At 2 tokens/s, at least ~2.2 tokens came back; allow scheduling slack.
        let level = limiter.read_level(&a).await.unwrap();
        assert!(level >= 2.0, "expected refill after sleep, got {level}");
        assert!(level <= 10.0, "refill must stay capped, got {level}");
    });
}
