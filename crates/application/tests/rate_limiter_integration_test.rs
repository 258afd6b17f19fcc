//! 限流器并发测试
//!
//! 计数使用原子递增，并发请求下放行数量不超过上限

use std::sync::Arc;

use application::memory::MemoryCounterStore;
use application::{ManualClock, RateLimitPolicy, RateLimiter};
use chrono::{Duration, TimeZone, Utc};
use futures::future::join_all;

fn limiter(clock: Arc<ManualClock>) -> Arc<RateLimiter> {
    Arc::new(RateLimiter::new(
        Arc::new(MemoryCounterStore::new()),
        clock,
        "rate_limit",
        RateLimitPolicy::default(),
    ))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_anonymous_requests_admit_exactly_ceiling() {
    let clock = Arc::new(ManualClock::new(Utc.timestamp_opt(1_700_000_040, 0).unwrap()));
    let limiter = limiter(clock);

    let tasks = (0..50).map(|_| {
        let limiter = limiter.clone();
        tokio::spawn(async move { limiter.allow("203.0.113.7", false).await })
    });
    let admitted = join_all(tasks)
        .await
        .into_iter()
        .filter(|allowed| matches!(allowed, Ok(true)))
        .count();

    assert_eq!(admitted, 20);
}

#[tokio::test]
async fn test_identities_are_counted_separately() {
    let clock = Arc::new(ManualClock::new(Utc.timestamp_opt(1_700_000_040, 0).unwrap()));
    let limiter = limiter(clock.clone());

    for _ in 0..20 {
        assert!(limiter.allow("a", false).await);
    }
    assert!(!limiter.allow("a", false).await);
    assert!(limiter.allow("b", false).await);

    // 固定窗口：跨过分钟边界后立即重新计数
    clock.advance(Duration::seconds(60));
    assert!(limiter.allow("a", false).await);
}
