//! 固定窗口限流
//!
//! 计数键为 `{prefix}:{identity}:{epoch_secs / 60}`，每个 UTC 分钟一个桶。
//! 固定窗口允许在窗口边界处出现最多两倍上限的突发，这是可接受的近似。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::{clock::Clock, error::ApplicationError};

/// 计数桶的存活时间
pub const WINDOW: Duration = Duration::from_secs(60);

/// 原子计数存储，可以跨进程共享
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// 原子递增并返回递增后的值；首次递增时设置 `ttl` 过期。
    async fn increment(&self, key: &str, ttl: Duration) -> Result<u64, ApplicationError>;
}

/// 每分钟请求上限
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub authenticated_per_minute: u64,
    pub anonymous_per_minute: u64,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            authenticated_per_minute: 100,
            anonymous_per_minute: 20,
        }
    }
}

impl From<&config::RateLimitConfig> for RateLimitPolicy {
    fn from(value: &config::RateLimitConfig) -> Self {
        Self {
            authenticated_per_minute: value.authenticated_per_minute,
            anonymous_per_minute: value.anonymous_per_minute,
        }
    }
}

pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
    prefix: String,
    policy: RateLimitPolicy,
}

impl RateLimiter {
    pub fn new(
        store: Arc<dyn CounterStore>,
        clock: Arc<dyn Clock>,
        prefix: impl Into<String>,
        policy: RateLimitPolicy,
    ) -> Self {
        Self {
            store,
            clock,
            prefix: prefix.into(),
            policy,
        }
    }

    /// 当前分钟桶的计数键
    pub fn bucket_key(&self, identity: &str) -> String {
        let minute = self.clock.now().timestamp().div_euclid(60);
        format!("{}:{}:{}", self.prefix, identity, minute)
    }

    /// 递增后的计数不超过该身份类别的上限时放行。
    ///
    /// 计数存储不可用时放行并记录错误，限流不能拖垮消息链路。
    pub async fn allow(&self, identity: &str, authenticated: bool) -> bool {
        let ceiling = if authenticated {
            self.policy.authenticated_per_minute
        } else {
            self.policy.anonymous_per_minute
        };
        let key = self.bucket_key(identity);

        match self.store.increment(&key, WINDOW).await {
            Ok(count) if count <= ceiling => true,
            Ok(count) => {
                tracing::debug!(key = %key, count, ceiling, "请求超过限流上限");
                false
            }
            Err(err) => {
                tracing::error!(key = %key, error = %err, "限流计数失败，放行请求");
                true
            }
        }
    }

    pub async fn check(&self, identity: &str, authenticated: bool) -> Result<(), ApplicationError> {
        if self.allow(identity, authenticated).await {
            Ok(())
        } else {
            Err(ApplicationError::RateLimited)
        }
    }
}
