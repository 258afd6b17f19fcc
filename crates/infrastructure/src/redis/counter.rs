//! 基于 Redis 的限流计数器
//!
//! 递增与首次设置过期在同一个 Lua 脚本中执行，多个进程并发递增也不会丢计数，
//! 也不会出现没有过期时间的计数键。

use std::time::Duration;

use application::{ApplicationError, CounterStore};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::Script;

use super::error::RedisError;

const INCR_WITH_EXPIRE: &str = r#"
local count = redis.call('INCR', KEYS[1])
if count == 1 then
    redis.call('EXPIRE', KEYS[1], ARGV[1])
end
return count
"#;

#[derive(Clone)]
pub struct RedisCounterStore {
    connection: ConnectionManager,
    script: Script,
}

impl RedisCounterStore {
    pub fn new(connection: ConnectionManager) -> Self {
        Self {
            connection,
            script: Script::new(INCR_WITH_EXPIRE),
        }
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn increment(&self, key: &str, ttl: Duration) -> Result<u64, ApplicationError> {
        let mut connection = self.connection.clone();
        let count: u64 = self
            .script
            .key(key)
            .arg(ttl.as_secs().max(1))
            .invoke_async(&mut connection)
            .await
            .map_err(RedisError::from)?;
        Ok(count)
    }
}
