use std::sync::Arc;
use std::time::Duration;

use application::{CounterStore, PresenceChannel};
use config::RedisConfig;
use redis::aio::ConnectionManager;
use redis::Client;
use thiserror::Error;

use crate::redis::{PresenceSubscriber, RedisCounterStore, RedisError, RedisPresencePublisher};

#[derive(Debug, Error)]
pub enum InfrastructureError {
    #[error("redis error: {0}")]
    Redis(#[from] RedisError),
}

/// 连接好的外部适配器
pub struct Infrastructure {
    pub counter_store: Arc<RedisCounterStore>,
    pub presence_publisher: Arc<RedisPresencePublisher>,
    /// 尚未启动的订阅者，由调用方在副本创建后 `spawn`
    pub presence_subscriber: PresenceSubscriber,
}

impl Infrastructure {
    pub async fn connect(config: &RedisConfig) -> Result<Self, InfrastructureError> {
        let client = Client::open(config.url.as_str()).map_err(|e| RedisError::ConfigError {
            message: format!("创建 Redis 客户端失败: {}", e),
        })?;
        let connection = ConnectionManager::new(client.clone())
            .await
            .map_err(RedisError::from)?;

        tracing::info!(url = %config.url, channel = %config.presence_channel, "Redis 已连接");

        Ok(Self {
            counter_store: Arc::new(RedisCounterStore::new(connection.clone())),
            presence_publisher: Arc::new(RedisPresencePublisher::new(
                connection,
                config.presence_channel.clone(),
            )),
            presence_subscriber: PresenceSubscriber::new(
                client,
                config.presence_channel.clone(),
                Duration::from_millis(config.reconnect_interval_ms),
                config.max_reconnect_attempts,
            ),
        })
    }

    pub fn counter_store_trait(&self) -> Arc<dyn CounterStore> {
        self.counter_store.clone()
    }

    pub fn presence_channel_trait(&self) -> Arc<dyn PresenceChannel> {
        self.presence_publisher.clone()
    }
}
