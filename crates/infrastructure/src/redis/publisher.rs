//! 在线状态发布者

use application::{ApplicationError, PresenceChannel};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::debug;

use super::error::RedisError;

/// 把 `{userId, online}` 发布到共享频道，所有实例（包括自己）都会收到。
#[derive(Clone)]
pub struct RedisPresencePublisher {
    connection: ConnectionManager,
    channel: String,
}

impl RedisPresencePublisher {
    pub fn new(connection: ConnectionManager, channel: impl Into<String>) -> Self {
        Self {
            connection,
            channel: channel.into(),
        }
    }
}

#[async_trait]
impl PresenceChannel for RedisPresencePublisher {
    async fn publish(&self, payload: String) -> Result<(), ApplicationError> {
        let mut connection = self.connection.clone();
        let receivers: i64 = connection
            .publish(&self.channel, payload)
            .await
            .map_err(|err| RedisError::PublishError {
                message: err.to_string(),
            })?;
        debug!(channel = %self.channel, receivers, "在线状态已发布");
        Ok(())
    }
}
