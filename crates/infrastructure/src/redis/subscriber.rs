//! 在线状态订阅者
//!
//! 长期运行的后台任务：订阅共享频道，把收到的事件交给 [`PresenceReplicator`]。
//! 连接断开后按指数退避重连；超过最大次数后停止，在线状态退化为本实例视图，
//! 消息链路不受影响。

use std::sync::Arc;
use std::time::Duration;

use application::PresenceReplicator;
use futures_util::stream::StreamExt;
use redis::Client;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::error::{RedisError, RedisResult};

/// 退避上限
const MAX_BACKOFF: Duration = Duration::from_secs(60);

pub struct PresenceSubscriber {
    client: Client,
    channel: String,
    reconnect_interval: Duration,
    max_reconnect_attempts: u32,
}

impl PresenceSubscriber {
    pub fn new(
        client: Client,
        channel: impl Into<String>,
        reconnect_interval: Duration,
        max_reconnect_attempts: u32,
    ) -> Self {
        Self {
            client,
            channel: channel.into(),
            reconnect_interval,
            max_reconnect_attempts,
        }
    }

    pub fn spawn(
        self,
        replicator: Arc<PresenceReplicator>,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(self.run(replicator, shutdown))
    }

    pub async fn run(self, replicator: Arc<PresenceReplicator>, shutdown: CancellationToken) {
        let mut failures: u32 = 0;

        while !shutdown.is_cancelled() {
            match self.listen(&replicator, &shutdown, &mut failures).await {
                Ok(()) => break,
                Err(err) => {
                    failures += 1;
                    error!(
                        channel = %self.channel,
                        attempt = failures,
                        error = %err,
                        "在线状态频道连接中断"
                    );

                    if failures >= self.max_reconnect_attempts {
                        error!(
                            channel = %self.channel,
                            "在线状态频道不可用，已达最大重试次数，降级为本实例在线状态"
                        );
                        break;
                    }

                    let delay = backoff_delay(self.reconnect_interval, failures);
                    warn!(delay_ms = delay.as_millis() as u64, "准备重连在线状态频道");
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = sleep(delay) => {}
                    }
                }
            }
        }

        info!(channel = %self.channel, "在线状态订阅已停止");
    }

    /// 正常关闭时返回 `Ok`，连接失败或流结束时返回错误以触发重连。
    async fn listen(
        &self,
        replicator: &PresenceReplicator,
        shutdown: &CancellationToken,
        failures: &mut u32,
    ) -> RedisResult<()> {
        let mut pubsub =
            self.client
                .get_async_pubsub()
                .await
                .map_err(|e| RedisError::ConnectionError {
                    message: format!("获取 PubSub 连接失败: {}", e),
                })?;
        pubsub
            .subscribe(&self.channel)
            .await
            .map_err(|e| RedisError::SubscribeError {
                message: format!("订阅频道 {} 失败: {}", self.channel, e),
            })?;

        *failures = 0;
        info!(channel = %self.channel, "已订阅在线状态频道");

        let mut messages = pubsub.on_message();
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                message = messages.next() => {
                    let Some(message) = message else {
                        return Err(RedisError::SubscribeError {
                            message: "订阅流已结束".to_string(),
                        });
                    };
                    match message.get_payload::<String>() {
                        Ok(payload) => {
                            debug!(channel = %self.channel, "收到在线状态事件");
                            replicator.on_remote_event(&payload).await;
                        }
                        Err(err) => {
                            warn!(error = %err, "在线状态事件负载不是字符串，已丢弃");
                        }
                    }
                }
            }
        }
    }
}

/// 第 `attempt` 次失败后的等待时间：`base * 2^(attempt-1)`，不超过 [`MAX_BACKOFF`]
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
    base.saturating_mul(factor).min(MAX_BACKOFF)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let base = Duration::from_millis(500);
        assert_eq!(backoff_delay(base, 1), Duration::from_millis(500));
        assert_eq!(backoff_delay(base, 2), Duration::from_millis(1000));
        assert_eq!(backoff_delay(base, 4), Duration::from_millis(4000));
        assert_eq!(backoff_delay(base, 30), MAX_BACKOFF);
    }
}
