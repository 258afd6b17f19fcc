// 进程内主题广播器
use crate::broadcaster::{BroadcastError, Envelope, MessageBroadcaster};
use async_trait::async_trait;
use tokio::sync::broadcast;

/// 基于 tokio broadcast 的进程内传输：每个连接持有一个订阅，自行按主题过滤。
///
/// 消费过慢的订阅者会丢失最旧的帧而不会拖慢发送方。
#[derive(Clone)]
pub struct LocalTopicBroadcaster {
    sender: broadcast::Sender<Envelope>,
}

impl LocalTopicBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> TopicStream {
        TopicStream {
            receiver: self.sender.subscribe(),
        }
    }
}

impl Default for LocalTopicBroadcaster {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl MessageBroadcaster for LocalTopicBroadcaster {
    async fn broadcast(&self, envelope: Envelope) -> Result<(), BroadcastError> {
        // 没有任何连接时直接返回
        if self.sender.receiver_count() == 0 {
            return Ok(());
        }
        self.sender
            .send(envelope)
            .map_err(|err| BroadcastError::failed(err.to_string()))?;
        Ok(())
    }
}

pub struct TopicStream {
    receiver: broadcast::Receiver<Envelope>,
}

impl TopicStream {
    /// 下一帧；广播器关闭时返回 `None`。
    pub async fn recv(&mut self) -> Option<Envelope> {
        loop {
            match self.receiver.recv().await {
                Ok(envelope) => return Some(envelope),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "订阅者消费过慢，丢弃部分消息");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
