//! 连接心跳调度
//!
//! 固定数量的心跳任务，每个任务负责一部分连接，与消息处理的工作池互不影响。

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::ws_connection::Outbound;

type Shard = Arc<DashMap<u64, mpsc::UnboundedSender<Outbound>>>;

#[derive(Clone)]
pub struct HeartbeatScheduler {
    shards: Arc<Vec<Shard>>,
}

impl HeartbeatScheduler {
    /// 启动 `workers` 个心跳任务，每隔 `interval` 向各自分片内的连接发送 ping
    pub fn spawn(
        workers: usize,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> (Self, Vec<JoinHandle<()>>) {
        let shards: Vec<Shard> = (0..workers.max(1))
            .map(|_| Arc::new(DashMap::new()))
            .collect();

        let handles = shards
            .iter()
            .enumerate()
            .map(|(index, shard)| {
                tokio::spawn(run_shard(index, shard.clone(), interval, shutdown.clone()))
            })
            .collect();

        (
            Self {
                shards: Arc::new(shards),
            },
            handles,
        )
    }

    pub fn register(&self, connection_id: u64, sender: mpsc::UnboundedSender<Outbound>) {
        self.shard(connection_id).insert(connection_id, sender);
    }

    pub fn unregister(&self, connection_id: u64) {
        self.shard(connection_id).remove(&connection_id);
    }

    pub fn registered(&self) -> usize {
        self.shards.iter().map(|shard| shard.len()).sum()
    }

    fn shard(&self, connection_id: u64) -> &Shard {
        &self.shards[(connection_id % self.shards.len() as u64) as usize]
    }
}

async fn run_shard(index: usize, shard: Shard, interval: Duration, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    // 第一次 tick 立即完成，跳过
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                // 发送失败说明连接的写任务已退出
                shard.retain(|_, sender| sender.send(Outbound::Ping).is_ok());
            }
        }
    }
    tracing::debug!(shard = index, "心跳任务结束");
}
