use std::sync::Arc;

use domain::Message;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;

use crate::repository::MessageRepository;

/// 异步持久化调度器
///
/// 广播之后把消息交给独立的有界队列，由专用的并发额度写入存储。
/// 调度方从不等待写入结果，失败只记录日志，不会撤回已送达的广播，也没有重试。
#[derive(Clone)]
pub struct PersistenceDispatcher {
    sender: mpsc::Sender<Message>,
}

impl PersistenceDispatcher {
    /// 启动后台写入循环。所有 dispatcher 句柄被丢弃后循环退出。
    pub fn spawn(
        repository: Arc<dyn MessageRepository>,
        workers: usize,
        queue: usize,
    ) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(queue.max(1));
        let handle = tokio::spawn(run(repository, receiver, workers.max(1)));
        (Self { sender }, handle)
    }

    /// 提交一条消息，立即返回。队列已满时丢弃并记录错误。
    pub fn dispatch(&self, message: Message) {
        let message_id = message.id;
        match self.sender.try_send(message) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::error!(message_id = %message_id, "持久化队列已满，消息未保存");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::error!(message_id = %message_id, "持久化调度器已关闭，消息未保存");
            }
        }
    }
}

async fn run(
    repository: Arc<dyn MessageRepository>,
    mut receiver: mpsc::Receiver<Message>,
    workers: usize,
) {
    let permits = Arc::new(Semaphore::new(workers));

    while let Some(message) = receiver.recv().await {
        let Ok(permit) = permits.clone().acquire_owned().await else {
            break;
        };
        let repository = repository.clone();
        tokio::spawn(async move {
            let _permit = permit;
            let message_id = message.id;
            let room_id = message.room_id;
            match repository.insert(message).await {
                Ok(()) => {
                    tracing::debug!(message_id = %message_id, room_id = %room_id, "消息已持久化");
                }
                Err(err) => {
                    tracing::error!(
                        message_id = %message_id,
                        room_id = %room_id,
                        error = %err,
                        "消息持久化失败"
                    );
                }
            }
        });
    }

    // 等待已经派发的写入完成
    let _ = permits.acquire_many(workers as u32).await;
    tracing::info!("持久化调度器已停止");
}
