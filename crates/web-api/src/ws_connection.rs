use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use application::{
    dto::{AddUserCommand, SendFailure, SendMessageCommand, TypingCommand},
    ApplicationError, Envelope, MessageBroadcaster, SendOutcome, Topic, TopicStream,
};
use axum::body::Bytes;
use axum::extract::ws::{Message as WsMessage, WebSocket};
use dashmap::DashSet;
use domain::UserId;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::pools::WorkerPool;
use crate::state::AppState;

/// 写任务的输入
#[derive(Debug)]
pub enum Outbound {
    Frame(String),
    Ping,
    Pong(Bytes),
}

/// 客户端发来的一帧：`{"destination": ..., "payload": {...}}`
#[derive(Debug, Deserialize)]
#[serde(tag = "destination", content = "payload")]
enum ClientFrame {
    #[serde(rename = "chat.sendMessage")]
    SendMessage(SendMessageCommand),
    #[serde(rename = "chat.addUser")]
    AddUser(AddUserCommand),
    #[serde(rename = "presence")]
    Presence(PresenceUpdate),
    #[serde(rename = "typing")]
    Typing(TypingCommand),
    #[serde(rename = "subscribe")]
    Subscribe(Subscription),
    #[serde(rename = "unsubscribe")]
    Unsubscribe(Subscription),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PresenceUpdate {
    #[serde(default)]
    user_id: Option<UserId>,
    online: bool,
}

#[derive(Debug, Deserialize)]
struct Subscription {
    topic: Topic,
}

/// WebSocket 连接
///
/// 一个连接由三个任务组成：
/// - 读循环把文本帧放进有界的入站队列，由分发任务在入站工作池额度内逐帧处理
/// - 转发任务从进程内广播器取出已订阅主题的帧，累计未发出的字节数
/// - 写任务在出站工作池额度内写 socket，每次写入都有超时
///
/// 超时、积压超限或进程关闭都会取消连接令牌，三个任务随之退出。
pub struct WebSocketConnection {
    id: u64,
    user_id: UserId,
    state: AppState,
    subscriptions: DashSet<Topic>,
    outbound: mpsc::UnboundedSender<Outbound>,
    pending_bytes: Arc<AtomicUsize>,
    closed: CancellationToken,
}

impl WebSocketConnection {
    pub async fn serve(socket: WebSocket, state: AppState, user_id: UserId) {
        let id = state.next_connection_id();
        let (sink, stream) = socket.split();
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let closed = state.shutdown.child_token();
        let pending_bytes = Arc::new(AtomicUsize::new(0));

        // 先订阅广播器，连接建立后的帧不会漏掉
        let topics = state.broadcaster.subscribe();
        let subscriptions = DashSet::new();
        subscriptions.insert(Topic::Presence);
        subscriptions.insert(Topic::UserErrors(user_id));

        let connection = Arc::new(Self {
            id,
            user_id,
            state: state.clone(),
            subscriptions,
            outbound: outbound.clone(),
            pending_bytes: pending_bytes.clone(),
            closed: closed.clone(),
        });

        tracing::info!(connection_id = id, user_id = %user_id, "WebSocket 连接已建立");
        state.presence.session_opened(user_id).await;
        state.heartbeat.register(id, outbound);

        let writer = tokio::spawn(write_loop(
            sink,
            outbound_rx,
            state.pools.outbound.clone(),
            Duration::from_secs(state.transport.send_time_limit_secs),
            pending_bytes,
            closed.clone(),
        ));
        let forwarder = tokio::spawn(connection.clone().forward(topics));
        let (frames, frames_rx) = mpsc::channel(state.inbound_queue.max(1));
        let dispatcher = tokio::spawn(connection.clone().dispatch(frames_rx));

        connection.read_loop(stream, frames).await;
        closed.cancel();

        for (task, handle) in [("dispatcher", dispatcher), ("forwarder", forwarder), ("writer", writer)] {
            if let Err(err) = handle.await {
                tracing::error!(connection_id = id, task, error = %err, "连接任务异常退出");
            }
        }

        state.heartbeat.unregister(id);
        state.presence.session_closed(user_id).await;
        tracing::info!(connection_id = id, user_id = %user_id, "WebSocket 连接已断开");
    }

    async fn read_loop(&self, mut stream: SplitStream<WebSocket>, frames: mpsc::Sender<String>) {
        loop {
            let message = tokio::select! {
                _ = self.closed.cancelled() => break,
                message = stream.next() => message,
            };

            match message {
                Some(Ok(WsMessage::Text(text))) => {
                    if frames.send(text.as_str().to_owned()).await.is_err() {
                        break;
                    }
                }
                Some(Ok(WsMessage::Ping(data))) => {
                    if self.outbound.send(Outbound::Pong(data)).is_err() {
                        break;
                    }
                }
                Some(Ok(WsMessage::Pong(_))) => {
                    tracing::trace!(connection_id = self.id, "收到pong消息");
                }
                Some(Ok(WsMessage::Binary(_))) => {
                    tracing::debug!(connection_id = self.id, "忽略二进制帧");
                }
                Some(Ok(WsMessage::Close(_))) | None => break,
                Some(Err(err)) => {
                    tracing::debug!(connection_id = self.id, error = %err, "读取 WebSocket 帧失败");
                    break;
                }
            }
        }
    }

    async fn dispatch(self: Arc<Self>, mut frames: mpsc::Receiver<String>) {
        while let Some(text) = frames.recv().await {
            let Some(_permit) = self.state.pools.inbound.acquire().await else {
                break;
            };
            self.handle_frame(&text).await;
        }
    }

    async fn forward(self: Arc<Self>, mut topics: TopicStream) {
        let limit = self.state.transport.send_buffer_size_limit;
        loop {
            let envelope = tokio::select! {
                _ = self.closed.cancelled() => break,
                envelope = topics.recv() => match envelope {
                    Some(envelope) => envelope,
                    None => break,
                },
            };
            if !self.subscriptions.contains(&envelope.topic) {
                continue;
            }

            let text = match serde_json::to_string(&envelope) {
                Ok(text) => text,
                Err(err) => {
                    tracing::warn!(error = %err, "WebSocket 负载序列化失败");
                    continue;
                }
            };
            let queued = self.pending_bytes.fetch_add(text.len(), Ordering::AcqRel) + text.len();
            if queued > limit {
                tracing::warn!(
                    connection_id = self.id,
                    user_id = %self.user_id,
                    queued,
                    limit,
                    "客户端消费过慢，强制关闭连接"
                );
                self.closed.cancel();
                break;
            }
            if self.outbound.send(Outbound::Frame(text)).is_err() {
                break;
            }
        }
    }

    async fn handle_frame(&self, text: &str) {
        let frame: ClientFrame = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(err) => {
                tracing::warn!(connection_id = self.id, error = %err, "无法解析的客户端帧");
                self.report(None, &ApplicationError::invalid_request(format!("malformed frame: {err}")))
                    .await;
                return;
            }
        };

        let result = match frame {
            ClientFrame::SendMessage(command) => {
                // 失败已由消息管道报告到错误主题
                if let SendOutcome::Delivered(response) = self
                    .state
                    .chat_service
                    .send_message(Some(self.user_id), command)
                    .await
                {
                    tracing::debug!(message_id = %response.id, room_id = %response.room_id, "消息已广播");
                }
                Ok(())
            }
            ClientFrame::AddUser(command) => self
                .state
                .chat_service
                .announce_join(self.user_id, command)
                .await
                .map(|_| ()),
            ClientFrame::Presence(update) => self.update_presence(update).await,
            ClientFrame::Typing(command) => {
                self.state
                    .chat_service
                    .relay_typing(self.user_id, command)
                    .await
            }
            ClientFrame::Subscribe(subscription) => self.subscribe(subscription.topic).await,
            ClientFrame::Unsubscribe(subscription) => {
                self.subscriptions.remove(&subscription.topic);
                Ok(())
            }
        };

        if let Err(err) = result {
            self.report(None, &err).await;
        }
    }

    async fn update_presence(&self, update: PresenceUpdate) -> Result<(), ApplicationError> {
        if update.user_id.is_some_and(|user_id| user_id != self.user_id) {
            return Err(ApplicationError::forbidden(
                "presence can only be reported for the session user",
            ));
        }
        self.state.presence.set_local(self.user_id, update.online).await;
        Ok(())
    }

    /// 房间主题只对成员开放，错误主题只能订阅自己的
    async fn subscribe(&self, topic: Topic) -> Result<(), ApplicationError> {
        match topic {
            Topic::Public(room_id) | Topic::Typing(room_id) => {
                self.state
                    .authorizer
                    .require_participant(room_id, self.user_id)
                    .await?;
            }
            Topic::UserErrors(user_id) if user_id != self.user_id => {
                return Err(ApplicationError::forbidden(
                    "cannot subscribe to another user's error queue",
                ));
            }
            Topic::UserErrors(_) | Topic::Presence => {}
        }
        self.subscriptions.insert(topic);
        tracing::debug!(connection_id = self.id, topic = %topic, "订阅主题");
        Ok(())
    }

    async fn report(&self, temp_id: Option<String>, err: &ApplicationError) {
        let failure = SendFailure {
            temp_id,
            code: err.code().to_owned(),
            message: err.to_string(),
        };
        let result = match Envelope::new(Topic::UserErrors(self.user_id), &failure) {
            Ok(envelope) => self.state.broadcaster.broadcast(envelope).await,
            Err(err) => Err(err),
        };
        if let Err(err) = result {
            tracing::warn!(user_id = %self.user_id, error = %err, "错误通知发送失败");
        }
    }
}

async fn write_loop(
    mut sink: SplitSink<WebSocket, WsMessage>,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    pool: WorkerPool,
    send_time_limit: Duration,
    pending_bytes: Arc<AtomicUsize>,
    closed: CancellationToken,
) {
    loop {
        let item = tokio::select! {
            _ = closed.cancelled() => break,
            item = outbound.recv() => match item {
                Some(item) => item,
                None => break,
            },
        };

        let (message, size) = match item {
            Outbound::Frame(text) => {
                let size = text.len();
                (WsMessage::Text(text.into()), size)
            }
            Outbound::Ping => (WsMessage::Ping(Bytes::new()), 0),
            Outbound::Pong(data) => (WsMessage::Pong(data), 0),
        };

        let Some(_permit) = pool.acquire().await else {
            break;
        };
        let result = tokio::time::timeout(send_time_limit, sink.send(message)).await;
        pending_bytes.fetch_sub(size, Ordering::AcqRel);

        match result {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                tracing::debug!(error = %err, "WebSocket 写入失败");
                break;
            }
            Err(_) => {
                tracing::warn!(limit_secs = send_time_limit.as_secs(), "WebSocket 写入超时，强制关闭连接");
                break;
            }
        }
    }

    closed.cancel();
    let _ = tokio::time::timeout(send_time_limit, sink.close()).await;
    tracing::debug!("WebSocket发送任务结束");
}
