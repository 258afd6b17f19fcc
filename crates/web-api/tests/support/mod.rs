#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use application::memory::{InMemoryStore, MemoryCounterStore, MemoryPresenceBus};
use application::{SystemClock, UserRepository};
use chrono::Utc;
use config::AppConfig;
use domain::{Room, RoomId, RoomKind, RoomSettings, User, UserId};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use web_api::{router, AppState, AppStateDependencies, Repositories};

pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.jwt.secret = "integration-test-secret-with-enough-length".to_string();
    config
}

pub struct TestApp {
    pub base_url: String,
    pub ws_url: String,
    pub store: Arc<InMemoryStore>,
    pub state: AppState,
    pub shutdown: CancellationToken,
    pub http: reqwest::Client,
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with(test_config()).await
}

/// 使用内存协作方启动一个真实监听端口的服务
pub async fn spawn_app_with(config: AppConfig) -> TestApp {
    let store = Arc::new(InMemoryStore::new());
    let shutdown = CancellationToken::new();
    let bus = MemoryPresenceBus::new(256);

    let (state, _tasks) = AppState::build(
        &config,
        AppStateDependencies {
            repositories: Repositories {
                users: store.clone(),
                rooms: store.clone(),
                participants: store.clone(),
                messages: store.clone(),
            },
            counter_store: Arc::new(MemoryCounterStore::new()),
            presence_channel: Arc::new(bus.clone()),
            clock: Arc::new(SystemClock),
            shutdown: shutdown.clone(),
        },
    );
    bus.attach(state.presence.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = router(state.clone(), None);
    let server_shutdown = shutdown.clone();
    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move { server_shutdown.cancelled().await })
        .await
        .unwrap();
    });

    TestApp {
        base_url: format!("http://{addr}"),
        ws_url: format!("ws://{addr}/ws"),
        store,
        state,
        shutdown,
        http: reqwest::Client::new(),
    }
}

impl TestApp {
    pub async fn create_user(&self, name: &str) -> (UserId, String) {
        let id = UserId::generate();
        self.store
            .save(User::new(id, name, "github", name.to_lowercase()))
            .await
            .unwrap();
        let token = self.state.jwt_service.generate_token(id).unwrap();
        (id, token)
    }

    pub async fn create_direct_room(&self, a: UserId, b: UserId) -> RoomId {
        let room = Room::new_direct(RoomId::generate(), a, b, Utc::now()).unwrap();
        self.store.insert_room(room).await.id
    }

    pub async fn create_group_room(
        &self,
        owner: UserId,
        kind: RoomKind,
        max_participants: Option<i32>,
    ) -> RoomId {
        let room = Room::new_group(
            RoomId::generate(),
            "general",
            kind,
            owner,
            max_participants,
            RoomSettings::default(),
            Utc::now(),
        )
        .unwrap();
        self.store.insert_room(room).await.id
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn connect(&self, token: &str) -> WsClient {
        let (stream, _) = connect_async(format!("{}?token={}", self.ws_url, token))
            .await
            .expect("websocket handshake failed");
        WsClient { stream }
    }
}

pub struct WsClient {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WsClient {
    pub async fn send(&mut self, destination: &str, payload: Value) {
        let frame = json!({ "destination": destination, "payload": payload });
        self.stream
            .send(Message::Text(frame.to_string().into()))
            .await
            .unwrap();
    }

    pub async fn subscribe(&mut self, topic: &str) {
        self.send("subscribe", json!({ "topic": topic })).await;
    }

    /// 等待下一个发往 `topic` 的帧，返回其 payload
    pub async fn next_on(&mut self, topic: &str, wait: Duration) -> Option<Value> {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            let frame = tokio::time::timeout_at(deadline, self.stream.next())
                .await
                .ok()??
                .ok()?;
            let Message::Text(text) = frame else {
                continue;
            };
            let envelope: Value = serde_json::from_str(text.as_str()).ok()?;
            if envelope["topic"] == topic {
                return Some(envelope["payload"].clone());
            }
        }
    }

    /// 丢弃收到的帧，直到服务端关闭连接；超时返回 false
    pub async fn closed_by_server_within(&mut self, wait: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            match tokio::time::timeout_at(deadline, self.stream.next()).await {
                Err(_) => return false,
                Ok(None) | Ok(Some(Err(_))) | Ok(Some(Ok(Message::Close(_)))) => return true,
                Ok(Some(Ok(_))) => continue,
            }
        }
    }

    pub async fn close(mut self) {
        let _ = self.stream.close(None).await;
    }
}

/// 轮询直到条件成立或超时
pub async fn eventually<F, Fut>(wait: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + wait;
    while tokio::time::Instant::now() < deadline {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    condition().await
}
