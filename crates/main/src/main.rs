//! 主应用程序入口
//!
//! 加载配置，连接 Redis，装配服务并启动 Axum Web API。

use std::net::SocketAddr;
use std::sync::Arc;

use application::memory::InMemoryStore;
use application::SystemClock;
use config::AppConfig;
use infrastructure::Infrastructure;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use web_api::{router, AppState, AppStateDependencies, Repositories};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::load()?;
    let shutdown = CancellationToken::new();

    let infra = Infrastructure::connect(&config.redis).await?;

    // 房间、成员、消息与用户数据保存在进程内
    let store = Arc::new(InMemoryStore::new());
    let (state, tasks) = AppState::build(
        &config,
        AppStateDependencies {
            repositories: Repositories {
                users: store.clone(),
                rooms: store.clone(),
                participants: store.clone(),
                messages: store,
            },
            counter_store: infra.counter_store_trait(),
            presence_channel: infra.presence_channel_trait(),
            clock: Arc::new(SystemClock),
            shutdown: shutdown.clone(),
        },
    );

    let subscriber = infra
        .presence_subscriber
        .spawn(state.presence.clone(), shutdown.clone());

    let app = router(state, config.server.allowed_origin.as_deref());
    let listener = tokio::net::TcpListener::bind(config.server_addr()).await?;
    tracing::info!("聊天室服务器启动在 http://{}", listener.local_addr()?);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
    .await?;

    // 路由及其持有的服务已释放，持久化队列排空后退出
    shutdown.cancel();
    if let Err(err) = tasks.persistence.await {
        tracing::error!(error = %err, "持久化任务异常退出");
    }
    for handle in tasks.heartbeats {
        let _ = handle.await;
    }
    let _ = subscriber.await;

    tracing::info!("服务已停止");
    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(err) = result {
                tracing::error!(error = %err, "监听退出信号失败");
            }
        }
        _ = shutdown.cancelled() => {}
    }
    tracing::info!("收到退出信号，开始关闭");
    shutdown.cancel();
}
