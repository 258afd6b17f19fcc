//! Web API 层。
//!
//! 提供 Axum 路由：WebSocket 帧分发到应用层的消息管道与在线状态复制，
//! 以及在线用户、历史消息、房间成员等 REST 接口。

mod auth;
mod error;
mod heartbeat;
mod pools;
mod routes;
mod state;
mod ws_connection;

pub use auth::{AuthUser, Claims, JwtService};
pub use error::{ApiError, ErrorBody};
pub use heartbeat::HeartbeatScheduler;
pub use pools::{WorkerPool, WorkerPools};
pub use routes::router;
pub use state::{AppState, AppStateDependencies, BackgroundTasks, Repositories};
pub use ws_connection::WebSocketConnection;
