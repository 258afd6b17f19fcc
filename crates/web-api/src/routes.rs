use std::net::SocketAddr;

use application::dto::ChatMessageResponse;
use axum::{
    extract::{ws::WebSocketUpgrade, ConnectInfo, Path, Query, Request, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use domain::{Participant, RoomId, UserId};
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;
use crate::ws_connection::WebSocketConnection;

#[derive(Debug, Deserialize)]
struct WsQuery {
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OfflinePayload {
    user_id: UserId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddParticipantPayload {
    /// 缺省为调用者自己
    #[serde(default)]
    user_id: Option<UserId>,
}

pub fn router(state: AppState, allowed_origin: Option<&str>) -> Router {
    let limited = Router::new()
        .route("/ws", get(websocket_upgrade))
        .nest("/api/v1", api_routes())
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit));

    Router::new()
        .route("/health", get(health))
        .merge(limited)
        .layer(cors_layer(allowed_origin))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/online-users", get(online_users))
        .route("/presence/offline", post(mark_offline))
        .route("/messages/room/{room_id}", get(recent_messages))
        .route("/rooms/{room_id}/participants", post(add_participant))
}

fn cors_layer(allowed_origin: Option<&str>) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    match allowed_origin.and_then(|origin| HeaderValue::from_str(origin).ok()) {
        Some(origin) => layer.allow_origin(origin),
        None => layer.allow_origin(Any),
    }
}

async fn health() -> StatusCode {
    StatusCode::OK
}

/// 固定窗口限流：已登录用户按用户 ID 计数，匿名请求按客户端 IP 计数。
/// 只有配置了 `trust_forwarded_for` 才读取 `X-Forwarded-For`，否则以 TCP 对端地址为准。
async fn rate_limit(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let user = state
        .jwt_service
        .user_from_headers(request.headers())
        .ok()
        .flatten();
    let (identity, authenticated) = match user {
        Some(user_id) => (user_id.to_string(), true),
        None => (client_ip(&request, state.trust_forwarded_for), false),
    };

    if !state.rate_limiter.allow(&identity, authenticated).await {
        tracing::debug!(identity = %identity, authenticated, "请求被限流");
        return ApiError::too_many_requests().into_response();
    }
    next.run(request).await
}

fn client_ip(request: &Request, trust_forwarded_for: bool) -> String {
    let forwarded = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if let Some(forwarded) = forwarded.filter(|_| trust_forwarded_for) {
        return forwarded.to_owned();
    }
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_owned())
}

async fn websocket_upgrade(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let user_id = match query.token {
        Some(token) => state.jwt_service.verify_token(&token)?.sub,
        None => state
            .jwt_service
            .user_from_headers(&headers)?
            .ok_or_else(|| ApiError::unauthorized("Missing token"))?,
    };

    let limit = state.transport.message_size_limit;
    Ok(ws
        .max_message_size(limit)
        .on_upgrade(move |socket| WebSocketConnection::serve(socket, state, user_id)))
}

async fn online_users(State(state): State<AppState>) -> Json<Vec<UserId>> {
    let mut users: Vec<UserId> = state.presence.store().list_online().into_iter().collect();
    users.sort();
    Json(users)
}

/// 只能把自己标记为离线
async fn mark_offline(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Json(payload): Json<OfflinePayload>,
) -> Result<StatusCode, ApiError> {
    if payload.user_id != caller {
        return Err(ApiError::forbidden("cannot change another user's presence"));
    }
    state.presence.set_local(caller, false).await;
    Ok(StatusCode::NO_CONTENT)
}

async fn recent_messages(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Path(room_id): Path<RoomId>,
) -> Result<Json<Vec<ChatMessageResponse>>, ApiError> {
    let messages = state.message_history.recent(room_id, caller).await?;
    Ok(Json(messages))
}

async fn add_participant(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Path(room_id): Path<RoomId>,
    Json(payload): Json<AddParticipantPayload>,
) -> Result<(StatusCode, Json<Participant>), ApiError> {
    let target = payload.user_id.unwrap_or(caller);
    let participant = state
        .participant_service
        .add_participant(caller, room_id, target)
        .await?;
    Ok((StatusCode::CREATED, Json(participant)))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use application::memory::{InMemoryStore, MemoryCounterStore, MemoryPresenceBus};
    use application::SystemClock;
    use axum::body::Body;
    use axum::http::Request as HttpRequest;
    use config::AppConfig;
    use tokio_util::sync::CancellationToken;
    use tower::ServiceExt;

    use super::*;
    use crate::state::{AppStateDependencies, Repositories};

    fn app() -> (Router, AppState) {
        let mut config = AppConfig::default();
        config.jwt.secret = "router-unit-test-secret-long-enough-xyz".to_string();
        let store = Arc::new(InMemoryStore::new());
        let (state, _) = AppState::build(
            &config,
            AppStateDependencies {
                repositories: Repositories {
                    users: store.clone(),
                    rooms: store.clone(),
                    participants: store.clone(),
                    messages: store,
                },
                counter_store: Arc::new(MemoryCounterStore::new()),
                presence_channel: Arc::new(MemoryPresenceBus::default()),
                clock: Arc::new(SystemClock),
                shutdown: CancellationToken::new(),
            },
        );
        (router(state.clone(), Some("http://localhost:3000")), state)
    }

    #[tokio::test]
    async fn health_responds_ok() {
        let (app, _) = app();
        let response = app
            .oneshot(HttpRequest::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn history_requires_bearer_token() {
        let (app, _) = app();
        let response = app
            .oneshot(
                HttpRequest::get(format!("/api/v1/messages/room/{}", RoomId::generate()))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn online_users_lists_local_presence() {
        let (app, state) = app();
        let user = UserId::generate();
        state.presence.session_opened(user).await;

        let response = app
            .oneshot(
                HttpRequest::get("/api/v1/online-users")
                    .header("x-forwarded-for", "203.0.113.9")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let users: Vec<UserId> = serde_json::from_slice(&body).unwrap();
        assert_eq!(users, vec![user]);
    }

    #[tokio::test]
    async fn cors_allows_configured_origin() {
        let (app, _) = app();
        let response = app
            .oneshot(
                HttpRequest::get("/health")
                    .header("origin", "http://localhost:3000")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(
            response.headers().get("access-control-allow-origin").unwrap(),
            "http://localhost:3000"
        );
    }
}
