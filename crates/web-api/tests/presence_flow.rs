//! 在线状态：连接计数、REST 视图、显式离线

mod support;

use std::time::Duration;

use domain::UserId;
use reqwest::StatusCode;
use serde_json::{json, Value};
use support::{eventually, spawn_app};

const WAIT: Duration = Duration::from_secs(3);

async fn online_users(app: &support::TestApp) -> Vec<UserId> {
    app.http
        .get(app.url("/api/v1/online-users"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

#[tokio::test]
async fn connection_lifecycle_drives_presence() {
    let app = &spawn_app().await;
    let (alice, alice_token) = app.create_user("Alice").await;

    let first = app.connect(&alice_token).await;
    let second = app.connect(&alice_token).await;
    assert!(eventually(WAIT, || async move { app.state.presence.local_sessions(alice) == 2 }).await);
    assert_eq!(online_users(app).await, vec![alice]);

    // 仍有一个连接，保持在线
    first.close().await;
    assert!(eventually(WAIT, || async move { app.state.presence.local_sessions(alice) == 1 }).await);
    assert!(app.state.presence.store().is_online(alice));

    second.close().await;
    assert!(eventually(WAIT, || async move { !app.state.presence.store().is_online(alice) }).await);
    assert!(online_users(app).await.is_empty());
}

#[tokio::test]
async fn presence_transitions_are_broadcast_to_connected_clients() {
    let app = &spawn_app().await;
    let (observer_id, observer_token) = app.create_user("Observer").await;
    let (bob, bob_token) = app.create_user("Bob").await;

    let mut observer = app.connect(&observer_token).await;
    assert!(eventually(WAIT, || async move { app.state.presence.store().is_online(observer_id) }).await);
    let bob_ws = app.connect(&bob_token).await;

    let mut saw_bob_online = false;
    while let Some(event) = observer.next_on("presence", WAIT).await {
        if event["userId"] == json!(bob) && event["online"] == true {
            saw_bob_online = true;
            break;
        }
    }
    assert!(saw_bob_online);

    bob_ws.close().await;
    let mut saw_bob_offline = false;
    while let Some(event) = observer.next_on("presence", WAIT).await {
        if event["userId"] == json!(bob) && event["online"] == false {
            saw_bob_offline = true;
            break;
        }
    }
    assert!(saw_bob_offline);
}

#[tokio::test]
async fn presence_frame_for_another_user_is_forbidden() {
    let app = &spawn_app().await;
    let (alice, alice_token) = app.create_user("Alice").await;
    let (bob, bob_token) = app.create_user("Bob").await;
    let _bob_ws = app.connect(&bob_token).await;
    let mut alice_ws = app.connect(&alice_token).await;
    assert!(eventually(WAIT, || async move { app.state.presence.store().is_online(bob) }).await);

    alice_ws
        .send("presence", json!({ "userId": bob, "online": false }))
        .await;
    let error = alice_ws
        .next_on(&format!("errors.{alice}"), WAIT)
        .await
        .expect("rejection not reported");
    assert_eq!(error["code"], "FORBIDDEN");
    assert!(app.state.presence.store().is_online(bob));

    alice_ws
        .send("presence", json!({ "userId": alice, "online": false }))
        .await;
    assert!(eventually(WAIT, || async move { !app.state.presence.store().is_online(alice) }).await);
}

#[tokio::test]
async fn explicit_offline_only_for_self() {
    let app = &spawn_app().await;
    let (alice, alice_token) = app.create_user("Alice").await;
    let (bob, _) = app.create_user("Bob").await;
    let _ws = app.connect(&alice_token).await;
    assert!(eventually(WAIT, || async move { app.state.presence.store().is_online(alice) }).await);

    let response = app
        .http
        .post(app.url("/api/v1/presence/offline"))
        .bearer_auth(&alice_token)
        .json(&json!({ "userId": bob }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "FORBIDDEN");

    let response = app
        .http
        .post(app.url("/api/v1/presence/offline"))
        .json(&json!({ "userId": alice }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .http
        .post(app.url("/api/v1/presence/offline"))
        .bearer_auth(&alice_token)
        .json(&json!({ "userId": alice }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(online_users(app).await.is_empty());
}
