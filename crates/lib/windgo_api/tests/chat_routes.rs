//! Integration tests for the root, health and chat routes.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use axum::response::Response;
use serde_json::{Value, json};
use tower::ServiceExt;
use windgo_api::config::ApiConfig;
use windgo_api::{AppState, router};
use windgo_core::clock::ManualClock;
use windgo_core::store::memory::MemoryStore;

fn app() -> Router {
    let store = Arc::new(MemoryStore::seeded());
    let state = AppState::new(
        store.clone(),
        store,
        Arc::new(ManualClock::default()),
        ApiConfig::for_tests("chat-test-secret"),
    )
    .unwrap();
    router(state)
}

async fn call(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp: Response = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn post(uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut req = Request::post(uri).header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    req.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut req = Request::get(uri);
    if let Some(token) = token {
        req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    req.body(Body::empty()).unwrap()
}

async fn register(app: &Router, username: &str) -> String {
    let (status, body) = call(
        app,
        post(
            "/auth/register",
            None,
            json!({
                "username": username,
                "email": format!("{username}@x.com"),
                "password": "secret1",
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn root_and_health() {
    let app = app();
    let (status, body) = call(&app, get("/", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"message": "WindGo Chat API is running!"}));

    let (status, body) = call(&app, get("/health", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn rooms_are_public_but_creating_requires_auth() {
    let app = app();
    let (status, body) = call(&app, get("/api/v1/rooms", None)).await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<_> = body["rooms"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["name"].as_str().unwrap().to_string())
        .collect();
    assert!(names.contains(&"general".to_string()));

    let (status, _) = call(&app, post("/api/v1/rooms", None, json!({"name": "rust"}))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let token = register(&app, "ann").await;
    let (status, room) = call(&app, post("/api/v1/rooms", Some(&token), json!({"name": "rust"}))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(room["name"], "rust");

    let (status, _) = call(&app, post("/api/v1/rooms", Some(&token), json!({"name": "  "}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn messages_are_paged_newest_first() {
    let app = app();
    let token = register(&app, "ann").await;
    let (_, rooms) = call(&app, get("/api/v1/rooms", None)).await;
    let room_id = rooms["rooms"][0]["id"].as_i64().unwrap();

    for i in 0..3 {
        let (status, body) = call(
            &app,
            post(
                "/api/v1/messages",
                Some(&token),
                json!({"room_id": room_id, "content": format!("m{i}")}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["message"], "Message sent successfully");
        assert_eq!(body["data"]["username"], "ann");
    }

    let (status, body) = call(
        &app,
        get(
            &format!("/api/v1/rooms/{room_id}/messages?page=1&limit=2"),
            Some(&token),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let contents: Vec<_> = body["messages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["content"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(contents, ["m2", "m1"]);
    assert_eq!(
        body["pagination"],
        json!({"page": 1, "limit": 2, "total": 3, "total_pages": 2})
    );
}

#[tokio::test]
async fn message_validation() {
    let app = app();
    let token = register(&app, "ann").await;

    let (status, _) = call(
        &app,
        post("/api/v1/messages", Some(&token), json!({"room_id": 9999, "content": "hi"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = call(
        &app,
        post("/api/v1/messages", Some(&token), json!({"room_id": 1, "content": "   "})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn user_directory_excludes_caller_and_filters() {
    let app = app();
    let token = register(&app, "ann").await;
    register(&app, "bert").await;
    register(&app, "bob").await;

    let (status, body) = call(&app, get("/api/v1/users", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<_> = body["users"]
        .as_array()
        .unwrap()
        .iter()
        .map(|u| u["username"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(names, ["bert", "bob"]);

    let (_, body) = call(&app, get("/api/v1/users?search=BO", Some(&token))).await;
    let users = body["users"].as_array().unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0]["username"], "bob");
    assert!(users[0]["is_online"].is_boolean());
    assert!(users[0]["status"].is_string());
}
