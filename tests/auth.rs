mod common;

use axum::http::StatusCode;
use serde_json::json;

use common::{test_config, TestApp};
use storefront::api::auth::hash_password;
use storefront::db;

#[tokio::test]
async fn token_pair_and_refresh() {
    let app = TestApp::new().await;
    let hash = hash_password("tangerine-kite-42").unwrap();
    db::insert_user(&app.state.db, "alice", "alice@example.com", &hash, false)
        .await
        .unwrap();

    let wrong = app
        .post(
            "/api/token/",
            None,
            json!({"username": "alice", "password": "nope"}),
        )
        .await;
    assert_eq!(wrong.status, StatusCode::UNAUTHORIZED);
    assert_eq!(
        wrong.body["error"]["message"],
        "No active account found with the given credentials"
    );

    let pair = app
        .post(
            "/api/token/",
            None,
            json!({"username": "alice", "password": "tangerine-kite-42"}),
        )
        .await;
    assert_eq!(pair.status, StatusCode::OK);
    assert_eq!(pair.body["username"], "alice");
    let access = pair.body["access"].as_str().unwrap().to_string();
    let refresh = pair.body["refresh"].as_str().unwrap().to_string();

    let me = app.get("/auth/users/me/", Some(&access)).await;
    assert_eq!(me.status, StatusCode::OK);
    assert_eq!(me.body["username"], "alice");
    assert!(me.body.get("password_hash").is_none());

    // A refresh token is not an access token
    let misuse = app.get("/auth/users/me/", Some(&refresh)).await;
    assert_eq!(misuse.status, StatusCode::UNAUTHORIZED);

    let refreshed = app
        .post("/api/token/refresh/", None, json!({"refresh": refresh}))
        .await;
    assert_eq!(refreshed.status, StatusCode::OK);
    assert!(refreshed.body["access"].is_string());

    let rejected = app
        .post("/api/token/refresh/", None, json!({"refresh": access}))
        .await;
    assert_eq!(rejected.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn invalid_bearer_token_is_rejected_everywhere() {
    let app = TestApp::new().await;

    let response = app.get("/products/", Some("not-a-jwt")).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert!(response.header("www-authenticate").is_some());
}

#[tokio::test]
async fn user_directory_is_staff_only() {
    let app = TestApp::new().await;
    let alice = app.create_user("alice", false).await;
    let staff = app.create_user("admin", true).await;
    let mug = app.create_product("Mug", 1250, 10).await;

    let order = app
        .post(
            "/orders/",
            Some(&app.token(&alice)),
            json!({"items": [{"product": mug, "quantity": 1}]}),
        )
        .await;
    let order_id = order.body["order_id"].clone();

    assert_eq!(app.get("/users/", None).await.status, StatusCode::UNAUTHORIZED);
    assert_eq!(
        app.get("/users/", Some(&app.token(&alice))).await.status,
        StatusCode::FORBIDDEN
    );

    let listed = app.get("/users/", Some(&app.token(&staff))).await;
    assert_eq!(listed.status, StatusCode::OK);
    let users = listed.body.as_array().unwrap();
    assert_eq!(users.len(), 2);
    assert_eq!(users[0]["username"], "alice");
    assert_eq!(users[0]["orders"], json!([order_id]));
    assert_eq!(users[1]["orders"], json!([]));
}

#[tokio::test]
async fn registration() {
    let app = TestApp::new().await;
    let body = json!({"username": "newbie", "password": "tangerine-kite-42", "email": "n@example.com"});

    let created = app.post("/auth/users/", None, body.clone()).await;
    assert_eq!(created.status, StatusCode::CREATED);
    assert_eq!(created.body["username"], "newbie");
    assert_eq!(created.body["is_staff"], false);

    let duplicate = app.post("/auth/users/", None, body).await;
    assert_eq!(duplicate.status, StatusCode::BAD_REQUEST);
    assert!(duplicate.body["error"]["details"]["username"].is_array());

    let weak = app
        .post(
            "/auth/users/",
            None,
            json!({"username": "other", "password": "123"}),
        )
        .await;
    assert_eq!(weak.status, StatusCode::BAD_REQUEST);
    assert!(weak.body["error"]["details"]["password"].is_array());
}

#[tokio::test]
async fn product_list_is_throttled_per_scope() {
    let mut config = test_config();
    config.throttle.enabled = true;
    config
        .throttle
        .rates
        .insert("products".to_string(), "2/minute".to_string());
    let app = TestApp::with_config(config).await;

    for _ in 0..2 {
        let response = app.get("/products/", None).await;
        assert_eq!(response.status, StatusCode::OK);
    }

    let throttled = app.get("/products/", None).await;
    assert_eq!(throttled.status, StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = throttled.header("retry-after").unwrap().parse().unwrap();
    assert!(retry_after >= 1 && retry_after <= 60);

    // The info endpoint is outside the products scope
    let info = app.get("/products/info/", None).await;
    assert_eq!(info.status, StatusCode::OK);
}

#[tokio::test]
async fn health_and_root_redirect() {
    let app = TestApp::new().await;

    let health = app.get("/health", None).await;
    assert_eq!(health.status, StatusCode::OK);

    let root = app.get("/", None).await;
    assert!(root.status.is_redirection());
    assert_eq!(root.header("location"), Some("/products/"));

    let unknown = app.get("/nowhere/", None).await;
    assert_eq!(unknown.status, StatusCode::NOT_FOUND);
}
