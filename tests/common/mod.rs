#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

use storefront::api::auth::TokenType;
use storefront::config::Config;
use storefront::db::{self, User};
use storefront::AppState;

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

pub struct TestApp {
    pub state: Arc<AppState>,
    router: Router,
}

/// Defaults with throttling off and a fixed signing secret
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.auth.jwt_secret = "integration-test-secret".to_string();
    config.throttle.enabled = false;
    config
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(test_config()).await
    }

    pub async fn with_config(config: Config) -> Self {
        let pool = db::init_in_memory().await.unwrap();
        let state = Arc::new(AppState::new(config, pool).unwrap());
        let router = storefront::api::create_router(state.clone());
        Self { state, router }
    }

    /// Insert a user that cannot log in with a password; use [`TestApp::token`]
    pub async fn create_user(&self, username: &str, staff: bool) -> User {
        db::insert_user(&self.state.db, username, "", "!", staff)
            .await
            .unwrap()
    }

    pub fn token(&self, user: &User) -> String {
        self.state.jwt.issue(user, TokenType::Access).unwrap()
    }

    pub async fn create_product(&self, name: &str, price_cents: i64, stock: i64) -> i64 {
        sqlx::query_scalar(
            "INSERT INTO products (name, description, price_cents, stock) VALUES (?, ?, ?, ?) RETURNING id",
        )
        .bind(name)
        .bind(format!("{} description", name))
        .bind(price_cents)
        .bind(stock)
        .fetch_one(&self.state.db)
        .await
        .unwrap()
    }

    pub async fn count(&self, sql: &str) -> i64 {
        sqlx::query_scalar(sql).fetch_one(&self.state.db).await.unwrap()
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> TestResponse {
        self.request(Method::GET, uri, token, None).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> TestResponse {
        self.request(Method::POST, uri, token, Some(body)).await
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

        TestResponse {
            status,
            headers,
            body,
        }
    }
}
