// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use axum::{
    body::Body,
    http::{header, Request, Response, StatusCode},
    Router,
};
use clubhouse::config::Config;
use clubhouse::db::FirestoreDb;
use clubhouse::routes::create_router;
use clubhouse::services::{FunctionsClient, IdentityProvider};
use clubhouse::AppState;
use std::sync::Arc;
use tower::ServiceExt;

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// Create a test app with in-memory profiles and accounts.
/// Returns the router and the shared state.
#[allow(dead_code)]
pub fn create_test_app() -> (Router, Arc<AppState>) {
    create_test_app_with_frontend_url("http://localhost:5173")
}

#[allow(dead_code)]
pub fn create_test_app_with_frontend_url(frontend_url: &str) -> (Router, Arc<AppState>) {
    let mut config = Config::test_default();
    config.frontend_url = frontend_url.to_string();

    let state = Arc::new(AppState::offline(config));
    (create_router(state.clone()), state)
}

/// Test app over an in-memory store the caller can seed directly.
#[allow(dead_code)]
pub fn create_test_app_with_db() -> (Router, Arc<AppState>, FirestoreDb) {
    let db = FirestoreDb::new_in_memory();
    let state = Arc::new(AppState::new(
        Config::test_default(),
        db.clone(),
        IdentityProvider::in_memory(),
        FunctionsClient::disabled(),
    ));
    (create_router(state.clone()), state, db)
}

#[allow(dead_code)]
pub fn set_cookie_headers<B>(response: &Response<B>) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|value| value.to_str().unwrap().to_string())
        .collect()
}

/// `name=value` pair of the session cookie set by `response`.
#[allow(dead_code)]
pub fn session_cookie_pair<B>(response: &Response<B>) -> String {
    set_cookie_headers(response)
        .iter()
        .find(|value| value.starts_with("clubhouse_session="))
        .and_then(|value| value.split(';').next())
        .map(|pair| pair.to_string())
        .unwrap_or_else(|| panic!("missing session cookie"))
}

#[allow(dead_code)]
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), 1 << 20)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[allow(dead_code)]
pub fn json_request(
    method: &str,
    uri: &str,
    cookie: Option<&str>,
    body: serde_json::Value,
) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

#[allow(dead_code)]
pub fn get_request(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

/// Sign up through the API and return the session cookie pair and uid.
#[allow(dead_code)]
pub async fn sign_up(app: &Router, email: &str, display_name: &str) -> (String, String) {
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/auth/signup",
            None,
            serde_json::json!({
                "email": email,
                "password": "correct-horse",
                "displayName": display_name,
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let cookie = session_cookie_pair(&response);
    let body = body_json(response).await;
    let uid = body["me"]["session"]["uid"].as_str().unwrap().to_string();
    (cookie, uid)
}
