// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! End-to-end sign-up / sign-in / sign-out tests against the offline app.

use axum::http::StatusCode;
use clubhouse::services::identity::FederatedIdentity;
use tower::ServiceExt;

mod common;
use common::{body_json, get_request, json_request, session_cookie_pair, sign_up};

#[tokio::test]
async fn test_sign_up_returns_profile_and_cookie() {
    let (app, state) = common::create_test_app();

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/auth/signup",
            None,
            serde_json::json!({
                "email": "ada@example.com",
                "password": "correct-horse",
                "displayName": "Ada Lovelace",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    let me = &body["me"];
    assert_eq!(me["session"]["displayName"], "Ada Lovelace");
    assert_eq!(me["profile"]["displayName"], "Ada Lovelace");
    assert_eq!(me["profile"]["membershipType"], "member");
    assert_eq!(me["isAdmin"], false);
    assert_eq!(me["isProfileComplete"], false);
    assert!(body["token"].as_str().is_some_and(|t| !t.is_empty()));

    // Provider tokens stay on the server
    assert!(me["session"].get("idToken").is_none());
    assert!(me["session"].get("refreshToken").is_none());

    assert_eq!(state.sessions.len(), 1);
}

#[tokio::test]
async fn test_me_requires_session() {
    let (app, _) = common::create_test_app();

    let response = app.oneshot(get_request("/api/me", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_me_with_session_cookie() {
    let (app, _) = common::create_test_app();
    let (cookie, uid) = sign_up(&app, "grace@example.com", "Grace").await;

    let response = app
        .clone()
        .oneshot(get_request("/api/me", Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let me = body_json(response).await;
    assert_eq!(me["session"]["uid"], uid.as_str());
    assert_eq!(me["profile"]["email"], "grace@example.com");
    assert_eq!(me["missingFields"], serde_json::json!(["company", "jobTitle"]));
}

#[tokio::test]
async fn test_bearer_token_is_accepted() {
    let (app, _) = common::create_test_app();
    let (cookie, _) = sign_up(&app, "bearer@example.com", "Bearer").await;
    let token = cookie.trim_start_matches("clubhouse_session=");

    let response = app
        .oneshot(
            axum::http::Request::builder()
                .uri("/api/me")
                .header("Authorization", format!("Bearer {}", token))
                .body(axum::body::Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_duplicate_sign_up_is_rejected() {
    let (app, _) = common::create_test_app();
    sign_up(&app, "dup@example.com", "First").await;

    let response = app
        .oneshot(json_request(
            "POST",
            "/auth/signup",
            None,
            serde_json::json!({
                "email": "dup@example.com",
                "password": "correct-horse",
                "displayName": "Second",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["error"], "auth_failure");
    assert_eq!(body["details"], "EMAIL_EXISTS");
}

#[tokio::test]
async fn test_invalid_sign_up_request() {
    let (app, _) = common::create_test_app();

    let response = app
        .oneshot(json_request(
            "POST",
            "/auth/signup",
            None,
            serde_json::json!({
                "email": "nope",
                "password": "correct-horse",
                "displayName": "Nope",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_sign_in_with_wrong_password() {
    let (app, state) = common::create_test_app();
    sign_up(&app, "wrong@example.com", "Wrong").await;

    let response = app
        .oneshot(json_request(
            "POST",
            "/auth/login",
            None,
            serde_json::json!({ "email": "wrong@example.com", "password": "incorrect" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    // Only the sign-up context exists
    assert_eq!(state.sessions.len(), 1);
}

#[tokio::test]
async fn test_sign_in_reuses_existing_profile() {
    let (app, state) = common::create_test_app();
    let (_, uid) = sign_up(&app, "again@example.com", "Again").await;

    state
        .profiles
        .set_membership_type(&uid, clubhouse::models::MembershipType::Admin)
        .await
        .unwrap();

    let response = app
        .oneshot(json_request(
            "POST",
            "/auth/login",
            None,
            serde_json::json!({ "email": "again@example.com", "password": "correct-horse" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["me"]["session"]["uid"], uid.as_str());
    assert_eq!(body["me"]["profile"]["membershipType"], "admin");
    assert_eq!(body["me"]["isAdmin"], true);
}

#[tokio::test]
async fn test_sign_in_replaces_previous_context() {
    let (app, state) = common::create_test_app();
    let (old_cookie, _) = sign_up(&app, "swap@example.com", "Swap").await;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/auth/login",
            Some(&old_cookie),
            serde_json::json!({ "email": "swap@example.com", "password": "correct-horse" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let new_cookie = session_cookie_pair(&response);
    assert_ne!(new_cookie, old_cookie);
    assert_eq!(state.sessions.len(), 1);

    let stale = app
        .clone()
        .oneshot(get_request("/api/me", Some(&old_cookie)))
        .await
        .unwrap();
    assert_eq!(stale.status(), StatusCode::UNAUTHORIZED);

    let fresh = app
        .oneshot(get_request("/api/me", Some(&new_cookie)))
        .await
        .unwrap();
    assert_eq!(fresh.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_google_sign_in_creates_profile_from_provider() {
    let (app, state) = common::create_test_app();
    state
        .identity
        .local_accounts()
        .unwrap()
        .register_federated(
            "google-token-1",
            FederatedIdentity {
                email: "popup@example.com".to_string(),
                display_name: Some("Pop Up".to_string()),
                photo_url: Some("https://example.com/p.png".to_string()),
            },
        );

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/auth/google",
            None,
            serde_json::json!({ "idToken": "google-token-1" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["me"]["profile"]["displayName"], "Pop Up");
    assert_eq!(body["me"]["profile"]["photoURL"], "https://example.com/p.png");

    let rejected = app
        .oneshot(json_request(
            "POST",
            "/auth/google",
            None,
            serde_json::json!({ "idToken": "unknown-token" }),
        ))
        .await
        .unwrap();
    assert_eq!(rejected.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_password_reset() {
    let (app, state) = common::create_test_app();
    sign_up(&app, "forgot@example.com", "Forgot").await;

    let response = app
        .oneshot(json_request(
            "POST",
            "/auth/password-reset",
            None,
            serde_json::json!({ "email": "forgot@example.com" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(
        state
            .identity
            .local_accounts()
            .unwrap()
            .password_resets_sent("forgot@example.com"),
        1
    );
}

#[tokio::test]
async fn test_logout_ends_session() {
    let (app, state) = common::create_test_app();
    let (cookie, _) = sign_up(&app, "bye@example.com", "Bye").await;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/auth/logout",
            Some(&cookie),
            serde_json::json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(state.sessions.is_empty());

    let after = app
        .oneshot(get_request("/api/me", Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(after.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_abandoned_sign_ins_are_pruned_once_idle() {
    let (app, state) = common::create_test_app();

    // Clients that never send their cookie back leave one context each.
    let mut cookies = Vec::new();
    for i in 0..5 {
        let (cookie, _) = sign_up(&app, &format!("drive-by{}@example.com", i), "Drive By").await;
        cookies.push(cookie);
    }
    assert_eq!(state.sessions.len(), 5);
    assert_eq!(state.sessions.prune(), 0);

    let later = chrono::Utc::now() + state.config.session_idle_timeout + chrono::Duration::seconds(1);
    assert_eq!(state.sessions.prune_at(later), 5);
    assert!(state.sessions.is_empty());

    let response = app
        .oneshot(get_request("/api/me", Some(&cookies[0])))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
