// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Booking checks degrade to safe defaults when the callables are
//! unreachable (the offline app has them disabled).

use axum::http::StatusCode;
use tower::ServiceExt;

mod common;
use common::{body_json, json_request, sign_up};

fn slot(start: &str, end: &str) -> serde_json::Value {
    serde_json::json!({
        "amenityId": "tennis-1",
        "startTime": start,
        "endTime": end,
    })
}

#[tokio::test]
async fn test_availability_defaults_to_unavailable() {
    let (app, _) = common::create_test_app();

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/availability/check",
            None,
            slot("2026-05-01T10:00:00Z", "2026-05-01T11:00:00Z"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        serde_json::json!({ "available": false, "conflicts": [] })
    );
}

#[tokio::test]
async fn test_backwards_slot_is_rejected() {
    let (app, _) = common::create_test_app();

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/availability/check",
            None,
            slot("2026-05-01T11:00:00Z", "2026-05-01T10:00:00Z"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_conflict_check_requires_session() {
    let (app, _) = common::create_test_app();

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/bookings/conflicts",
            None,
            slot("2026-05-01T10:00:00Z", "2026-05-01T11:00:00Z"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_conflict_check_defaults_to_none() {
    let (app, _) = common::create_test_app();
    let (cookie, _) = sign_up(&app, "booker@example.com", "Booker").await;

    let mut request = slot("2026-05-01T10:00:00Z", "2026-05-01T11:00:00Z");
    request["excludeBookingId"] = serde_json::json!("booking-7");

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/bookings/conflicts",
            Some(&cookie),
            request,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        serde_json::json!({ "hasConflicts": false, "conflicts": [] })
    );
}
