// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Member administration routes. Gated by `require_admin` in routes/mod.rs.

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::{Member, MembershipType};
use crate::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, put},
    Extension, Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/admin/members", get(list_members))
        .route(
            "/api/admin/members/{uid}/membership",
            put(set_membership),
        )
        .route("/api/admin/members/{uid}", axum::routing::delete(delete_member))
}

async fn list_members(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Member>>> {
    Ok(Json(state.profiles.list().await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipRequest {
    pub membership_type: MembershipType,
}

async fn set_membership(
    State(state): State<Arc<AppState>>,
    Extension(admin): Extension<AuthUser>,
    Path(uid): Path<String>,
    Json(request): Json<MembershipRequest>,
) -> Result<Json<Member>> {
    if uid == admin.uid && request.membership_type != MembershipType::Admin {
        return Err(AppError::BadRequest(
            "Administrators cannot remove their own admin role".to_string(),
        ));
    }

    let member = state
        .profiles
        .set_membership_type(&uid, request.membership_type)
        .await?;
    tracing::info!(admin = %admin.uid, uid = %uid, membership_type = %member.membership_type, "Admin changed membership");
    Ok(Json(member))
}

async fn delete_member(
    State(state): State<Arc<AppState>>,
    Extension(admin): Extension<AuthUser>,
    Path(uid): Path<String>,
) -> Result<StatusCode> {
    if uid == admin.uid {
        return Err(AppError::BadRequest(
            "Administrators cannot delete their own profile".to_string(),
        ));
    }
    if state.profiles.get(&uid).await?.is_none() {
        return Err(AppError::profile_not_found(&uid));
    }

    state.profiles.delete(&uid).await?;
    tracing::info!(admin = %admin.uid, uid = %uid, "Admin deleted member profile");
    Ok(StatusCode::NO_CONTENT)
}
