// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! API routes: the signed-in member's profile, screen access decisions and
//! booking checks.

use crate::error::{AppError, Result};
use crate::middleware::auth::{resolve_auth_user, AuthUser};
use crate::models::{Member, MemberStats, ProfileUpdate, SessionSummary};
use crate::services::policy::ProfileCompletenessPolicy;
use crate::services::{AuthSnapshot, BookingConflicts, GuardDecision, SlotAvailability};
use crate::AppState;
use axum::{
    extract::{Query, State},
    http::HeaderMap,
    routing::{get, post},
    Extension, Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// API routes (require a session).
/// The auth middleware is applied in routes/mod.rs for these routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/me", get(get_me).put(update_me))
        .route("/api/me/refresh", post(refresh_me))
        .route("/api/me/stats", get(get_my_stats))
        .route("/api/bookings/conflicts", post(check_booking_conflicts))
}

/// API routes usable without signing in.
pub fn public_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/navigate", get(navigate))
        .route("/api/availability/check", post(check_availability))
}

// ─── Current Member ──────────────────────────────────────────

/// Signed-in member's session and profile, with derived flags.
#[derive(Debug, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "camelCase")]
pub struct MeResponse {
    pub session: SessionSummary,
    pub profile: Option<Member>,
    pub is_admin: bool,
    pub is_profile_complete: bool,
    pub missing_fields: Vec<String>,
}

impl MeResponse {
    /// `Unauthorized` if the snapshot has no session.
    pub fn from_snapshot(
        snapshot: &AuthSnapshot,
        completeness: &ProfileCompletenessPolicy,
    ) -> Result<Self> {
        let session = snapshot.session.as_ref().ok_or(AppError::Unauthorized)?;
        let missing_fields = snapshot
            .profile
            .as_ref()
            .map(|p| {
                completeness
                    .missing_fields(p)
                    .map(|f| f.as_str().to_string())
                    .collect()
            })
            .unwrap_or_else(|| {
                completeness
                    .required_fields()
                    .iter()
                    .map(|f| f.as_str().to_string())
                    .collect()
            });

        Ok(Self {
            session: session.summary(),
            profile: snapshot.profile.clone(),
            is_admin: snapshot.is_admin(),
            is_profile_complete: snapshot.is_profile_complete(completeness),
            missing_fields,
        })
    }
}

async fn get_me(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<MeResponse>> {
    let snapshot = user.store.settled().await;
    Ok(Json(MeResponse::from_snapshot(
        &snapshot,
        &state.config.completeness_policy,
    )?))
}

/// Self-service profile update.
async fn update_me(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(update): Json<ProfileUpdate>,
) -> Result<Json<MeResponse>> {
    user.store.settled().await;
    user.store.update_profile(update).await?;
    Ok(Json(MeResponse::from_snapshot(
        &user.store.snapshot(),
        &state.config.completeness_policy,
    )?))
}

/// Re-read the profile after a change made elsewhere (e.g. by an admin).
async fn refresh_me(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<MeResponse>> {
    user.store.settled().await;
    user.store.refresh_profile().await?;
    Ok(Json(MeResponse::from_snapshot(
        &user.store.snapshot(),
        &state.config.completeness_policy,
    )?))
}

async fn get_my_stats(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<MemberStats>> {
    Ok(Json(state.profiles.stats(&user.uid).await?))
}

// ─── Navigation ──────────────────────────────────────────────

#[derive(Deserialize)]
pub struct NavigateParams {
    pub path: String,
}

/// Decide what the frontend should do for a screen.
///
/// Uses the context's state as it is right now, so a context still loading
/// its profile gets `waiting`. A missing or stale cookie counts as signed
/// out.
async fn navigate(
    State(state): State<Arc<AppState>>,
    Query(params): Query<NavigateParams>,
    jar: CookieJar,
    headers: HeaderMap,
) -> Json<GuardDecision> {
    let snapshot = match resolve_auth_user(&state, &jar, &headers).await {
        Ok(Some(user)) => user.store.snapshot(),
        Ok(None) => AuthSnapshot::signed_out(),
        Err(e) => {
            tracing::debug!(error = %e, "Navigating without a usable session");
            AuthSnapshot::signed_out()
        }
    };

    Json(
        state
            .routes
            .navigate(&snapshot, &state.config.completeness_policy, &params.path),
    )
}

// ─── Bookings ────────────────────────────────────────────────

/// Time slot for an amenity.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotRequest {
    pub amenity_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Booking being edited, ignored when looking for conflicts
    #[serde(default)]
    pub exclude_booking_id: Option<String>,
}

impl SlotRequest {
    fn validate(&self) -> Result<()> {
        if self.amenity_id.trim().is_empty() {
            return Err(AppError::BadRequest("amenityId is required".to_string()));
        }
        if self.end_time <= self.start_time {
            return Err(AppError::BadRequest(
                "endTime must be after startTime".to_string(),
            ));
        }
        Ok(())
    }
}

async fn check_availability(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SlotRequest>,
) -> Result<Json<SlotAvailability>> {
    request.validate()?;
    Ok(Json(
        state
            .functions
            .check_slot_availability(&request.amenity_id, request.start_time, request.end_time)
            .await,
    ))
}

async fn check_booking_conflicts(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<SlotRequest>,
) -> Result<Json<BookingConflicts>> {
    request.validate()?;
    let id_token = user.store.current_session().map(|s| s.id_token);

    Ok(Json(
        state
            .functions
            .check_booking_conflicts(
                &request.amenity_id,
                request.start_time,
                request.end_time,
                request.exclude_booking_id.as_deref(),
                id_token.as_deref(),
            )
            .await,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Member, Session};
    use chrono::Duration;

    fn session() -> Session {
        Session {
            uid: "u1".to_string(),
            display_name: Some("Ada".to_string()),
            email: Some("ada@example.com".to_string()),
            photo_url: None,
            id_token: "id".to_string(),
            refresh_token: "refresh".to_string(),
            expires_at: Utc::now() + Duration::hours(1),
        }
    }

    #[test]
    fn test_me_response_lists_missing_fields() {
        let session = session();
        let mut profile = Member::from_session(&session, "2026-01-01T00:00:00.000Z".to_string());
        profile.company = "Acme".to_string();

        let snapshot = AuthSnapshot {
            loading: false,
            session: Some(session),
            profile: Some(profile),
        };
        let me = MeResponse::from_snapshot(&snapshot, &ProfileCompletenessPolicy::default())
            .unwrap();
        assert!(!me.is_profile_complete);
        assert!(!me.is_admin);
        assert_eq!(me.missing_fields, vec!["jobTitle".to_string()]);

        let json = serde_json::to_value(&me).unwrap();
        assert_eq!(json["session"]["uid"], "u1");
        assert!(json["session"].get("idToken").is_none());
        assert_eq!(json["missingFields"][0], "jobTitle");
    }

    #[test]
    fn test_me_response_requires_session() {
        assert!(matches!(
            MeResponse::from_snapshot(
                &AuthSnapshot::signed_out(),
                &ProfileCompletenessPolicy::default()
            ),
            Err(AppError::Unauthorized)
        ));
    }

    #[test]
    fn test_slot_request_validation() {
        let start = Utc::now();
        let ok = SlotRequest {
            amenity_id: "pool".to_string(),
            start_time: start,
            end_time: start + Duration::hours(1),
            exclude_booking_id: None,
        };
        assert!(ok.validate().is_ok());

        let backwards = SlotRequest {
            end_time: start - Duration::minutes(1),
            ..ok
        };
        assert!(matches!(backwards.validate(), Err(AppError::BadRequest(_))));
    }
}
