// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Sign-up, sign-in, password reset and sign-out routes.
//!
//! Each successful sign-in creates a fresh server-side session context and
//! hands the browser a cookie naming it.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

use crate::error::{AppError, Result};
use crate::middleware::auth::{
    create_session_token, resolve_auth_user, session_cookie, session_cookie_removal,
};
use crate::routes::api::MeResponse;
use crate::services::{IdpCredential, SessionStore};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/signup", post(sign_up))
        .route("/auth/login", post(sign_in))
        .route("/auth/google", post(sign_in_with_google))
        .route("/auth/password-reset", post(password_reset))
        .route("/auth/logout", post(logout))
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SignUpRequest {
    #[validate(email(message = "Enter a valid email address"))]
    pub email: String,
    pub password: String,
    #[validate(length(min = 1, message = "Name is required"))]
    pub display_name: String,
}

#[derive(Debug, Deserialize)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct PasswordResetRequest {
    #[validate(email(message = "Enter a valid email address"))]
    pub email: String,
}

/// Returned by every sign-in route along with the session cookie.
#[derive(Debug, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct SignInResponse {
    /// Same value as the cookie, for clients using bearer auth
    pub token: String,
    pub me: MeResponse,
}

/// First validation message, as a `BadRequest`.
fn check(request: &impl Validate) -> Result<()> {
    request.validate().map_err(|errors| {
        let message = errors
            .field_errors()
            .values()
            .flat_map(|errs| errs.iter())
            .find_map(|e| e.message.as_ref().map(|m| m.to_string()))
            .unwrap_or_else(|| "Invalid request".to_string());
        AppError::BadRequest(message)
    })
}

/// Register a signed-in context and build the cookie response. Any context
/// named by the previous cookie is signed out.
async fn establish(
    state: &AppState,
    jar: CookieJar,
    headers: &HeaderMap,
    store: SessionStore,
) -> Result<(CookieJar, Json<SignInResponse>)> {
    if let Ok(Some(previous)) = resolve_auth_user(state, &jar, headers).await {
        previous.store.sign_out();
        state.sessions.remove(&previous.sid);
    }

    let me = MeResponse::from_snapshot(&store.snapshot(), &state.config.completeness_policy)?;
    let uid = me.session.uid.clone();

    let sid = state.sessions.insert(Arc::new(store))?;
    let token = create_session_token(&uid, &sid, &state.config.jwt_signing_key)?;

    tracing::info!(uid = %uid, "Session established");
    Ok((
        jar.add(session_cookie(token.clone(), &state.config.frontend_url)),
        Json(SignInResponse { token, me }),
    ))
}

async fn sign_up(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    headers: HeaderMap,
    Json(request): Json<SignUpRequest>,
) -> Result<(CookieJar, Json<SignInResponse>)> {
    check(&request)?;
    let store = state.new_session_store();
    store
        .sign_up_with_credentials(
            request.email.trim(),
            &request.password,
            request.display_name.trim(),
        )
        .await?;
    establish(&state, jar, &headers, store).await
}

async fn sign_in(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    headers: HeaderMap,
    Json(request): Json<SignInRequest>,
) -> Result<(CookieJar, Json<SignInResponse>)> {
    let store = state.new_session_store();
    store
        .sign_in_with_credentials(request.email.trim(), &request.password)
        .await?;
    establish(&state, jar, &headers, store).await
}

/// Federated sign-in with the ID token from the provider's popup.
async fn sign_in_with_google(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    headers: HeaderMap,
    Json(credential): Json<IdpCredential>,
) -> Result<(CookieJar, Json<SignInResponse>)> {
    if credential.id_token.trim().is_empty() {
        return Err(AppError::BadRequest("idToken is required".to_string()));
    }
    let store = state.new_session_store();
    store.sign_in_with_popup_provider(&credential).await?;
    establish(&state, jar, &headers, store).await
}

async fn password_reset(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PasswordResetRequest>,
) -> Result<StatusCode> {
    check(&request)?;
    state
        .new_session_store()
        .request_password_reset(request.email.trim())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Sign out and clear the cookie. Succeeds even without a session.
async fn logout(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    headers: HeaderMap,
) -> (CookieJar, StatusCode) {
    match resolve_auth_user(&state, &jar, &headers).await {
        Ok(Some(user)) => {
            user.store.sign_out();
            state.sessions.remove(&user.sid);
            tracing::info!(uid = %user.uid, "Signed out");
        }
        Ok(None) => {}
        Err(e) => tracing::debug!(error = %e, "Logout without a live session"),
    }

    (
        jar.add(session_cookie_removal(&state.config.frontend_url)),
        StatusCode::NO_CONTENT,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_up_validation_messages() {
        let bad_email = SignUpRequest {
            email: "not-an-email".to_string(),
            password: "hunter22".to_string(),
            display_name: "Ada".to_string(),
        };
        assert!(matches!(
            check(&bad_email),
            Err(AppError::BadRequest(msg)) if msg == "Enter a valid email address"
        ));

        let no_name = SignUpRequest {
            email: "ada@example.com".to_string(),
            password: "hunter22".to_string(),
            display_name: String::new(),
        };
        assert!(matches!(
            check(&no_name),
            Err(AppError::BadRequest(msg)) if msg == "Name is required"
        ));
    }
}
