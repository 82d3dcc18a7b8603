// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session cookie authentication middleware.
//!
//! The cookie carries a JWT naming the user and the server-side session
//! context (`sid`). Provider tokens never leave the server.

use crate::error::AppError;
use crate::services::session::SESSION_TTL_SECS;
use crate::services::SessionStore;
use crate::AppState;
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Session cookie name.
pub const SESSION_COOKIE: &str = "clubhouse_session";

/// JWT claims structure.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (identity provider uid)
    pub sub: String,
    /// Server-side session context id
    pub sid: String,
    /// Expiration time (Unix timestamp)
    pub exp: usize,
    /// Issued at (Unix timestamp)
    pub iat: usize,
}

/// Authenticated client extracted from the session cookie.
#[derive(Clone)]
pub struct AuthUser {
    pub uid: String,
    pub sid: String,
    pub store: Arc<SessionStore>,
}

/// Pull the session JWT from the cookie, falling back to a bearer header.
fn extract_token(jar: &CookieJar, headers: &HeaderMap) -> Option<String> {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        return Some(cookie.value().to_string());
    }
    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(|t| t.to_string())
}

fn decode_claims(token: &str, signing_key: &[u8]) -> Result<Claims, AppError> {
    let key = DecodingKey::from_secret(signing_key);
    let validation = Validation::new(Algorithm::HS256);
    decode::<Claims>(token, &key, &validation)
        .map(|data| data.claims)
        .map_err(|_| AppError::InvalidToken)
}

/// Find the live context for a request, if any.
///
/// Returns `Ok(None)` when there is no credential at all and an error when
/// a credential is present but no longer valid.
pub async fn resolve_auth_user(
    state: &AppState,
    jar: &CookieJar,
    headers: &HeaderMap,
) -> Result<Option<AuthUser>, AppError> {
    let Some(token) = extract_token(jar, headers) else {
        return Ok(None);
    };
    let claims = decode_claims(&token, &state.config.jwt_signing_key)?;

    let store = state.sessions.get(&claims.sid).ok_or(AppError::Unauthorized)?;

    let session = match store.ensure_fresh_session().await? {
        Some(session) => session,
        None => {
            // Provider ended the session (sign-out or revocation).
            state.sessions.remove(&claims.sid);
            return Err(AppError::Unauthorized);
        }
    };

    if session.uid != claims.sub {
        tracing::warn!(sid = %claims.sid, "Session cookie subject does not match context");
        return Err(AppError::InvalidToken);
    }

    Ok(Some(AuthUser {
        uid: claims.sub,
        sid: claims.sid,
        store,
    }))
}

/// Middleware that requires a valid session.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let auth_user = resolve_auth_user(&state, &jar, request.headers())
        .await?
        .ok_or(AppError::Unauthorized)?;

    request.extensions_mut().insert(auth_user);
    Ok(next.run(request).await)
}

/// Middleware that additionally requires the administrator role.
///
/// Must run after [`require_auth`]. Re-reads the profile so a demotion by
/// another administrator takes effect immediately.
pub async fn require_admin(request: Request, next: Next) -> Result<Response, AppError> {
    let auth_user = request
        .extensions()
        .get::<AuthUser>()
        .cloned()
        .ok_or(AppError::Unauthorized)?;

    auth_user.store.settled().await;
    auth_user.store.refresh_profile().await?;

    if !auth_user.store.is_admin() {
        tracing::warn!(uid = %auth_user.uid, "Blocked non-admin from admin route");
        return Err(AppError::Forbidden);
    }

    Ok(next.run(request).await)
}

/// Create a JWT for a user session.
pub fn create_session_token(uid: &str, sid: &str, signing_key: &[u8]) -> anyhow::Result<String> {
    use jsonwebtoken::{encode, EncodingKey, Header};
    use std::time::{SystemTime, UNIX_EPOCH};

    let now = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs() as usize;

    let claims = Claims {
        sub: uid.to_string(),
        sid: sid.to_string(),
        iat: now,
        exp: now + SESSION_TTL_SECS as usize,
    };

    Ok(encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(signing_key),
    )?)
}

fn is_local(frontend_url: &str) -> bool {
    frontend_url.contains("://localhost") || frontend_url.contains("://127.0.0.1")
}

/// Session cookie carrying `token`.
pub fn session_cookie(token: String, frontend_url: &str) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(!is_local(frontend_url))
        .max_age(time::Duration::seconds(SESSION_TTL_SECS))
        .build()
}

/// Cookie that clears the session cookie; attributes match creation.
pub fn session_cookie_removal(frontend_url: &str) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, ""))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(!is_local(frontend_url))
        .max_age(time::Duration::ZERO)
        .build()
}
