// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Identity provider client (Firebase Auth).
//!
//! Handles:
//! - Email/password sign-up and sign-in
//! - Federated ("popup") sign-in with a Google ID token
//! - Display name updates and password reset emails
//! - ID token refresh, treating a rejected refresh as a provider sign-out
//!
//! Each browser client gets its own [`IdentityClient`] holding that client's
//! current user, the same way the web SDK keeps one current user per app.
//! Changes to it are published on a `watch` channel, so subscribers always
//! see the latest state and a newer session supersedes any older one.

use crate::config::Config;
use crate::error::AppError;
use crate::models::Session;
use anyhow::Context;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use ring::rand::{SecureRandom, SystemRandom};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use subtle::ConstantTimeEq;
use tokio::sync::watch;

const IDENTITY_TOOLKIT_HOST: &str = "https://identitytoolkit.googleapis.com";
const SECURE_TOKEN_HOST: &str = "https://securetoken.googleapis.com";
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);
/// Lifetime of tokens minted by the in-memory provider.
const LOCAL_TOKEN_TTL_SECS: i64 = 3600;
const MIN_PASSWORD_LEN: usize = 6;

/// Generate a URL-safe random identifier from `bytes` random bytes.
pub(crate) fn random_id(bytes: usize) -> Result<String, AppError> {
    let mut buf = vec![0u8; bytes];
    SystemRandom::new()
        .fill(&mut buf)
        .map_err(|_| AppError::Internal(anyhow::anyhow!("System RNG failure")))?;
    Ok(URL_SAFE_NO_PAD.encode(buf))
}

/// Credential from a federated provider popup.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdpCredential {
    /// e.g. `google.com`
    #[serde(default = "default_idp")]
    pub provider_id: String,
    pub id_token: String,
}

fn default_idp() -> String {
    "google.com".to_string()
}

// ─── Firebase REST ───────────────────────────────────────────────

#[derive(Clone)]
struct FirebaseRest {
    http: reqwest::Client,
    api_key: String,
    identity_base: String,
    token_base: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthResponse {
    local_id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    photo_url: Option<String>,
    id_token: String,
    refresh_token: String,
    /// Seconds, as a string
    expires_in: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateResponse {
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    photo_url: Option<String>,
}

#[derive(Deserialize)]
struct RefreshResponse {
    id_token: String,
    refresh_token: String,
    expires_in: String,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

fn expiry_from(expires_in: &str) -> chrono::DateTime<Utc> {
    let secs = expires_in.trim().parse::<i64>().unwrap_or(LOCAL_TOKEN_TTL_SECS);
    Utc::now() + ChronoDuration::seconds(secs)
}

impl AuthResponse {
    fn into_session(self) -> Session {
        let expires_at = expiry_from(&self.expires_in);
        Session {
            uid: self.local_id,
            display_name: self.display_name.filter(|n| !n.is_empty()),
            email: self.email.filter(|e| !e.is_empty()),
            photo_url: self.photo_url.filter(|p| !p.is_empty()),
            id_token: self.id_token,
            refresh_token: self.refresh_token,
            expires_at,
        }
    }
}

impl FirebaseRest {
    fn new(config: &Config) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .context("failed building identity HTTP client")?;

        let (identity_base, token_base) = match &config.auth_emulator_host {
            Some(host) => (
                format!("http://{}/identitytoolkit.googleapis.com/v1", host),
                format!("http://{}/securetoken.googleapis.com/v1", host),
            ),
            None => (
                format!("{}/v1", IDENTITY_TOOLKIT_HOST),
                format!("{}/v1", SECURE_TOKEN_HOST),
            ),
        };

        Ok(Self {
            http,
            api_key: config.firebase_api_key.clone(),
            identity_base,
            token_base,
        })
    }

    async fn call<T: for<'de> Deserialize<'de>>(
        &self,
        method: &str,
        body: serde_json::Value,
    ) -> Result<T, AppError> {
        let url = format!("{}/accounts:{}", self.identity_base, method);
        let response = self
            .http
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Transient(format!("Identity provider unreachable: {}", e)))?;

        Self::check_response_json(response).await
    }

    /// Map provider error envelopes to `AuthFailure`, 5xx to `Transient`.
    async fn check_response_json<T: for<'de> Deserialize<'de>>(
        response: reqwest::Response,
    ) -> Result<T, AppError> {
        let status = response.status();
        if status.is_success() {
            return response
                .json()
                .await
                .map_err(|e| AppError::Transient(format!("Malformed provider response: {}", e)));
        }

        let body = response.text().await.unwrap_or_default();
        if status.is_server_error() {
            return Err(AppError::Transient(format!("HTTP {}: {}", status, body)));
        }

        let code = serde_json::from_str::<ErrorEnvelope>(&body)
            .map(|e| e.error.message)
            .unwrap_or_else(|_| format!("HTTP {}", status));
        Err(AppError::AuthFailure(code))
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<Session, AppError> {
        let response: AuthResponse = self
            .call(
                "signUp",
                serde_json::json!({
                    "email": email,
                    "password": password,
                    "returnSecureToken": true,
                }),
            )
            .await?;
        Ok(response.into_session())
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, AppError> {
        let response: AuthResponse = self
            .call(
                "signInWithPassword",
                serde_json::json!({
                    "email": email,
                    "password": password,
                    "returnSecureToken": true,
                }),
            )
            .await?;
        Ok(response.into_session())
    }

    async fn sign_in_with_idp(&self, credential: &IdpCredential) -> Result<Session, AppError> {
        let post_body = format!(
            "id_token={}&providerId={}",
            urlencoding::encode(&credential.id_token),
            urlencoding::encode(&credential.provider_id)
        );
        let response: AuthResponse = self
            .call(
                "signInWithIdp",
                serde_json::json!({
                    "postBody": post_body,
                    "requestUri": "http://localhost",
                    "returnIdpCredential": true,
                    "returnSecureToken": true,
                }),
            )
            .await?;
        Ok(response.into_session())
    }

    async fn update_display_name(
        &self,
        session: &Session,
        display_name: &str,
    ) -> Result<Session, AppError> {
        let response: UpdateResponse = self
            .call(
                "update",
                serde_json::json!({
                    "idToken": session.id_token,
                    "displayName": display_name,
                    "returnSecureToken": false,
                }),
            )
            .await?;

        let mut updated = session.clone();
        updated.display_name = response.display_name.filter(|n| !n.is_empty());
        if let Some(photo) = response.photo_url.filter(|p| !p.is_empty()) {
            updated.photo_url = Some(photo);
        }
        Ok(updated)
    }

    async fn send_password_reset(&self, email: &str) -> Result<(), AppError> {
        let _: serde_json::Value = self
            .call(
                "sendOobCode",
                serde_json::json!({
                    "requestType": "PASSWORD_RESET",
                    "email": email,
                }),
            )
            .await?;
        Ok(())
    }

    async fn refresh(&self, session: &Session) -> Result<Session, AppError> {
        let url = format!("{}/token", self.token_base);
        let response = self
            .http
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", session.refresh_token.as_str()),
            ])
            .send()
            .await
            .map_err(|e| AppError::Transient(format!("Token refresh request failed: {}", e)))?;

        let refreshed: RefreshResponse = Self::check_response_json(response).await?;
        let mut updated = session.clone();
        updated.expires_at = expiry_from(&refreshed.expires_in);
        updated.id_token = refreshed.id_token;
        updated.refresh_token = refreshed.refresh_token;
        Ok(updated)
    }
}

// ─── In-memory provider ──────────────────────────────────────────

struct LocalAccount {
    uid: String,
    email: String,
    salt: [u8; 16],
    password_digest: [u8; 32],
    display_name: Option<String>,
    photo_url: Option<String>,
}

/// Profile a federated token resolves to in the in-memory provider.
#[derive(Debug, Clone)]
pub struct FederatedIdentity {
    pub email: String,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
}

/// Process-local account database for tests and offline development.
#[derive(Default)]
pub struct InMemoryAccounts {
    /// Keyed by lowercase email
    accounts: DashMap<String, LocalAccount>,
    /// Keyed by federated ID token; value carries the assigned uid
    federated: DashMap<String, (Option<String>, FederatedIdentity)>,
    /// Refresh token -> uid; removing one revokes it
    refresh_tokens: DashMap<String, String>,
    /// Emails a reset link was "sent" to
    password_resets: DashMap<String, usize>,
    /// Display name updates fail while set
    profile_updates_throttled: AtomicBool,
}

fn digest_password(salt: &[u8], password: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    hasher.finalize().into()
}

impl InMemoryAccounts {
    /// Make `id_token` a valid federated credential for `identity`.
    pub fn register_federated(&self, id_token: &str, identity: FederatedIdentity) {
        self.federated
            .insert(id_token.to_string(), (None, identity));
    }

    /// Number of password reset emails sent to `email`.
    pub fn password_resets_sent(&self, email: &str) -> usize {
        self.password_resets
            .get(&email.to_ascii_lowercase())
            .map(|count| *count)
            .unwrap_or(0)
    }

    /// Revoke every refresh token issued for `uid` (e.g. account disabled).
    pub fn revoke_refresh_tokens(&self, uid: &str) {
        self.refresh_tokens.retain(|_, owner| owner != uid);
    }

    /// Make display name updates fail the way a throttled provider does.
    pub fn throttle_profile_updates(&self, throttled: bool) {
        self.profile_updates_throttled
            .store(throttled, Ordering::SeqCst);
    }

    fn mint_session(
        &self,
        uid: &str,
        email: Option<String>,
        display_name: Option<String>,
        photo_url: Option<String>,
    ) -> Result<Session, AppError> {
        let refresh_token = random_id(32)?;
        self.refresh_tokens
            .insert(refresh_token.clone(), uid.to_string());
        Ok(Session {
            uid: uid.to_string(),
            display_name,
            email,
            photo_url,
            id_token: random_id(32)?,
            refresh_token,
            expires_at: Utc::now() + ChronoDuration::seconds(LOCAL_TOKEN_TTL_SECS),
        })
    }

    fn sign_up(&self, email: &str, password: &str) -> Result<Session, AppError> {
        let key = email.trim().to_ascii_lowercase();
        if !key.contains('@') {
            return Err(AppError::AuthFailure("INVALID_EMAIL".to_string()));
        }
        if password.len() < MIN_PASSWORD_LEN {
            return Err(AppError::AuthFailure("WEAK_PASSWORD".to_string()));
        }

        let mut salt = [0u8; 16];
        SystemRandom::new()
            .fill(&mut salt)
            .map_err(|_| AppError::Internal(anyhow::anyhow!("System RNG failure")))?;
        let uid = random_id(21)?;

        match self.accounts.entry(key.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(AppError::AuthFailure("EMAIL_EXISTS".to_string()))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(LocalAccount {
                    uid: uid.clone(),
                    email: key.clone(),
                    salt,
                    password_digest: digest_password(&salt, password),
                    display_name: None,
                    photo_url: None,
                });
                self.mint_session(&uid, Some(key), None, None)
            }
        }
    }

    fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, AppError> {
        let key = email.trim().to_ascii_lowercase();
        let account = self
            .accounts
            .get(&key)
            .ok_or_else(|| AppError::AuthFailure("EMAIL_NOT_FOUND".to_string()))?;

        let candidate = digest_password(&account.salt, password);
        if !bool::from(candidate[..].ct_eq(&account.password_digest[..])) {
            return Err(AppError::AuthFailure("INVALID_PASSWORD".to_string()));
        }

        self.mint_session(
            &account.uid,
            Some(account.email.clone()),
            account.display_name.clone(),
            account.photo_url.clone(),
        )
    }

    fn sign_in_with_idp(&self, credential: &IdpCredential) -> Result<Session, AppError> {
        let mut entry = self
            .federated
            .get_mut(&credential.id_token)
            .ok_or_else(|| AppError::AuthFailure("INVALID_IDP_RESPONSE".to_string()))?;

        let uid = match &entry.0 {
            Some(uid) => uid.clone(),
            None => {
                let uid = random_id(21)?;
                entry.0 = Some(uid.clone());
                uid
            }
        };
        let identity = entry.1.clone();
        drop(entry);

        self.mint_session(
            &uid,
            Some(identity.email),
            identity.display_name,
            identity.photo_url,
        )
    }

    fn update_display_name(
        &self,
        session: &Session,
        display_name: &str,
    ) -> Result<Session, AppError> {
        if self.profile_updates_throttled.load(Ordering::SeqCst) {
            return Err(AppError::AuthFailure(
                "TOO_MANY_ATTEMPTS_TRY_LATER".to_string(),
            ));
        }

        let mut found = false;
        for mut account in self.accounts.iter_mut() {
            if account.uid == session.uid {
                account.display_name = Some(display_name.to_string());
                found = true;
            }
        }
        if !found {
            return Err(AppError::AuthFailure("USER_NOT_FOUND".to_string()));
        }

        let mut updated = session.clone();
        updated.display_name = Some(display_name.to_string()).filter(|n| !n.is_empty());
        Ok(updated)
    }

    fn send_password_reset(&self, email: &str) -> Result<(), AppError> {
        let key = email.trim().to_ascii_lowercase();
        if !self.accounts.contains_key(&key) {
            return Err(AppError::AuthFailure("EMAIL_NOT_FOUND".to_string()));
        }
        *self.password_resets.entry(key).or_insert(0) += 1;
        Ok(())
    }

    fn refresh(&self, session: &Session) -> Result<Session, AppError> {
        let (_, uid) = self
            .refresh_tokens
            .remove(&session.refresh_token)
            .ok_or_else(|| AppError::AuthFailure("TOKEN_EXPIRED".to_string()))?;
        let refreshed = self.mint_session(
            &uid,
            session.email.clone(),
            session.display_name.clone(),
            session.photo_url.clone(),
        )?;
        Ok(refreshed)
    }
}

// ─── Public API ──────────────────────────────────────────────────

#[derive(Clone)]
enum ProviderMode {
    Firebase(FirebaseRest),
    InMemory(Arc<InMemoryAccounts>),
}

/// Shared identity provider configuration; hands out per-client handles.
#[derive(Clone)]
pub struct IdentityProvider {
    mode: ProviderMode,
}

impl IdentityProvider {
    /// Provider backed by Firebase Auth (or its emulator).
    pub fn firebase(config: &Config) -> anyhow::Result<Self> {
        if let Some(host) = &config.auth_emulator_host {
            tracing::info!(host = %host, "Using Firebase Auth emulator");
        }
        Ok(Self {
            mode: ProviderMode::Firebase(FirebaseRest::new(config)?),
        })
    }

    /// Provider with a process-local account database.
    pub fn in_memory() -> Self {
        Self {
            mode: ProviderMode::InMemory(Arc::new(InMemoryAccounts::default())),
        }
    }

    /// Account database when running in memory.
    pub fn local_accounts(&self) -> Option<&InMemoryAccounts> {
        match &self.mode {
            ProviderMode::InMemory(accounts) => Some(accounts),
            ProviderMode::Firebase(_) => None,
        }
    }

    /// New signed-out client handle.
    pub fn client(&self) -> IdentityClient {
        let (current, _) = watch::channel(None);
        IdentityClient {
            mode: self.mode.clone(),
            current,
        }
    }
}

/// Cancellable stream of session changes. Dropping it unsubscribes.
pub struct SessionSubscription {
    rx: watch::Receiver<Option<Session>>,
}

impl SessionSubscription {
    /// Latest state, marking it seen.
    pub fn current(&mut self) -> Option<Session> {
        self.rx.borrow_and_update().clone()
    }

    /// Wait for the next change. Returns `false` once the provider is gone.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }
}

/// One client's view of the identity provider.
pub struct IdentityClient {
    mode: ProviderMode,
    current: watch::Sender<Option<Session>>,
}

impl IdentityClient {
    /// Subscribe to session changes. The first value observed is the
    /// current state.
    pub fn subscribe(&self) -> SessionSubscription {
        let mut rx = self.current.subscribe();
        rx.mark_changed();
        SessionSubscription { rx }
    }

    pub fn current_session(&self) -> Option<Session> {
        self.current.borrow().clone()
    }

    fn publish(&self, session: Option<Session>) {
        self.current.send_replace(session);
    }

    /// Popup sign-in with a federated ID token.
    pub async fn sign_in_with_idp(&self, credential: &IdpCredential) -> Result<Session, AppError> {
        let session = match &self.mode {
            ProviderMode::Firebase(rest) => rest.sign_in_with_idp(credential).await?,
            ProviderMode::InMemory(accounts) => accounts.sign_in_with_idp(credential)?,
        };
        self.publish(Some(session.clone()));
        Ok(session)
    }

    /// Create an email/password account and sign it in.
    ///
    /// With `display_name`, the name is set before the new session is
    /// published, so subscribers never see the nameless intermediate user.
    /// The account exists once the provider accepts the sign-up; if naming
    /// it then fails, the nameless session is published anyway.
    pub async fn create_account(
        &self,
        email: &str,
        password: &str,
        display_name: Option<&str>,
    ) -> Result<Session, AppError> {
        let session = match &self.mode {
            ProviderMode::Firebase(rest) => rest.sign_up(email, password).await?,
            ProviderMode::InMemory(accounts) => accounts.sign_up(email, password)?,
        };
        let session = match display_name {
            Some(name) => match self.update_display_name_quiet(&session, name).await {
                Ok(named) => named,
                Err(e) => {
                    tracing::error!(uid = %session.uid, error = %e, "Account created but setting its display name failed");
                    session
                }
            },
            None => session,
        };
        self.publish(Some(session.clone()));
        Ok(session)
    }

    pub async fn sign_in_with_credentials(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, AppError> {
        let session = match &self.mode {
            ProviderMode::Firebase(rest) => rest.sign_in_with_password(email, password).await?,
            ProviderMode::InMemory(accounts) => accounts.sign_in_with_password(email, password)?,
        };
        self.publish(Some(session.clone()));
        Ok(session)
    }

    async fn update_display_name_quiet(
        &self,
        session: &Session,
        display_name: &str,
    ) -> Result<Session, AppError> {
        match &self.mode {
            ProviderMode::Firebase(rest) => rest.update_display_name(session, display_name).await,
            ProviderMode::InMemory(accounts) => {
                accounts.update_display_name(session, display_name)
            }
        }
    }

    /// Set the provider-side display name for `session`.
    pub async fn update_display_name(
        &self,
        session: &Session,
        display_name: &str,
    ) -> Result<Session, AppError> {
        let updated = self.update_display_name_quiet(session, display_name).await?;
        let is_current = self
            .current
            .borrow()
            .as_ref()
            .map(|s| s.uid == updated.uid)
            .unwrap_or(false);
        if is_current {
            self.publish(Some(updated.clone()));
        }
        Ok(updated)
    }

    pub async fn send_password_reset(&self, email: &str) -> Result<(), AppError> {
        match &self.mode {
            ProviderMode::Firebase(rest) => rest.send_password_reset(email).await,
            ProviderMode::InMemory(accounts) => accounts.send_password_reset(email),
        }
    }

    /// Local sign-out; subscribers observe "no session".
    pub fn sign_out(&self) {
        self.publish(None);
    }

    /// Refresh the ID token if it has expired.
    ///
    /// A provider rejection (revoked/disabled account) signs the client out
    /// and returns `Ok(None)`. Network failures are returned as errors and
    /// leave the session untouched.
    pub async fn refresh_if_expired(&self) -> Result<Option<Session>, AppError> {
        let Some(session) = self.current_session() else {
            return Ok(None);
        };
        if !session.is_expired(Utc::now()) {
            return Ok(Some(session));
        }

        let refreshed = match &self.mode {
            ProviderMode::Firebase(rest) => rest.refresh(&session).await,
            ProviderMode::InMemory(accounts) => accounts.refresh(&session),
        };

        match refreshed {
            Ok(fresh) => {
                // Only replace if nobody signed out or in meanwhile.
                let still_current = self
                    .current
                    .borrow()
                    .as_ref()
                    .map(|s| s.refresh_token == session.refresh_token)
                    .unwrap_or(false);
                if still_current {
                    self.publish(Some(fresh.clone()));
                }
                Ok(Some(fresh))
            }
            Err(AppError::AuthFailure(code)) => {
                tracing::warn!(uid = %session.uid, code = %code, "Session invalidated by provider");
                self.sign_out();
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Force the current session to look expired (tests).
    #[doc(hidden)]
    pub fn expire_current_session(&self) {
        self.current.send_modify(|current| {
            if let Some(session) = current {
                session.expires_at = Utc::now() - ChronoDuration::seconds(1);
            }
        });
    }
}
