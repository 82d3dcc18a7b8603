// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Per-client session store.
//!
//! The store is the only writer of a client's auth state (`loading`,
//! current session, cached profile). It follows the identity provider's
//! session stream for its whole lifetime; everything else reads through
//! [`AuthView`] or [`SessionStore::snapshot`].
//!
//! Profile fetches are tied to the session they were started for. A newer
//! session notification cancels an in-flight fetch, and a result is only
//! written if its uid is still the current session's uid, so a fetch racing
//! a sign-out never resurrects a profile.

use crate::error::AppError;
use crate::models::{Member, ProfileUpdate, Session};
use crate::services::identity::{IdentityClient, IdpCredential, SessionSubscription};
use crate::services::policy::{self, ProfileCompletenessPolicy};
use crate::services::profiles::ProfileRepository;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Point-in-time auth state for one client.
#[derive(Debug, Clone)]
pub struct AuthSnapshot {
    pub loading: bool,
    pub session: Option<Session>,
    pub profile: Option<Member>,
}

impl AuthSnapshot {
    /// State before the first provider notification.
    pub fn initial() -> Self {
        Self {
            loading: true,
            session: None,
            profile: None,
        }
    }

    /// Settled with nobody signed in.
    pub fn signed_out() -> Self {
        Self {
            loading: false,
            session: None,
            profile: None,
        }
    }

    fn session_uid(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.uid.as_str())
    }

    pub fn is_admin(&self) -> bool {
        self.profile.as_ref().map(policy::is_admin).unwrap_or(false)
    }

    pub fn is_profile_complete(&self, completeness: &ProfileCompletenessPolicy) -> bool {
        self.profile
            .as_ref()
            .map(|p| completeness.is_complete(p))
            .unwrap_or(false)
    }
}

/// Read-only view of a store's state.
#[derive(Clone)]
pub struct AuthView {
    rx: watch::Receiver<AuthSnapshot>,
}

impl AuthView {
    pub fn snapshot(&self) -> AuthSnapshot {
        self.rx.borrow().clone()
    }

    /// Wait until the store is no longer loading.
    pub async fn settled(&mut self) -> AuthSnapshot {
        if let Ok(snapshot) = self.rx.wait_for(|s| !s.loading).await {
            return snapshot.clone();
        }
        // Store dropped; report whatever it last said.
        self.rx.borrow().clone()
    }
}

enum FetchOutcome {
    Settled(Result<Member, AppError>),
    Superseded { provider_alive: bool },
}

/// Follow the provider's session stream until it closes.
async fn follow_sessions(
    mut subscription: SessionSubscription,
    state: Arc<watch::Sender<AuthSnapshot>>,
    profiles: ProfileRepository,
) {
    let mut pending = subscription.changed().await;

    while pending {
        let Some(session) = subscription.current() else {
            state.send_modify(|s| {
                s.session = None;
                s.profile = None;
                s.loading = false;
            });
            pending = subscription.changed().await;
            continue;
        };

        let uid = session.uid.clone();
        state.send_modify(|s| {
            if s.session_uid() != Some(uid.as_str()) {
                s.profile = None;
            }
            s.session = Some(session.clone());
        });

        let outcome = tokio::select! {
            result = profiles.fetch_or_create(&session) => FetchOutcome::Settled(result),
            alive = subscription.changed() => FetchOutcome::Superseded { provider_alive: alive },
        };

        match outcome {
            FetchOutcome::Settled(result) => {
                state.send_if_modified(|s| {
                    if s.session_uid() != Some(uid.as_str()) {
                        return false;
                    }
                    // Failures were logged by the repository; keep going
                    // without a profile.
                    if let Ok(profile) = result {
                        s.profile = Some(profile);
                    }
                    s.loading = false;
                    true
                });
                pending = subscription.changed().await;
            }
            FetchOutcome::Superseded { provider_alive } => {
                tracing::debug!(uid = %uid, "Session changed during profile fetch, result dropped");
                pending = provider_alive;
            }
        }
    }

    tracing::debug!("Identity provider closed, session listener stopped");
}

/// One client's auth context.
pub struct SessionStore {
    state: Arc<watch::Sender<AuthSnapshot>>,
    identity: IdentityClient,
    profiles: ProfileRepository,
    listener: JoinHandle<()>,
}

impl Drop for SessionStore {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

impl SessionStore {
    /// Start following `identity`'s session stream. Must be called inside a
    /// Tokio runtime.
    pub fn new(identity: IdentityClient, profiles: ProfileRepository) -> Self {
        let (tx, _) = watch::channel(AuthSnapshot::initial());
        let state = Arc::new(tx);
        let listener = tokio::spawn(follow_sessions(
            identity.subscribe(),
            state.clone(),
            profiles.clone(),
        ));

        Self {
            state,
            identity,
            profiles,
            listener,
        }
    }

    pub fn view(&self) -> AuthView {
        AuthView {
            rx: self.state.subscribe(),
        }
    }

    pub fn snapshot(&self) -> AuthSnapshot {
        self.state.borrow().clone()
    }

    /// Wait for the initial (or current) profile load to finish.
    pub async fn settled(&self) -> AuthSnapshot {
        self.view().settled().await
    }

    pub fn current_session(&self) -> Option<Session> {
        self.state.borrow().session.clone()
    }

    pub fn is_admin(&self) -> bool {
        self.state.borrow().is_admin()
    }

    /// Store `profile` if `session` is still the provider's current one.
    /// The check runs under the state lock, so a concurrent sign-out either
    /// lands first and wins or clears the profile afterwards.
    fn adopt(&self, session: &Session, profile: Member) -> bool {
        let adopted = self.state.send_if_modified(|s| {
            let current = self.identity.current_session();
            if current.as_ref().map(|c| c.uid.as_str()) != Some(session.uid.as_str()) {
                return false;
            }
            s.session = current;
            s.profile = Some(profile);
            s.loading = false;
            true
        });
        if !adopted {
            tracing::debug!(uid = %session.uid, "Signed out before profile arrived, not caching it");
        }
        adopted
    }

    /// Completes once the provider accepted the credentials and the
    /// profile exists.
    async fn finish_sign_in(&self, session: Session) -> Result<Session, AppError> {
        let profile = self.profiles.fetch_or_create(&session).await?;
        self.adopt(&session, profile);
        Ok(session)
    }

    pub async fn sign_in_with_popup_provider(
        &self,
        credential: &IdpCredential,
    ) -> Result<Session, AppError> {
        let session = self
            .identity
            .sign_in_with_idp(credential)
            .await
            .map_err(|e| {
                tracing::error!(provider = %credential.provider_id, error = %e, "Popup sign-in failed");
                e
            })?;
        self.finish_sign_in(session).await
    }

    pub async fn sign_up_with_credentials(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> Result<Session, AppError> {
        let session = self
            .identity
            .create_account(email, password, Some(display_name))
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Sign-up failed");
                e
            })?;
        self.finish_sign_in(session).await
    }

    pub async fn sign_in_with_credentials(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, AppError> {
        let session = self
            .identity
            .sign_in_with_credentials(email, password)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Credential sign-in failed");
                e
            })?;
        self.finish_sign_in(session).await
    }

    pub async fn request_password_reset(&self, email: &str) -> Result<(), AppError> {
        self.identity.send_password_reset(email).await.map_err(|e| {
            tracing::error!(error = %e, "Password reset request failed");
            e
        })
    }

    /// Sign out and drop the cached profile.
    pub fn sign_out(&self) {
        self.identity.sign_out();
        self.state.send_modify(|s| {
            s.session = None;
            s.profile = None;
            s.loading = false;
        });
    }

    /// Re-read the profile after an external change. `Ok(None)` without a
    /// session.
    pub async fn refresh_profile(&self) -> Result<Option<Member>, AppError> {
        let Some(session) = self.current_session() else {
            return Ok(None);
        };
        let profile = self.profiles.refresh(&session.uid).await?;
        if let Some(profile) = &profile {
            self.adopt(&session, profile.clone());
        }
        Ok(profile)
    }

    /// Apply a self-service update to the signed-in user's profile and
    /// return the refreshed record.
    pub async fn update_profile(&self, update: ProfileUpdate) -> Result<Member, AppError> {
        let session = self.current_session().ok_or(AppError::Unauthorized)?;
        self.profiles.update(&session.uid, update).await?;
        self.refresh_profile()
            .await?
            .ok_or_else(|| AppError::profile_not_found(&session.uid))
    }

    /// Refresh an expired provider token. `Ok(None)` means the provider has
    /// ended the session.
    pub async fn ensure_fresh_session(&self) -> Result<Option<Session>, AppError> {
        let fresh = self.identity.refresh_if_expired().await.map_err(|e| {
            tracing::error!(error = %e, "Session refresh failed");
            e
        })?;
        if fresh.is_none() {
            self.state.send_modify(|s| {
                s.session = None;
                s.profile = None;
                s.loading = false;
            });
        }
        Ok(fresh)
    }
}

/// Lifetime of a signed-in context. Matches the session cookie.
pub const SESSION_TTL_SECS: i64 = 7 * 24 * 60 * 60;
/// Default time an unused context survives.
pub const DEFAULT_SESSION_IDLE_SECS: i64 = 24 * 60 * 60;

struct RegisteredContext {
    store: Arc<SessionStore>,
    issued_at: DateTime<Utc>,
    last_seen: DateTime<Utc>,
}

/// All live client contexts, keyed by opaque session id.
///
/// A context is evicted once its provider session ends, once it is older
/// than the cookie lifetime, or once no request has used it for the idle
/// limit.
#[derive(Clone)]
pub struct SessionRegistry {
    contexts: Arc<DashMap<String, RegisteredContext>>,
    max_age: Duration,
    idle_timeout: Duration,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(
            Duration::seconds(SESSION_TTL_SECS),
            Duration::seconds(DEFAULT_SESSION_IDLE_SECS),
        )
    }
}

/// Random bytes in a session id.
const SESSION_ID_BYTES: usize = 32;

impl SessionRegistry {
    pub fn new(max_age: Duration, idle_timeout: Duration) -> Self {
        Self {
            contexts: Arc::new(DashMap::new()),
            max_age,
            idle_timeout,
        }
    }

    /// Register a context and return its new session id.
    pub fn insert(&self, store: Arc<SessionStore>) -> Result<String, AppError> {
        let sid = crate::services::identity::random_id(SESSION_ID_BYTES)?;
        let now = Utc::now();
        self.contexts.insert(
            sid.clone(),
            RegisteredContext {
                store,
                issued_at: now,
                last_seen: now,
            },
        );
        Ok(sid)
    }

    /// Look up a context and mark it as used.
    pub fn get(&self, sid: &str) -> Option<Arc<SessionStore>> {
        self.contexts.get_mut(sid).map(|mut entry| {
            entry.last_seen = Utc::now();
            entry.store.clone()
        })
    }

    pub fn remove(&self, sid: &str) -> Option<Arc<SessionStore>> {
        self.contexts.remove(sid).map(|(_, entry)| entry.store)
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    /// Drop ended, expired and idle contexts. Returns how many were removed.
    pub fn prune(&self) -> usize {
        self.prune_at(Utc::now())
    }

    /// [`prune`](Self::prune) as of `now`.
    pub fn prune_at(&self, now: DateTime<Utc>) -> usize {
        let before = self.contexts.len();
        self.contexts.retain(|_, entry| {
            let snapshot = entry.store.snapshot();
            let ended = !snapshot.loading && snapshot.session.is_none();
            let expired = now - entry.issued_at >= self.max_age;
            let idle = now - entry.last_seen >= self.idle_timeout;

            if !ended && (expired || idle) {
                tracing::debug!(expired, idle, "Evicting unused session context");
                entry.store.sign_out();
            }
            !(ended || expired || idle)
        });
        before.saturating_sub(self.contexts.len())
    }
}
