// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Clubhouse: member sign-in, profiles and screen access for a club
//! amenity-booking app.
//!
//! This crate provides the backend API that owns each browser's auth
//! session, keeps member profiles in Firestore, and decides which screens
//! a visitor may open.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use chrono::Duration;
use config::Config;
use db::FirestoreDb;
use services::session::SESSION_TTL_SECS;
use services::{
    FunctionsClient, IdentityProvider, ProfileRepository, RouteTable, SessionRegistry,
    SessionStore,
};

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub profiles: ProfileRepository,
    pub identity: IdentityProvider,
    pub sessions: SessionRegistry,
    pub functions: FunctionsClient,
    pub routes: RouteTable,
}

impl AppState {
    pub fn new(
        config: Config,
        db: FirestoreDb,
        identity: IdentityProvider,
        functions: FunctionsClient,
    ) -> Self {
        let sessions = SessionRegistry::new(
            Duration::seconds(SESSION_TTL_SECS),
            config.session_idle_timeout,
        );
        Self {
            config,
            profiles: ProfileRepository::new(db),
            identity,
            sessions,
            functions,
            routes: RouteTable::default(),
        }
    }

    /// Everything in process: in-memory store and identity provider, no
    /// callable functions.
    pub fn offline(config: Config) -> Self {
        Self::new(
            config,
            FirestoreDb::new_in_memory(),
            IdentityProvider::in_memory(),
            FunctionsClient::disabled(),
        )
    }

    /// Fresh, signed-out context for one client. Must be called inside a
    /// Tokio runtime.
    pub fn new_session_store(&self) -> SessionStore {
        SessionStore::new(self.identity.client(), self.profiles.clone())
    }
}
