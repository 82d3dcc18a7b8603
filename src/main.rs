// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Clubhouse API Server
//!
//! Owns member sign-in sessions and profiles for the club amenity-booking
//! web app, and answers screen-access questions for the frontend.

use clubhouse::{
    config::Config,
    db::FirestoreDb,
    services::{FunctionsClient, IdentityProvider},
    AppState,
};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How often ended, expired and idle session contexts are dropped.
const PRUNE_INTERVAL: Duration = Duration::from_secs(5 * 60);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging for GCP
    init_logging();

    // Load configuration from environment
    let config = Config::from_env()?;
    tracing::info!(
        port = config.port,
        offline = config.offline,
        "Starting Clubhouse API"
    );

    let state = if config.offline {
        tracing::warn!("Running offline: in-memory profiles and accounts, callables disabled");
        AppState::offline(config.clone())
    } else {
        // Initialize Firestore database
        let db = FirestoreDb::new(&config.gcp_project_id).await?;

        let identity = IdentityProvider::firebase(&config)?;
        tracing::info!(
            emulator = config.auth_emulator_host.is_some(),
            "Identity provider initialized"
        );

        let functions = FunctionsClient::new(&config)?;
        tracing::info!(region = %config.functions_region, "Callable functions client initialized");

        AppState::new(config.clone(), db, identity, functions)
    };
    let state = Arc::new(state);

    // Periodically drop contexts that ended, expired or went idle
    let sessions = state.sessions.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(PRUNE_INTERVAL);
        loop {
            ticker.tick().await;
            let removed = sessions.prune();
            if removed > 0 {
                tracing::debug!(removed, remaining = sessions.len(), "Pruned session contexts");
            }
        }
    });

    // Build router
    let app = clubhouse::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("clubhouse=debug,info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(format)
        .init();
}
