// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.
//!
//! Secrets arrive as environment variables (Cloud Run secret bindings in
//! production, `.env` locally) and are read once at startup.

use crate::services::policy::ProfileCompletenessPolicy;
use crate::services::session::DEFAULT_SESSION_IDLE_SECS;
use chrono::Duration;
use std::env;

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Environment Variables (non-sensitive) ---
    /// Firebase Web API key (public, identifies the project to Identity Toolkit)
    pub firebase_api_key: String,
    /// GCP / Firebase project ID
    pub gcp_project_id: String,
    /// Region the callable functions are deployed in
    pub functions_region: String,
    /// Frontend URL (CORS origin, cookie domain)
    pub frontend_url: String,
    /// Server port
    pub port: u16,
    /// `host:port` of the Firebase Auth emulator, if used
    pub auth_emulator_host: Option<String>,
    /// `host:port` of the Cloud Functions emulator, if used
    pub functions_emulator_host: Option<String>,
    /// Run with the in-memory store and identity provider
    pub offline: bool,
    /// Fields a profile needs before gated screens open
    pub completeness_policy: ProfileCompletenessPolicy,
    /// Unused session contexts are dropped after this long
    pub session_idle_timeout: Duration,

    // --- Secrets ---
    /// JWT signing key for session cookies (raw bytes)
    pub jwt_signing_key: Vec<u8>,
}

impl Config {
    /// Config for tests only.
    pub fn test_default() -> Self {
        Self {
            firebase_api_key: "test_api_key".to_string(),
            gcp_project_id: "test-project".to_string(),
            functions_region: "us-central1".to_string(),
            frontend_url: "http://localhost:5173".to_string(),
            port: 8080,
            auth_emulator_host: None,
            functions_emulator_host: None,
            offline: true,
            completeness_policy: ProfileCompletenessPolicy::default(),
            session_idle_timeout: Duration::seconds(DEFAULT_SESSION_IDLE_SECS),
            jwt_signing_key: b"test_jwt_key_32_bytes_minimum!!".to_vec(),
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let completeness_policy = match env::var("PROFILE_REQUIRED_FIELDS") {
            Ok(raw) => raw
                .parse()
                .map_err(|e| ConfigError::Invalid("PROFILE_REQUIRED_FIELDS", e))?,
            Err(_) => ProfileCompletenessPolicy::default(),
        };

        let session_idle_timeout = match env::var("SESSION_IDLE_TIMEOUT_MINUTES") {
            Ok(raw) => match raw.trim().parse::<i64>() {
                Ok(minutes) if minutes > 0 => Duration::minutes(minutes),
                _ => {
                    return Err(ConfigError::Invalid(
                        "SESSION_IDLE_TIMEOUT_MINUTES",
                        format!("expected a positive number of minutes, got {:?}", raw),
                    ))
                }
            },
            Err(_) => Duration::seconds(DEFAULT_SESSION_IDLE_SECS),
        };

        let offline = env::var("CLUBHOUSE_OFFLINE")
            .map(|v| matches!(v.trim(), "1" | "true" | "yes"))
            .unwrap_or(false);

        Ok(Self {
            firebase_api_key: match env::var("FIREBASE_API_KEY") {
                Ok(key) => key.trim().to_string(),
                Err(_) if offline => "offline".to_string(),
                Err(_) => return Err(ConfigError::Missing("FIREBASE_API_KEY")),
            },
            gcp_project_id: env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string()),
            functions_region: env::var("FUNCTIONS_REGION")
                .unwrap_or_else(|_| "us-central1".to_string()),
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
            auth_emulator_host: env::var("FIREBASE_AUTH_EMULATOR_HOST").ok(),
            functions_emulator_host: env::var("FUNCTIONS_EMULATOR_HOST").ok(),
            offline,
            completeness_policy,
            session_idle_timeout,

            jwt_signing_key: env::var("JWT_SIGNING_KEY")
                .map_err(|_| ConfigError::Missing("JWT_SIGNING_KEY"))?
                .into_bytes(),
        })
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}
