// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Client for the remote booking callables (`checkSlotAvailability`,
//! `checkBookingConflicts`).
//!
//! These are the one place failures are converted into a safe default
//! instead of being propagated: availability falls back to "not available",
//! conflict checks fall back to "no conflicts".

use crate::config::Config;
use crate::error::AppError;
use crate::time_utils::format_utc_rfc3339;
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Result of `checkSlotAvailability`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "camelCase")]
pub struct SlotAvailability {
    pub available: bool,
    #[serde(default)]
    #[cfg_attr(feature = "binding-generation", ts(type = "Array<unknown>"))]
    pub conflicts: Vec<serde_json::Value>,
}

impl SlotAvailability {
    /// Used when the callable cannot be reached.
    pub fn unavailable() -> Self {
        Self {
            available: false,
            conflicts: Vec::new(),
        }
    }
}

/// Result of `checkBookingConflicts`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "camelCase")]
pub struct BookingConflicts {
    pub has_conflicts: bool,
    #[serde(default)]
    #[cfg_attr(feature = "binding-generation", ts(type = "Array<unknown>"))]
    pub conflicts: Vec<serde_json::Value>,
}

impl BookingConflicts {
    /// Used when the callable cannot be reached.
    pub fn none() -> Self {
        Self {
            has_conflicts: false,
            conflicts: Vec::new(),
        }
    }
}

#[derive(Deserialize)]
struct CallableResponse<T> {
    result: T,
}

/// Callable functions HTTP client.
#[derive(Clone)]
pub struct FunctionsClient {
    http: reqwest::Client,
    /// `None` when running offline; every call degrades.
    base_url: Option<String>,
}

impl FunctionsClient {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let base_url = match &config.functions_emulator_host {
            Some(host) => format!(
                "http://{}/{}/{}",
                host, config.gcp_project_id, config.functions_region
            ),
            None => format!(
                "https://{}-{}.cloudfunctions.net",
                config.functions_region, config.gcp_project_id
            ),
        };
        Self::with_base_url(&base_url)
    }

    pub fn with_base_url(base_url: &str) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .context("failed building functions HTTP client")?;
        Ok(Self {
            http,
            base_url: Some(base_url.trim_end_matches('/').to_string()),
        })
    }

    /// Client that never leaves the process.
    pub fn disabled() -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: None,
        }
    }

    async fn call<T: for<'de> Deserialize<'de>>(
        &self,
        name: &str,
        data: serde_json::Value,
        id_token: Option<&str>,
    ) -> Result<T, AppError> {
        let base_url = self
            .base_url
            .as_ref()
            .ok_or_else(|| AppError::Transient("Callable functions disabled".to_string()))?;

        let mut request = self
            .http
            .post(format!("{}/{}", base_url, name))
            .json(&serde_json::json!({ "data": data }));
        if let Some(token) = id_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AppError::Transient(format!("{} request failed: {}", name, e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Transient(format!(
                "{} returned HTTP {}: {}",
                name, status, body
            )));
        }

        let envelope: CallableResponse<T> = response
            .json()
            .await
            .map_err(|e| AppError::Transient(format!("{} returned malformed body: {}", name, e)))?;
        Ok(envelope.result)
    }

    /// Is `[start, end)` free for `amenity_id`? No sign-in required.
    pub async fn check_slot_availability(
        &self,
        amenity_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> SlotAvailability {
        let data = serde_json::json!({
            "amenityId": amenity_id,
            "startTime": format_utc_rfc3339(start),
            "endTime": format_utc_rfc3339(end),
        });

        match self.call("checkSlotAvailability", data, None).await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(amenity_id, error = %e, "Error checking slot availability");
                SlotAvailability::unavailable()
            }
        }
    }

    /// Existing bookings overlapping `[start, end)`, ignoring
    /// `exclude_booking_id` (the booking being edited).
    pub async fn check_booking_conflicts(
        &self,
        amenity_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude_booking_id: Option<&str>,
        id_token: Option<&str>,
    ) -> BookingConflicts {
        let data = serde_json::json!({
            "amenityId": amenity_id,
            "startTime": format_utc_rfc3339(start),
            "endTime": format_utc_rfc3339(end),
            "excludeBookingId": exclude_booking_id,
        });

        match self.call("checkBookingConflicts", data, id_token).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(
                    amenity_id,
                    error = %e,
                    "Error checking booking conflicts, assuming none"
                );
                BookingConflicts::none()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    #[tokio::test]
    async fn test_disabled_client_degrades() {
        let client = FunctionsClient::disabled();
        let start = Utc::now();
        let end = start + ChronoDuration::hours(1);

        assert_eq!(
            client.check_slot_availability("pool", start, end).await,
            SlotAvailability::unavailable()
        );
        assert_eq!(
            client
                .check_booking_conflicts("pool", start, end, None, None)
                .await,
            BookingConflicts::none()
        );
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_degrades() {
        let client = FunctionsClient::with_base_url("http://127.0.0.1:9").unwrap();
        let start = Utc::now();
        let end = start + ChronoDuration::minutes(30);

        let availability = client.check_slot_availability("court-1", start, end).await;
        assert!(!availability.available);
        assert!(availability.conflicts.is_empty());

        let conflicts = client
            .check_booking_conflicts("court-1", start, end, Some("b1"), Some("token"))
            .await;
        assert!(!conflicts.has_conflicts);
    }

    #[test]
    fn test_result_shapes() {
        let parsed: CallableResponse<BookingConflicts> = serde_json::from_value(serde_json::json!({
            "result": { "hasConflicts": true, "conflicts": [{ "id": "b7" }] }
        }))
        .unwrap();
        assert!(parsed.result.has_conflicts);
        assert_eq!(parsed.result.conflicts.len(), 1);

        let minimal: SlotAvailability =
            serde_json::from_value(serde_json::json!({ "available": true })).unwrap();
        assert!(minimal.available);
        assert!(minimal.conflicts.is_empty());
    }
}
