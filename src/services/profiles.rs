// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Member profile repository.
//!
//! One profile per uid, created lazily on the first observed session.
//! Self-service updates go through [`ProfileUpdate`], which cannot express
//! a membership type; role changes use [`ProfileRepository::set_membership_type`],
//! which callers must restrict to administrators.

use crate::db::FirestoreDb;
use crate::error::AppError;
use crate::models::{Member, MemberStats, MembershipType, ProfileUpdate, Session};
use crate::time_utils::{format_utc_rfc3339, now_rfc3339};
use chrono::{DateTime, Duration, Utc};
use serde_json::{Map, Value};

/// Stored field name of the update timestamp.
const UPDATED_AT_FIELD: &str = "updatedAt";

/// Reads and writes member profiles.
#[derive(Clone)]
pub struct ProfileRepository {
    db: FirestoreDb,
}

/// A timestamp strictly after `previous`, so every update moves
/// `updatedAt` forward even within the same millisecond.
fn next_update_timestamp(previous: Option<&str>) -> String {
    let now = Utc::now();
    let previous = previous
        .and_then(|p| DateTime::parse_from_rfc3339(p).ok())
        .map(|p| p.with_timezone(&Utc));
    match previous {
        Some(prev) if now <= prev => format_utc_rfc3339(prev + Duration::milliseconds(1)),
        _ => format_utc_rfc3339(now),
    }
}

fn saturating_u32(count: usize) -> u32 {
    u32::try_from(count).unwrap_or(u32::MAX)
}

impl ProfileRepository {
    pub fn new(db: FirestoreDb) -> Self {
        Self { db }
    }

    /// Return the stored profile for the session's user, creating the
    /// default profile if there is none.
    ///
    /// An existing profile is returned verbatim; session fields are never
    /// merged onto it.
    pub async fn fetch_or_create(&self, session: &Session) -> Result<Member, AppError> {
        if let Some(existing) = self.db.get_member(&session.uid).await.map_err(|e| {
            tracing::error!(uid = %session.uid, error = %e, "Failed to read member profile");
            e
        })? {
            return Ok(existing);
        }

        let profile = Member::from_session(session, now_rfc3339());
        let stored = self
            .db
            .create_member_if_absent(&profile)
            .await
            .map_err(|e| {
                tracing::error!(uid = %session.uid, error = %e, "Failed to create member profile");
                e
            })?;

        tracing::info!(uid = %session.uid, "Created member profile");
        Ok(stored)
    }

    /// Re-read the stored profile.
    pub async fn refresh(&self, uid: &str) -> Result<Option<Member>, AppError> {
        self.db.get_member(uid).await.map_err(|e| {
            tracing::error!(uid, error = %e, "Failed to refresh member profile");
            e
        })
    }

    /// Merge self-service fields into the stored profile and stamp
    /// `updatedAt`.
    ///
    /// Fails with `NotFound` if the profile does not exist yet, `BadRequest`
    /// on validation errors, and `Conflict` when `expected_updated_at` is
    /// set and no longer matches.
    pub async fn update(&self, uid: &str, update: ProfileUpdate) -> Result<(), AppError> {
        let update = update.normalized();
        if let Some(message) = update.validation_message() {
            return Err(AppError::BadRequest(message));
        }

        let current = self
            .refresh(uid)
            .await?
            .ok_or_else(|| AppError::profile_not_found(uid))
            .map_err(|e| {
                tracing::error!(uid, "Profile update before profile creation");
                e
            })?;

        if let Some(expected) = &update.expected_updated_at {
            if current.updated_at.as_deref() != Some(expected.as_str()) {
                tracing::warn!(
                    uid,
                    expected = %expected,
                    stored = ?current.updated_at,
                    "Rejected stale profile update"
                );
                return Err(AppError::Conflict(
                    "Profile was changed by another session".to_string(),
                ));
            }
        }

        let mut fields = match serde_json::to_value(&update) {
            Ok(Value::Object(fields)) => fields,
            Ok(_) => Map::new(),
            Err(e) => return Err(AppError::Internal(e.into())),
        };
        fields.insert(
            UPDATED_AT_FIELD.to_string(),
            Value::String(next_update_timestamp(current.updated_at.as_deref())),
        );

        self.write_fields(uid, fields).await?;
        tracing::info!(uid, "Member profile updated");
        Ok(())
    }

    /// Admin-only: change a member's role. Returns the updated profile.
    pub async fn set_membership_type(
        &self,
        uid: &str,
        membership_type: MembershipType,
    ) -> Result<Member, AppError> {
        let current = self
            .refresh(uid)
            .await?
            .ok_or_else(|| AppError::profile_not_found(uid))?;

        let mut fields = Map::new();
        fields.insert(
            "membershipType".to_string(),
            Value::String(membership_type.as_str().to_string()),
        );
        fields.insert(
            UPDATED_AT_FIELD.to_string(),
            Value::String(next_update_timestamp(current.updated_at.as_deref())),
        );
        self.write_fields(uid, fields).await?;

        tracing::info!(uid, membership_type = %membership_type, "Membership type changed");
        self.refresh(uid)
            .await?
            .ok_or_else(|| AppError::profile_not_found(uid))
    }

    pub async fn get(&self, uid: &str) -> Result<Option<Member>, AppError> {
        self.refresh(uid).await
    }

    /// Admin-only: every member, newest first.
    pub async fn list(&self) -> Result<Vec<Member>, AppError> {
        self.db.list_members().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to list members");
            e
        })
    }

    /// Admin-only: remove a member profile.
    pub async fn delete(&self, uid: &str) -> Result<(), AppError> {
        self.db.delete_member(uid).await.map_err(|e| {
            tracing::error!(uid, error = %e, "Failed to delete member profile");
            e
        })?;
        tracing::info!(uid, "Member profile deleted");
        Ok(())
    }

    /// Booking and event counts for `uid`. The three reads run
    /// concurrently; any failure fails the whole call.
    pub async fn stats(&self, uid: &str) -> Result<MemberStats, AppError> {
        let (bookings, attended, organized) = tokio::try_join!(
            self.db.count_member_bookings(uid),
            self.db.count_events_attended(uid),
            self.db.count_events_organized(uid),
        )
        .map_err(|e| {
            tracing::error!(uid, error = %e, "Failed to load member stats");
            e
        })?;

        Ok(MemberStats {
            total_bookings: saturating_u32(bookings),
            events_attended: saturating_u32(attended),
            events_organized: saturating_u32(organized),
        })
    }

    async fn write_fields(&self, uid: &str, fields: Map<String, Value>) -> Result<(), AppError> {
        self.db.update_member_fields(uid, fields).await.map_err(|e| {
            tracing::error!(uid, error = %e, "Failed to write member profile");
            e
        })
    }
}
