// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper with typed operations.
//!
//! Provides high-level operations for:
//! - Members (profile documents keyed by identity provider uid)
//! - Booking and event counts per member (read-only)
//!
//! Besides live Firestore (or the emulator) there is an in-memory backend
//! for tests and offline development, and an offline mock that fails every
//! call.

use crate::db::collections;
use crate::error::AppError;
use crate::models::Member;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::{Map, Value};
use std::sync::Arc;

type MemoryKey = (String, String);

#[derive(Clone)]
enum Backend {
    Firestore(firestore::FirestoreDb),
    Memory(Arc<DashMap<MemoryKey, Value>>),
    Offline,
}

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    backend: Backend,
    /// Holds member reads until opened.
    #[cfg(test)]
    read_gate: Option<Arc<tokio::sync::watch::Sender<bool>>>,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        // If the emulator environment variable is set, use unauthenticated connection
        // to avoid local credential warnings and leakage.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self::from_backend(Backend::Firestore(client)))
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self::from_backend(Backend::Firestore(client)))
    }

    /// Create an in-process store (tests and offline development).
    ///
    /// Clones share the same documents.
    pub fn new_in_memory() -> Self {
        Self::from_backend(Backend::Memory(Arc::new(DashMap::new())))
    }

    /// In-memory store whose member reads wait for [`open_reads`](Self::open_reads).
    #[cfg(test)]
    pub(crate) fn new_in_memory_gated() -> Self {
        let (gate, _) = tokio::sync::watch::channel(false);
        Self {
            read_gate: Some(Arc::new(gate)),
            ..Self::new_in_memory()
        }
    }

    #[cfg(test)]
    pub(crate) fn open_reads(&self) {
        if let Some(gate) = &self.read_gate {
            gate.send_replace(true);
        }
    }

    /// Create a mock Firestore client for testing (offline mode).
    ///
    /// All database operations will return an error if called.
    pub fn new_mock() -> Self {
        Self::from_backend(Backend::Offline)
    }

    fn from_backend(backend: Backend) -> Self {
        Self {
            backend,
            #[cfg(test)]
            read_gate: None,
        }
    }

    fn offline_error() -> AppError {
        AppError::Database("Database not connected (offline mode)".to_string())
    }

    fn memory_key(collection: &str, id: &str) -> MemoryKey {
        (collection.to_string(), id.to_string())
    }

    fn decode(value: Value) -> Result<Member, AppError> {
        serde_json::from_value(value)
            .map_err(|e| AppError::Database(format!("Malformed member document: {}", e)))
    }

    fn encode(member: &Member) -> Result<Value, AppError> {
        serde_json::to_value(member)
            .map_err(|e| AppError::Database(format!("Failed to encode member: {}", e)))
    }

    // ─── Member Operations ───────────────────────────────────────

    /// Get a member profile by uid.
    pub async fn get_member(&self, uid: &str) -> Result<Option<Member>, AppError> {
        #[cfg(test)]
        if let Some(gate) = &self.read_gate {
            let _ = gate.subscribe().wait_for(|open| *open).await;
        }

        match &self.backend {
            Backend::Firestore(client) => client
                .fluent()
                .select()
                .by_id_in(collections::MEMBERS)
                .obj()
                .one(uid)
                .await
                .map_err(|e| AppError::Database(e.to_string())),
            Backend::Memory(docs) => docs
                .get(&Self::memory_key(collections::MEMBERS, uid))
                .map(|doc| Self::decode(doc.value().clone()))
                .transpose(),
            Backend::Offline => Err(Self::offline_error()),
        }
    }

    /// Store `member` unless a document already exists for its uid.
    ///
    /// Never overwrites. Returns whichever record ends up stored, so two
    /// concurrent first sign-ins both see the same profile.
    pub async fn create_member_if_absent(&self, member: &Member) -> Result<Member, AppError> {
        match &self.backend {
            Backend::Firestore(client) => {
                let inserted: Result<Member, _> = client
                    .fluent()
                    .insert()
                    .into(collections::MEMBERS)
                    .document_id(&member.uid)
                    .object(member)
                    .execute()
                    .await;

                match inserted {
                    Ok(stored) => Ok(stored),
                    Err(insert_err) => {
                        // Most likely another writer created it first.
                        match self.get_member(&member.uid).await? {
                            Some(existing) => {
                                tracing::debug!(
                                    uid = %member.uid,
                                    "Member created concurrently, using stored record"
                                );
                                Ok(existing)
                            }
                            None => Err(AppError::Database(insert_err.to_string())),
                        }
                    }
                }
            }
            Backend::Memory(docs) => {
                match docs.entry(Self::memory_key(collections::MEMBERS, &member.uid)) {
                    Entry::Occupied(existing) => Self::decode(existing.get().clone()),
                    Entry::Vacant(slot) => {
                        slot.insert(Self::encode(member)?);
                        Ok(member.clone())
                    }
                }
            }
            Backend::Offline => Err(Self::offline_error()),
        }
    }

    /// Merge `fields` (stored field name -> value) into an existing member.
    ///
    /// Only the listed fields are written. Fails with `NotFound` when there
    /// is no document for `uid`. Last write wins.
    pub async fn update_member_fields(
        &self,
        uid: &str,
        fields: Map<String, Value>,
    ) -> Result<(), AppError> {
        match &self.backend {
            Backend::Firestore(client) => {
                if self.get_member(uid).await?.is_none() {
                    return Err(AppError::profile_not_found(uid));
                }

                let field_paths: Vec<String> = fields.keys().cloned().collect();
                let _: () = client
                    .fluent()
                    .update()
                    .fields(field_paths)
                    .in_col(collections::MEMBERS)
                    .document_id(uid)
                    .object(&Value::Object(fields))
                    .execute()
                    .await
                    .map_err(|e| AppError::Database(e.to_string()))?;
                Ok(())
            }
            Backend::Memory(docs) => {
                let mut doc = docs
                    .get_mut(&Self::memory_key(collections::MEMBERS, uid))
                    .ok_or_else(|| AppError::profile_not_found(uid))?;
                let object = doc.value_mut().as_object_mut().ok_or_else(|| {
                    AppError::Database(format!("Member document {} is not an object", uid))
                })?;
                object.extend(fields);
                Ok(())
            }
            Backend::Offline => Err(Self::offline_error()),
        }
    }

    /// Delete a member profile. Deleting a missing document is not an error.
    pub async fn delete_member(&self, uid: &str) -> Result<(), AppError> {
        match &self.backend {
            Backend::Firestore(client) => {
                client
                    .fluent()
                    .delete()
                    .from(collections::MEMBERS)
                    .document_id(uid)
                    .execute()
                    .await
                    .map_err(|e| AppError::Database(e.to_string()))?;
                Ok(())
            }
            Backend::Memory(docs) => {
                docs.remove(&Self::memory_key(collections::MEMBERS, uid));
                Ok(())
            }
            Backend::Offline => Err(Self::offline_error()),
        }
    }

    /// All members, newest first.
    pub async fn list_members(&self) -> Result<Vec<Member>, AppError> {
        match &self.backend {
            Backend::Firestore(client) => client
                .fluent()
                .select()
                .from(collections::MEMBERS)
                .order_by([("createdAt", firestore::FirestoreQueryDirection::Descending)])
                .obj()
                .query()
                .await
                .map_err(|e| AppError::Database(e.to_string())),
            Backend::Memory(docs) => {
                let mut members = docs
                    .iter()
                    .filter(|doc| doc.key().0 == collections::MEMBERS)
                    .map(|doc| Self::decode(doc.value().clone()))
                    .collect::<Result<Vec<_>, _>>()?;
                members.sort_by(|a, b| b.created_at.cmp(&a.created_at));
                Ok(members)
            }
            Backend::Offline => Err(Self::offline_error()),
        }
    }

    // ─── Booking / Event Counts ──────────────────────────────────

    /// Number of bookings made by `uid`.
    pub async fn count_member_bookings(&self, uid: &str) -> Result<usize, AppError> {
        match &self.backend {
            Backend::Firestore(client) => client
                .fluent()
                .select()
                .from(collections::BOOKINGS)
                .filter(|q| q.for_all([q.field("memberId").eq(uid)]))
                .query()
                .await
                .map(|docs| docs.len())
                .map_err(|e| AppError::Database(e.to_string())),
            Backend::Memory(docs) => Ok(Self::count_memory(docs, collections::BOOKINGS, |doc| {
                doc.get("memberId").and_then(Value::as_str) == Some(uid)
            })),
            Backend::Offline => Err(Self::offline_error()),
        }
    }

    /// Number of events whose `attendees` list contains `uid`.
    pub async fn count_events_attended(&self, uid: &str) -> Result<usize, AppError> {
        match &self.backend {
            Backend::Firestore(client) => client
                .fluent()
                .select()
                .from(collections::EVENTS)
                .filter(|q| q.for_all([q.field("attendees").array_contains(uid)]))
                .query()
                .await
                .map(|docs| docs.len())
                .map_err(|e| AppError::Database(e.to_string())),
            Backend::Memory(docs) => Ok(Self::count_memory(docs, collections::EVENTS, |doc| {
                doc.get("attendees")
                    .and_then(Value::as_array)
                    .is_some_and(|attendees| attendees.iter().any(|a| a.as_str() == Some(uid)))
            })),
            Backend::Offline => Err(Self::offline_error()),
        }
    }

    /// Number of events organized by `uid`.
    pub async fn count_events_organized(&self, uid: &str) -> Result<usize, AppError> {
        match &self.backend {
            Backend::Firestore(client) => client
                .fluent()
                .select()
                .from(collections::EVENTS)
                .filter(|q| q.for_all([q.field("organizerId").eq(uid)]))
                .query()
                .await
                .map(|docs| docs.len())
                .map_err(|e| AppError::Database(e.to_string())),
            Backend::Memory(docs) => Ok(Self::count_memory(docs, collections::EVENTS, |doc| {
                doc.get("organizerId").and_then(Value::as_str) == Some(uid)
            })),
            Backend::Offline => Err(Self::offline_error()),
        }
    }

    fn count_memory(
        docs: &DashMap<MemoryKey, Value>,
        collection: &str,
        matches: impl Fn(&Value) -> bool,
    ) -> usize {
        docs.iter()
            .filter(|doc| doc.key().0 == collection && matches(doc.value()))
            .count()
    }

    /// Create or replace a raw document. Used to seed bookings and events,
    /// which this service otherwise only reads.
    pub async fn put_document(
        &self,
        collection: &str,
        id: &str,
        document: Value,
    ) -> Result<(), AppError> {
        match &self.backend {
            Backend::Firestore(client) => {
                let _: () = client
                    .fluent()
                    .update()
                    .in_col(collection)
                    .document_id(id)
                    .object(&document)
                    .execute()
                    .await
                    .map_err(|e| AppError::Database(e.to_string()))?;
                Ok(())
            }
            Backend::Memory(docs) => {
                docs.insert(Self::memory_key(collection, id), document);
                Ok(())
            }
            Backend::Offline => Err(Self::offline_error()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MembershipType, Session};

    fn member(uid: &str, created_at: &str) -> Member {
        let session = Session {
            uid: uid.to_string(),
            display_name: Some(format!("User {}", uid)),
            email: Some(format!("{}@example.com", uid)),
            photo_url: None,
            id_token: String::new(),
            refresh_token: String::new(),
            expires_at: chrono::Utc::now(),
        };
        Member::from_session(&session, created_at.to_string())
    }

    #[tokio::test]
    async fn test_create_if_absent_never_overwrites() {
        let db = FirestoreDb::new_in_memory();
        let first = member("u1", "2026-01-01T00:00:00Z");
        let stored = db.create_member_if_absent(&first).await.unwrap();
        assert_eq!(stored, first);

        let mut second = member("u1", "2026-02-02T00:00:00Z");
        second.display_name = "Someone Else".to_string();
        let stored_again = db.create_member_if_absent(&second).await.unwrap();
        assert_eq!(stored_again, first);
        assert_eq!(db.get_member("u1").await.unwrap(), Some(first));
    }

    #[tokio::test]
    async fn test_update_fields_merges_only_listed_fields() {
        let db = FirestoreDb::new_in_memory();
        let original = member("u1", "2026-01-01T00:00:00Z");
        db.create_member_if_absent(&original).await.unwrap();

        let mut fields = Map::new();
        fields.insert("company".to_string(), Value::from("Acme"));
        db.update_member_fields("u1", fields).await.unwrap();

        let updated = db.get_member("u1").await.unwrap().unwrap();
        assert_eq!(updated.company, "Acme");
        assert_eq!(updated.display_name, original.display_name);
        assert_eq!(updated.membership_type, MembershipType::Member);
    }

    #[tokio::test]
    async fn test_update_missing_member_is_not_found() {
        let db = FirestoreDb::new_in_memory();
        let err = db.update_member_fields("ghost", Map::new()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_list_members_newest_first() {
        let db = FirestoreDb::new_in_memory();
        db.create_member_if_absent(&member("old", "2025-01-01T00:00:00Z"))
            .await
            .unwrap();
        db.create_member_if_absent(&member("new", "2026-06-01T00:00:00Z"))
            .await
            .unwrap();

        let uids: Vec<_> = db
            .list_members()
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.uid)
            .collect();
        assert_eq!(uids, vec!["new", "old"]);

        db.delete_member("old").await.unwrap();
        assert_eq!(db.list_members().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_counts_match_member_fields() {
        let db = FirestoreDb::new_in_memory();
        for (id, member_id) in [("b1", "u1"), ("b2", "u1"), ("b3", "u2")] {
            db.put_document(
                collections::BOOKINGS,
                id,
                serde_json::json!({ "memberId": member_id, "status": "confirmed" }),
            )
            .await
            .unwrap();
        }
        db.put_document(
            collections::EVENTS,
            "e1",
            serde_json::json!({ "organizerId": "u1", "attendees": ["u2", "u3"] }),
        )
        .await
        .unwrap();
        db.put_document(
            collections::EVENTS,
            "e2",
            serde_json::json!({ "organizerId": "u2", "attendees": ["u1"] }),
        )
        .await
        .unwrap();
        // No attendee list at all
        db.put_document(collections::EVENTS, "e3", serde_json::json!({ "organizerId": "u3" }))
            .await
            .unwrap();

        assert_eq!(db.count_member_bookings("u1").await.unwrap(), 2);
        assert_eq!(db.count_events_attended("u1").await.unwrap(), 1);
        assert_eq!(db.count_events_organized("u1").await.unwrap(), 1);
        assert_eq!(db.count_events_attended("u2").await.unwrap(), 1);
        assert_eq!(db.count_member_bookings("nobody").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_gated_reads_wait_until_opened() {
        let db = FirestoreDb::new_in_memory_gated();
        db.create_member_if_absent(&member("u1", "2026-01-01T00:00:00Z"))
            .await
            .unwrap();

        let reader = tokio::spawn({
            let db = db.clone();
            async move { db.get_member("u1").await }
        });
        tokio::task::yield_now().await;
        assert!(!reader.is_finished());

        db.open_reads();
        assert!(reader.await.unwrap().unwrap().is_some());
    }

    #[tokio::test]
    async fn test_offline_mock_fails() {
        let db = FirestoreDb::new_mock();
        assert!(matches!(
            db.get_member("u1").await,
            Err(AppError::Database(_))
        ));
        assert!(matches!(
            db.count_member_bookings("u1").await,
            Err(AppError::Database(_))
        ));
    }
}
