// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper with typed operations.
//!
//! Provides high-level operations for members: profile storage, their
//! encrypted OAuth tokens, and the last successful sync timestamp.

use crate::db::collections;
use crate::error::AppError;
use crate::models::Member;
use crate::services::sync::SyncRecorder;
use crate::time_utils::format_utc_rfc3339;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
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

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a mock Firestore client for testing (offline mode).
    ///
    /// All database operations will return an error if called.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    /// Helper to get the client or return an error if offline.
    fn get_client(&self) -> Result<&firestore::FirestoreDb, AppError> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Database("Database not connected (offline mode)".to_string()))
    }

    // ─── Member Operations ───────────────────────────────────────

    /// Get a member by their Open Humans project member ID.
    pub async fn get_member(&self, oh_id: &str) -> Result<Option<Member>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::MEMBERS)
            .obj()
            .one(oh_id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Create or update a member.
    pub async fn upsert_member(&self, member: &Member) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::MEMBERS)
            .document_id(&member.oh_id)
            .object(member)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// IDs of all members.
    pub async fn list_member_ids(&self) -> Result<Vec<String>, AppError> {
        let members: Vec<Member> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::MEMBERS)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(members.into_iter().map(|m| m.oh_id).collect())
    }

    /// Store the last successful sync time for a member.
    pub async fn set_last_updated(&self, oh_id: &str, at: DateTime<Utc>) -> Result<(), AppError> {
        let mut member = self
            .get_member(oh_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Member {}", oh_id)))?;

        member.last_updated = Some(format_utc_rfc3339(at));
        self.upsert_member(&member).await
    }
}

#[async_trait]
impl SyncRecorder for FirestoreDb {
    async fn record_success(&self, oh_id: &str, at: DateTime<Utc>) -> Result<(), AppError> {
        self.set_last_updated(oh_id, at).await
    }
}
