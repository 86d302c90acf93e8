// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore-backed user store.
//!
//! Documents:
//! - `users/{id}`: the user record
//! - `user_external_ids/{external_id}`: uniqueness claim pointing at `users/{id}`
//!
//! Both documents are created in one transaction with a must-not-exist
//! precondition, so Firestore itself rejects a second record for the same
//! external id and a claim never exists without its record.

use crate::db::{collections, UserStore};
use crate::error::AppError;
use crate::models::{UserPatch, UserRecord};
use crate::time_utils::now_rfc3339;
use async_trait::async_trait;
use firestore::errors::FirestoreError;
use firestore::FirestoreWritePrecondition;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Body of a `user_external_ids` claim document.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ExternalIdClaim {
    user_id: String,
}

/// Firestore user store with a lazily established, shared connection.
///
/// Clones share one connection; the first operation connects and every
/// later call reuses it.
#[derive(Clone)]
pub struct FirestoreUserStore {
    project_id: String,
    client: Arc<OnceCell<firestore::FirestoreDb>>,
}

impl FirestoreUserStore {
    /// Create a store handle. No connection is made until first use.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            client: Arc::new(OnceCell::new()),
        }
    }

    /// Get the shared client, connecting on first call.
    pub async fn client(&self) -> Result<&firestore::FirestoreDb, AppError> {
        self.client
            .get_or_try_init(|| connect(&self.project_id))
            .await
    }

    pub fn is_connected(&self) -> bool {
        self.client.initialized()
    }

    fn claim_doc_id(external_id: &str) -> String {
        urlencoding::encode(external_id).into_owned()
    }
}

/// Open a Firestore connection, using the emulator when configured.
async fn connect(project_id: &str) -> Result<firestore::FirestoreDb, AppError> {
    // If the emulator environment variable is set, use unauthenticated connection
    // to avoid local credential warnings and leakage.
    if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
        return connect_emulator(project_id).await;
    }

    let client = firestore::FirestoreDb::new(project_id)
        .await
        .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

    tracing::info!(project = project_id, "Connected to Firestore");
    Ok(client)
}

/// Create a Firestore client for the emulator with unauthenticated access.
async fn connect_emulator(project_id: &str) -> Result<firestore::FirestoreDb, AppError> {
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
    .map_err(|e| AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e)))?;

    tracing::info!(
        project = project_id,
        "Connected to Firestore (Emulator/Unauthenticated)"
    );
    Ok(client)
}

#[async_trait]
impl UserStore for FirestoreUserStore {
    async fn find_by_id(&self, id: &str) -> Result<Option<UserRecord>, AppError> {
        self.client()
            .await?
            .fluent()
            .select()
            .by_id_in(collections::USERS)
            .obj()
            .one(id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn find_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<UserRecord>, AppError> {
        let external_id = external_id.to_string();
        let users: Vec<UserRecord> = self
            .client()
            .await?
            .fluent()
            .select()
            .from(collections::USERS)
            .filter(move |q| q.field("external_id").eq(external_id.clone()))
            .limit(1)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(users.into_iter().next())
    }

    async fn insert(&self, user: &UserRecord) -> Result<bool, AppError> {
        let client = self.client().await?;
        let claim = ExternalIdClaim {
            user_id: user.id.clone(),
        };

        // Claim and record commit together or not at all.
        let mut transaction = client
            .begin_transaction()
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

        client
            .fluent()
            .update()
            .in_col(collections::USER_EXTERNAL_IDS)
            .precondition(FirestoreWritePrecondition::Exists(false))
            .document_id(Self::claim_doc_id(&user.external_id))
            .object(&claim)
            .add_to_transaction(&mut transaction)
            .map_err(|e| AppError::Database(e.to_string()))?;

        client
            .fluent()
            .update()
            .in_col(collections::USERS)
            .precondition(FirestoreWritePrecondition::Exists(false))
            .document_id(&user.id)
            .object(user)
            .add_to_transaction(&mut transaction)
            .map_err(|e| AppError::Database(e.to_string()))?;

        match transaction.commit().await {
            Ok(_) => {
                tracing::debug!(user_id = %user.id, external_id = %user.external_id, "User inserted");
                Ok(true)
            }
            Err(FirestoreError::DataConflictError(_)) => {
                tracing::debug!(external_id = %user.external_id, "External id already claimed");
                Ok(false)
            }
            Err(e) => Err(AppError::Database(format!("Failed to insert user: {}", e))),
        }
    }

    async fn update_profile(
        &self,
        id: &str,
        patch: &UserPatch,
    ) -> Result<Option<UserRecord>, AppError> {
        let Some(mut user) = self.find_by_id(id).await? else {
            return Ok(None);
        };

        patch.apply(&mut user, &now_rfc3339());

        // Field mask: a full-document write would clobber concurrent credit increments.
        let mut fields = patch.field_names();
        fields.push("updated_at");

        // Without the precondition a write racing a delete would recreate a partial document.
        let updated: Result<UserRecord, FirestoreError> = self
            .client()
            .await?
            .fluent()
            .update()
            .fields(fields)
            .in_col(collections::USERS)
            .precondition(FirestoreWritePrecondition::Exists(true))
            .document_id(id)
            .object(&user)
            .execute()
            .await;

        match updated {
            Ok(updated) => Ok(Some(updated)),
            Err(FirestoreError::DataNotFoundError(_)) => Ok(None),
            Err(e) => Err(AppError::Database(e.to_string())),
        }
    }

    async fn delete(&self, user: &UserRecord) -> Result<(), AppError> {
        let client = self.client().await?;

        let mut transaction = client
            .begin_transaction()
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

        client
            .fluent()
            .delete()
            .from(collections::USERS)
            .document_id(&user.id)
            .add_to_transaction(&mut transaction)
            .map_err(|e| AppError::Database(e.to_string()))?;

        client
            .fluent()
            .delete()
            .from(collections::USER_EXTERNAL_IDS)
            .document_id(Self::claim_doc_id(&user.external_id))
            .add_to_transaction(&mut transaction)
            .map_err(|e| AppError::Database(e.to_string()))?;

        transaction
            .commit()
            .await
            .map_err(|e| AppError::Database(format!("Failed to commit deletion: {}", e)))?;

        Ok(())
    }

    async fn increment_credits(
        &self,
        id: &str,
        delta: i64,
    ) -> Result<Option<UserRecord>, AppError> {
        let client = self.client().await?;
        let mut transaction = client
            .begin_transaction()
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

        client
            .fluent()
            .update()
            .in_col(collections::USERS)
            // An increment on a missing document would create it.
            .precondition(FirestoreWritePrecondition::Exists(true))
            .document_id(id)
            .transforms(|t| t.fields([t.field("credit_balance").increment(delta)]))
            .only_transform()
            .add_to_transaction(&mut transaction)
            .map_err(|e| {
                AppError::Database(format!("Failed to add increment to transaction: {}", e))
            })?;

        match transaction.commit().await {
            Ok(_) => self.find_by_id(id).await,
            Err(FirestoreError::DataNotFoundError(_)) => Ok(None),
            Err(e) => Err(AppError::Database(format!(
                "Credit increment commit failed: {}",
                e
            ))),
        }
    }
}
