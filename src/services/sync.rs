// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! User record synchronization between Clerk and the user store.
//!
//! Every operation re-reads or writes through the store; nothing is cached.
//! Results follow one convention: `Ok(Some(_))` on success, `Ok(None)` when
//! nothing matched, `Err(_)` when the store or Clerk failed.

use crate::db::UserStore;
use crate::error::AppError;
use crate::models::{NewUser, UserPatch, UserRecord};
use crate::services::clerk::IdentityProvider;
use crate::time_utils::now_rfc3339;
use std::sync::Arc;

/// Idempotent user record operations with a read-through fallback to Clerk.
#[derive(Clone)]
pub struct UserSynchronizer {
    store: Arc<dyn UserStore>,
    provider: Arc<dyn IdentityProvider>,
    default_credit_balance: i64,
}

impl UserSynchronizer {
    pub fn new(
        store: Arc<dyn UserStore>,
        provider: Arc<dyn IdentityProvider>,
        default_credit_balance: i64,
    ) -> Self {
        Self {
            store,
            provider,
            default_credit_balance,
        }
    }

    /// Create a record, or return the existing one for the same external id.
    pub async fn create(&self, new_user: NewUser) -> Result<UserRecord, AppError> {
        if let Some(existing) = self.store.find_by_external_id(&new_user.external_id).await? {
            tracing::info!(
                external_id = %existing.external_id,
                user_id = %existing.id,
                "User already exists"
            );
            return Ok(existing);
        }

        let external_id = new_user.external_id.clone();
        let record = UserRecord::from_new(new_user, self.default_credit_balance, &now_rfc3339());

        if self.store.insert(&record).await? {
            tracing::info!(external_id = %external_id, user_id = %record.id, "User created");
            return Ok(record);
        }

        // Lost a race with a concurrent create; the store kept the winner.
        tracing::info!(external_id = %external_id, "Concurrent create absorbed");
        self.store
            .find_by_external_id(&external_id)
            .await?
            .ok_or_else(|| {
                AppError::Internal(anyhow::anyhow!(
                    "external id {} is claimed but has no record",
                    external_id
                ))
            })
    }

    /// Plain local read by internal id.
    pub async fn get_by_id(&self, id: &str) -> Result<Option<UserRecord>, AppError> {
        self.store.find_by_id(id).await
    }

    /// Read by external id, materializing the record from Clerk on a local miss.
    pub async fn get_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<UserRecord>, AppError> {
        if let Some(user) = self.store.find_by_external_id(external_id).await? {
            return Ok(Some(user));
        }

        let Some(profile) = self.provider.get_user(external_id).await? else {
            tracing::warn!(external_id, "User not found locally or in Clerk");
            return Ok(None);
        };

        tracing::info!(external_id, "User missing locally; creating from Clerk profile");

        let new_user = NewUser::from_provider(&profile).map_err(|e| {
            AppError::IdentityProvider(format!("Clerk profile unusable: {}", e))
        })?;
        let user = self.create(new_user).await?;

        if profile.linked_user_id() != Some(user.id.as_str()) {
            self.link_external_id(&user).await?;
        }

        tracing::info!(external_id, user_id = %user.id, "User created via fallback");
        Ok(Some(user))
    }

    /// Apply a partial update. Empty patches write nothing.
    pub async fn update(
        &self,
        external_id: &str,
        patch: &UserPatch,
    ) -> Result<Option<UserRecord>, AppError> {
        let Some(user) = self.store.find_by_external_id(external_id).await? else {
            tracing::info!(external_id, "User update skipped: not found");
            return Ok(None);
        };

        if patch.is_empty() {
            return Ok(Some(user));
        }

        let updated = self.store.update_profile(&user.id, patch).await?;
        if updated.is_some() {
            tracing::info!(
                external_id,
                user_id = %user.id,
                fields = ?patch.field_names(),
                "User updated"
            );
        }
        Ok(updated)
    }

    /// Delete by external id, returning the removed record.
    pub async fn delete(&self, external_id: &str) -> Result<Option<UserRecord>, AppError> {
        let Some(user) = self.store.find_by_external_id(external_id).await? else {
            tracing::info!(external_id, "User delete skipped: not found");
            return Ok(None);
        };

        self.store.delete(&user).await?;
        tracing::info!(external_id, user_id = %user.id, "User deleted");
        Ok(Some(user))
    }

    /// Atomically add `delta` (may be negative) to a record's credit balance.
    pub async fn adjust_credits(
        &self,
        id: &str,
        delta: i64,
    ) -> Result<Option<UserRecord>, AppError> {
        let updated = self.store.increment_credits(id, delta).await?;
        match &updated {
            Some(user) => tracing::info!(
                user_id = id,
                delta,
                credit_balance = user.credit_balance,
                "Credits adjusted"
            ),
            None => tracing::info!(user_id = id, "Credit adjustment skipped: not found"),
        }
        Ok(updated)
    }

    /// Write the record id into Clerk's public metadata.
    pub async fn link_external_id(&self, user: &UserRecord) -> Result<(), AppError> {
        self.provider
            .set_user_id_metadata(&user.external_id, &user.id)
            .await
    }
}
