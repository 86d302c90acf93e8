// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Clerk Backend API client.
//!
//! Handles:
//! - User profile lookup (read-through fallback)
//! - Public metadata write-back of the local record id

use crate::error::AppError;
use crate::models::ProviderUser;
use async_trait::async_trait;
use serde::Serialize;

/// The identity provider, as seen by the synchronizer.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Fetch a user's canonical profile. `Ok(None)` if the provider has no
    /// such user.
    async fn get_user(&self, external_id: &str) -> Result<Option<ProviderUser>, AppError>;

    /// Set `userId` in the user's public metadata.
    async fn set_user_id_metadata(&self, external_id: &str, user_id: &str)
        -> Result<(), AppError>;
}

/// Clerk API client.
#[derive(Clone)]
pub struct ClerkClient {
    http: reqwest::Client,
    base_url: String,
    secret_key: String,
}

#[derive(Serialize)]
struct MetadataUpdate<'a> {
    public_metadata: PublicMetadata<'a>,
}

#[derive(Serialize)]
struct PublicMetadata<'a> {
    #[serde(rename = "userId")]
    user_id: &'a str,
}

impl ClerkClient {
    /// Create a new Clerk client. `base_url` includes the API version,
    /// e.g. `https://api.clerk.com/v1`.
    pub fn new(base_url: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            secret_key: secret_key.into(),
        }
    }

    fn user_url(&self, external_id: &str) -> String {
        format!(
            "{}/users/{}",
            self.base_url,
            urlencoding::encode(external_id)
        )
    }

    /// Return an error for any non-success status.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, AppError> {
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if status.as_u16() == 429 {
            tracing::warn!("Clerk rate limit hit (429)");
        }

        Err(AppError::IdentityProvider(format!(
            "HTTP {}: {}",
            status, body
        )))
    }
}

#[async_trait]
impl IdentityProvider for ClerkClient {
    async fn get_user(&self, external_id: &str) -> Result<Option<ProviderUser>, AppError> {
        let response = self
            .http
            .get(self.user_url(external_id))
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|e| AppError::IdentityProvider(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            tracing::debug!(external_id, "Clerk user not found");
            return Ok(None);
        }

        let user = Self::check_response(response)
            .await?
            .json()
            .await
            .map_err(|e| AppError::IdentityProvider(format!("JSON parse error: {}", e)))?;

        Ok(Some(user))
    }

    async fn set_user_id_metadata(
        &self,
        external_id: &str,
        user_id: &str,
    ) -> Result<(), AppError> {
        let body = MetadataUpdate {
            public_metadata: PublicMetadata { user_id },
        };

        let response = self
            .http
            .patch(format!("{}/metadata", self.user_url(external_id)))
            .bearer_auth(&self.secret_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::IdentityProvider(format!("Metadata update failed: {}", e)))?;

        Self::check_response(response).await?;
        tracing::debug!(external_id, user_id, "Clerk public metadata updated");
        Ok(())
    }
}
