//! Database layer (Firestore, plus an in-memory store for local runs).

pub mod firestore;
pub mod memory;

pub use firestore::FirestoreUserStore;
pub use memory::MemoryUserStore;

use crate::error::AppError;
use crate::models::{UserPatch, UserRecord};
use async_trait::async_trait;

/// Collection names as constants.
pub mod collections {
    pub const USERS: &str = "users";
    /// One document per external id; its existence is the uniqueness claim.
    pub const USER_EXTERNAL_IDS: &str = "user_external_ids";
}

/// Persistence port for user records.
///
/// `Ok(None)` always means "nothing matched"; store failures are `Err`.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<Option<UserRecord>, AppError>;

    async fn find_by_external_id(&self, external_id: &str)
        -> Result<Option<UserRecord>, AppError>;

    /// Insert a new record.
    ///
    /// Returns `false` without writing if another record already holds
    /// `user.external_id`.
    async fn insert(&self, user: &UserRecord) -> Result<bool, AppError>;

    /// Write only the fields present in `patch` (plus `updated_at`).
    async fn update_profile(
        &self,
        id: &str,
        patch: &UserPatch,
    ) -> Result<Option<UserRecord>, AppError>;

    /// Remove a record and release its external id claim.
    async fn delete(&self, user: &UserRecord) -> Result<(), AppError>;

    /// Atomically add `delta` to `credit_balance`.
    async fn increment_credits(&self, id: &str, delta: i64)
        -> Result<Option<UserRecord>, AppError>;
}
