//! Process-local user store.
//!
//! Used for local development (`USER_STORE=memory`) and offline tests. Holds
//! the same uniqueness guarantee as Firestore: the external id index entry is
//! claimed atomically before the record is written.

use crate::db::UserStore;
use crate::error::AppError;
use crate::models::{UserPatch, UserRecord};
use crate::time_utils::now_rfc3339;
use async_trait::async_trait;
use dashmap::{mapref::entry::Entry, DashMap};
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct MemoryUserStore {
    users: Arc<DashMap<String, UserRecord>>,
    /// external_id -> id
    external_ids: Arc<DashMap<String, String>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_id(&self, id: &str) -> Result<Option<UserRecord>, AppError> {
        Ok(self.users.get(id).map(|u| u.value().clone()))
    }

    async fn find_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<UserRecord>, AppError> {
        let Some(id) = self.external_ids.get(external_id).map(|e| e.value().clone()) else {
            return Ok(None);
        };
        self.find_by_id(&id).await
    }

    async fn insert(&self, user: &UserRecord) -> Result<bool, AppError> {
        match self.external_ids.entry(user.external_id.clone()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                self.users.insert(user.id.clone(), user.clone());
                slot.insert(user.id.clone());
                Ok(true)
            }
        }
    }

    async fn update_profile(
        &self,
        id: &str,
        patch: &UserPatch,
    ) -> Result<Option<UserRecord>, AppError> {
        Ok(self.users.get_mut(id).map(|mut user| {
            patch.apply(&mut user, &now_rfc3339());
            user.clone()
        }))
    }

    async fn delete(&self, user: &UserRecord) -> Result<(), AppError> {
        self.users.remove(&user.id);
        self.external_ids
            .remove_if(&user.external_id, |_, id| *id == user.id);
        Ok(())
    }

    async fn increment_credits(
        &self,
        id: &str,
        delta: i64,
    ) -> Result<Option<UserRecord>, AppError> {
        Ok(self.users.get_mut(id).map(|mut user| {
            user.credit_balance += delta;
            user.clone()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewUser;

    fn record(external_id: &str) -> UserRecord {
        UserRecord::from_new(
            NewUser {
                external_id: external_id.to_string(),
                email: "a@b.com".to_string(),
                username: "a".to_string(),
                first_name: String::new(),
                last_name: String::new(),
                photo_url: String::new(),
            },
            10,
            "2024-01-01T00:00:00Z",
        )
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicate_external_id() {
        let store = MemoryUserStore::new();

        assert!(store.insert(&record("ext_1")).await.unwrap());
        assert!(!store.insert(&record("ext_1")).await.unwrap());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_releases_external_id() {
        let store = MemoryUserStore::new();
        let user = record("ext_1");
        store.insert(&user).await.unwrap();

        store.delete(&user).await.unwrap();

        assert!(store.find_by_external_id("ext_1").await.unwrap().is_none());
        assert!(store.is_empty());
        assert!(store.insert(&record("ext_1")).await.unwrap());
    }

    #[tokio::test]
    async fn test_concurrent_increments_are_not_lost() {
        let store = MemoryUserStore::new();
        let user = record("ext_1");
        store.insert(&user).await.unwrap();

        let handles: Vec<_> = (0..50)
            .map(|_| {
                let store = store.clone();
                let id = user.id.clone();
                tokio::spawn(async move { store.increment_credits(&id, 1).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let stored = store.find_by_id(&user.id).await.unwrap().unwrap();
        assert_eq!(stored.credit_balance, 60);
    }
}
