// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use async_trait::async_trait;
use axum::body::Body;
use axum::http::Request;
use dashmap::DashMap;
use identity_sync::config::Config;
use identity_sync::db::{FirestoreUserStore, MemoryUserStore, UserStore};
use identity_sync::error::AppError;
use identity_sync::models::{ProviderUser, UserPatch, UserRecord};
use identity_sync::routes::create_router;
use identity_sync::services::{IdentityProvider, UserSynchronizer, WebhookVerifier};
use identity_sync::AppState;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a Firestore store pointed at the emulator.
#[allow(dead_code)]
pub fn test_firestore() -> FirestoreUserStore {
    FirestoreUserStore::new("test-project")
}

/// Unique external id for test isolation.
#[allow(dead_code)]
pub fn unique_external_id() -> String {
    format!("user_test_{}", uuid::Uuid::new_v4().simple())
}

/// In-memory Clerk stand-in.
#[allow(dead_code)]
#[derive(Default)]
pub struct FakeClerk {
    pub users: DashMap<String, ProviderUser>,
    /// external_id -> userId written to public metadata
    pub metadata: DashMap<String, String>,
    pub metadata_writes: AtomicUsize,
    pub fail_metadata: AtomicBool,
}

#[async_trait]
impl IdentityProvider for FakeClerk {
    async fn get_user(&self, external_id: &str) -> Result<Option<ProviderUser>, AppError> {
        Ok(self.users.get(external_id).map(|u| u.value().clone()))
    }

    async fn set_user_id_metadata(
        &self,
        external_id: &str,
        user_id: &str,
    ) -> Result<(), AppError> {
        if self.fail_metadata.load(Ordering::SeqCst) {
            return Err(AppError::IdentityProvider("HTTP 503: unavailable".to_string()));
        }
        self.metadata_writes.fetch_add(1, Ordering::SeqCst);
        self.metadata
            .insert(external_id.to_string(), user_id.to_string());
        Ok(())
    }
}

/// Store that fails every call and counts how often it was touched.
#[allow(dead_code)]
#[derive(Default)]
pub struct FailingStore {
    pub calls: AtomicUsize,
}

impl FailingStore {
    #[allow(dead_code)]
    fn fail<T>(&self) -> Result<T, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(AppError::Database("connection refused".to_string()))
    }
}

#[async_trait]
impl UserStore for FailingStore {
    async fn find_by_id(&self, _id: &str) -> Result<Option<UserRecord>, AppError> {
        self.fail()
    }

    async fn find_by_external_id(&self, _id: &str) -> Result<Option<UserRecord>, AppError> {
        self.fail()
    }

    async fn insert(&self, _user: &UserRecord) -> Result<bool, AppError> {
        self.fail()
    }

    async fn update_profile(
        &self,
        _id: &str,
        _patch: &UserPatch,
    ) -> Result<Option<UserRecord>, AppError> {
        self.fail()
    }

    async fn delete(&self, _user: &UserRecord) -> Result<(), AppError> {
        self.fail()
    }

    async fn increment_credits(
        &self,
        _id: &str,
        _delta: i64,
    ) -> Result<Option<UserRecord>, AppError> {
        self.fail()
    }
}

/// Test app handles.
#[allow(dead_code)]
pub struct TestApp {
    pub router: axum::Router,
    pub state: Arc<AppState>,
    pub store: MemoryUserStore,
    pub clerk: Arc<FakeClerk>,
}

fn build_state(store: Arc<dyn UserStore>, clerk: Arc<FakeClerk>) -> Arc<AppState> {
    let config = Config::test_default();
    let verifier = WebhookVerifier::new(&config.webhook_secret, config.webhook_tolerance_secs)
        .expect("test secret is valid");
    let synchronizer = UserSynchronizer::new(store, clerk, config.default_credit_balance);

    Arc::new(AppState {
        verifier,
        synchronizer,
    })
}

/// Create a test app backed by the in-memory store and a fake Clerk.
#[allow(dead_code)]
pub fn create_test_app() -> TestApp {
    let store = MemoryUserStore::new();
    let clerk = Arc::new(FakeClerk::default());
    let state = build_state(Arc::new(store.clone()), clerk.clone());

    TestApp {
        router: create_router(state.clone()),
        state,
        store,
        clerk,
    }
}

/// Create a test app whose store always fails.
#[allow(dead_code)]
pub fn create_failing_app() -> (axum::Router, Arc<AppState>, Arc<FailingStore>) {
    let store = Arc::new(FailingStore::default());
    let state = build_state(store.clone(), Arc::new(FakeClerk::default()));
    (create_router(state.clone()), state, store)
}

/// Build a correctly signed webhook delivery.
#[allow(dead_code)]
pub fn signed_request(state: &AppState, body: &str) -> Request<Body> {
    let timestamp = chrono::Utc::now().timestamp();
    let signature = state
        .verifier
        .sign("msg_test", timestamp, body.as_bytes());

    webhook_request(
        body,
        &[
            ("svix-id", "msg_test".to_string()),
            ("svix-timestamp", timestamp.to_string()),
            ("svix-signature", signature),
        ],
    )
}

/// Build a webhook delivery with arbitrary headers.
#[allow(dead_code)]
pub fn webhook_request(body: &str, headers: &[(&str, String)]) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/webhooks/clerk")
        .header("content-type", "application/json");
    for (name, value) in headers {
        builder = builder.header(*name, value.as_str());
    }
    builder.body(Body::from(body.to_string())).unwrap()
}
