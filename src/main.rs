// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Identity-Sync API Server
//!
//! Receives Clerk webhook deliveries and keeps the user store in step.

use identity_sync::{
    config::{Config, StoreBackend},
    db::{FirestoreUserStore, MemoryUserStore, UserStore},
    services::{ClerkClient, UserSynchronizer, WebhookVerifier},
    AppState,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging for GCP
    init_logging();

    // Load configuration from environment; a missing signing secret stops here.
    let config = Config::from_env()?;
    tracing::info!(port = config.port, "Starting Identity-Sync API");

    let verifier = WebhookVerifier::new(&config.webhook_secret, config.webhook_tolerance_secs)?;

    // Firestore connects lazily on first use.
    let store: Arc<dyn UserStore> = match config.store_backend {
        StoreBackend::Firestore => {
            tracing::info!(project = %config.gcp_project_id, "Using Firestore user store");
            Arc::new(FirestoreUserStore::new(config.gcp_project_id.clone()))
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory user store; records will not persist");
            Arc::new(MemoryUserStore::new())
        }
    };

    let clerk = Arc::new(ClerkClient::new(
        config.clerk_api_url.clone(),
        config.clerk_secret_key.clone(),
    ));
    tracing::info!(api_url = %config.clerk_api_url, "Clerk client initialized");

    let synchronizer = UserSynchronizer::new(store, clerk, config.default_credit_balance);

    // Build shared state
    let state = Arc::new(AppState {
        verifier,
        synchronizer,
    });

    // Build router
    let app = identity_sync::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("identity_sync=debug,info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(format)
        .init();
}
