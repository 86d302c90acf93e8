// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Identity-Sync: keep application user records in step with Clerk
//!
//! This crate receives signed Clerk webhook deliveries and mirrors user
//! lifecycle events into the application's user store, with a read-through
//! fallback for records a missed delivery never created.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use services::{UserSynchronizer, WebhookVerifier};

/// Shared application state.
pub struct AppState {
    pub verifier: WebhookVerifier,
    pub synchronizer: UserSynchronizer,
}
