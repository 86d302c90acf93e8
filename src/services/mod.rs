// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod clerk;
pub mod signature;
pub mod sync;

pub use clerk::{ClerkClient, IdentityProvider};
pub use signature::{SignatureError, WebhookVerifier};
pub use sync::UserSynchronizer;
