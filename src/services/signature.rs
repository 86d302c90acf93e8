// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Svix webhook signature verification.
//!
//! Signed content is `{svix-id}.{svix-timestamp}.{raw body}`, MACed with
//! HMAC-SHA256 under the base64 key that follows the `whsec_` prefix. The
//! `svix-signature` header carries one or more space-separated `v1,<base64>`
//! entries; any one matching is enough.

use crate::config::ConfigError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::{SystemTime, UNIX_EPOCH};
use subtle::ConstantTimeEq;

// Type alias for HMAC-SHA256
type HmacSha256 = Hmac<Sha256>;

const SECRET_PREFIX: &str = "whsec_";
const SIGNATURE_VERSION: &str = "v1";

/// Why a delivery failed verification.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("timestamp is not a unix time: {0}")]
    InvalidTimestamp(String),

    #[error("timestamp outside tolerance")]
    TimestampOutOfTolerance,

    #[error("no v1 signature in header")]
    NoSignatures,

    #[error("no matching signature")]
    Mismatch,
}

/// Verifies Svix-signed deliveries with one signing secret.
#[derive(Clone)]
pub struct WebhookVerifier {
    key: Vec<u8>,
    tolerance_secs: u64,
}

impl std::fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookVerifier")
            .field("tolerance_secs", &self.tolerance_secs)
            .finish_non_exhaustive()
    }
}

impl WebhookVerifier {
    /// Build a verifier from a `whsec_...` secret.
    pub fn new(secret: &str, tolerance_secs: u64) -> Result<Self, ConfigError> {
        let encoded = secret.trim();
        let encoded = encoded.strip_prefix(SECRET_PREFIX).unwrap_or(encoded);

        let key = STANDARD.decode(encoded).map_err(|e| ConfigError::Invalid {
            name: "CLERK_WEBHOOK_SECRET",
            reason: format!("not valid base64: {}", e),
        })?;

        if key.is_empty() {
            return Err(ConfigError::Missing("CLERK_WEBHOOK_SECRET"));
        }

        Ok(Self {
            key,
            tolerance_secs,
        })
    }

    /// Verify a delivery against the current clock.
    pub fn verify(
        &self,
        msg_id: &str,
        timestamp: &str,
        signature_header: &str,
        body: &[u8],
    ) -> Result<(), SignatureError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or_default();
        self.verify_at(msg_id, timestamp, signature_header, body, now)
    }

    /// Verify a delivery as of `now` (unix seconds).
    pub fn verify_at(
        &self,
        msg_id: &str,
        timestamp: &str,
        signature_header: &str,
        body: &[u8],
        now: i64,
    ) -> Result<(), SignatureError> {
        let ts: i64 = timestamp
            .trim()
            .parse()
            .map_err(|_| SignatureError::InvalidTimestamp(timestamp.to_string()))?;

        if now.abs_diff(ts) > self.tolerance_secs {
            return Err(SignatureError::TimestampOutOfTolerance);
        }

        let expected = self.compute(msg_id, ts, body);

        let mut candidates = signature_header
            .split_whitespace()
            .filter_map(|entry| entry.split_once(','))
            .filter(|(version, _)| *version == SIGNATURE_VERSION)
            .peekable();

        if candidates.peek().is_none() {
            return Err(SignatureError::NoSignatures);
        }

        let matched = candidates.any(|(_, sig)| {
            STANDARD
                .decode(sig)
                .map(|provided| bool::from(provided.ct_eq(&expected)))
                .unwrap_or(false)
        });

        if matched {
            Ok(())
        } else {
            Err(SignatureError::Mismatch)
        }
    }

    /// Produce a `v1,<base64>` signature for a delivery.
    pub fn sign(&self, msg_id: &str, timestamp: i64, body: &[u8]) -> String {
        format!(
            "{},{}",
            SIGNATURE_VERSION,
            STANDARD.encode(self.compute(msg_id, timestamp, body))
        )
    }

    fn compute(&self, msg_id: &str, timestamp: i64, body: &[u8]) -> Vec<u8> {
        let mut mac =
            HmacSha256::new_from_slice(&self.key).expect("HMAC can take key of any size");
        mac.update(format!("{}.{}.", msg_id, timestamp).as_bytes());
        mac.update(body);
        mac.finalize().into_bytes().to_vec()
    }
}
