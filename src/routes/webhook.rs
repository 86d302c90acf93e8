// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Webhook routes for Clerk user events.

use crate::error::{AppError, Result};
use crate::models::{NewUser, ProviderUser, UserPatch};
use crate::AppState;
use axum::{
    body::Bytes,
    extract::{Json, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const HEADER_ID: &str = "svix-id";
pub const HEADER_TIMESTAMP: &str = "svix-timestamp";
pub const HEADER_SIGNATURE: &str = "svix-signature";

/// Webhook routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/webhooks/clerk", post(handle_event))
}

/// The three Svix delivery headers.
struct DeliveryHeaders<'a> {
    id: &'a str,
    timestamp: &'a str,
    signature: &'a str,
}

impl<'a> DeliveryHeaders<'a> {
    fn from_headers(headers: &'a HeaderMap) -> Result<Self> {
        let get = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        };

        let (id, timestamp, signature) = (
            get(HEADER_ID),
            get(HEADER_TIMESTAMP),
            get(HEADER_SIGNATURE),
        );

        match (id, timestamp, signature) {
            (Some(id), Some(timestamp), Some(signature)) => Ok(Self {
                id,
                timestamp,
                signature,
            }),
            _ => {
                let missing: Vec<&str> = [
                    (HEADER_ID, id),
                    (HEADER_TIMESTAMP, timestamp),
                    (HEADER_SIGNATURE, signature),
                ]
                .into_iter()
                .filter(|(_, value)| value.is_none())
                .map(|(name, _)| name)
                .collect();
                Err(AppError::MissingHeaders(missing.join(", ")))
            }
        }
    }
}

/// Clerk event envelope.
#[derive(Deserialize, Debug)]
struct WebhookEvent {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    data: serde_json::Value,
}

/// Acknowledgment body.
#[derive(Serialize)]
struct Ack {
    message: &'static str,
}

fn ack(message: &'static str) -> Response {
    (StatusCode::OK, Json(Ack { message })).into_response()
}

fn parse_user(data: serde_json::Value) -> Result<ProviderUser> {
    serde_json::from_value(data)
        .map_err(|e| AppError::BadRequest(format!("invalid user payload: {}", e)))
}

/// Handle incoming webhook deliveries (POST).
///
/// The body is taken as raw bytes: the signature covers exactly what was sent.
async fn handle_event(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response> {
    let delivery = DeliveryHeaders::from_headers(&headers).inspect_err(|e| {
        tracing::warn!(error = %e, "Webhook delivery rejected");
    })?;

    state
        .verifier
        .verify(delivery.id, delivery.timestamp, delivery.signature, &body)
        .map_err(|e| AppError::InvalidSignature(format!("{} (delivery {})", e, delivery.id)))?;

    let event: WebhookEvent = serde_json::from_slice(&body).map_err(|e| {
        tracing::error!(delivery_id = delivery.id, error = %e, "Failed to parse webhook event");
        AppError::BadRequest(format!("invalid event envelope: {}", e))
    })?;

    tracing::info!(
        delivery_id = delivery.id,
        event_type = %event.event_type,
        "Webhook event verified"
    );

    let delivery_id = delivery.id.to_string();
    dispatch(&state, event).await.inspect_err(|e| {
        tracing::error!(
            delivery_id = %delivery_id,
            error = %e,
            will_retry = e.is_retryable(),
            "Webhook event handling failed"
        );
    })
}

async fn dispatch(state: &AppState, event: WebhookEvent) -> Result<Response> {
    match event.event_type.as_str() {
        "user.created" => {
            let user = parse_user(event.data)?;
            let new_user = NewUser::from_provider(&user)?;
            let record = state.synchronizer.create(new_user).await?;

            // Skip the write-back when a redelivery finds it already done.
            if user.linked_user_id() != Some(record.id.as_str()) {
                state.synchronizer.link_external_id(&record).await?;
            }

            Ok(ack("New user created"))
        }
        "user.updated" => {
            let user = parse_user(event.data)?;
            let patch = UserPatch::from_provider(&user);

            if state.synchronizer.update(&user.id, &patch).await?.is_none() {
                tracing::warn!(external_id = %user.id, "Update for unknown user ignored");
            }

            Ok(ack("User updated"))
        }
        "user.deleted" => {
            let user = parse_user(event.data)?;

            if state.synchronizer.delete(&user.id).await?.is_none() {
                tracing::info!(external_id = %user.id, "Delete for unknown user ignored");
            }

            Ok(ack("User deleted"))
        }
        other => {
            tracing::debug!(event_type = other, "Ignoring unhandled event type");
            Ok(StatusCode::OK.into_response())
        }
    }
}
