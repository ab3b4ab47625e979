//! PayPal webhook endpoint.
//!
//! Only `CHECKOUT.ORDER.APPROVED` is acted on: approval means the buyer
//! authorized payment but no money has moved, so the handler attempts the
//! capture itself and completes the transaction on a successful capture.
//! Every other event type is acknowledged with no database writes.

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::Response,
};
use serde_json::Value;

use crate::db::{queries, AppState};
use crate::error::AppError;
use crate::util::extract_request_info;

use super::{ack, nack, reconcile, stamp_outcome, Resolution};

pub async fn handle_paypal_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let raw = String::from_utf8_lossy(&body).into_owned();
    let (ip, user_agent) = extract_request_info(&headers);
    tracing::info!("PayPal webhook received (ip={:?}, ua={:?})", ip, user_agent);

    let payload: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            log_delivery(&state, None, None, &raw);
            tracing::error!("Malformed PayPal webhook payload: {}", e);
            return nack("invalid payload");
        }
    };

    let event_type = payload
        .get("event_type")
        .and_then(Value::as_str)
        .map(String::from);
    let paypal_order_id = payload
        .pointer("/resource/id")
        .and_then(Value::as_str)
        .map(String::from);
    let reference = payload
        .pointer("/resource/purchase_units/0/reference_id")
        .and_then(Value::as_str)
        .map(String::from);

    // Raw payload is on record before any verification or processing.
    let log_id = log_delivery(&state, event_type.as_deref(), reference.as_deref(), &raw);

    let client = match state.gateways.paypal() {
        Some(c) => c,
        None => {
            tracing::error!("PayPal webhook received but PayPal is not configured");
            return nack("paypal not configured");
        }
    };

    match client.verify_webhook_signature(&body, &headers).await {
        Ok(true) => {}
        Ok(false) => {
            tracing::warn!("PayPal webhook signature verification failed");
            finish(&state, log_id.as_deref(), "verification_failed");
            return nack("verification failed");
        }
        Err(e) => {
            tracing::error!("PayPal webhook verification error: {}", e);
            finish(&state, log_id.as_deref(), "verification_error");
            return nack("verification error");
        }
    }

    let event_type = event_type.unwrap_or_default();
    if event_type != "CHECKOUT.ORDER.APPROVED" {
        tracing::debug!("Ignoring PayPal event type {}", event_type);
        finish(&state, log_id.as_deref(), "ignored");
        return ack();
    }

    let paypal_order_id = match paypal_order_id {
        Some(id) => id,
        None => {
            finish(&state, log_id.as_deref(), "missing_resource_id");
            return nack("missing resource id");
        }
    };
    let reference = match reference {
        Some(r) => r,
        None => {
            finish(&state, log_id.as_deref(), "missing_reference");
            return nack("missing reference");
        }
    };

    // Approval is not payment; capture now and complete only on success.
    let resolution = match client.capture_order(&paypal_order_id).await {
        Ok(captured) if captured.completed => Resolution::Completed {
            payment_id: Some(paypal_order_id),
            amount_cents: captured.amount_cents,
        },
        Ok(_) => {
            // Capture accepted but not final; let PayPal redeliver.
            tracing::info!("Capture for {} not yet complete", reference);
            finish(&state, log_id.as_deref(), "capture_pending");
            return nack("capture pending");
        }
        Err(AppError::Gateway { reason, message })
            if !reason.is_retryable() =>
        {
            tracing::warn!("Capture for {} declined: {} ({})", reference, message, reason);
            Resolution::Failed { reason }
        }
        Err(e) => {
            tracing::error!("Capture for {} errored: {}", reference, e);
            finish(&state, log_id.as_deref(), "capture_error");
            return nack("capture failed");
        }
    };

    match reconcile(&state, &reference, resolution, &raw).await {
        Ok(outcome) => {
            finish(&state, log_id.as_deref(), outcome);
            ack()
        }
        Err(e) => {
            tracing::error!("PayPal reconciliation for {} failed: {}", reference, e);
            finish(&state, log_id.as_deref(), "error");
            nack("reconciliation failed")
        }
    }
}

fn log_delivery(
    state: &AppState,
    event_type: Option<&str>,
    reference: Option<&str>,
    raw: &str,
) -> Option<String> {
    let conn = match state.db.get() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("Could not log PayPal webhook: {}", e);
            return None;
        }
    };
    match queries::insert_webhook_log(&conn, "paypal", event_type, reference, raw) {
        Ok(id) => Some(id),
        Err(e) => {
            tracing::error!("Could not log PayPal webhook: {}", e);
            None
        }
    }
}

fn finish(state: &AppState, log_id: Option<&str>, outcome: &str) {
    if let Some(id) = log_id {
        stamp_outcome(state, id, outcome);
    }
}
