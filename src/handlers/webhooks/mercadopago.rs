//! MercadoPago webhook endpoint.
//!
//! MercadoPago notifications carry only a payment id; the authoritative
//! status comes from fetching the payment back from the API. Approved maps
//! to completed, rejected/cancelled to failed with a classified reason,
//! and in-flight statuses are acknowledged without touching the database
//! (MercadoPago notifies again on the final state).

use axum::{
    body::Bytes,
    extract::{RawQuery, State},
    http::HeaderMap,
    response::Response,
};
use serde_json::Value;

use crate::db::{queries, AppState};
use crate::payments::FailureReason;
use crate::util::extract_request_info;

use super::{ack, nack, reconcile, stamp_outcome, Resolution};

pub async fn handle_mercadopago_webhook(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let raw = String::from_utf8_lossy(&body).into_owned();
    let (ip, user_agent) = extract_request_info(&headers);
    tracing::info!("MercadoPago webhook received (ip={:?}, ua={:?})", ip, user_agent);

    let payload: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    let notification_type = payload
        .get("type")
        .and_then(Value::as_str)
        .map(String::from)
        .or_else(|| query_param(query.as_deref(), "type"));
    let data_id = payload
        .pointer("/data/id")
        .and_then(data_id_value)
        .or_else(|| query_param(query.as_deref(), "data.id"));

    // Raw payload is on record before any verification or processing.
    let log_id = log_delivery(&state, notification_type.as_deref(), data_id.as_deref(), &raw);

    let client = match state.gateways.mercadopago() {
        Some(c) => c,
        None => {
            tracing::error!("MercadoPago webhook received but MercadoPago is not configured");
            return nack("mercadopago not configured");
        }
    };

    let data_id = match data_id {
        Some(id) => id,
        None => {
            finish(&state, log_id.as_deref(), "missing_data_id");
            return nack("missing data.id");
        }
    };

    let x_signature = headers.get("x-signature").and_then(|v| v.to_str().ok());
    let x_request_id = headers.get("x-request-id").and_then(|v| v.to_str().ok());
    match client.verify_webhook_signature(&data_id, x_signature, x_request_id) {
        Ok(true) => {}
        Ok(false) => {
            tracing::warn!("MercadoPago webhook signature verification failed");
            finish(&state, log_id.as_deref(), "verification_failed");
            return nack("verification failed");
        }
        Err(e) => {
            tracing::error!("MercadoPago webhook verification error: {}", e);
            finish(&state, log_id.as_deref(), "verification_error");
            return nack("verification error");
        }
    }

    if notification_type.as_deref() != Some("payment") {
        tracing::debug!(
            "Ignoring MercadoPago notification type {:?}",
            notification_type
        );
        finish(&state, log_id.as_deref(), "ignored");
        return ack();
    }

    // The notification is just a pointer; fetch the payment for the truth.
    let payment = match client.get_payment(&data_id).await {
        Ok(p) => p,
        Err(e) => {
            tracing::error!("Could not fetch MercadoPago payment {}: {}", data_id, e);
            finish(&state, log_id.as_deref(), "fetch_error");
            return nack("payment fetch failed");
        }
    };

    let reference = match payment.external_reference.clone() {
        Some(r) => r,
        None => {
            tracing::error!("MercadoPago payment {} carries no external reference", data_id);
            finish(&state, log_id.as_deref(), "missing_reference");
            return nack("missing external reference");
        }
    };

    let resolution = match payment.status.as_str() {
        "approved" => Resolution::Completed {
            payment_id: Some(payment.id.clone()),
            amount_cents: payment.amount_cents,
        },
        "rejected" | "cancelled" => Resolution::Failed {
            reason: payment
                .status_detail
                .as_deref()
                .map(FailureReason::from_gateway_detail)
                .unwrap_or(FailureReason::Declined),
        },
        other => {
            // pending / in_process / authorized: a final notification follows.
            tracing::info!("MercadoPago payment {} still {}, waiting", data_id, other);
            finish(&state, log_id.as_deref(), "pending");
            return ack();
        }
    };

    match reconcile(&state, &reference, resolution, &raw).await {
        Ok(outcome) => {
            finish(&state, log_id.as_deref(), outcome);
            ack()
        }
        Err(e) => {
            tracing::error!("MercadoPago reconciliation for {} failed: {}", reference, e);
            finish(&state, log_id.as_deref(), "error");
            nack("reconciliation failed")
        }
    }
}

/// MercadoPago sends data.id as either a JSON string or a number.
fn data_id_value(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn query_param(query: Option<&str>, name: &str) -> Option<String> {
    let query = query?;
    for pair in query.split('&') {
        if let Some((k, v)) = pair.split_once('=') {
            if k == name {
                return Some(v.to_string());
            }
        }
    }
    None
}

fn log_delivery(
    state: &AppState,
    event_type: Option<&str>,
    data_id: Option<&str>,
    raw: &str,
) -> Option<String> {
    let conn = match state.db.get() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("Could not log MercadoPago webhook: {}", e);
            return None;
        }
    };
    match queries::insert_webhook_log(&conn, "mercadopago", event_type, data_id, raw) {
        Ok(id) => Some(id),
        Err(e) => {
            tracing::error!("Could not log MercadoPago webhook: {}", e);
            None
        }
    }
}

fn finish(state: &AppState, log_id: Option<&str>, outcome: &str) {
    if let Some(id) = log_id {
        stamp_outcome(state, id, outcome);
    }
}
