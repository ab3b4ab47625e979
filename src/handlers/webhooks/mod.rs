//! Gateway webhook endpoints.
//!
//! Both handlers follow the same discipline: log the raw payload first,
//! verify the delivery, resolve the external reference, then apply a
//! conditional status transition. Side effects (license grant, email) fire
//! only when the transition actually applied, so replays and concurrent
//! deliveries stay exactly-once.
//!
//! Response contract is plain text: `OK` with 200, or `Error: <msg>` with
//! 500 so the gateway redelivers.

pub mod mercadopago;
pub mod paypal;

pub use mercadopago::handle_mercadopago_webhook;
pub use paypal::handle_paypal_webhook;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Router,
};

use crate::db::{queries, AppState};
use crate::error::{AppError, Result};
use crate::models::{Order, OrderItem, TransitionOutcome};
use crate::orders;
use crate::payments::FailureReason;

pub fn router() -> Router<AppState> {
    // The /pages/* paths are the ones registered with the gateways; the
    // short aliases exist for new registrations.
    Router::new()
        .route("/pages/paypal_webhook", post(handle_paypal_webhook))
        .route("/pages/mercadopago_webhook", post(handle_mercadopago_webhook))
        .route("/webhook/paypal", post(handle_paypal_webhook))
        .route("/webhook/mercadopago", post(handle_mercadopago_webhook))
}

/// Acknowledge a delivery.
pub(crate) fn ack() -> Response {
    (StatusCode::OK, "OK").into_response()
}

/// Refuse a delivery so the gateway retries it.
pub(crate) fn nack(msg: &str) -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, format!("Error: {}", msg)).into_response()
}

/// What the webhook says happened to the transaction.
#[derive(Debug, Clone)]
pub enum Resolution {
    Completed {
        payment_id: Option<String>,
        /// Amount the gateway reports as captured, for mismatch logging.
        amount_cents: Option<i64>,
    },
    Failed {
        reason: FailureReason,
    },
}

/// Apply a webhook resolution to whatever the external reference points at.
///
/// `ORD-` references route to orders, `DON-` to donations. A reference that
/// matches neither prefix, or matches no row, is an anomaly: it is logged
/// and surfaced as an error so the delivery is answered 500 and retried,
/// since a payment may have been taken for something we cannot reconcile.
///
/// Returns a short outcome label for the webhook log.
pub async fn reconcile(
    state: &AppState,
    reference: &str,
    resolution: Resolution,
    raw_payload: &str,
) -> Result<&'static str> {
    if reference.starts_with("ORD-") {
        reconcile_order(state, reference, resolution).await
    } else if reference.starts_with("DON-") {
        reconcile_donation(state, reference, resolution, raw_payload).await
    } else {
        tracing::error!("Webhook reference with unrecognized prefix: {}", reference);
        Err(AppError::Anomaly(format!(
            "Unrecognized reference: {}",
            reference
        )))
    }
}

async fn reconcile_order(
    state: &AppState,
    order_number: &str,
    resolution: Resolution,
) -> Result<&'static str> {
    let mut conn = state.db.get()?;

    if queries::get_order_by_number(&conn, order_number)?.is_none() {
        tracing::error!("Webhook for unknown order: {}", order_number);
        return Err(AppError::Anomaly(format!(
            "No order matches reference {}",
            order_number
        )));
    }

    match resolution {
        Resolution::Completed {
            payment_id,
            amount_cents,
        } => {
            // Completion and license grants commit together: a failed grant
            // rolls the status transition back, so the gateway's redelivery
            // re-runs the whole thing instead of acking a license-less order.
            let tx = conn.transaction()?;
            let outcome =
                orders::mark_completed(&tx, order_number, payment_id.as_deref(), amount_cents)?;
            match outcome {
                TransitionOutcome::Applied => {
                    let order = queries::get_order_by_number(&tx, order_number)?.ok_or_else(
                        || AppError::Internal("Order vanished during reconciliation".into()),
                    )?;
                    let licenses = crate::licenses::grant_for_order(&tx, &order)?;
                    let items = queries::get_order_items(&tx, &order.id)?;
                    tx.commit()?;
                    tracing::info!(
                        "Order {} reconciled: {} licenses granted",
                        order_number,
                        licenses.len()
                    );
                    send_order_email(state, order, items);
                    Ok("completed")
                }
                TransitionOutcome::AlreadyApplied => Ok("already_completed"),
                TransitionOutcome::Rejected { current } => {
                    tracing::warn!(
                        "Order {} webhook wants completed but row is {}",
                        order_number,
                        current
                    );
                    Ok("rejected")
                }
                TransitionOutcome::NotFound => Err(AppError::Anomaly(format!(
                    "Order disappeared: {}",
                    order_number
                ))),
            }
        }
        Resolution::Failed { reason } => {
            let outcome = orders::mark_failed(&conn, order_number, reason.as_str())?;
            Ok(match outcome {
                TransitionOutcome::Applied => "failed",
                _ => "failed_noop",
            })
        }
    }
}

async fn reconcile_donation(
    state: &AppState,
    transaction_id: &str,
    resolution: Resolution,
    raw_payload: &str,
) -> Result<&'static str> {
    let conn = state.db.get()?;

    if queries::get_donation_by_transaction_id(&conn, transaction_id)?.is_none() {
        tracing::error!("Webhook for unknown donation: {}", transaction_id);
        return Err(AppError::Anomaly(format!(
            "No donation matches reference {}",
            transaction_id
        )));
    }

    match resolution {
        Resolution::Completed {
            payment_id,
            amount_cents,
        } => {
            let outcome = queries::try_mark_donation_completed(
                &conn,
                transaction_id,
                payment_id.as_deref(),
                amount_cents,
                Some(raw_payload),
            )?;
            match outcome {
                TransitionOutcome::Applied => {
                    tracing::info!("Donation {} completed", transaction_id);
                    if let Some(donation) =
                        queries::get_donation_by_transaction_id(&conn, transaction_id)?
                    {
                        send_donation_email(state, &donation);
                    }
                    Ok("completed")
                }
                TransitionOutcome::AlreadyApplied => Ok("already_completed"),
                TransitionOutcome::Rejected { current } => {
                    tracing::warn!(
                        "Donation {} webhook wants completed but row is {}",
                        transaction_id,
                        current
                    );
                    Ok("rejected")
                }
                TransitionOutcome::NotFound => Err(AppError::Anomaly(format!(
                    "Donation disappeared: {}",
                    transaction_id
                ))),
            }
        }
        Resolution::Failed { .. } => {
            let outcome =
                queries::try_mark_donation_failed(&conn, transaction_id, Some(raw_payload))?;
            Ok(match outcome {
                TransitionOutcome::Applied => "failed",
                _ => "failed_noop",
            })
        }
    }
}

/// Fire the confirmation email without holding up the webhook response;
/// delivery failures are logged, never fatal.
pub(crate) fn send_order_email(state: &AppState, order: Order, items: Vec<OrderItem>) {
    let svc = state.email.clone();
    tokio::spawn(async move {
        if let Err(e) = svc.send_order_confirmation(&order, &items).await {
            tracing::error!("Confirmation email for {} failed: {}", order.order_number, e);
        }
    });
}

fn send_donation_email(state: &AppState, donation: &crate::models::Donation) {
    let email = match donation.donor_email.clone() {
        Some(e) => e,
        None => return,
    };
    let svc = state.email.clone();
    let amount = donation.final_amount_cents.unwrap_or(donation.amount_cents);
    let currency = donation.currency.clone();
    let name = donation.donor_name.clone();
    let reference = donation.transaction_id.clone();
    tokio::spawn(async move {
        if let Err(e) = svc
            .send_donation_thanks(&email, name.as_deref(), amount, &currency)
            .await
        {
            tracing::error!("Donation thanks email for {} failed: {}", reference, e);
        }
    });
}

/// Stamp the processing outcome on a webhook log row. Best effort.
pub(crate) fn stamp_outcome(state: &AppState, log_id: &str, outcome: &str) {
    match state.db.get() {
        Ok(conn) => {
            if let Err(e) = queries::set_webhook_log_outcome(&conn, log_id, outcome) {
                tracing::warn!("Failed to stamp webhook log {}: {}", log_id, e);
            }
        }
        Err(e) => tracing::warn!("Failed to stamp webhook log {}: {}", log_id, e),
    }
}
