//! Order lifecycle: creation from a checkout snapshot and conditional
//! status transitions.
//!
//! Transitions are single conditional UPDATE statements; under concurrent
//! webhook deliveries only the first writer wins and the second observes an
//! idempotent no-op. No locks are taken anywhere in this module.

use rusqlite::Connection;

use crate::checkout::CheckoutSnapshot;
use crate::db::queries;
use crate::error::{AppError, Result};
use crate::models::{Customer, Order, TransitionOutcome};

/// Create an order (status pending) plus its items atomically from a
/// price-verified snapshot.
///
/// The order number is collision-checked by the UNIQUE constraint; on a
/// collision the insert is retried once with a fresh number before giving
/// up with `OrderCreation`.
pub fn create_order(
    conn: &mut Connection,
    snapshot: &CheckoutSnapshot,
    customer: &Customer,
    payment_method: &str,
    currency: &str,
) -> Result<Order> {
    let items: Vec<(String, String, i64, i64, bool)> = snapshot
        .items
        .iter()
        .map(|i| {
            (
                i.product_id.clone(),
                i.product_name.clone(),
                i.price_cents,
                i.quantity,
                i.is_free,
            )
        })
        .collect();

    let mut last_err = None;
    for attempt in 0..2 {
        let order_number = queries::generate_reference("ORD");
        match queries::create_order_with_items(
            conn,
            &order_number,
            customer,
            payment_method,
            &snapshot.totals,
            currency,
            &items,
        ) {
            Ok(order) => {
                debug_assert_eq!(
                    order.total_amount_cents,
                    snapshot.totals.total_cents,
                    "order total must equal snapshot total"
                );
                return Ok(order);
            }
            Err(AppError::Database(e)) if is_constraint_violation(&e) => {
                tracing::warn!(
                    "Order number collision on attempt {}: {}",
                    attempt + 1,
                    order_number
                );
                last_err = Some(e);
            }
            Err(e) => return Err(e),
        }
    }

    Err(AppError::OrderCreation(format!(
        "Could not allocate a unique order number: {}",
        last_err.map(|e| e.to_string()).unwrap_or_default()
    )))
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err.sqlite_error_code(),
        Some(rusqlite::ErrorCode::ConstraintViolation)
    )
}

/// Mark an order completed. Idempotent: an already-completed order is a
/// successful no-op (duplicate webhook delivery); any transition other than
/// pending → completed is rejected and logged, never silently applied.
///
/// `final_amount_cents` is the amount the gateway reports as captured; a
/// mismatch against the stored total is logged for operator follow-up but
/// does not block completion.
pub fn mark_completed(
    conn: &Connection,
    order_number: &str,
    payment_id: Option<&str>,
    final_amount_cents: Option<i64>,
) -> Result<TransitionOutcome> {
    let outcome = queries::try_mark_order_completed(conn, order_number, payment_id)?;

    match &outcome {
        TransitionOutcome::Applied => {
            if let Some(captured) = final_amount_cents {
                if let Some(order) = queries::get_order_by_number(conn, order_number)? {
                    if order.total_amount_cents != captured {
                        tracing::warn!(
                            "Captured amount mismatch for {}: expected {} cents, gateway captured {}",
                            order_number,
                            order.total_amount_cents,
                            captured
                        );
                    }
                }
            }
            tracing::info!("Order {} completed (payment_id={:?})", order_number, payment_id);
            Ok(outcome)
        }
        TransitionOutcome::AlreadyApplied => {
            tracing::info!("Order {} already completed, no-op", order_number);
            Ok(outcome)
        }
        TransitionOutcome::Rejected { current } => {
            tracing::warn!(
                "Rejected transition {} -> completed for order {}",
                current,
                order_number
            );
            Ok(outcome)
        }
        TransitionOutcome::NotFound => Ok(outcome),
    }
}

/// Mark an order failed with a classified reason. Same CAS discipline.
pub fn mark_failed(conn: &Connection, order_number: &str, reason: &str) -> Result<TransitionOutcome> {
    let outcome = queries::try_mark_order_failed(conn, order_number, reason)?;
    if let TransitionOutcome::Rejected { current } = &outcome {
        tracing::warn!(
            "Rejected transition {} -> failed for order {}",
            current,
            order_number
        );
    }
    Ok(outcome)
}

/// Manual/admin-only path: completed → refunded. Deactivates the order's
/// licenses when the transition applies.
pub fn mark_refunded(conn: &Connection, order_number: &str) -> Result<TransitionOutcome> {
    let outcome = queries::try_mark_order_refunded(conn, order_number)?;
    if outcome == TransitionOutcome::Applied {
        if let Some(order) = queries::get_order_by_number(conn, order_number)? {
            let n = queries::deactivate_licenses_for_order(conn, &order.id)?;
            tracing::info!("Order {} refunded, {} licenses deactivated", order_number, n);
        }
    }
    Ok(outcome)
}
