//! Checkout preparation: cart validation against the live catalog and the
//! immutable snapshot consumed by order creation.
//!
//! Validation must run immediately before order creation. Cart-stored data
//! is never trusted for money computation; every line is re-fetched and
//! priced from the catalog here.

use rusqlite::Connection;
use serde::Serialize;

use crate::db::queries;
use crate::error::{AppError, Result};
use crate::models::CartTotals;

/// One price-verified line of a checkout snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotItem {
    pub product_id: String,
    pub product_name: String,
    pub image: Option<String>,
    pub price_cents: i64,
    pub quantity: i64,
    pub is_free: bool,
}

/// Immutable, price-verified representation of cart contents at the moment
/// of order creation.
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutSnapshot {
    pub items: Vec<SnapshotItem>,
    pub totals: CartTotals,
    /// False short-circuits the payment-gateway step entirely.
    pub requires_payment: bool,
    pub free_items: usize,
}

/// Re-validate every cart line against the live catalog.
///
/// Collects all failure reasons rather than stopping at the first, so the
/// user sees everything wrong with their cart at once.
pub fn validate(conn: &Connection, session_id: &str) -> Result<()> {
    let lines = queries::get_cart_lines(conn, session_id)?;
    if lines.is_empty() {
        return Err(AppError::BadRequest("Cart is empty".into()));
    }

    let mut reasons = Vec::new();
    for line in &lines {
        if !line.is_active {
            reasons.push(format!("'{}' is no longer available", line.product_name));
        }
        if line.is_free && line.unit_price_cents > 0 {
            // Free flag disagrees with the stored price; the catalog entry
            // is inconsistent and must not be sold until fixed.
            reasons.push(format!(
                "'{}' has inconsistent pricing",
                line.product_name
            ));
        }
        if !(1..=crate::cart::MAX_QUANTITY).contains(&line.quantity) {
            reasons.push(format!(
                "'{}' has an invalid quantity",
                line.product_name
            ));
        }
    }

    // Cart lines referencing deleted products are dropped by the join;
    // detect the mismatch by comparing counts.
    let raw_count = queries::get_cart_items(conn, session_id)?.len();
    if raw_count != lines.len() {
        reasons.push("Cart contains products that no longer exist".into());
    }

    if reasons.is_empty() {
        Ok(())
    } else {
        Err(AppError::CartInvalid { reasons })
    }
}

/// Produce the immutable checkout snapshot. Call only after `validate`.
pub fn prepare(conn: &Connection, session_id: &str, tax_rate_bps: i64) -> Result<CheckoutSnapshot> {
    let lines = queries::get_cart_lines(conn, session_id)?;
    if lines.is_empty() {
        return Err(AppError::BadRequest("Cart is empty".into()));
    }

    let items: Vec<SnapshotItem> = lines
        .iter()
        .map(|l| SnapshotItem {
            product_id: l.product_id.clone(),
            product_name: l.product_name.clone(),
            image: l.image.clone(),
            price_cents: if l.is_free { 0 } else { l.unit_price_cents },
            quantity: l.quantity,
            is_free: l.is_free,
        })
        .collect();

    let items_count: i64 = items.iter().map(|i| i.quantity).sum();
    let subtotal_cents: i64 = items.iter().map(|i| i.price_cents * i.quantity).sum();
    let totals = CartTotals::from_subtotal(items_count, subtotal_cents, tax_rate_bps);
    let free_items = items.iter().filter(|i| i.is_free).count();

    Ok(CheckoutSnapshot {
        requires_payment: totals.total_cents > 0,
        free_items,
        items,
        totals,
    })
}
