//! Session-scoped cart operations.
//!
//! The session is an explicit parameter, never ambient state; a cart is
//! only visible to its own session id. Quantities are clamped to [1, 10]
//! rather than rejected, and prices are always read from the live catalog.

use rusqlite::Connection;

use crate::db::queries;
use crate::error::{AppError, Result};
use crate::models::CartTotals;

pub const MAX_QUANTITY: i64 = 10;

fn clamp_quantity(quantity: i64) -> i64 {
    quantity.clamp(1, MAX_QUANTITY)
}

/// Add a product to the cart, merging with an existing line.
pub fn add(conn: &Connection, session_id: &str, product_id: &str, quantity: i64) -> Result<()> {
    let product = queries::get_product_by_id(conn, product_id)?
        .ok_or_else(|| AppError::ProductUnavailable(format!("Product not found: {}", product_id)))?;
    if !product.is_active {
        return Err(AppError::ProductUnavailable(format!(
            "Product is not available: {}",
            product.name
        )));
    }
    queries::add_cart_item(conn, session_id, product_id, clamp_quantity(quantity))
}

/// Set a line's quantity. Zero or below removes the line.
pub fn update(conn: &Connection, session_id: &str, product_id: &str, quantity: i64) -> Result<()> {
    if quantity <= 0 {
        queries::remove_cart_item(conn, session_id, product_id)?;
        return Ok(());
    }
    let product = queries::get_product_by_id(conn, product_id)?
        .ok_or_else(|| AppError::ProductUnavailable(format!("Product not found: {}", product_id)))?;
    if !product.is_active {
        return Err(AppError::ProductUnavailable(format!(
            "Product is not available: {}",
            product.name
        )));
    }
    queries::set_cart_item(conn, session_id, product_id, clamp_quantity(quantity))
}

pub fn remove(conn: &Connection, session_id: &str, product_id: &str) -> Result<bool> {
    queries::remove_cart_item(conn, session_id, product_id)
}

pub fn clear(conn: &Connection, session_id: &str) -> Result<()> {
    queries::clear_cart(conn, session_id)
}

/// Compute totals from live catalog prices. Free items contribute zero;
/// a zero subtotal yields a zero total regardless of the tax rate.
pub fn totals(conn: &Connection, session_id: &str, tax_rate_bps: i64) -> Result<CartTotals> {
    let lines = queries::get_cart_lines(conn, session_id)?;
    let items_count: i64 = lines.iter().map(|l| l.quantity).sum();
    let subtotal_cents: i64 = lines.iter().map(|l| l.line_total_cents()).sum();
    Ok(CartTotals::from_subtotal(
        items_count,
        subtotal_cents,
        tax_rate_bps,
    ))
}
