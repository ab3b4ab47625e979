//! Row mapping trait and helpers for reducing boilerplate in queries.

use rusqlite::{Connection, OptionalExtension, Row, ToSql};

use crate::models::*;

/// Parse a string column into an enum type, converting parse errors to
/// rusqlite errors instead of panicking on corrupted data.
fn parse_enum<T: std::str::FromStr>(row: &Row, col: usize, col_name: &str) -> rusqlite::Result<T> {
    row.get::<_, String>(col)?.parse::<T>().map_err(|_| {
        rusqlite::Error::InvalidColumnType(col, col_name.to_string(), rusqlite::types::Type::Text)
    })
}

/// Trait for constructing a type from a database row.
pub trait FromRow: Sized {
    fn from_row(row: &Row) -> rusqlite::Result<Self>;
}

/// Query for a single optional result.
pub fn query_one<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Option<T>> {
    conn.query_row(sql, params, T::from_row)
        .optional()
        .map_err(Into::into)
}

/// Query for multiple results.
pub fn query_all<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, T::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ============ SQL SELECT Constants ============

pub const CATEGORY_COLS: &str = "id, name, slug, created_at";

pub const PRODUCT_COLS: &str = "id, category_id, name, slug, description, image, price_cents, currency, is_free, is_active, download_limit, updates_exp_days, created_at, updated_at";

pub const CART_ITEM_COLS: &str = "session_id, product_id, quantity, created_at, updated_at";

pub const ORDER_COLS: &str = "id, order_number, user_id, customer_name, customer_email, payment_method, payment_status, subtotal_cents, tax_cents, total_amount_cents, currency, payment_id, failure_reason, created_at, updated_at, completed_at";

pub const ORDER_ITEM_COLS: &str =
    "id, order_id, product_id, product_name, price_cents, quantity, is_free";

pub const LICENSE_COLS: &str = "id, user_id, customer_email, product_id, order_id, download_limit, downloads_used, updates_expires_at, is_active, created_at";

pub const DONATION_COLS: &str = "id, transaction_id, amount_cents, final_amount_cents, currency, payment_method, payment_status, donor_name, donor_email, donor_message, product_id, payment_id, webhook_received, webhook_data, created_at, updated_at";

pub const WEBHOOK_LOG_COLS: &str =
    "id, gateway, event_type, external_ref, payload, outcome, created_at";

// ============ FromRow Implementations ============

impl FromRow for Category {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Category {
            id: row.get(0)?,
            name: row.get(1)?,
            slug: row.get(2)?,
            created_at: row.get(3)?,
        })
    }
}

impl FromRow for Product {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Product {
            id: row.get(0)?,
            category_id: row.get(1)?,
            name: row.get(2)?,
            slug: row.get(3)?,
            description: row.get(4)?,
            image: row.get(5)?,
            price_cents: row.get(6)?,
            currency: row.get(7)?,
            is_free: row.get::<_, i64>(8)? != 0,
            is_active: row.get::<_, i64>(9)? != 0,
            download_limit: row.get(10)?,
            updates_exp_days: row.get(11)?,
            created_at: row.get(12)?,
            updated_at: row.get(13)?,
        })
    }
}

impl FromRow for CartItem {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(CartItem {
            session_id: row.get(0)?,
            product_id: row.get(1)?,
            quantity: row.get(2)?,
            created_at: row.get(3)?,
            updated_at: row.get(4)?,
        })
    }
}

impl FromRow for CartLine {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(CartLine {
            product_id: row.get(0)?,
            product_name: row.get(1)?,
            image: row.get(2)?,
            quantity: row.get(3)?,
            unit_price_cents: row.get(4)?,
            is_free: row.get::<_, i64>(5)? != 0,
            is_active: row.get::<_, i64>(6)? != 0,
        })
    }
}

impl FromRow for Order {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Order {
            id: row.get(0)?,
            order_number: row.get(1)?,
            user_id: row.get(2)?,
            customer_name: row.get(3)?,
            customer_email: row.get(4)?,
            payment_method: row.get(5)?,
            payment_status: parse_enum(row, 6, "payment_status")?,
            subtotal_cents: row.get(7)?,
            tax_cents: row.get(8)?,
            total_amount_cents: row.get(9)?,
            currency: row.get(10)?,
            payment_id: row.get(11)?,
            failure_reason: row.get(12)?,
            created_at: row.get(13)?,
            updated_at: row.get(14)?,
            completed_at: row.get(15)?,
        })
    }
}

impl FromRow for OrderItem {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(OrderItem {
            id: row.get(0)?,
            order_id: row.get(1)?,
            product_id: row.get(2)?,
            product_name: row.get(3)?,
            price_cents: row.get(4)?,
            quantity: row.get(5)?,
            is_free: row.get::<_, i64>(6)? != 0,
        })
    }
}

impl FromRow for UserLicense {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(UserLicense {
            id: row.get(0)?,
            user_id: row.get(1)?,
            customer_email: row.get(2)?,
            product_id: row.get(3)?,
            order_id: row.get(4)?,
            download_limit: row.get(5)?,
            downloads_used: row.get(6)?,
            updates_expires_at: row.get(7)?,
            is_active: row.get::<_, i64>(8)? != 0,
            created_at: row.get(9)?,
        })
    }
}

impl FromRow for Donation {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Donation {
            id: row.get(0)?,
            transaction_id: row.get(1)?,
            amount_cents: row.get(2)?,
            final_amount_cents: row.get(3)?,
            currency: row.get(4)?,
            payment_method: row.get(5)?,
            payment_status: parse_enum(row, 6, "payment_status")?,
            donor_name: row.get(7)?,
            donor_email: row.get(8)?,
            donor_message: row.get(9)?,
            product_id: row.get(10)?,
            payment_id: row.get(11)?,
            webhook_received: row.get::<_, i64>(12)? != 0,
            webhook_data: row.get(13)?,
            created_at: row.get(14)?,
            updated_at: row.get(15)?,
        })
    }
}

impl FromRow for WebhookLog {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(WebhookLog {
            id: row.get(0)?,
            gateway: row.get(1)?,
            event_type: row.get(2)?,
            external_ref: row.get(3)?,
            payload: row.get(4)?,
            outcome: row.get(5)?,
            created_at: row.get(6)?,
        })
    }
}
