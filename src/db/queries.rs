use chrono::Utc;
use rand::Rng;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::*;

use super::from_row::{
    query_all, query_one, CART_ITEM_COLS, CATEGORY_COLS, DONATION_COLS, LICENSE_COLS, ORDER_COLS,
    ORDER_ITEM_COLS, PRODUCT_COLS,
};

fn now() -> i64 {
    Utc::now().timestamp()
}

fn gen_id() -> String {
    Uuid::new_v4().to_string()
}

/// Generate a human-readable reference like `ORD-20260115-4F7A2C`.
///
/// Uniqueness is enforced by the DB constraint; callers retry once with a
/// fresh number on collision.
pub fn generate_reference(prefix: &str) -> String {
    const CHARSET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
    let mut rng = rand::thread_rng();
    let suffix: String = (0..6)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect();
    format!("{}-{}-{}", prefix, Utc::now().format("%Y%m%d"), suffix)
}

// ============ Catalog ============

pub fn create_category(conn: &Connection, input: &CreateCategory) -> Result<Category> {
    let id = gen_id();
    let now = now();
    conn.execute(
        "INSERT INTO categories (id, name, slug, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![&id, &input.name, &input.slug, now],
    )?;
    Ok(Category {
        id,
        name: input.name.clone(),
        slug: input.slug.clone(),
        created_at: now,
    })
}

pub fn list_categories(conn: &Connection) -> Result<Vec<Category>> {
    query_all(
        conn,
        &format!("SELECT {} FROM categories ORDER BY name", CATEGORY_COLS),
        &[],
    )
}

pub fn create_product(conn: &Connection, input: &CreateProduct) -> Result<Product> {
    let id = gen_id();
    let now = now();
    conn.execute(
        "INSERT INTO products (id, category_id, name, slug, description, image, price_cents,
                               currency, is_free, is_active, download_limit, updates_exp_days,
                               created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 1, ?10, ?11, ?12, ?12)",
        params![
            &id,
            &input.category_id,
            &input.name,
            &input.slug,
            &input.description,
            &input.image,
            input.price_cents,
            &input.currency,
            input.is_free as i64,
            input.download_limit,
            input.updates_exp_days,
            now,
        ],
    )?;
    get_product_by_id(conn, &id)?
        .ok_or_else(|| AppError::Internal("Product vanished after insert".into()))
}

pub fn get_product_by_id(conn: &Connection, id: &str) -> Result<Option<Product>> {
    query_one(
        conn,
        &format!("SELECT {} FROM products WHERE id = ?1", PRODUCT_COLS),
        &[&id],
    )
}

pub fn list_active_products(conn: &Connection) -> Result<Vec<Product>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM products WHERE is_active = 1 ORDER BY name",
            PRODUCT_COLS
        ),
        &[],
    )
}

pub fn set_product_active(conn: &Connection, id: &str, active: bool) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE products SET is_active = ?1, updated_at = ?2 WHERE id = ?3",
        params![active as i64, now(), id],
    )?;
    Ok(affected > 0)
}

pub fn set_product_price(conn: &Connection, id: &str, price_cents: i64) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE products SET price_cents = ?1, updated_at = ?2 WHERE id = ?3",
        params![price_cents, now(), id],
    )?;
    Ok(affected > 0)
}

// ============ Cart ============

/// Merge a quantity into an existing cart line, clamping the result to 10.
pub fn add_cart_item(
    conn: &Connection,
    session_id: &str,
    product_id: &str,
    quantity: i64,
) -> Result<()> {
    let now = now();
    conn.execute(
        "INSERT INTO cart_items (session_id, product_id, quantity, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?4)
         ON CONFLICT(session_id, product_id)
         DO UPDATE SET quantity = MIN(10, quantity + excluded.quantity), updated_at = ?4",
        params![session_id, product_id, quantity, now],
    )?;
    Ok(())
}

/// Replace a cart line's quantity.
pub fn set_cart_item(
    conn: &Connection,
    session_id: &str,
    product_id: &str,
    quantity: i64,
) -> Result<()> {
    let now = now();
    conn.execute(
        "INSERT INTO cart_items (session_id, product_id, quantity, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?4)
         ON CONFLICT(session_id, product_id)
         DO UPDATE SET quantity = excluded.quantity, updated_at = ?4",
        params![session_id, product_id, quantity, now],
    )?;
    Ok(())
}

pub fn remove_cart_item(conn: &Connection, session_id: &str, product_id: &str) -> Result<bool> {
    let affected = conn.execute(
        "DELETE FROM cart_items WHERE session_id = ?1 AND product_id = ?2",
        params![session_id, product_id],
    )?;
    Ok(affected > 0)
}

pub fn clear_cart(conn: &Connection, session_id: &str) -> Result<()> {
    conn.execute(
        "DELETE FROM cart_items WHERE session_id = ?1",
        params![session_id],
    )?;
    Ok(())
}

pub fn get_cart_items(conn: &Connection, session_id: &str) -> Result<Vec<CartItem>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM cart_items WHERE session_id = ?1 ORDER BY created_at",
            CART_ITEM_COLS
        ),
        &[&session_id],
    )
}

/// Cart lines joined with live product data. Prices come from the catalog,
/// never from the cart.
pub fn get_cart_lines(conn: &Connection, session_id: &str) -> Result<Vec<CartLine>> {
    query_all(
        conn,
        "SELECT c.product_id, p.name, p.image, c.quantity, p.price_cents, p.is_free, p.is_active
         FROM cart_items c
         JOIN products p ON p.id = c.product_id
         WHERE c.session_id = ?1
         ORDER BY c.created_at",
        &[&session_id],
    )
}

// ============ Orders ============

/// Insert an order and its items atomically. Both succeed or neither does;
/// a UNIQUE collision on order_number surfaces as a constraint error for
/// the caller to retry with a fresh number.
pub fn create_order_with_items(
    conn: &mut Connection,
    order_number: &str,
    customer: &Customer,
    payment_method: &str,
    totals: &CartTotals,
    currency: &str,
    items: &[(String, String, i64, i64, bool)], // (product_id, name, price_cents, quantity, is_free)
) -> Result<Order> {
    let id = gen_id();
    let now = now();

    let tx = conn.transaction()?;
    tx.execute(
        "INSERT INTO orders (id, order_number, user_id, customer_name, customer_email,
                             payment_method, payment_status, subtotal_cents, tax_cents,
                             total_amount_cents, currency, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'pending', ?7, ?8, ?9, ?10, ?11, ?11)",
        params![
            &id,
            order_number,
            &customer.user_id,
            &customer.name,
            &customer.email,
            payment_method,
            totals.subtotal_cents,
            totals.tax_cents,
            totals.total_cents,
            currency,
            now,
        ],
    )?;

    for (product_id, product_name, price_cents, quantity, is_free) in items {
        tx.execute(
            "INSERT INTO order_items (id, order_id, product_id, product_name, price_cents,
                                      quantity, is_free)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                gen_id(),
                &id,
                product_id,
                product_name,
                price_cents,
                quantity,
                *is_free as i64
            ],
        )?;
    }
    tx.commit()?;

    get_order_by_id(conn, &id)?
        .ok_or_else(|| AppError::Internal("Order vanished after insert".into()))
}

pub fn get_order_by_id(conn: &Connection, id: &str) -> Result<Option<Order>> {
    query_one(
        conn,
        &format!("SELECT {} FROM orders WHERE id = ?1", ORDER_COLS),
        &[&id],
    )
}

pub fn get_order_by_number(conn: &Connection, order_number: &str) -> Result<Option<Order>> {
    query_one(
        conn,
        &format!("SELECT {} FROM orders WHERE order_number = ?1", ORDER_COLS),
        &[&order_number],
    )
}

pub fn get_order_items(conn: &Connection, order_id: &str) -> Result<Vec<OrderItem>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM order_items WHERE order_id = ?1",
            ORDER_ITEM_COLS
        ),
        &[&order_id],
    )
}

/// Record the gateway-side reference once a payment session is created.
pub fn set_order_payment_id(conn: &Connection, order_number: &str, payment_id: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE orders SET payment_id = ?1, updated_at = ?2 WHERE order_number = ?3",
        params![payment_id, now(), order_number],
    )?;
    Ok(affected > 0)
}

/// Classify why a conditional transition update matched no rows.
fn classify_missed_transition(
    conn: &Connection,
    table: &str,
    key_col: &str,
    key: &str,
    target: PaymentStatus,
) -> Result<TransitionOutcome> {
    let current: Option<String> = conn
        .query_row(
            &format!("SELECT payment_status FROM {} WHERE {} = ?1", table, key_col),
            params![key],
            |row| row.get(0),
        )
        .optional()?;

    Ok(match current {
        None => TransitionOutcome::NotFound,
        Some(s) => {
            let status: PaymentStatus = s
                .parse()
                .map_err(|_| AppError::Internal(format!("Corrupt payment_status: {}", s)))?;
            if status == target {
                TransitionOutcome::AlreadyApplied
            } else {
                TransitionOutcome::Rejected { current: status }
            }
        }
    })
}

/// Move an order pending → completed with a single conditional update.
///
/// Only the first writer wins; concurrent webhook deliveries observe
/// `AlreadyApplied` and must not re-fire side effects.
pub fn try_mark_order_completed(
    conn: &Connection,
    order_number: &str,
    payment_id: Option<&str>,
) -> Result<TransitionOutcome> {
    let now = now();
    let affected = conn.execute(
        "UPDATE orders
         SET payment_status = 'completed',
             payment_id = COALESCE(?1, payment_id),
             completed_at = ?2,
             updated_at = ?2
         WHERE order_number = ?3 AND payment_status = 'pending'",
        params![payment_id, now, order_number],
    )?;
    if affected > 0 {
        return Ok(TransitionOutcome::Applied);
    }
    classify_missed_transition(conn, "orders", "order_number", order_number, PaymentStatus::Completed)
}

/// Move an order pending → failed, recording the classified reason.
pub fn try_mark_order_failed(
    conn: &Connection,
    order_number: &str,
    reason: &str,
) -> Result<TransitionOutcome> {
    let affected = conn.execute(
        "UPDATE orders
         SET payment_status = 'failed', failure_reason = ?1, updated_at = ?2
         WHERE order_number = ?3 AND payment_status = 'pending'",
        params![reason, now(), order_number],
    )?;
    if affected > 0 {
        return Ok(TransitionOutcome::Applied);
    }
    classify_missed_transition(conn, "orders", "order_number", order_number, PaymentStatus::Failed)
}

/// Manual/admin path: completed → refunded only.
pub fn try_mark_order_refunded(conn: &Connection, order_number: &str) -> Result<TransitionOutcome> {
    let affected = conn.execute(
        "UPDATE orders
         SET payment_status = 'refunded', updated_at = ?1
         WHERE order_number = ?2 AND payment_status = 'completed'",
        params![now(), order_number],
    )?;
    if affected > 0 {
        return Ok(TransitionOutcome::Applied);
    }
    classify_missed_transition(conn, "orders", "order_number", order_number, PaymentStatus::Refunded)
}

// ============ Licenses ============

/// Grant (or re-activate) a license for one order item.
///
/// Idempotent: UNIQUE(product_id, order_id) means re-invocation for an
/// already-completed order updates the existing row instead of creating a
/// duplicate.
pub fn grant_license(conn: &Connection, input: &CreateLicense) -> Result<UserLicense> {
    let id = gen_id();
    let now = now();
    conn.execute(
        "INSERT INTO user_licenses (id, user_id, customer_email, product_id, order_id,
                                    download_limit, downloads_used, updates_expires_at,
                                    is_active, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7, 1, ?8)
         ON CONFLICT(product_id, order_id) DO UPDATE SET is_active = 1",
        params![
            &id,
            &input.user_id,
            &input.customer_email,
            &input.product_id,
            &input.order_id,
            input.download_limit,
            input.updates_expires_at,
            now,
        ],
    )?;
    query_one(
        conn,
        &format!(
            "SELECT {} FROM user_licenses WHERE product_id = ?1 AND order_id = ?2",
            LICENSE_COLS
        ),
        &[&input.product_id.as_str(), &input.order_id.as_str()],
    )?
    .ok_or_else(|| AppError::Internal("License vanished after upsert".into()))
}

pub fn get_licenses_for_order(conn: &Connection, order_id: &str) -> Result<Vec<UserLicense>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM user_licenses WHERE order_id = ?1",
            LICENSE_COLS
        ),
        &[&order_id],
    )
}

pub fn get_licenses_for_user(conn: &Connection, user_id: &str) -> Result<Vec<UserLicense>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM user_licenses WHERE user_id = ?1 AND is_active = 1",
            LICENSE_COLS
        ),
        &[&user_id],
    )
}

pub fn deactivate_license(conn: &Connection, license_id: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE user_licenses SET is_active = 0 WHERE id = ?1",
        params![license_id],
    )?;
    Ok(affected > 0)
}

/// Deactivate every license granted by an order (refund path).
pub fn deactivate_licenses_for_order(conn: &Connection, order_id: &str) -> Result<usize> {
    let affected = conn.execute(
        "UPDATE user_licenses SET is_active = 0 WHERE order_id = ?1",
        params![order_id],
    )?;
    Ok(affected)
}

/// Attach guest orders and licenses to a registered account with a
/// matching purchase email. Returns the number of licenses claimed.
pub fn claim_guest_licenses(conn: &Connection, user_id: &str, email: &str) -> Result<usize> {
    conn.execute(
        "UPDATE orders SET user_id = ?1, updated_at = ?2
         WHERE user_id IS NULL AND customer_email = ?3",
        params![user_id, now(), email],
    )?;
    let claimed = conn.execute(
        "UPDATE user_licenses SET user_id = ?1
         WHERE user_id IS NULL AND customer_email = ?2",
        params![user_id, email],
    )?;
    Ok(claimed)
}

// ============ Donations ============

pub fn create_donation(
    conn: &Connection,
    transaction_id: &str,
    input: &CreateDonation,
) -> Result<Donation> {
    let id = gen_id();
    let now = now();
    conn.execute(
        "INSERT INTO donations (id, transaction_id, amount_cents, currency, payment_method,
                                payment_status, donor_name, donor_email, donor_message,
                                product_id, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, 'pending', ?6, ?7, ?8, ?9, ?10, ?10)",
        params![
            &id,
            transaction_id,
            input.amount_cents,
            &input.currency,
            &input.payment_method,
            &input.donor_name,
            &input.donor_email,
            &input.donor_message,
            &input.product_id,
            now,
        ],
    )?;
    get_donation_by_transaction_id(conn, transaction_id)?
        .ok_or_else(|| AppError::Internal("Donation vanished after insert".into()))
}

pub fn get_donation_by_transaction_id(
    conn: &Connection,
    transaction_id: &str,
) -> Result<Option<Donation>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM donations WHERE transaction_id = ?1",
            DONATION_COLS
        ),
        &[&transaction_id],
    )
}

pub fn set_donation_payment_id(
    conn: &Connection,
    transaction_id: &str,
    payment_id: &str,
) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE donations SET payment_id = ?1, updated_at = ?2 WHERE transaction_id = ?3",
        params![payment_id, now(), transaction_id],
    )?;
    Ok(affected > 0)
}

/// Move a donation pending → completed, stamping the captured amount and
/// the raw webhook payload. Same first-writer-wins discipline as orders.
pub fn try_mark_donation_completed(
    conn: &Connection,
    transaction_id: &str,
    payment_id: Option<&str>,
    final_amount_cents: Option<i64>,
    webhook_data: Option<&str>,
) -> Result<TransitionOutcome> {
    let affected = conn.execute(
        "UPDATE donations
         SET payment_status = 'completed',
             payment_id = COALESCE(?1, payment_id),
             final_amount_cents = COALESCE(?2, final_amount_cents, amount_cents),
             webhook_received = 1,
             webhook_data = COALESCE(?3, webhook_data),
             updated_at = ?4
         WHERE transaction_id = ?5 AND payment_status = 'pending'",
        params![payment_id, final_amount_cents, webhook_data, now(), transaction_id],
    )?;
    if affected > 0 {
        return Ok(TransitionOutcome::Applied);
    }
    classify_missed_transition(
        conn,
        "donations",
        "transaction_id",
        transaction_id,
        PaymentStatus::Completed,
    )
}

pub fn try_mark_donation_failed(
    conn: &Connection,
    transaction_id: &str,
    webhook_data: Option<&str>,
) -> Result<TransitionOutcome> {
    let affected = conn.execute(
        "UPDATE donations
         SET payment_status = 'failed', webhook_received = 1,
             webhook_data = COALESCE(?1, webhook_data), updated_at = ?2
         WHERE transaction_id = ?3 AND payment_status = 'pending'",
        params![webhook_data, now(), transaction_id],
    )?;
    if affected > 0 {
        return Ok(TransitionOutcome::Applied);
    }
    classify_missed_transition(
        conn,
        "donations",
        "transaction_id",
        transaction_id,
        PaymentStatus::Failed,
    )
}

// ============ Webhook logs ============

/// Record a raw webhook delivery before any processing. Returns the log id
/// so the handler can stamp the outcome afterwards.
pub fn insert_webhook_log(
    conn: &Connection,
    gateway: &str,
    event_type: Option<&str>,
    external_ref: Option<&str>,
    payload: &str,
) -> Result<String> {
    let id = gen_id();
    conn.execute(
        "INSERT INTO webhook_logs (id, gateway, event_type, external_ref, payload, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![&id, gateway, event_type, external_ref, payload, now()],
    )?;
    Ok(id)
}

pub fn set_webhook_log_outcome(conn: &Connection, log_id: &str, outcome: &str) -> Result<()> {
    conn.execute(
        "UPDATE webhook_logs SET outcome = ?1 WHERE id = ?2",
        params![outcome, log_id],
    )?;
    Ok(())
}

pub fn list_webhook_logs_for_ref(conn: &Connection, external_ref: &str) -> Result<Vec<WebhookLog>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM webhook_logs WHERE external_ref = ?1 ORDER BY created_at",
            super::from_row::WEBHOOK_LOG_COLS
        ),
        &[&external_ref],
    )
}

pub fn count_webhook_logs(conn: &Connection, external_ref: &str) -> Result<i64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM webhook_logs WHERE external_ref = ?1",
        params![external_ref],
        |row| row.get(0),
    )?;
    Ok(count)
}
