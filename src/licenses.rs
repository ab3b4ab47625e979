//! License granting on order completion.
//!
//! Download limits and update windows are read from the product at grant
//! time and fixed thereafter; later catalog changes never touch an existing
//! license. Idempotent under webhook replay via UNIQUE(product_id, order_id).

use rusqlite::Connection;

use crate::db::queries;
use crate::error::Result;
use crate::models::{CreateLicense, Order, UserLicense};
use crate::util::updates_window;

/// Grant one license per order item. Safe to re-invoke for an
/// already-completed order: existing rows are re-activated, not duplicated.
pub fn grant_for_order(conn: &Connection, order: &Order) -> Result<Vec<UserLicense>> {
    let items = queries::get_order_items(conn, &order.id)?;
    let now = chrono::Utc::now().timestamp();

    let mut granted = Vec::with_capacity(items.len());
    for item in &items {
        let product = match queries::get_product_by_id(conn, &item.product_id)? {
            Some(p) => p,
            None => {
                // Product deleted between purchase and webhook; the order
                // item still records what was sold, so grant with defaults.
                tracing::warn!(
                    "Product {} missing at grant time for order {}, using defaults",
                    item.product_id,
                    order.order_number
                );
                let license = queries::grant_license(
                    conn,
                    &CreateLicense {
                        user_id: order.user_id.clone(),
                        customer_email: order.customer_email.clone(),
                        product_id: item.product_id.clone(),
                        order_id: order.id.clone(),
                        download_limit: 5,
                        updates_expires_at: None,
                    },
                )?;
                granted.push(license);
                continue;
            }
        };

        let license = queries::grant_license(
            conn,
            &CreateLicense {
                user_id: order.user_id.clone(),
                customer_email: order.customer_email.clone(),
                product_id: product.id.clone(),
                order_id: order.id.clone(),
                download_limit: product.download_limit,
                updates_expires_at: updates_window(product.updates_exp_days, now),
            },
        )?;
        granted.push(license);
    }

    tracing::info!(
        "Granted {} licenses for order {}",
        granted.len(),
        order.order_number
    );
    Ok(granted)
}

/// Attach guest purchases to a registered account with a matching email.
pub fn claim_guest(conn: &Connection, user_id: &str, email: &str) -> Result<usize> {
    let claimed = queries::claim_guest_licenses(conn, user_id, email)?;
    if claimed > 0 {
        tracing::info!("User {} claimed {} guest licenses", user_id, claimed);
    }
    Ok(claimed)
}
