use serde::{Deserialize, Serialize};

/// A single pending line in a visitor's cart.
///
/// Carts never store prices: money is always recomputed from the live
/// catalog at read time, so a stale cart cannot produce a stale total.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartItem {
    pub session_id: String,
    pub product_id: String,
    pub quantity: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A cart line joined with live product data, ready for display or
/// checkout validation.
#[derive(Debug, Clone, Serialize)]
pub struct CartLine {
    pub product_id: String,
    pub product_name: String,
    pub image: Option<String>,
    pub quantity: i64,
    pub unit_price_cents: i64,
    pub is_free: bool,
    pub is_active: bool,
}

impl CartLine {
    pub fn line_total_cents(&self) -> i64 {
        if self.is_free {
            0
        } else {
            self.unit_price_cents * self.quantity
        }
    }
}

/// Computed totals for a cart. Free items contribute zero to the subtotal;
/// a zero subtotal always yields a zero total regardless of the tax rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CartTotals {
    pub items_count: i64,
    pub subtotal_cents: i64,
    pub tax_cents: i64,
    pub tax_rate_bps: i64,
    pub total_cents: i64,
}

impl CartTotals {
    /// Compute totals from a subtotal and a tax rate in basis points.
    pub fn from_subtotal(items_count: i64, subtotal_cents: i64, tax_rate_bps: i64) -> Self {
        let tax_cents = if subtotal_cents == 0 {
            0
        } else {
            subtotal_cents * tax_rate_bps / 10_000
        };
        Self {
            items_count,
            subtotal_cents,
            tax_cents,
            tax_rate_bps,
            total_cents: subtotal_cents + tax_cents,
        }
    }
}
