use serde::{Deserialize, Serialize};

use super::PaymentStatus;

/// A donation. Lifecycle mirrors an order (pending → completed|failed) with
/// no license side effect; correlated to the gateway via `transaction_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Donation {
    pub id: String,
    /// Unique gateway-correlated reference (DON-YYYYMMDD-XXXXXX).
    pub transaction_id: String,
    pub amount_cents: i64,
    /// Amount the gateway actually captured, stamped at completion.
    pub final_amount_cents: Option<i64>,
    pub currency: String,
    pub payment_method: String,
    pub payment_status: PaymentStatus,
    pub donor_name: Option<String>,
    pub donor_email: Option<String>,
    pub donor_message: Option<String>,
    /// "Donate for product" target, if any.
    pub product_id: Option<String>,
    pub payment_id: Option<String>,
    pub webhook_received: bool,
    /// Raw webhook payload kept for replay/debugging.
    pub webhook_data: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateDonation {
    pub amount_cents: i64,
    pub currency: String,
    pub payment_method: String,
    pub donor_name: Option<String>,
    pub donor_email: Option<String>,
    pub donor_message: Option<String>,
    pub product_id: Option<String>,
}
