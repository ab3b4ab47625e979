use serde::{Deserialize, Serialize};

/// Per-customer, per-product entitlement created when an order completes.
///
/// Download limit and update window are copied from the product at grant
/// time and never change afterwards. `downloads_used <= download_limit` is
/// enforced at download time, not here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserLicense {
    pub id: String,
    /// None for guest purchases until claimed by a registered account.
    pub user_id: Option<String>,
    /// Purchase email; the durable identity for guest license recovery.
    pub customer_email: String,
    pub product_id: String,
    pub order_id: String,
    pub download_limit: i64,
    pub downloads_used: i64,
    /// Unix timestamp after which updates are no longer available
    /// (None = perpetual updates).
    pub updates_expires_at: Option<i64>,
    pub is_active: bool,
    pub created_at: i64,
}

/// Data required to grant a license.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateLicense {
    pub user_id: Option<String>,
    pub customer_email: String,
    pub product_id: String,
    pub order_id: String,
    pub download_limit: i64,
    pub updates_expires_at: Option<i64>,
}
