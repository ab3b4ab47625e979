use serde::{Deserialize, Serialize};

/// A downloadable software product in the catalog.
///
/// Read-mostly: the reconciliation flow consumes products but never mutates
/// them. Prices are integer cents; `is_free` products contribute zero to
/// order totals regardless of `price_cents`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub category_id: Option<String>,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub image: Option<String>,
    pub price_cents: i64,
    pub currency: String,
    pub is_free: bool,
    pub is_active: bool,
    /// Download allowance granted per license at purchase time.
    pub download_limit: i64,
    /// Days of update eligibility granted per license (None = perpetual).
    pub updates_exp_days: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Data required to create a product (seeding and tests).
#[derive(Debug, Clone, Deserialize)]
pub struct CreateProduct {
    pub category_id: Option<String>,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub image: Option<String>,
    pub price_cents: i64,
    pub currency: String,
    pub is_free: bool,
    pub download_limit: i64,
    pub updates_exp_days: Option<i64>,
}
