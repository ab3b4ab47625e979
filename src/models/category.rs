use serde::{Deserialize, Serialize};

/// Catalog category. External collaborator data for the reconciliation
/// flow; only consumed by joins during cart validation and listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateCategory {
    pub name: String,
    pub slug: String,
}
