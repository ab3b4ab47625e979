use serde::{Deserialize, Serialize};

/// Payment lifecycle status for an order.
///
/// Transitions are monotonic forward: pending → completed|failed, and
/// completed → refunded (manual path). Everything else is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Refunded => "refunded",
        }
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "refunded" => Ok(Self::Refunded),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single checkout transaction grouping one or more purchased line items.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    /// Unique human-readable number (ORD-YYYYMMDD-XXXXXX), embedded as the
    /// gateway reference so webhooks can correlate back.
    pub order_number: String,
    /// None for guest checkout; claimable later by email match.
    pub user_id: Option<String>,
    pub customer_name: String,
    pub customer_email: String,
    pub payment_method: String,
    pub payment_status: PaymentStatus,
    pub subtotal_cents: i64,
    pub tax_cents: i64,
    pub total_amount_cents: i64,
    pub currency: String,
    /// Gateway-side reference (PayPal order id, MercadoPago payment id).
    pub payment_id: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    pub completed_at: Option<i64>,
}

/// A purchased line, denormalized at purchase time. Immutable once the
/// order completes; later catalog price changes never affect it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: String,
    pub order_id: String,
    pub product_id: String,
    pub product_name: String,
    pub price_cents: i64,
    pub quantity: i64,
    pub is_free: bool,
}

/// Customer details captured at checkout.
#[derive(Debug, Clone, Deserialize)]
pub struct Customer {
    pub name: String,
    pub email: String,
    pub user_id: Option<String>,
}

/// Outcome of a conditional status-transition update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// This call won the conditional update; side effects should fire.
    Applied,
    /// Already in the target state; idempotent no-op.
    AlreadyApplied,
    /// The row exists but is in a state the transition does not allow.
    Rejected { current: PaymentStatus },
    NotFound,
}
