mod mercadopago;
mod paypal;

pub use mercadopago::*;
pub use paypal::*;

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::{AppError, Result};

/// Payment method selected at checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    PayPal,
    MercadoPago,
    /// Zero-total checkout; no gateway involved.
    Free,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PayPal => "paypal",
            Self::MercadoPago => "mercadopago",
            Self::Free => "free",
        }
    }
}

impl std::str::FromStr for PaymentMethod {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "paypal" => Ok(Self::PayPal),
            "mercadopago" | "mp" => Ok(Self::MercadoPago),
            "free" => Ok(Self::Free),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Classified reason for a payment failure. Each code maps to a fixed
/// user-facing message and a retryability flag; the failed page receives
/// only the code, never raw gateway output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    Cancelled,
    Declined,
    NetworkError,
    GatewayError,
    InsufficientFunds,
    FraudDetected,
    InvalidData,
    Expired,
    Unknown,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cancelled => "cancelled",
            Self::Declined => "declined",
            Self::NetworkError => "network_error",
            Self::GatewayError => "gateway_error",
            Self::InsufficientFunds => "insufficient_funds",
            Self::FraudDetected => "fraud_detected",
            Self::InvalidData => "invalid_data",
            Self::Expired => "expired",
            Self::Unknown => "unknown",
        }
    }

    /// Fixed user-facing message for the failure page.
    pub fn message(&self) -> &'static str {
        match self {
            Self::Cancelled => "The payment was cancelled. You can try again whenever you like.",
            Self::Declined => "The payment was declined by your payment provider.",
            Self::NetworkError => "We could not reach the payment provider. Please try again.",
            Self::GatewayError => "The payment provider reported an error. Please try again or use a different method.",
            Self::InsufficientFunds => "The payment was declined due to insufficient funds.",
            Self::FraudDetected => "The payment was rejected by the provider's risk checks.",
            Self::InvalidData => "The payment details were invalid. Please check them and try again.",
            Self::Expired => "The payment session expired. Please start the checkout again.",
            Self::Unknown => "The payment could not be completed. Please contact support.",
        }
    }

    /// Whether retrying the same method is worthwhile.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Cancelled | Self::NetworkError | Self::GatewayError | Self::Expired
        )
    }

    /// Map a gateway-reported status detail to a classified reason.
    pub fn from_gateway_detail(detail: &str) -> Self {
        let d = detail.to_lowercase();
        if d.contains("insufficient") {
            Self::InsufficientFunds
        } else if d.contains("fraud") || d.contains("high_risk") || d.contains("blacklist") {
            Self::FraudDetected
        } else if d.contains("bad_filled") || d.contains("invalid") {
            Self::InvalidData
        } else if d.contains("expired") {
            Self::Expired
        } else if d.contains("cancel") || d.contains("voided") {
            Self::Cancelled
        } else if d.contains("rejected") || d.contains("declined") || d.contains("call_for_auth") {
            Self::Declined
        } else {
            Self::Unknown
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Request to open a gateway payment session for an order or donation.
///
/// `reference` is the internal order_number / transaction_id and MUST be
/// embedded as the gateway's reference field; the webhook correlates back
/// through it, and losing it makes reconciliation impossible.
#[derive(Debug, Clone)]
pub struct SessionRequest {
    pub reference: String,
    pub amount_cents: i64,
    pub currency: String,
    pub description: String,
    pub return_url: String,
    pub cancel_url: String,
}

/// A created gateway session: where to send the user, and the gateway-side
/// id to store as `payment_id`.
#[derive(Debug, Clone, Serialize)]
pub struct GatewaySession {
    pub external_id: String,
    pub redirect_url: String,
}

/// Result of a capture attempt.
#[derive(Debug, Clone)]
pub struct Captured {
    pub completed: bool,
    pub amount_cents: Option<i64>,
    pub external_reference: Option<String>,
}

/// Configured gateway clients, keyed by payment method. Built once at
/// startup; checkout resolves a client from here instead of switching on
/// method strings inline.
pub struct GatewayRegistry {
    paypal: Option<PayPalClient>,
    mercadopago: Option<MercadoPagoClient>,
}

/// A resolved gateway client for one payment method.
pub enum Gateway<'a> {
    PayPal(&'a PayPalClient),
    MercadoPago(&'a MercadoPagoClient),
}

impl GatewayRegistry {
    pub fn from_config(config: &Config) -> Self {
        Self {
            paypal: config.paypal.as_ref().map(PayPalClient::new),
            mercadopago: config.mercadopago.as_ref().map(MercadoPagoClient::new),
        }
    }

    /// Registry for tests: no gateways configured.
    pub fn empty() -> Self {
        Self {
            paypal: None,
            mercadopago: None,
        }
    }

    pub fn get(&self, method: PaymentMethod) -> Result<Gateway<'_>> {
        match method {
            PaymentMethod::PayPal => self
                .paypal
                .as_ref()
                .map(Gateway::PayPal)
                .ok_or_else(|| AppError::BadRequest("PayPal is not configured".into())),
            PaymentMethod::MercadoPago => self
                .mercadopago
                .as_ref()
                .map(Gateway::MercadoPago)
                .ok_or_else(|| AppError::BadRequest("MercadoPago is not configured".into())),
            PaymentMethod::Free => Err(AppError::BadRequest(
                "Free checkout does not use a payment gateway".into(),
            )),
        }
    }

    pub fn paypal(&self) -> Option<&PayPalClient> {
        self.paypal.as_ref()
    }

    pub fn mercadopago(&self) -> Option<&MercadoPagoClient> {
        self.mercadopago.as_ref()
    }
}

impl Gateway<'_> {
    /// Open a payment session and return the user-facing redirect URL.
    pub async fn create_session(&self, req: &SessionRequest) -> Result<GatewaySession> {
        match self {
            Gateway::PayPal(client) => client.create_order(req).await,
            Gateway::MercadoPago(client) => client.create_preference(req).await,
        }
    }
}

/// Convert integer cents to the decimal string the gateway APIs expect.
pub(crate) fn cents_to_decimal(cents: i64) -> String {
    format!("{}.{:02}", cents / 100, cents % 100)
}

/// Parse a gateway decimal amount ("40.00") back into cents.
pub(crate) fn decimal_to_cents(s: &str) -> Option<i64> {
    let (whole, frac) = match s.split_once('.') {
        Some((w, f)) => (w, f),
        None => (s, ""),
    };
    let whole: i64 = whole.parse().ok()?;
    let frac_cents: i64 = match frac.len() {
        0 => 0,
        1 => frac.parse::<i64>().ok()? * 10,
        // get() rather than slicing: gateway strings are untrusted and a
        // multi-byte character must yield None, not a panic.
        _ => frac.get(..2)?.parse().ok()?,
    };
    Some(whole * 100 + frac_cents)
}
