//! MercadoPago REST API client: checkout preference creation, payment
//! lookup, and x-signature webhook verification.

use std::time::Duration;

use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::config::MercadoPagoConfig;
use crate::error::{AppError, Result};

use super::{cents_to_decimal, Captured, GatewaySession, SessionRequest};

type HmacSha256 = Hmac<Sha256>;

const API_BASE: &str = "https://api.mercadopago.com";

const GATEWAY_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum age of a webhook signature timestamp before rejection.
const SIGNATURE_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, Clone)]
pub struct MercadoPagoClient {
    client: Client,
    config: MercadoPagoConfig,
}

#[derive(Debug, Deserialize)]
struct CreatePreferenceResponse {
    id: String,
    init_point: String,
}

/// A payment as reported by `GET /v1/payments/{id}`.
#[derive(Debug, Clone)]
pub struct MpPayment {
    pub id: String,
    /// "approved", "pending", "in_process", "rejected", "cancelled", ...
    pub status: String,
    pub status_detail: Option<String>,
    pub external_reference: Option<String>,
    pub amount_cents: Option<i64>,
}

impl MercadoPagoClient {
    pub fn new(config: &MercadoPagoConfig) -> Self {
        Self {
            client: Client::builder()
                .timeout(GATEWAY_TIMEOUT)
                .build()
                .unwrap_or_default(),
            config: config.clone(),
        }
    }

    /// Create a checkout preference and return its init_point redirect.
    ///
    /// The internal reference goes into `external_reference` so the webhook
    /// can correlate back to the local order/donation.
    pub async fn create_preference(&self, req: &SessionRequest) -> Result<GatewaySession> {
        // MercadoPago wants a decimal amount, not cents.
        let unit_price: f64 = cents_to_decimal(req.amount_cents)
            .parse()
            .map_err(|_| AppError::Internal("Bad amount".into()))?;

        let body = json!({
            "items": [{
                "title": req.description,
                "quantity": 1,
                "unit_price": unit_price,
                "currency_id": req.currency,
            }],
            "external_reference": req.reference,
            "back_urls": {
                "success": req.return_url,
                "pending": req.return_url,
                "failure": req.cancel_url,
            },
            "auto_return": "approved",
        });

        let response = self
            .client
            .post(format!("{}/checkout/preferences", API_BASE))
            .bearer_auth(&self.config.access_token)
            .json(&body)
            .send()
            .await
            .map_err(AppError::from_gateway_http)?;

        if !response.status().is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AppError::Gateway {
                reason: super::FailureReason::GatewayError,
                message: format!("MercadoPago preference creation failed: {}", text),
            });
        }

        let created: CreatePreferenceResponse = response.json().await.map_err(|e| {
            AppError::Internal(format!("Failed to parse MercadoPago preference: {}", e))
        })?;

        Ok(GatewaySession {
            external_id: created.id,
            redirect_url: created.init_point,
        })
    }

    /// Look up a payment by the id delivered in the webhook.
    pub async fn get_payment(&self, payment_id: &str) -> Result<MpPayment> {
        let response = self
            .client
            .get(format!("{}/v1/payments/{}", API_BASE, payment_id))
            .bearer_auth(&self.config.access_token)
            .send()
            .await
            .map_err(AppError::from_gateway_http)?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(AppError::Gateway {
                reason: super::FailureReason::GatewayError,
                message: format!("MercadoPago payment lookup failed: {}", status),
            });
        }

        let body: serde_json::Value = response.json().await.map_err(|e| {
            AppError::Internal(format!("Failed to parse MercadoPago payment: {}", e))
        })?;

        Ok(MpPayment {
            id: body["id"]
                .as_i64()
                .map(|i| i.to_string())
                .or_else(|| body["id"].as_str().map(String::from))
                .unwrap_or_default(),
            status: body["status"].as_str().unwrap_or_default().to_string(),
            status_detail: body["status_detail"].as_str().map(String::from),
            external_reference: body["external_reference"].as_str().map(String::from),
            amount_cents: body["transaction_amount"]
                .as_f64()
                .map(|a| (a * 100.0).round() as i64),
        })
    }

    /// Interpret a payment status as a capture outcome.
    pub fn captured_from_payment(payment: &MpPayment) -> Captured {
        Captured {
            completed: payment.status == "approved",
            amount_cents: payment.amount_cents,
            external_reference: payment.external_reference.clone(),
        }
    }

    /// Verify the `x-signature` header against the configured secret.
    ///
    /// The signed manifest is `id:{data_id};request-id:{rid};ts:{ts};`,
    /// signed HMAC-SHA256 and hex encoded. Without a configured secret the
    /// payload is trusted and a warning is logged (degraded mode).
    pub fn verify_webhook_signature(
        &self,
        data_id: &str,
        x_signature: Option<&str>,
        x_request_id: Option<&str>,
    ) -> Result<bool> {
        let secret = match &self.config.webhook_secret {
            Some(s) => s,
            None => {
                tracing::warn!(
                    "MP_WEBHOOK_SECRET not configured - webhook payload trusted without verification"
                );
                return Ok(true);
            }
        };

        let signature = x_signature
            .ok_or_else(|| AppError::WebhookVerification("Missing x-signature header".into()))?;

        // Signature format: ts=...,v1=...
        let mut ts = None;
        let mut v1 = None;
        for part in signature.split(',') {
            let part = part.trim();
            if let Some(t) = part.strip_prefix("ts=") {
                ts = Some(t);
            } else if let Some(s) = part.strip_prefix("v1=") {
                v1 = Some(s);
            }
        }
        let ts = ts
            .ok_or_else(|| AppError::WebhookVerification("Invalid signature format".into()))?;
        let v1 = v1
            .ok_or_else(|| AppError::WebhookVerification("Invalid signature format".into()))?;

        // Reject stale timestamps so captured signatures cannot be replayed
        // much later. Small future skew tolerated.
        let ts_num: i64 = ts
            .parse()
            .map_err(|_| AppError::WebhookVerification("Invalid timestamp in signature".into()))?;
        // MercadoPago timestamps are milliseconds.
        let age = chrono::Utc::now().timestamp() - ts_num / 1000;
        if age > SIGNATURE_TOLERANCE_SECS {
            tracing::warn!("MercadoPago webhook rejected: timestamp too old (age={}s)", age);
            return Ok(false);
        }
        if age < -60 {
            tracing::warn!("MercadoPago webhook rejected: timestamp in the future");
            return Ok(false);
        }

        let manifest = match x_request_id {
            Some(rid) => format!("id:{};request-id:{};ts:{};", data_id, rid, ts),
            None => format!("id:{};ts:{};", data_id, ts),
        };

        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|_| AppError::Internal("Invalid webhook secret".into()))?;
        mac.update(manifest.as_bytes());
        let expected = hex::encode(mac.finalize().into_bytes());

        let expected_bytes = expected.as_bytes();
        let provided_bytes = v1.as_bytes();
        if expected_bytes.len() != provided_bytes.len() {
            return Ok(false);
        }
        Ok(expected_bytes.ct_eq(provided_bytes).into())
    }
}
