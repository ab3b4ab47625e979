//! PayPal REST API client: OAuth2 token handling, order create/lookup/
//! capture, and webhook signature verification.

use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderMap;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::RwLock;

use crate::config::PayPalConfig;
use crate::error::{AppError, Result};

use super::{cents_to_decimal, decimal_to_cents, Captured, GatewaySession, SessionRequest};

/// Bounded timeout for all gateway calls; a timeout is a retryable error.
const GATEWAY_TIMEOUT: Duration = Duration::from_secs(30);

/// Refresh the cached token this many seconds before it actually expires.
const TOKEN_EXPIRY_SLACK_SECS: i64 = 60;

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: i64,
}

#[derive(Debug, Clone)]
pub struct PayPalClient {
    client: Client,
    config: PayPalConfig,
    // Cached per-process, never persisted.
    token: Arc<RwLock<Option<CachedToken>>>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Deserialize)]
struct OrderLink {
    rel: String,
    href: String,
}

#[derive(Debug, Deserialize)]
struct CreateOrderResponse {
    id: String,
    #[serde(default)]
    links: Vec<OrderLink>,
}

/// An order as reported by `GET /v2/checkout/orders/{id}`.
#[derive(Debug, Clone)]
pub struct PayPalOrder {
    pub id: String,
    pub status: String,
    pub reference: Option<String>,
    pub amount_cents: Option<i64>,
}

impl PayPalClient {
    pub fn new(config: &PayPalConfig) -> Self {
        Self {
            client: Client::builder()
                .timeout(GATEWAY_TIMEOUT)
                .build()
                .unwrap_or_default(),
            config: config.clone(),
            token: Arc::new(RwLock::new(None)),
        }
    }

    /// Fetch (or reuse) an OAuth2 client-credentials token. Every API call
    /// goes through here; the token lives only in process memory.
    async fn access_token(&self) -> Result<String> {
        {
            let cached = self.token.read().await;
            if let Some(t) = cached.as_ref() {
                if t.expires_at > Utc::now().timestamp() {
                    return Ok(t.access_token.clone());
                }
            }
        }

        let url = format!("{}/v1/oauth2/token", self.config.base_url());
        let response = self
            .client
            .post(&url)
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(AppError::from_gateway_http)?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(AppError::Internal(format!(
                "PayPal auth failed: {}",
                status
            )));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to parse PayPal token: {}", e)))?;

        let token = CachedToken {
            access_token: body.access_token.clone(),
            expires_at: Utc::now().timestamp() + body.expires_in - TOKEN_EXPIRY_SLACK_SECS,
        };
        *self.token.write().await = Some(token);

        Ok(body.access_token)
    }

    /// Create a PayPal order and return the approval redirect.
    ///
    /// The internal reference goes into `reference_id` so the webhook can
    /// correlate back to the local order/donation.
    pub async fn create_order(&self, req: &SessionRequest) -> Result<GatewaySession> {
        let token = self.access_token().await?;

        let body = json!({
            "intent": "CAPTURE",
            "purchase_units": [{
                "reference_id": req.reference,
                "description": req.description,
                "amount": {
                    "currency_code": req.currency,
                    "value": cents_to_decimal(req.amount_cents),
                },
            }],
            "application_context": {
                "return_url": req.return_url,
                "cancel_url": req.cancel_url,
                "user_action": "PAY_NOW",
            },
        });

        let response = self
            .client
            .post(format!("{}/v2/checkout/orders", self.config.base_url()))
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await
            .map_err(AppError::from_gateway_http)?;

        if !response.status().is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AppError::Gateway {
                reason: super::FailureReason::GatewayError,
                message: format!("PayPal order creation failed: {}", text),
            });
        }

        let created: CreateOrderResponse = response
            .json()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to parse PayPal order: {}", e)))?;

        let approval_url = created
            .links
            .iter()
            .find(|l| l.rel == "approve")
            .map(|l| l.href.clone())
            .ok_or_else(|| AppError::Internal("PayPal order has no approval link".into()))?;

        Ok(GatewaySession {
            external_id: created.id,
            redirect_url: approval_url,
        })
    }

    /// Look up an order by its PayPal id.
    pub async fn get_order(&self, order_id: &str) -> Result<PayPalOrder> {
        let token = self.access_token().await?;

        let response = self
            .client
            .get(format!(
                "{}/v2/checkout/orders/{}",
                self.config.base_url(),
                order_id
            ))
            .bearer_auth(&token)
            .send()
            .await
            .map_err(AppError::from_gateway_http)?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(AppError::Gateway {
                reason: super::FailureReason::GatewayError,
                message: format!("PayPal order lookup failed: {}", status),
            });
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to parse PayPal order: {}", e)))?;

        Ok(parse_order(&body))
    }

    /// Capture an approved order. An already-captured order is reported as
    /// completed (idempotent from the reconciler's point of view).
    pub async fn capture_order(&self, order_id: &str) -> Result<Captured> {
        let token = self.access_token().await?;

        let response = self
            .client
            .post(format!(
                "{}/v2/checkout/orders/{}/capture",
                self.config.base_url(),
                order_id
            ))
            .bearer_auth(&token)
            .header("Content-Type", "application/json")
            .send()
            .await
            .map_err(AppError::from_gateway_http)?;

        let status = response.status();
        let body: serde_json::Value = response.json().await.unwrap_or_default();

        if status.as_u16() == 422
            && body["details"]
                .as_array()
                .map(|d| {
                    d.iter()
                        .any(|i| i["issue"].as_str() == Some("ORDER_ALREADY_CAPTURED"))
                })
                .unwrap_or(false)
        {
            return Ok(Captured {
                completed: true,
                amount_cents: None,
                external_reference: None,
            });
        }

        if !status.is_success() {
            return Err(AppError::Gateway {
                reason: super::FailureReason::GatewayError,
                message: format!("PayPal capture failed ({}): {}", status, body),
            });
        }

        let order = parse_order(&body);
        let capture_amount = body["purchase_units"][0]["payments"]["captures"][0]["amount"]
            ["value"]
            .as_str()
            .and_then(decimal_to_cents);

        Ok(Captured {
            completed: order.status == "COMPLETED",
            amount_cents: capture_amount.or(order.amount_cents),
            external_reference: order.reference,
        })
    }

    /// Verify a webhook delivery via PayPal's verification API.
    ///
    /// Without a configured webhook id there is nothing to verify against;
    /// the payload is trusted and a warning is logged. That degraded mode is
    /// deliberate and visible, not a silent bypass.
    pub async fn verify_webhook_signature(
        &self,
        raw_body: &[u8],
        headers: &HeaderMap,
    ) -> Result<bool> {
        let webhook_id = match &self.config.webhook_id {
            Some(id) => id.clone(),
            None => {
                tracing::warn!(
                    "PAYPAL_WEBHOOK_ID not configured - webhook payload trusted without verification"
                );
                return Ok(true);
            }
        };

        let header = |name: &str| -> Result<String> {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(String::from)
                .ok_or_else(|| {
                    AppError::WebhookVerification(format!("Missing header: {}", name))
                })
        };

        let event: serde_json::Value = serde_json::from_slice(raw_body)
            .map_err(|e| AppError::WebhookVerification(format!("Invalid JSON body: {}", e)))?;

        // PayPal sends the certificate as either a URL or an id depending
        // on the integration vintage.
        let cert = headers
            .get("paypal-cert-url")
            .or_else(|| headers.get("paypal-cert-id"))
            .and_then(|v| v.to_str().ok())
            .map(String::from)
            .ok_or_else(|| AppError::WebhookVerification("Missing certificate header".into()))?;

        let body = json!({
            "auth_algo": header("paypal-auth-algo")?,
            "cert_url": cert,
            "transmission_id": header("paypal-transmission-id")?,
            "transmission_sig": header("paypal-transmission-sig")?,
            "transmission_time": header("paypal-transmission-time")?,
            "webhook_id": webhook_id,
            "webhook_event": event,
        });

        let token = self.access_token().await?;
        let response = self
            .client
            .post(format!(
                "{}/v1/notifications/verify-webhook-signature",
                self.config.base_url()
            ))
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await
            .map_err(AppError::from_gateway_http)?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(AppError::WebhookVerification(format!(
                "Verification API returned {}",
                status
            )));
        }

        let result: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AppError::WebhookVerification(format!("Bad verification body: {}", e)))?;

        Ok(result["verification_status"].as_str() == Some("SUCCESS"))
    }
}

fn parse_order(body: &serde_json::Value) -> PayPalOrder {
    let unit = &body["purchase_units"][0];
    PayPalOrder {
        id: body["id"].as_str().unwrap_or_default().to_string(),
        status: body["status"].as_str().unwrap_or_default().to_string(),
        reference: unit["reference_id"].as_str().map(String::from),
        amount_cents: unit["amount"]["value"].as_str().and_then(decimal_to_cents),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_order_payload() {
        let body = serde_json::json!({
            "id": "5O190127TN364715T",
            "status": "APPROVED",
            "purchase_units": [{
                "reference_id": "ORD-20260115-4F7A2C",
                "amount": { "currency_code": "USD", "value": "40.00" },
            }],
        });
        let order = parse_order(&body);
        assert_eq!(order.id, "5O190127TN364715T");
        assert_eq!(order.status, "APPROVED");
        assert_eq!(order.reference.as_deref(), Some("ORD-20260115-4F7A2C"));
        assert_eq!(order.amount_cents, Some(4000));
    }
}
