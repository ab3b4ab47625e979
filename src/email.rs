//! Transactional email for order confirmations and donation receipts.
//!
//! Three modes:
//! 1. POST to a webhook URL (for DIY email delivery)
//! 2. Send via the Resend API (when an API key is configured)
//! 3. Disabled (log only)
//!
//! Dispatch happens only when a status transition actually applied, so a
//! replayed webhook never produces a second email.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;

use crate::error::{AppError, Result};
use crate::models::{Order, OrderItem};
use crate::payments::cents_to_decimal;

/// Retry delays in seconds (exponential backoff: 1s, 4s, 16s)
const RETRY_DELAYS: &[u64] = &[1, 4, 16];

const RESEND_API_URL: &str = "https://api.resend.com/emails";

/// Format a Unix timestamp as a human-readable date (e.g., "Jan 15, 2026")
fn format_date(timestamp: i64) -> String {
    DateTime::<Utc>::from_timestamp(timestamp, 0)
        .map(|dt| dt.format("%b %d, %Y").to_string())
        .unwrap_or_else(|| "Unknown date".to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailSendResult {
    Sent,
    Disabled,
}

#[derive(Debug, Serialize)]
struct ResendRequest<'a> {
    from: &'a str,
    to: Vec<&'a str>,
    subject: String,
    html: String,
}

/// Payload POSTed to the delivery webhook instead of Resend.
#[derive(Debug, Serialize)]
struct WebhookNotification<'a> {
    to: &'a str,
    subject: &'a str,
    html: &'a str,
}

#[derive(Clone)]
pub struct EmailService {
    client: Client,
    api_key: Option<String>,
    webhook_url: Option<String>,
    from: String,
}

impl EmailService {
    pub fn new(api_key: Option<String>, webhook_url: Option<String>, from: String) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            api_key,
            webhook_url,
            from,
        }
    }

    /// Order confirmation with the purchased items and download note.
    pub async fn send_order_confirmation(
        &self,
        order: &Order,
        items: &[OrderItem],
    ) -> Result<EmailSendResult> {
        let subject = format!("Order {} confirmed", order.order_number);

        let mut rows = String::new();
        for item in items {
            rows.push_str(&format!(
                "<tr><td>{}</td><td>{}</td><td>${}</td></tr>",
                item.product_name,
                item.quantity,
                cents_to_decimal(item.price_cents * item.quantity),
            ));
        }

        let html = format!(
            r#"<h2>Thanks for your purchase, {}!</h2>
<p>Your order <strong>{}</strong> from {} is confirmed.</p>
<table>
<tr><th>Product</th><th>Qty</th><th>Total</th></tr>
{}
</table>
<p>Total: <strong>${} {}</strong></p>
<p>Your downloads are now available in your account dashboard.</p>"#,
            order.customer_name,
            order.order_number,
            format_date(order.created_at),
            rows,
            cents_to_decimal(order.total_amount_cents),
            order.currency,
        );

        self.send(&order.customer_email, subject, html).await
    }

    /// Donation receipt.
    pub async fn send_donation_thanks(
        &self,
        donor_email: &str,
        donor_name: Option<&str>,
        amount_cents: i64,
        currency: &str,
    ) -> Result<EmailSendResult> {
        let subject = "Thank you for your donation".to_string();
        let html = format!(
            r#"<h2>Thank you{}!</h2>
<p>We received your donation of <strong>${} {}</strong>. It means a lot.</p>"#,
            donor_name.map(|n| format!(", {}", n)).unwrap_or_default(),
            cents_to_decimal(amount_cents),
            currency,
        );
        self.send(donor_email, subject, html).await
    }

    async fn send(&self, to: &str, subject: String, html: String) -> Result<EmailSendResult> {
        if let Some(webhook_url) = &self.webhook_url {
            return self.post_webhook(webhook_url, to, &subject, &html).await;
        }

        let api_key = match &self.api_key {
            Some(key) => key,
            None => {
                tracing::info!("Email disabled - would send '{}' to {}", subject, to);
                return Ok(EmailSendResult::Disabled);
            }
        };

        let request = ResendRequest {
            from: &self.from,
            to: vec![to],
            subject,
            html,
        };

        let mut last_err: Option<AppError> = None;
        for (attempt, delay_secs) in std::iter::once(&0u64).chain(RETRY_DELAYS).enumerate() {
            // Sleep before retry (skip on first attempt)
            if *delay_secs > 0 {
                tracing::warn!(attempt, delay_secs, "Retrying email send after failure");
                tokio::time::sleep(Duration::from_secs(*delay_secs)).await;
            }

            match self.send_resend_request(api_key, &request).await {
                Ok(()) => return Ok(EmailSendResult::Sent),
                Err((error, is_transient)) => {
                    if is_transient {
                        last_err = Some(error);
                    } else {
                        return Err(error);
                    }
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| AppError::Internal("email delivery retries exhausted".into())))
    }

    /// One request to Resend. Err carries whether the failure is transient
    /// (network, 429, 5xx) and therefore worth retrying.
    async fn send_resend_request(
        &self,
        api_key: &str,
        request: &ResendRequest<'_>,
    ) -> std::result::Result<(), (AppError, bool)> {
        let response = self
            .client
            .post(RESEND_API_URL)
            .bearer_auth(api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| (AppError::Internal(format!("email send failed: {}", e)), true))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let is_transient = status.as_u16() == 429 || status.is_server_error();
        Err((
            AppError::Internal(format!("Resend returned {}", status)),
            is_transient,
        ))
    }

    async fn post_webhook(
        &self,
        url: &str,
        to: &str,
        subject: &str,
        html: &str,
    ) -> Result<EmailSendResult> {
        let payload = WebhookNotification { to, subject, html };
        let response = self
            .client
            .post(url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| AppError::Internal(format!("email webhook failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::Internal(format!(
                "email webhook returned {}",
                response.status()
            )));
        }
        Ok(EmailSendResult::Sent)
    }
}
