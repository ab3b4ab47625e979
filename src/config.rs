use std::env;

/// Credentials for the PayPal REST API.
#[derive(Debug, Clone)]
pub struct PayPalConfig {
    pub client_id: String,
    pub client_secret: String,
    /// "sandbox" or "live"
    pub mode: String,
    /// Webhook ID from the PayPal dashboard. When absent, webhook payloads
    /// are trusted without verification (degraded mode, logged loudly).
    pub webhook_id: Option<String>,
}

impl PayPalConfig {
    pub fn base_url(&self) -> &'static str {
        if self.mode == "live" {
            "https://api-m.paypal.com"
        } else {
            "https://api-m.sandbox.paypal.com"
        }
    }
}

/// Credentials for the MercadoPago REST API.
#[derive(Debug, Clone)]
pub struct MercadoPagoConfig {
    pub access_token: String,
    /// Shared secret for x-signature verification. When absent, webhook
    /// payloads are trusted without verification (degraded mode).
    pub webhook_secret: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: String,
    /// Public base URL for redirect targets (success/failed/pending pages).
    pub base_url: String,
    /// Tax rate in basis points (e.g. 1600 = 16%). Applied to the subtotal.
    pub tax_rate_bps: i64,
    /// ISO 4217 currency code for all catalog prices.
    pub currency: String,
    pub paypal: Option<PayPalConfig>,
    pub mercadopago: Option<MercadoPagoConfig>,
    /// Resend API key for transactional email. None disables email.
    pub resend_api_key: Option<String>,
    /// Delivery webhook; when set, emails are POSTed here instead of Resend.
    pub email_webhook_url: Option<String>,
    pub email_from: String,
    pub dev_mode: bool,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let dev_mode = env::var("STOREFRONT_ENV")
            .map(|v| v == "dev" || v == "development")
            .unwrap_or(false);

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port: u16 = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3000);

        let base_url =
            env::var("BASE_URL").unwrap_or_else(|_| format!("http://{}:{}", host, port));

        let paypal = match (
            env::var("PAYPAL_CLIENT_ID"),
            env::var("PAYPAL_CLIENT_SECRET"),
        ) {
            (Ok(client_id), Ok(client_secret)) => Some(PayPalConfig {
                client_id,
                client_secret,
                mode: env::var("PAYPAL_MODE").unwrap_or_else(|_| "sandbox".to_string()),
                webhook_id: env::var("PAYPAL_WEBHOOK_ID").ok(),
            }),
            _ => None,
        };

        let mercadopago = env::var("MP_ACCESS_TOKEN").ok().map(|access_token| {
            MercadoPagoConfig {
                access_token,
                webhook_secret: env::var("MP_WEBHOOK_SECRET").ok(),
            }
        });

        Self {
            host,
            port,
            database_path: env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "storefront.db".to_string()),
            base_url,
            tax_rate_bps: env::var("TAX_RATE_BPS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
            currency: env::var("CURRENCY").unwrap_or_else(|_| "USD".to_string()),
            paypal,
            mercadopago,
            resend_api_key: env::var("RESEND_API_KEY").ok(),
            email_webhook_url: env::var("EMAIL_WEBHOOK_URL").ok(),
            email_from: env::var("EMAIL_FROM")
                .unwrap_or_else(|_| "store@example.com".to_string()),
            dev_mode,
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn success_url(&self, order_number: &str) -> String {
        format!("{}/pages/success.php?order={}", self.base_url, order_number)
    }

    pub fn failed_url(&self, reason: &str, order_number: &str) -> String {
        format!(
            "{}/pages/failed.php?reason={}&order={}",
            self.base_url, reason, order_number
        )
    }

    pub fn pending_url(&self, order_number: &str, method: &str) -> String {
        format!(
            "{}/pages/pending.php?order={}&method={}",
            self.base_url, order_number, method
        )
    }
}
