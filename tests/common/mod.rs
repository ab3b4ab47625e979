//! Test utilities and fixtures for storefront integration tests

#![allow(dead_code)]

use axum::Router;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use std::sync::Arc;

pub use storefront::config::{Config, MercadoPagoConfig, PayPalConfig};
pub use storefront::db::{init_db, queries, AppState};
pub use storefront::email::EmailService;
pub use storefront::models::*;
pub use storefront::payments::GatewayRegistry;
pub use storefront::{cart, checkout, licenses, orders};

/// Create an in-memory test database with schema initialized
pub fn setup_test_db() -> Connection {
    let conn = Connection::open_in_memory().expect("Failed to create in-memory database");
    init_db(&conn).expect("Failed to initialize schema");
    conn
}

pub fn test_config() -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 3000,
        database_path: ":memory:".to_string(),
        base_url: "http://localhost:3000".to_string(),
        tax_rate_bps: 1600,
        currency: "USD".to_string(),
        paypal: None,
        mercadopago: None,
        resend_api_key: None,
        email_webhook_url: None,
        email_from: "store@test.local".to_string(),
        dev_mode: true,
    }
}

/// Create an AppState with an in-memory database and no gateways.
///
/// Pool size is 1 on purpose: every `get()` returns the same connection,
/// so all callers see the same in-memory database. Handlers only hold one
/// connection at a time.
pub fn create_test_app_state() -> AppState {
    create_test_app_state_with(test_config())
}

pub fn create_test_app_state_with(config: Config) -> AppState {
    let manager = SqliteConnectionManager::memory();
    let pool = Pool::builder().max_size(1).build(manager).unwrap();
    {
        let conn = pool.get().unwrap();
        init_db(&conn).unwrap();
    }

    let gateways = Arc::new(GatewayRegistry::from_config(&config));
    let email = EmailService::new(None, None, config.email_from.clone());

    AppState {
        db: pool,
        config: Arc::new(config),
        gateways,
        email,
    }
}

/// Config with PayPal in degraded verification mode (no webhook id): webhook
/// payloads are trusted, so endpoint tests need no signing.
pub fn config_with_paypal() -> Config {
    let mut config = test_config();
    config.paypal = Some(PayPalConfig {
        client_id: "test-client-id".to_string(),
        client_secret: "test-client-secret".to_string(),
        mode: "sandbox".to_string(),
        webhook_id: None,
    });
    config
}

pub fn config_with_mercadopago(webhook_secret: Option<&str>) -> Config {
    let mut config = test_config();
    config.mercadopago = Some(MercadoPagoConfig {
        access_token: "TEST-access-token".to_string(),
        webhook_secret: webhook_secret.map(String::from),
    });
    config
}

/// Full application router with all endpoints
pub fn app(state: AppState) -> Router {
    storefront::handlers::router().with_state(state)
}

pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Create a test product priced in cents
pub fn create_test_product(conn: &Connection, name: &str, price_cents: i64) -> Product {
    let input = CreateProduct {
        category_id: None,
        name: name.to_string(),
        slug: name.to_lowercase().replace(' ', "-"),
        description: None,
        image: None,
        price_cents,
        currency: "USD".to_string(),
        is_free: price_cents == 0,
        download_limit: 5,
        updates_exp_days: Some(365),
    };
    queries::create_product(conn, &input).expect("Failed to create test product")
}

/// Create a pending order straight from a populated cart
pub fn create_pending_order(
    conn: &mut Connection,
    session_id: &str,
    customer_email: &str,
    method: &str,
) -> Order {
    let snapshot =
        checkout::prepare(conn, session_id, 1600).expect("Failed to prepare checkout");
    let customer = Customer {
        name: "Test Customer".to_string(),
        email: customer_email.to_string(),
        user_id: None,
    };
    orders::create_order(conn, &snapshot, &customer, method, "USD")
        .expect("Failed to create test order")
}

/// Product in cart, order created, ready for webhook reconciliation
pub fn setup_pending_order(conn: &mut Connection, price_cents: i64) -> (Product, Order) {
    let product = create_test_product(conn, "Pro Plugin", price_cents);
    cart::add(conn, "sess-1", &product.id, 1).expect("Failed to add to cart");
    let order = create_pending_order(conn, "sess-1", "buyer@example.com", "paypal");
    (product, order)
}
