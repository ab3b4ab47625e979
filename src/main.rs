use axum::Router;
use clap::Parser;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use std::sync::Arc;

use storefront::config::Config;
use storefront::db::{create_pool, init_db, queries, AppState};
use storefront::email::EmailService;
use storefront::handlers;
use storefront::models::{CreateCategory, CreateProduct};
use storefront::payments::GatewayRegistry;

#[derive(Parser, Debug)]
#[command(name = "storefront")]
#[command(about = "Order and payment reconciliation service for a digital downloads shop")]
struct Cli {
    /// Seed the database with dev data (categories and products)
    #[arg(long)]
    seed: bool,

    /// Delete the database on exit (dev mode only, useful for fresh starts)
    #[arg(long)]
    ephemeral: bool,
}

/// Seeds the catalog with dev data for testing.
/// Only runs in dev mode and when the catalog is empty.
fn seed_dev_data(state: &AppState) {
    let conn = state.db.get().expect("Failed to get db connection for seeding");

    let existing = queries::list_active_products(&conn).expect("Failed to list products");
    if !existing.is_empty() {
        tracing::info!("Catalog already has products, skipping seed");
        return;
    }

    tracing::info!("Seeding dev catalog");

    let category = queries::create_category(
        &conn,
        &CreateCategory {
            name: "Plugins".to_string(),
            slug: "plugins".to_string(),
        },
    )
    .expect("Failed to create dev category");

    let paid = queries::create_product(
        &conn,
        &CreateProduct {
            category_id: Some(category.id.clone()),
            name: "Pro Plugin".to_string(),
            slug: "pro-plugin".to_string(),
            description: Some("Full-featured plugin license".to_string()),
            image: None,
            price_cents: 4000,
            currency: state.config.currency.clone(),
            is_free: false,
            download_limit: 5,
            updates_exp_days: Some(365),
        },
    )
    .expect("Failed to create dev product");

    let free = queries::create_product(
        &conn,
        &CreateProduct {
            category_id: Some(category.id),
            name: "Lite Plugin".to_string(),
            slug: "lite-plugin".to_string(),
            description: Some("Free starter plugin".to_string()),
            image: None,
            price_cents: 0,
            currency: state.config.currency.clone(),
            is_free: true,
            download_limit: 3,
            updates_exp_days: None,
        },
    )
    .expect("Failed to create dev product");

    tracing::info!("Seeded products: {} ({}), {} ({})", paid.name, paid.id, free.name, free.id);
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "storefront=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();

    if config.dev_mode {
        tracing::info!("Running in DEVELOPMENT mode");
    }
    if config.paypal.is_none() {
        tracing::warn!("PayPal is not configured (PAYPAL_CLIENT_ID/PAYPAL_CLIENT_SECRET)");
    }
    if config.mercadopago.is_none() {
        tracing::warn!("MercadoPago is not configured (MP_ACCESS_TOKEN)");
    }

    let db_pool = create_pool(&config.database_path).expect("Failed to create database pool");
    {
        let conn = db_pool.get().expect("Failed to get connection");
        init_db(&conn).expect("Failed to initialize database");
    }

    let gateways = Arc::new(GatewayRegistry::from_config(&config));
    let email = EmailService::new(
        config.resend_api_key.clone(),
        config.email_webhook_url.clone(),
        config.email_from.clone(),
    );

    let state = AppState {
        db: db_pool,
        config: Arc::new(config.clone()),
        gateways,
        email,
    };

    // Seed dev data if --seed flag is passed (only in dev mode)
    if cli.seed {
        if !config.dev_mode {
            tracing::warn!("--seed flag ignored: not in dev mode (set STOREFRONT_ENV=dev)");
        } else {
            seed_dev_data(&state);
        }
    }

    let app = Router::new()
        .merge(handlers::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    let cleanup_on_exit = cli.ephemeral && config.dev_mode;
    let db_path = config.database_path.clone();

    if cleanup_on_exit {
        tracing::info!("EPHEMERAL MODE: database will be deleted on exit");
    }

    tracing::info!("Storefront server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Failed to start server");

    if cleanup_on_exit {
        tracing::info!("Cleaning up ephemeral database...");
        if let Err(e) = std::fs::remove_file(&db_path) {
            tracing::warn!("Failed to remove {}: {}", db_path, e);
        } else {
            tracing::info!("Removed {}", db_path);
        }
        let _ = std::fs::remove_file(format!("{}-wal", db_path));
        let _ = std::fs::remove_file(format!("{}-shm", db_path));
    }
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    tracing::info!("Shutdown signal received, stopping server...");
}
