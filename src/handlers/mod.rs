mod cart;
mod checkout;
mod donations;
mod orders;
pub mod webhooks;

pub use cart::*;
pub use checkout::*;
pub use donations::*;
pub use orders::*;

use axum::{
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use crate::db::AppState;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/api/cart", get(get_cart))
        .route("/api/cart/update", post(update_cart))
        .route("/api/cart/clear", post(clear_cart))
        .route("/api/payments/process_payment", post(process_payment))
        .route("/api/donations/process", post(process_donation))
        .route("/api/orders/check_status", get(check_status))
        .route("/api/licenses/claim", post(claim_licenses))
        .merge(webhooks::router())
}
