//! Cart endpoints. The session id travels in the request body/query; there
//! is no server-side session state.

use axum::extract::State;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::cart;
use crate::db::{queries, AppState};
use crate::error::Result;
use crate::extractors::{Json, Query};
use crate::models::{CartLine, CartTotals};

#[derive(Debug, Deserialize)]
pub struct UpdateCartRequest {
    pub session_id: String,
    pub product_id: String,
    pub quantity: i64,
}

#[derive(Debug, Deserialize)]
pub struct ClearCartRequest {
    pub session_id: String,
}

#[derive(Debug, Serialize)]
pub struct CartResponse {
    pub success: bool,
    pub items: Vec<CartLine>,
    pub totals: CartTotals,
}

#[derive(Debug, Deserialize)]
pub struct CartQuery {
    pub session_id: String,
}

/// Set a line's quantity (0 removes it), then return the whole cart so the
/// page can re-render totals without a second round trip.
pub async fn update_cart(
    State(state): State<AppState>,
    Json(request): Json<UpdateCartRequest>,
) -> Result<Json<CartResponse>> {
    let conn = state.db.get()?;
    cart::update(
        &conn,
        &request.session_id,
        &request.product_id,
        request.quantity,
    )?;
    cart_response(&conn, &state, &request.session_id)
}

pub async fn clear_cart(
    State(state): State<AppState>,
    Json(request): Json<ClearCartRequest>,
) -> Result<Json<CartResponse>> {
    let conn = state.db.get()?;
    cart::clear(&conn, &request.session_id)?;
    cart_response(&conn, &state, &request.session_id)
}

pub async fn get_cart(
    State(state): State<AppState>,
    Query(query): Query<CartQuery>,
) -> Result<Json<CartResponse>> {
    let conn = state.db.get()?;
    cart_response(&conn, &state, &query.session_id)
}

// Takes the caller's connection: a second pool checkout here would deadlock
// once the pool is exhausted by concurrent cart requests.
fn cart_response(conn: &Connection, state: &AppState, session_id: &str) -> Result<Json<CartResponse>> {
    let items = queries::get_cart_lines(conn, session_id)?;
    let totals = cart::totals(conn, session_id, state.config.tax_rate_bps)?;
    Ok(Json(CartResponse {
        success: true,
        items,
        totals,
    }))
}
