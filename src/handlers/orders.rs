//! Order status polling and guest license claiming.
//!
//! The pending page polls `check_status` while the webhook race resolves;
//! the endpoint is read-only and safe to call arbitrarily often.

use axum::extract::State;
use serde::{Deserialize, Serialize};

use crate::db::{queries, AppState};
use crate::error::{AppError, OptionExt, Result};
use crate::extractors::{Json, Query};
use crate::licenses;
use crate::models::PaymentStatus;
use crate::util::looks_like_email;

#[derive(Debug, Deserialize)]
pub struct CheckStatusQuery {
    /// ORD- order number or DON- transaction id.
    pub order: String,
}

#[derive(Debug, Serialize)]
pub struct CheckStatusResponse {
    pub success: bool,
    pub status: PaymentStatus,
    /// Failure reason code, present only for failed orders.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

pub async fn check_status(
    State(state): State<AppState>,
    Query(query): Query<CheckStatusQuery>,
) -> Result<Json<CheckStatusResponse>> {
    let conn = state.db.get()?;
    let reference = query.order.trim();

    let (status, reason) = if reference.starts_with("DON-") {
        let donation = queries::get_donation_by_transaction_id(&conn, reference)?
            .or_not_found("Unknown reference")?;
        (donation.payment_status, None)
    } else {
        let order = queries::get_order_by_number(&conn, reference)?
            .or_not_found("Unknown reference")?;
        (order.payment_status, order.failure_reason)
    };

    Ok(Json(CheckStatusResponse {
        success: status == PaymentStatus::Completed,
        status,
        reason,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ClaimLicensesRequest {
    pub user_id: String,
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct ClaimLicensesResponse {
    pub success: bool,
    pub claimed: usize,
}

/// Attach guest purchases to a registered account with a matching email.
pub async fn claim_licenses(
    State(state): State<AppState>,
    Json(request): Json<ClaimLicensesRequest>,
) -> Result<Json<ClaimLicensesResponse>> {
    if request.user_id.trim().is_empty() {
        return Err(AppError::BadRequest("user_id is required".into()));
    }
    if !looks_like_email(&request.email) {
        return Err(AppError::BadRequest("A valid email is required".into()));
    }

    let conn = state.db.get()?;
    let claimed = licenses::claim_guest(&conn, &request.user_id, &request.email)?;
    Ok(Json(ClaimLicensesResponse {
        success: true,
        claimed,
    }))
}
