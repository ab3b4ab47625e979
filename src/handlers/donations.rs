//! Donation endpoint. Lifecycle mirrors orders (pending, webhook-driven
//! completion) with no license side effect.

use axum::extract::State;
use serde::{Deserialize, Serialize};

use crate::db::{queries, AppState};
use crate::error::{AppError, Result};
use crate::extractors::{Form, Json};
use crate::models::CreateDonation;
use crate::payments::{PaymentMethod, SessionRequest};
use crate::util::looks_like_email;

const MIN_DONATION_CENTS: i64 = 100;

#[derive(Debug, Deserialize)]
pub struct ProcessDonationRequest {
    pub amount_cents: i64,
    pub payment_method: String,
    #[serde(default)]
    pub donor_name: Option<String>,
    #[serde(default)]
    pub donor_email: Option<String>,
    #[serde(default)]
    pub donor_message: Option<String>,
    /// "Donate for product" target, if any.
    #[serde(default)]
    pub product_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ProcessDonationResponse {
    pub success: bool,
    pub transaction_id: String,
    pub redirect_url: String,
}

pub async fn process_donation(
    State(state): State<AppState>,
    Form(request): Form<ProcessDonationRequest>,
) -> Result<Json<ProcessDonationResponse>> {
    if request.amount_cents < MIN_DONATION_CENTS {
        return Err(AppError::BadRequest(format!(
            "Minimum donation is {} cents",
            MIN_DONATION_CENTS
        )));
    }
    if let Some(email) = &request.donor_email {
        if !looks_like_email(email) {
            return Err(AppError::BadRequest("Invalid donor email".into()));
        }
    }
    let method: PaymentMethod = request
        .payment_method
        .parse()
        .map_err(|_| AppError::BadRequest("Unknown payment method".into()))?;
    if method == PaymentMethod::Free {
        return Err(AppError::BadRequest(
            "Donations require a payment method".into(),
        ));
    }

    if let Some(product_id) = &request.product_id {
        let conn = state.db.get()?;
        if queries::get_product_by_id(&conn, product_id)?.is_none() {
            return Err(AppError::BadRequest("Unknown product".into()));
        }
    }

    let input = CreateDonation {
        amount_cents: request.amount_cents,
        currency: state.config.currency.clone(),
        payment_method: method.as_str().to_string(),
        donor_name: request.donor_name.clone(),
        donor_email: request.donor_email.clone(),
        donor_message: request.donor_message.clone(),
        product_id: request.product_id.clone(),
    };

    // Same collision discipline as order numbers: the UNIQUE constraint
    // backs the generated id, one retry with a fresh reference.
    let donation = {
        let conn = state.db.get()?;
        let mut created = None;
        for _ in 0..2 {
            let transaction_id = queries::generate_reference("DON");
            match queries::create_donation(&conn, &transaction_id, &input) {
                Ok(d) => {
                    created = Some(d);
                    break;
                }
                Err(AppError::Database(e))
                    if e.sqlite_error_code()
                        == Some(rusqlite::ErrorCode::ConstraintViolation) =>
                {
                    tracing::warn!("Donation reference collision: {}", transaction_id);
                }
                Err(e) => return Err(e),
            }
        }
        created.ok_or_else(|| {
            AppError::Internal("Could not allocate a unique donation reference".into())
        })?
    };

    let session_req = SessionRequest {
        reference: donation.transaction_id.clone(),
        amount_cents: donation.amount_cents,
        currency: donation.currency.clone(),
        description: "Donation".to_string(),
        return_url: state
            .config
            .pending_url(&donation.transaction_id, method.as_str()),
        cancel_url: state
            .config
            .failed_url("cancelled", &donation.transaction_id),
    };

    let gateway = state.gateways.get(method)?;
    let session = gateway.create_session(&session_req).await.map_err(|e| {
        if let AppError::Gateway { reason, message } = &e {
            tracing::warn!(
                "Gateway session for donation {} failed: {} ({})",
                donation.transaction_id,
                message,
                reason
            );
        }
        e
    })?;

    {
        let conn = state.db.get()?;
        queries::set_donation_payment_id(&conn, &donation.transaction_id, &session.external_id)?;
    }

    tracing::info!(
        "Donation {} awaiting payment via {}",
        donation.transaction_id,
        method
    );

    Ok(Json(ProcessDonationResponse {
        success: true,
        transaction_id: donation.transaction_id,
        redirect_url: session.redirect_url,
    }))
}
