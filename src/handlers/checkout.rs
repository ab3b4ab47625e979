//! Checkout endpoint: turn a validated cart into a pending order and a
//! gateway redirect (or complete it immediately when nothing is owed).

use axum::extract::State;
use serde::{Deserialize, Serialize};

use crate::checkout;
use crate::db::{queries, AppState};
use crate::error::{AppError, Result};
use crate::extractors::{Form, Json};
use crate::models::Customer;
use crate::orders;
use crate::payments::{PaymentMethod, SessionRequest};
use crate::util::looks_like_email;

#[derive(Debug, Deserialize)]
pub struct ProcessPaymentRequest {
    pub session_id: String,
    pub customer_name: String,
    pub customer_email: String,
    pub payment_method: String,
    /// Checkbox; form posts "on"/"1"/"true".
    #[serde(default)]
    pub accept_terms: Option<String>,
    /// Registered account placing the order, if any.
    #[serde(default)]
    pub user_id: Option<String>,
    /// Checkbox asking to create an account afterwards. Licenses are keyed
    /// by email either way, so the later claim flow picks them up.
    #[serde(default)]
    pub create_account: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ProcessPaymentResponse {
    pub success: bool,
    pub order_number: String,
    /// Where to send the buyer next: gateway approval page, or our own
    /// success/failed page.
    pub redirect_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

fn truthy(v: &Option<String>) -> bool {
    matches!(v.as_deref(), Some("on") | Some("1") | Some("true"))
}

pub async fn process_payment(
    State(state): State<AppState>,
    Form(request): Form<ProcessPaymentRequest>,
) -> Result<Json<ProcessPaymentResponse>> {
    if request.customer_name.trim().is_empty() {
        return Err(AppError::BadRequest("Customer name is required".into()));
    }
    if !looks_like_email(&request.customer_email) {
        return Err(AppError::BadRequest("A valid email is required".into()));
    }
    if !truthy(&request.accept_terms) {
        return Err(AppError::BadRequest("Terms must be accepted".into()));
    }

    let requested_method: PaymentMethod = request
        .payment_method
        .parse()
        .map_err(|_| AppError::BadRequest("Unknown payment method".into()))?;

    if request.user_id.is_none() && truthy(&request.create_account) {
        tracing::debug!(
            email = %request.customer_email,
            "guest requested account creation; licenses stay claimable by email"
        );
    }

    let customer = Customer {
        name: request.customer_name.trim().to_string(),
        email: request.customer_email.trim().to_lowercase(),
        user_id: request.user_id.clone(),
    };

    // Validate and snapshot, then create the order, all against catalog
    // state read inside this request. The snapshot is what gets charged.
    let snapshot = {
        let conn = state.db.get()?;
        checkout::validate(&conn, &request.session_id)?;
        checkout::prepare(&conn, &request.session_id, state.config.tax_rate_bps)?
    };

    // A zero total never touches a gateway, whatever method was selected.
    let method = if snapshot.requires_payment {
        requested_method
    } else {
        PaymentMethod::Free
    };

    let order = {
        let mut conn = state.db.get()?;
        orders::create_order(
            &mut conn,
            &snapshot,
            &customer,
            method.as_str(),
            &state.config.currency,
        )?
    };

    if !snapshot.requires_payment {
        return complete_free_order(&state, &request.session_id, &order.order_number).await;
    }

    let session_req = SessionRequest {
        reference: order.order_number.clone(),
        amount_cents: order.total_amount_cents,
        currency: order.currency.clone(),
        description: format!("Order {}", order.order_number),
        return_url: state
            .config
            .pending_url(&order.order_number, method.as_str()),
        cancel_url: state
            .config
            .failed_url("cancelled", &order.order_number),
    };

    let gateway = state.gateways.get(method)?;
    let session = match gateway.create_session(&session_req).await {
        Ok(s) => s,
        Err(AppError::Gateway { reason, message }) => {
            tracing::warn!(
                "Gateway session for {} failed: {} ({})",
                order.order_number,
                message,
                reason
            );
            let conn = state.db.get()?;
            orders::mark_failed(&conn, &order.order_number, reason.as_str())?;
            return Ok(Json(ProcessPaymentResponse {
                success: false,
                order_number: order.order_number.clone(),
                redirect_url: state
                    .config
                    .failed_url(reason.as_str(), &order.order_number),
                message: Some(reason.message().to_string()),
            }));
        }
        Err(e) => return Err(e),
    };

    {
        let conn = state.db.get()?;
        queries::set_order_payment_id(&conn, &order.order_number, &session.external_id)?;
        // Order row is committed; only now is the cart safe to drop.
        crate::cart::clear(&conn, &request.session_id)?;
    }

    tracing::info!(
        "Order {} awaiting payment via {} (session {})",
        order.order_number,
        method,
        session.external_id
    );

    Ok(Json(ProcessPaymentResponse {
        success: true,
        order_number: order.order_number,
        redirect_url: session.redirect_url,
        message: None,
    }))
}

/// Zero-total checkout: no gateway, completed on the spot.
async fn complete_free_order(
    state: &AppState,
    session_id: &str,
    order_number: &str,
) -> Result<Json<ProcessPaymentResponse>> {
    let conn = state.db.get()?;

    orders::mark_completed(&conn, order_number, None, None)?;
    let order = queries::get_order_by_number(&conn, order_number)?
        .ok_or_else(|| AppError::Internal("Order vanished after creation".into()))?;
    crate::licenses::grant_for_order(&conn, &order)?;
    crate::cart::clear(&conn, session_id)?;

    let items = queries::get_order_items(&conn, &order.id)?;
    let redirect_url = state.config.success_url(order_number);
    let order_number = order.order_number.clone();
    super::webhooks::send_order_email(state, order, items);

    tracing::info!("Free order {} completed at checkout", order_number);

    Ok(Json(ProcessPaymentResponse {
        success: true,
        order_number,
        redirect_url,
        message: Some("Order completed, no payment required".to_string()),
    }))
}
