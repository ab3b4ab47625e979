//! Checkout endpoint tests: validation, the free-order short circuit, and
//! status polling.

use axum::{body::Body, http::Request};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

mod common;
use common::*;

async fn post_form(app: axum::Router, uri: &str, body: String) -> (axum::http::StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/x-www-form-urlencoded")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

fn checkout_form(session_id: &str, method: &str) -> String {
    format!(
        "session_id={}&customer_name=Test+Customer&customer_email=buyer%40example.com\
         &payment_method={}&accept_terms=on",
        session_id, method
    )
}

#[tokio::test]
async fn test_free_checkout_completes_immediately() {
    let state = create_test_app_state();
    {
        let conn = state.db.get().unwrap();
        let free = create_test_product(&conn, "Lite Plugin", 0);
        cart::add(&conn, "sess-1", &free.id, 1).unwrap();
    }

    let (status, body) = post_form(
        app(state.clone()),
        "/api/payments/process_payment",
        checkout_form("sess-1", "paypal"),
    )
    .await;

    assert_eq!(status, axum::http::StatusCode::OK);
    assert_eq!(body["success"], Value::Bool(true));
    let order_number = body["order_number"].as_str().unwrap().to_string();
    assert!(order_number.starts_with("ORD-"));
    assert!(body["redirect_url"]
        .as_str()
        .unwrap()
        .contains("success.php"));

    let conn = state.db.get().unwrap();
    let order = queries::get_order_by_number(&conn, &order_number)
        .unwrap()
        .unwrap();
    assert_eq!(order.payment_status, PaymentStatus::Completed);
    assert_eq!(order.payment_method, "free");
    assert_eq!(order.total_amount_cents, 0);

    // License granted without any gateway involvement
    let granted = queries::get_licenses_for_order(&conn, &order.id).unwrap();
    assert_eq!(granted.len(), 1);
    assert!(granted[0].is_active);

    // Cart cleared after commit
    assert!(queries::get_cart_items(&conn, "sess-1").unwrap().is_empty());
}

#[tokio::test]
async fn test_checkout_requires_accepted_terms() {
    let state = create_test_app_state();
    {
        let conn = state.db.get().unwrap();
        let product = create_test_product(&conn, "Pro Plugin", 4000);
        cart::add(&conn, "sess-1", &product.id, 1).unwrap();
    }

    let form = "session_id=sess-1&customer_name=Test&customer_email=buyer%40example.com\
                &payment_method=paypal";
    let (status, _) = post_form(
        app(state),
        "/api/payments/process_payment",
        form.to_string(),
    )
    .await;

    assert_eq!(status, axum::http::StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_checkout_rejects_bad_email() {
    let state = create_test_app_state();
    {
        let conn = state.db.get().unwrap();
        let product = create_test_product(&conn, "Pro Plugin", 4000);
        cart::add(&conn, "sess-1", &product.id, 1).unwrap();
    }

    let form = "session_id=sess-1&customer_name=Test&customer_email=not-an-email\
                &payment_method=paypal&accept_terms=on";
    let (status, _) = post_form(
        app(state),
        "/api/payments/process_payment",
        form.to_string(),
    )
    .await;

    assert_eq!(status, axum::http::StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_checkout_empty_cart_rejected() {
    let state = create_test_app_state();

    let (status, _) = post_form(
        app(state),
        "/api/payments/process_payment",
        checkout_form("sess-empty", "paypal"),
    )
    .await;

    assert_eq!(status, axum::http::StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_checkout_collects_all_cart_problems() {
    let state = create_test_app_state();
    {
        let conn = state.db.get().unwrap();
        let retired = create_test_product(&conn, "Retired Plugin", 4000);
        let gone = create_test_product(&conn, "Gone Plugin", 2000);
        cart::add(&conn, "sess-1", &retired.id, 1).unwrap();
        cart::add(&conn, "sess-1", &gone.id, 1).unwrap();
        queries::set_product_active(&conn, &retired.id, false).unwrap();
        conn.execute("DELETE FROM products WHERE id = ?1", [&gone.id])
            .unwrap();
    }

    let (status, body) = post_form(
        app(state),
        "/api/payments/process_payment",
        checkout_form("sess-1", "paypal"),
    )
    .await;

    assert_eq!(status, axum::http::StatusCode::CONFLICT);
    let reasons = body["reasons"].as_array().unwrap();
    // Both the inactive and the deleted product are reported at once
    assert_eq!(reasons.len(), 2);
}

#[tokio::test]
async fn test_checkout_unknown_method_rejected() {
    let state = create_test_app_state();
    {
        let conn = state.db.get().unwrap();
        let product = create_test_product(&conn, "Pro Plugin", 4000);
        cart::add(&conn, "sess-1", &product.id, 1).unwrap();
    }

    let (status, _) = post_form(
        app(state),
        "/api/payments/process_payment",
        checkout_form("sess-1", "stripe"),
    )
    .await;

    assert_eq!(status, axum::http::StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_checkout_unconfigured_gateway_rejected() {
    // Paid cart, but no PayPal credentials in the registry
    let state = create_test_app_state();
    {
        let conn = state.db.get().unwrap();
        let product = create_test_product(&conn, "Pro Plugin", 4000);
        cart::add(&conn, "sess-1", &product.id, 1).unwrap();
    }

    let (status, _) = post_form(
        app(state),
        "/api/payments/process_payment",
        checkout_form("sess-1", "paypal"),
    )
    .await;

    assert_eq!(status, axum::http::StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_check_status_pending_then_completed() {
    let state = create_test_app_state();
    let order_number = {
        let mut conn = state.db.get().unwrap();
        let (_, order) = setup_pending_order(&mut conn, 4000);
        order.order_number
    };

    let response = app(state.clone())
        .oneshot(
            Request::builder()
                .uri(format!("/api/orders/check_status?order={}", order_number))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), axum::http::StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["success"], Value::Bool(false));
    assert_eq!(body["status"], Value::String("pending".into()));

    {
        let conn = state.db.get().unwrap();
        orders::mark_completed(&conn, &order_number, Some("PAY-1"), None).unwrap();
    }

    let response = app(state)
        .oneshot(
            Request::builder()
                .uri(format!("/api/orders/check_status?order={}", order_number))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["success"], Value::Bool(true));
    assert_eq!(body["status"], Value::String("completed".into()));
}

#[tokio::test]
async fn test_check_status_failed_exposes_reason_code() {
    let state = create_test_app_state();
    let order_number = {
        let mut conn = state.db.get().unwrap();
        let (_, order) = setup_pending_order(&mut conn, 4000);
        orders::mark_failed(&conn, &order.order_number, "insufficient_funds").unwrap();
        order.order_number
    };

    let response = app(state)
        .oneshot(
            Request::builder()
                .uri(format!("/api/orders/check_status?order={}", order_number))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["status"], Value::String("failed".into()));
    assert_eq!(body["reason"], Value::String("insufficient_funds".into()));
}

#[tokio::test]
async fn test_check_status_unknown_reference_404() {
    let state = create_test_app_state();

    let response = app(state)
        .oneshot(
            Request::builder()
                .uri("/api/orders/check_status?order=ORD-20260101-XXXXXX")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), axum::http::StatusCode::NOT_FOUND);
}
