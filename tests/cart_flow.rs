//! Cart endpoint tests: add/update/remove semantics and totals arithmetic.

use axum::{body::Body, http::Request};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

mod common;
use common::*;

async fn post_json(app: axum::Router, uri: &str, body: Value) -> (axum::http::StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_string(&body).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn test_update_cart_adds_line_and_returns_totals() {
    let state = create_test_app_state();
    let product_id = {
        let conn = state.db.get().unwrap();
        create_test_product(&conn, "Pro Plugin", 4000).id
    };

    let (status, body) = post_json(
        app(state),
        "/api/cart/update",
        json!({
            "session_id": "sess-1",
            "product_id": product_id,
            "quantity": 2
        }),
    )
    .await;

    assert_eq!(status, axum::http::StatusCode::OK);
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["totals"]["items_count"], json!(2));
    assert_eq!(body["totals"]["subtotal_cents"], json!(8000));
    // 16% of $80.00
    assert_eq!(body["totals"]["tax_cents"], json!(1280));
    assert_eq!(body["totals"]["total_cents"], json!(9280));
}

#[tokio::test]
async fn test_update_cart_quantity_zero_removes_line() {
    let state = create_test_app_state();
    let product_id = {
        let conn = state.db.get().unwrap();
        let product = create_test_product(&conn, "Pro Plugin", 4000);
        cart::add(&conn, "sess-1", &product.id, 2).unwrap();
        product.id
    };

    let (status, body) = post_json(
        app(state),
        "/api/cart/update",
        json!({
            "session_id": "sess-1",
            "product_id": product_id,
            "quantity": 0
        }),
    )
    .await;

    assert_eq!(status, axum::http::StatusCode::OK);
    assert_eq!(body["items"].as_array().unwrap().len(), 0);
    assert_eq!(body["totals"]["total_cents"], json!(0));
}

#[tokio::test]
async fn test_update_cart_clamps_quantity_to_ten() {
    let state = create_test_app_state();
    let product_id = {
        let conn = state.db.get().unwrap();
        create_test_product(&conn, "Pro Plugin", 1000).id
    };

    let (status, body) = post_json(
        app(state),
        "/api/cart/update",
        json!({
            "session_id": "sess-1",
            "product_id": product_id,
            "quantity": 99
        }),
    )
    .await;

    assert_eq!(status, axum::http::StatusCode::OK);
    assert_eq!(body["totals"]["items_count"], json!(10));
}

#[tokio::test]
async fn test_update_cart_inactive_product_rejected() {
    let state = create_test_app_state();
    let product_id = {
        let conn = state.db.get().unwrap();
        let product = create_test_product(&conn, "Retired Plugin", 4000);
        queries::set_product_active(&conn, &product.id, false).unwrap();
        product.id
    };

    let (status, _) = post_json(
        app(state),
        "/api/cart/update",
        json!({
            "session_id": "sess-1",
            "product_id": product_id,
            "quantity": 1
        }),
    )
    .await;

    assert_eq!(status, axum::http::StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_clear_cart_empties_session_only() {
    let state = create_test_app_state();
    {
        let conn = state.db.get().unwrap();
        let product = create_test_product(&conn, "Pro Plugin", 4000);
        cart::add(&conn, "sess-1", &product.id, 1).unwrap();
        cart::add(&conn, "sess-2", &product.id, 3).unwrap();
    }

    let (status, body) = post_json(
        app(state.clone()),
        "/api/cart/clear",
        json!({ "session_id": "sess-1" }),
    )
    .await;

    assert_eq!(status, axum::http::StatusCode::OK);
    assert_eq!(body["items"].as_array().unwrap().len(), 0);

    // The other session's cart is untouched
    let conn = state.db.get().unwrap();
    let other = queries::get_cart_items(&conn, "sess-2").unwrap();
    assert_eq!(other.len(), 1);
    assert_eq!(other[0].quantity, 3);
}

#[tokio::test]
async fn test_get_cart_free_items_contribute_zero() {
    let state = create_test_app_state();
    {
        let conn = state.db.get().unwrap();
        let paid = create_test_product(&conn, "Pro Plugin", 4000);
        let free = create_test_product(&conn, "Lite Plugin", 0);
        cart::add(&conn, "sess-1", &paid.id, 1).unwrap();
        cart::add(&conn, "sess-1", &free.id, 2).unwrap();
    }

    let response = app(state)
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/api/cart?session_id=sess-1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), axum::http::StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["totals"]["items_count"], json!(3));
    assert_eq!(body["totals"]["subtotal_cents"], json!(4000));
}

#[tokio::test]
async fn test_add_merges_quantities_with_cap() {
    let conn = setup_test_db();
    let product = create_test_product(&conn, "Pro Plugin", 1000);

    cart::add(&conn, "sess-1", &product.id, 6).unwrap();
    cart::add(&conn, "sess-1", &product.id, 6).unwrap();

    let items = queries::get_cart_items(&conn, "sess-1").unwrap();
    assert_eq!(items.len(), 1);
    // 6 + 6 capped at 10
    assert_eq!(items[0].quantity, 10);
}

#[tokio::test]
async fn test_cart_endpoints_share_one_pooled_connection() {
    // The fixture pool holds a single connection; each handler must finish
    // with the connection it checked out instead of taking a second one.
    let state = create_test_app_state();
    let product_id = {
        let conn = state.db.get().unwrap();
        create_test_product(&conn, "Pro Plugin", 4000).id
    };

    let (status, body) = post_json(
        app(state.clone()),
        "/api/cart/update",
        json!({ "session_id": "sess-1", "product_id": product_id, "quantity": 1 }),
    )
    .await;
    assert_eq!(status, axum::http::StatusCode::OK);
    assert_eq!(body["totals"]["items_count"], json!(1));

    let response = app(state.clone())
        .oneshot(
            Request::builder()
                .uri("/api/cart?session_id=sess-1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), axum::http::StatusCode::OK);

    let (status, body) = post_json(
        app(state),
        "/api/cart/clear",
        json!({ "session_id": "sess-1" }),
    )
    .await;
    assert_eq!(status, axum::http::StatusCode::OK);
    assert_eq!(body["totals"]["items_count"], json!(0));
}
