//! License granting and guest-claim tests.

use axum::{body::Body, http::Request};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

mod common;
use common::*;

#[test]
fn test_grant_copies_product_terms_at_grant_time() {
    let mut conn = setup_test_db();
    let (product, order) = setup_pending_order(&mut conn, 4000);

    orders::mark_completed(&conn, &order.order_number, None, None).unwrap();
    let order = queries::get_order_by_number(&conn, &order.order_number)
        .unwrap()
        .unwrap();
    let before = now();
    let granted = licenses::grant_for_order(&conn, &order).unwrap();

    assert_eq!(granted.len(), 1);
    let license = &granted[0];
    assert_eq!(license.product_id, product.id);
    assert_eq!(license.download_limit, 5);
    assert_eq!(license.customer_email, "buyer@example.com");
    // 365-day window anchored at grant time
    let expires = license.updates_expires_at.unwrap();
    assert!(expires >= before + 365 * 86_400);
    assert!(expires <= now() + 365 * 86_400);

    // Later catalog changes never touch the granted license
    conn.execute(
        "UPDATE products SET download_limit = 99 WHERE id = ?1",
        [&product.id],
    )
    .unwrap();
    let after = queries::get_licenses_for_order(&conn, &order.id).unwrap();
    assert_eq!(after[0].download_limit, 5);
}

#[test]
fn test_grant_survives_deleted_product() {
    let mut conn = setup_test_db();
    let (product, order) = setup_pending_order(&mut conn, 4000);

    orders::mark_completed(&conn, &order.order_number, None, None).unwrap();
    conn.execute("DELETE FROM products WHERE id = ?1", [&product.id])
        .unwrap();

    let order = queries::get_order_by_number(&conn, &order.order_number)
        .unwrap()
        .unwrap();
    let granted = licenses::grant_for_order(&conn, &order).unwrap();

    // Order item still says what was sold; defaults fill the gaps
    assert_eq!(granted.len(), 1);
    assert_eq!(granted[0].download_limit, 5);
    assert_eq!(granted[0].updates_expires_at, None);
}

#[test]
fn test_guest_claim_attaches_matching_email_only() {
    let mut conn = setup_test_db();
    let product = create_test_product(&conn, "Pro Plugin", 4000);
    cart::add(&conn, "sess-1", &product.id, 1).unwrap();
    let order = create_pending_order(&mut conn, "sess-1", "guest@example.com", "paypal");

    cart::add(&conn, "sess-2", &product.id, 1).unwrap();
    let other = create_pending_order(&mut conn, "sess-2", "other@example.com", "paypal");

    for o in [&order, &other] {
        orders::mark_completed(&conn, &o.order_number, None, None).unwrap();
        let row = queries::get_order_by_number(&conn, &o.order_number)
            .unwrap()
            .unwrap();
        licenses::grant_for_order(&conn, &row).unwrap();
    }

    let claimed = licenses::claim_guest(&conn, "user-42", "guest@example.com").unwrap();
    assert_eq!(claimed, 1);

    let mine = queries::get_licenses_for_user(&conn, "user-42").unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].customer_email, "guest@example.com");

    // Re-claim is a no-op, and the other guest's license stays unclaimed
    assert_eq!(
        licenses::claim_guest(&conn, "user-42", "guest@example.com").unwrap(),
        0
    );
}

#[tokio::test]
async fn test_claim_endpoint() {
    let state = create_test_app_state();
    {
        let mut conn = state.db.get().unwrap();
        let (_, order) = setup_pending_order(&mut conn, 4000);
        orders::mark_completed(&conn, &order.order_number, None, None).unwrap();
        let row = queries::get_order_by_number(&conn, &order.order_number)
            .unwrap()
            .unwrap();
        licenses::grant_for_order(&conn, &row).unwrap();
    }

    let body = json!({ "user_id": "user-42", "email": "buyer@example.com" });
    let response = app(state)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/licenses/claim")
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_string(&body).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), axum::http::StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let parsed: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(parsed["claimed"], json!(1));
}
