//! Carrier webhook flows through the real HTTP surface: signature and
//! token authenticity, alias normalization, event-id dedup, monotonic rank
//! gating, set-once timestamps and journaling.

mod common;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use common::{sign_webhook, OrderSeed, TestApp};
use orderflow_api::entities::{order, return_request, webhook_event};
use orderflow_api::models::{OrderStatus, PaymentStatus, ReturnStatus};
use sea_orm::EntityTrait;
use serde_json::{json, Value};
use tower::ServiceExt;

async fn post_webhook(
    app: &TestApp,
    path: &str,
    body: Value,
    headers: &[(&str, String)],
) -> (StatusCode, Value) {
    let raw = body.to_string();
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri(path)
        .header("content-type", "application/json");
    for (name, value) in headers {
        builder = builder.header(*name, value);
    }
    let request = builder.body(Body::from(raw)).unwrap();

    let response = app.router().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

fn signed_headers(secret: &str, body: &Value, event_id: Option<&str>) -> Vec<(&'static str, String)> {
    let mut headers = vec![("x-signature", sign_webhook(secret, body.to_string().as_bytes()))];
    if let Some(event_id) = event_id {
        headers.push(("x-event-id", event_id.to_string()));
    }
    headers
}

#[tokio::test]
async fn delivered_event_advances_order_and_sets_timestamp_once() {
    let app = TestApp::new().await;
    let seeded = app.seed_order(OrderSeed::paid(5_000)).await;

    let body = json!({
        "order_id": seeded.id,
        "carrier": "fastship",
        "trackingNumber": "TRK-99",
        "status": "delivered",
        "delivered_at": "2025-06-01T10:30:00Z",
    });
    let headers = signed_headers("shipping-secret", &body, Some("evt-1"));

    let (status, payload) = post_webhook(&app, "/api/v1/webhooks/shipping", body.clone(), &headers).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payload["ok"], true);
    assert_eq!(payload["status"], "delivered");
    assert_eq!(payload["duplicate"], false);

    let stored = order::Entity::find_by_id(seeded.id)
        .one(&*app.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.order_status(), OrderStatus::Delivered);
    assert_eq!(stored.tracking_number.as_deref(), Some("TRK-99"));
    let delivered_at = stored.delivered_at.expect("delivered_at set");
    assert_eq!(delivered_at.to_rfc3339(), "2025-06-01T10:30:00+00:00");

    // Redelivery of the identical payload: acknowledged as duplicate, no
    // second journal row, timestamp untouched.
    let (status, payload) = post_webhook(&app, "/api/v1/webhooks/shipping", body, &headers).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payload["duplicate"], true);
    assert_eq!(payload["unchanged"], true);

    let journal = webhook_event::Entity::find().all(&*app.db).await.unwrap();
    assert_eq!(journal.len(), 1);
    assert_eq!(journal[0].event_id, "evt-1");
    assert_eq!(journal[0].status_mapped, "delivered");
    assert!(!journal[0].body_hash.is_empty());

    let after = order::Entity::find_by_id(seeded.id)
        .one(&*app.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(after.delivered_at, Some(delivered_at));
}

#[tokio::test]
async fn late_low_rank_event_never_regresses_delivered() {
    let app = TestApp::new().await;
    let seeded = app.seed_order(OrderSeed::paid(5_000)).await;

    let delivered = json!({ "order_id": seeded.id, "status": "delivered" });
    post_webhook(
        &app,
        "/api/v1/webhooks/shipping",
        delivered.clone(),
        &signed_headers("shipping-secret", &delivered, Some("evt-a")),
    )
    .await;

    // A delayed in-transit event arrives afterwards with a fresh id.
    let late = json!({ "order_id": seeded.id, "status": "in_transit" });
    let (status, payload) = post_webhook(
        &app,
        "/api/v1/webhooks/shipping",
        late.clone(),
        &signed_headers("shipping-secret", &late, Some("evt-b")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payload["unchanged"], true);
    assert_eq!(payload["status"], "delivered");

    let stored = order::Entity::find_by_id(seeded.id)
        .one(&*app.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.order_status(), OrderStatus::Delivered);

    // Both events were journaled even though the second had no effect.
    let journal = webhook_event::Entity::find().all(&*app.db).await.unwrap();
    assert_eq!(journal.len(), 2);
}

#[tokio::test]
async fn shipped_then_delivered_is_the_happy_path() {
    let app = TestApp::new().await;
    let seeded = app.seed_order(OrderSeed::paid(5_000)).await;

    let shipped = json!({ "orderId": seeded.id, "state": "accepted", "tn": "TRK-7" });
    let (_, payload) = post_webhook(
        &app,
        "/api/v1/webhooks/shipping",
        shipped.clone(),
        &signed_headers("shipping-secret", &shipped, Some("evt-s")),
    )
    .await;
    assert_eq!(payload["status"], "shipped");

    let mid = order::Entity::find_by_id(seeded.id)
        .one(&*app.db)
        .await
        .unwrap()
        .unwrap();
    assert!(mid.shipped_at.is_some());
    assert_eq!(mid.tracking_number.as_deref(), Some("TRK-7"));

    let delivered = json!({ "orderId": seeded.id, "state": "completed" });
    let (_, payload) = post_webhook(
        &app,
        "/api/v1/webhooks/shipping",
        delivered.clone(),
        &signed_headers("shipping-secret", &delivered, Some("evt-d")),
    )
    .await;
    assert_eq!(payload["status"], "delivered");
    assert_eq!(payload["unchanged"], false);
}

#[tokio::test]
async fn bad_signature_and_missing_auth_are_unauthorized() {
    let app = TestApp::new().await;
    let seeded = app.seed_order(OrderSeed::paid(5_000)).await;
    let body = json!({ "order_id": seeded.id, "status": "delivered" });

    let (status, _) = post_webhook(
        &app,
        "/api/v1/webhooks/shipping",
        body.clone(),
        &[("x-signature", "sha256=forged".to_string())],
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = post_webhook(&app, "/api/v1/webhooks/shipping", body, &[]).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let stored = order::Entity::find_by_id(seeded.id)
        .one(&*app.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.order_status(), OrderStatus::Paid);
}

#[tokio::test]
async fn legacy_token_header_still_authenticates() {
    let app = TestApp::new().await;
    let seeded = app.seed_order(OrderSeed::paid(5_000)).await;
    let body = json!({ "order_id": seeded.id, "status": "in_transit" });

    let (status, payload) = post_webhook(
        &app,
        "/api/v1/webhooks/shipping",
        body,
        &[("x-webhook-token", "shipping-token".to_string())],
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payload["status"], "shipped");
}

#[tokio::test]
async fn order_number_alias_resolves_the_order() {
    let app = TestApp::new().await;
    let seeded = app.seed_order(OrderSeed::paid(5_000)).await;
    let body = json!({ "order_number": seeded.order_number, "status": "shipped" });

    let (status, payload) = post_webhook(
        &app,
        "/api/v1/webhooks/shipping",
        body.clone(),
        &signed_headers("shipping-secret", &body, None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payload["order_id"], json!(seeded.id));
}

#[tokio::test]
async fn returns_webhook_drives_the_return_lifecycle_monotonically() {
    let app = TestApp::new().await;
    let seeded = app.seed_order(OrderSeed::paid(5_000)).await;
    let request = app.seed_return(seeded.id, ReturnStatus::Approved).await;

    let transit = json!({ "rid": request.id, "status": "return_in_transit" });
    let (status, payload) = post_webhook(
        &app,
        "/api/v1/webhooks/returns",
        transit.clone(),
        &signed_headers("returns-secret", &transit, Some("ret-1")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payload["status"], "in_transit");

    let received = json!({ "order_id": seeded.id, "status": "delivered" });
    let (_, payload) = post_webhook(
        &app,
        "/api/v1/webhooks/returns",
        received.clone(),
        &signed_headers("returns-secret", &received, Some("ret-2")),
    )
    .await;
    assert_eq!(payload["status"], "received");

    let stored = return_request::Entity::find_by_id(request.id)
        .one(&*app.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.return_status(), ReturnStatus::Received);
    let received_at = stored.received_at.expect("received_at set");

    // A late in-transit event cannot undo "received".
    let late = json!({ "rid": request.id, "status": "in_transit" });
    let (_, payload) = post_webhook(
        &app,
        "/api/v1/webhooks/returns",
        late.clone(),
        &signed_headers("returns-secret", &late, Some("ret-3")),
    )
    .await;
    assert_eq!(payload["unchanged"], true);

    let after = return_request::Entity::find_by_id(request.id)
        .one(&*app.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(after.return_status(), ReturnStatus::Received);
    assert_eq!(after.received_at, Some(received_at));
}

#[tokio::test]
async fn webhook_for_unknown_order_is_not_found() {
    let app = TestApp::new().await;
    let body = json!({ "order_id": uuid::Uuid::new_v4(), "status": "delivered" });
    let (status, _) = post_webhook(
        &app,
        "/api/v1/webhooks/shipping",
        body.clone(),
        &signed_headers("shipping-secret", &body, None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn payment_status_axis_is_untouched_by_shipping_events() {
    let app = TestApp::new().await;
    let seeded = app.seed_order(OrderSeed::paid(5_000)).await;
    let body = json!({ "order_id": seeded.id, "status": "delivered" });

    post_webhook(
        &app,
        "/api/v1/webhooks/shipping",
        body.clone(),
        &signed_headers("shipping-secret", &body, None),
    )
    .await;

    let stored = order::Entity::find_by_id(seeded.id)
        .one(&*app.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.payment_state(), PaymentStatus::Paid);
}
