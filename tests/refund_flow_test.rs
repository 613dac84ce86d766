//! Refund and cancellation flows: ledger accumulation, idempotency,
//! authorization, stock reversal, and fail-closed gateway handling.

mod common;

use assert_matches::assert_matches;
use common::{OrderSeed, TestApp};
use orderflow_api::auth::{AuthenticatedUser, ROLE_ADMIN};
use orderflow_api::entities::{order, product, refund_event};
use orderflow_api::errors::ServiceError;
use orderflow_api::models::{OrderStatus, PaymentStatus};
use orderflow_api::services::refunds::{RefundRequest, RefundStatus};
use sea_orm::EntityTrait;
use uuid::Uuid;

fn admin() -> AuthenticatedUser {
    AuthenticatedUser {
        user_id: Uuid::new_v4(),
        role: ROLE_ADMIN.to_string(),
    }
}

fn customer(user_id: Uuid) -> AuthenticatedUser {
    AuthenticatedUser {
        user_id,
        role: "customer".to_string(),
    }
}

#[tokio::test]
async fn partial_refunds_accumulate_until_fully_refunded() {
    let app = TestApp::new().await;
    let seeded = app.seed_order(OrderSeed::paid(5_000)).await;

    let first = app
        .services()
        .refunds
        .refund(
            seeded.id,
            &admin(),
            RefundRequest {
                amount_minor: Some(2_000),
                reason: Some("damaged item".to_string()),
            },
        )
        .await
        .unwrap();
    assert_eq!(first.status, RefundStatus::PartialRefunded);
    assert_eq!(first.refunded_total_minor, 2_000);

    let second = app
        .services()
        .refunds
        .refund(
            seeded.id,
            &admin(),
            RefundRequest {
                amount_minor: Some(3_000),
                reason: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(second.status, RefundStatus::Refunded);
    assert_eq!(second.refunded_total_minor, 5_000);

    let stored = order::Entity::find_by_id(seeded.id)
        .one(&*app.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.payment_state(), PaymentStatus::Refunded);
    assert_eq!(stored.order_status(), OrderStatus::Cancelled);
    assert_eq!(app.gateway.refund_calls(), 2);
    assert_eq!(app.gateway.cancel_calls(), 0);

    let ledger = refund_event::Entity::find().all(&*app.db).await.unwrap();
    assert_eq!(ledger.len(), 2);
    assert_eq!(ledger.iter().map(|e| e.amount_minor).sum::<i64>(), 5_000);
}

#[tokio::test]
async fn refunded_order_is_a_noop_on_repeat() {
    let app = TestApp::new().await;
    let item = app.seed_product("RF-1", 2_500, 3).await;
    let mut seed = OrderSeed::paid(5_000);
    seed.items = vec![(item.id, 2, 2_500)];
    let seeded = app.seed_order(seed).await;

    app.services()
        .refunds
        .refund(seeded.id, &admin(), RefundRequest::default())
        .await
        .unwrap();
    let cancel_calls = app.gateway.cancel_calls();
    let stock_after_refund = product::Entity::find_by_id(item.id)
        .one(&*app.db)
        .await
        .unwrap()
        .unwrap()
        .stock_qty;

    let repeat = app
        .services()
        .refunds
        .refund(seeded.id, &admin(), RefundRequest::default())
        .await
        .unwrap();
    assert_eq!(repeat.status, RefundStatus::AlreadyRefunded);
    assert_eq!(repeat.amount_minor, 0);

    // No further gateway call, no further stock mutation.
    assert_eq!(app.gateway.cancel_calls(), cancel_calls);
    let stock_after_repeat = product::Entity::find_by_id(item.id)
        .one(&*app.db)
        .await
        .unwrap()
        .unwrap()
        .stock_qty;
    assert_eq!(stock_after_repeat, stock_after_refund);
}

#[tokio::test]
async fn full_cancel_restores_stock_for_every_item() {
    let app = TestApp::new().await;
    let item = app.seed_product("RF-2", 2_500, 5).await;
    let mut seed = OrderSeed::paid(5_000);
    seed.items = vec![(item.id, 2, 2_500)];
    let seeded = app.seed_order(seed).await;

    let outcome = app
        .services()
        .refunds
        .refund(seeded.id, &admin(), RefundRequest::default())
        .await
        .unwrap();
    assert_eq!(outcome.status, RefundStatus::Refunded);
    assert_eq!(outcome.amount_minor, 5_000);
    assert_eq!(app.gateway.cancel_calls(), 1);

    let restocked = product::Entity::find_by_id(item.id)
        .one(&*app.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(restocked.stock_qty, 7);
}

#[tokio::test]
async fn partial_refund_does_not_restore_stock() {
    let app = TestApp::new().await;
    let item = app.seed_product("RF-3", 2_500, 5).await;
    let mut seed = OrderSeed::paid(5_000);
    seed.items = vec![(item.id, 2, 2_500)];
    let seeded = app.seed_order(seed).await;

    app.services()
        .refunds
        .refund(
            seeded.id,
            &admin(),
            RefundRequest {
                amount_minor: Some(1_000),
                reason: None,
            },
        )
        .await
        .unwrap();

    let untouched = product::Entity::find_by_id(item.id)
        .one(&*app.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(untouched.stock_qty, 5);
}

#[tokio::test]
async fn owner_may_refund_but_strangers_may_not() {
    let app = TestApp::new().await;
    let owner_id = Uuid::new_v4();
    let mut seed = OrderSeed::paid(5_000);
    seed.user_id = Some(owner_id);
    let seeded = app.seed_order(seed).await;

    let stranger = customer(Uuid::new_v4());
    let denied = app
        .services()
        .refunds
        .refund(seeded.id, &stranger, RefundRequest::default())
        .await;
    assert_matches!(denied, Err(ServiceError::Forbidden(_)));

    let allowed = app
        .services()
        .refunds
        .refund(seeded.id, &customer(owner_id), RefundRequest::default())
        .await
        .unwrap();
    assert_eq!(allowed.status, RefundStatus::Refunded);
}

#[tokio::test]
async fn shipped_orders_keep_their_fulfillment_status_when_refunded() {
    let app = TestApp::new().await;
    let mut seed = OrderSeed::paid(5_000);
    seed.status = OrderStatus::Shipped;
    let seeded = app.seed_order(seed).await;

    app.services()
        .refunds
        .refund(seeded.id, &admin(), RefundRequest::default())
        .await
        .unwrap();

    let stored = order::Entity::find_by_id(seeded.id)
        .one(&*app.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.order_status(), OrderStatus::Shipped);
    assert_eq!(stored.payment_state(), PaymentStatus::Refunded);
}

#[tokio::test]
async fn gateway_rejection_changes_nothing_locally() {
    let app = TestApp::new().await;
    let seeded = app.seed_order(OrderSeed::paid(5_000)).await;
    app.gateway.set_accept_operations(false);

    let result = app
        .services()
        .refunds
        .refund(seeded.id, &admin(), RefundRequest::default())
        .await;
    assert_matches!(result, Err(ServiceError::PaymentFailed(_)));

    let stored = order::Entity::find_by_id(seeded.id)
        .one(&*app.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.payment_state(), PaymentStatus::Paid);
    assert_eq!(stored.refunded_total_minor, 0);
    assert!(refund_event::Entity::find()
        .all(&*app.db)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn over_refund_is_rejected_before_the_gateway() {
    let app = TestApp::new().await;
    let seeded = app.seed_order(OrderSeed::paid(5_000)).await;

    let result = app
        .services()
        .refunds
        .refund(
            seeded.id,
            &admin(),
            RefundRequest {
                amount_minor: Some(6_000),
                reason: None,
            },
        )
        .await;
    assert_matches!(result, Err(ServiceError::ValidationError(_)));
    assert_eq!(app.gateway.refund_calls(), 0);
    assert_eq!(app.gateway.cancel_calls(), 0);
}

#[tokio::test]
async fn partial_refund_without_transaction_id_fails_fast() {
    let app = TestApp::new().await;
    let mut seed = OrderSeed::paid(5_000);
    seed.payment_transaction_id = None;
    let seeded = app.seed_order(seed).await;

    let result = app
        .services()
        .refunds
        .refund(
            seeded.id,
            &admin(),
            RefundRequest {
                amount_minor: Some(1_000),
                reason: None,
            },
        )
        .await;
    assert_matches!(result, Err(ServiceError::ValidationError(_)));
    assert_eq!(app.gateway.refund_calls(), 0);
}

#[tokio::test]
async fn unpaid_order_is_voided_locally_without_gateway() {
    let app = TestApp::new().await;
    let seeded = app.seed_order(OrderSeed::default()).await;

    let outcome = app
        .services()
        .refunds
        .refund(seeded.id, &admin(), RefundRequest::default())
        .await
        .unwrap();
    assert_eq!(outcome.status, RefundStatus::Refunded);
    assert_eq!(app.gateway.cancel_calls(), 0);
    assert_eq!(app.gateway.refund_calls(), 0);

    let stored = order::Entity::find_by_id(seeded.id)
        .one(&*app.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.order_status(), OrderStatus::Cancelled);
    assert_eq!(stored.payment_state(), PaymentStatus::Refunded);
}
