//! Housekeeping sweeps: asymmetric grace windows, one bounded
//! re-resolution, idempotent repeat sweeps.

mod common;

use common::{OrderSeed, RetrieveOutcome, TestApp};
use orderflow_api::entities::order;
use orderflow_api::models::OrderStatus;
use sea_orm::EntityTrait;

#[tokio::test]
async fn abandoned_pending_orders_without_token_are_cancelled() {
    let app = TestApp::new().await;
    let mut seed = OrderSeed::default();
    seed.age_minutes = 31;
    let stale = app.seed_order(seed).await;

    let report = app.services().housekeeping.sweep().await.unwrap();
    assert_eq!(report.cancelled, 1);
    assert!(report.reconciled.is_empty());
    assert!(report.failed.is_empty());

    let stored = order::Entity::find_by_id(stale.id)
        .one(&*app.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.order_status(), OrderStatus::Cancelled);

    // Second sweep finds nothing pending: idempotent.
    let repeat = app.services().housekeeping.sweep().await.unwrap();
    assert_eq!(repeat.cancelled, 0);
    let untouched = order::Entity::find_by_id(stale.id)
        .one(&*app.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(untouched.order_status(), OrderStatus::Cancelled);
}

#[tokio::test]
async fn fresh_pending_orders_are_left_alone() {
    let app = TestApp::new().await;
    let mut seed = OrderSeed::default();
    seed.age_minutes = 5;
    let fresh = app.seed_order(seed).await;

    let report = app.services().housekeeping.sweep().await.unwrap();
    assert_eq!(report.cancelled, 0);

    let stored = order::Entity::find_by_id(fresh.id)
        .one(&*app.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.order_status(), OrderStatus::Pending);
}

#[tokio::test]
async fn stuck_order_with_token_reconciles_to_paid_on_gateway_success() {
    let app = TestApp::new().await;
    let mut seed = OrderSeed::default();
    seed.age_minutes = 20;
    seed.payment_token = Some("tok-stuck".to_string());
    let stuck = app.seed_order(seed).await;

    let report = app.services().housekeeping.sweep().await.unwrap();
    assert_eq!(report.reconciled, vec![stuck.id]);
    assert!(report.failed.is_empty());
    assert_eq!(app.gateway.retrieve_calls(), 1);

    let stored = order::Entity::find_by_id(stuck.id)
        .one(&*app.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.order_status(), OrderStatus::Paid);
}

#[tokio::test]
async fn stuck_order_is_forced_failed_when_retrieval_does_not_succeed() {
    let app = TestApp::new().await;
    app.gateway.set_retrieve_outcome(RetrieveOutcome::Unreachable);

    let mut seed = OrderSeed::default();
    seed.age_minutes = 20;
    seed.payment_token = Some("tok-stuck-2".to_string());
    let stuck = app.seed_order(seed).await;

    let report = app.services().housekeeping.sweep().await.unwrap();
    assert_eq!(report.failed, vec![stuck.id]);
    assert!(report.reconciled.is_empty());

    let stored = order::Entity::find_by_id(stuck.id)
        .one(&*app.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.order_status(), OrderStatus::Failed);
}

#[tokio::test]
async fn token_holding_orders_wait_for_the_shorter_window() {
    let app = TestApp::new().await;
    let mut seed = OrderSeed::default();
    // Inside the 15-minute reconcile window: too fresh to touch.
    seed.age_minutes = 10;
    seed.payment_token = Some("tok-fresh".to_string());
    let fresh = app.seed_order(seed).await;

    let report = app.services().housekeeping.sweep().await.unwrap();
    assert!(report.reconciled.is_empty());
    assert!(report.failed.is_empty());
    assert_eq!(app.gateway.retrieve_calls(), 0);

    let stored = order::Entity::find_by_id(fresh.id)
        .one(&*app.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.order_status(), OrderStatus::Pending);
}

#[tokio::test]
async fn abandoned_window_does_not_cancel_token_holding_orders() {
    let app = TestApp::new().await;
    app.gateway.set_retrieve_outcome(RetrieveOutcome::Failure);

    let mut seed = OrderSeed::default();
    seed.age_minutes = 45;
    seed.payment_token = Some("tok-old".to_string());
    let old = app.seed_order(seed).await;

    let report = app.services().housekeeping.sweep().await.unwrap();
    // Not "cancelled": the token routes it through re-resolution instead.
    assert_eq!(report.cancelled, 0);
    assert_eq!(report.failed, vec![old.id]);

    let stored = order::Entity::find_by_id(old.id)
        .one(&*app.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.order_status(), OrderStatus::Failed);
}
