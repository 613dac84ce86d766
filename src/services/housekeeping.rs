//! Reconciliation housekeeping: no order stays pending forever.
//!
//! Two independent sweeps with asymmetric grace windows. An order that never
//! reached the gateway (no token) is abandoned and cancelled; an order with
//! a token carries real payment intent, so it gets exactly one pull-based
//! re-resolution before being forced to failed. The sweep contract is
//! trigger-independent: timer, admin endpoint and tests all call `sweep()`.

use chrono::{Duration, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QuerySelect};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::HousekeepingConfig;
use crate::db::DbPool;
use crate::entities::order;
use crate::errors::ServiceError;
use crate::models::OrderStatus;
use crate::services::payment_callback::{CallbackParams, CallbackStatus, PaymentCallbackService};

#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct SweepReport {
    /// Abandoned pending orders (no token) cancelled by this sweep.
    pub cancelled: u64,
    /// Orders whose one bounded re-resolution came back paid.
    pub reconciled: Vec<Uuid>,
    /// Orders forced to failed after the re-resolution didn't succeed.
    pub failed: Vec<Uuid>,
}

#[derive(Clone)]
pub struct HousekeepingService {
    db: Arc<DbPool>,
    callback: PaymentCallbackService,
    config: HousekeepingConfig,
}

impl HousekeepingService {
    pub fn new(
        db: Arc<DbPool>,
        callback: PaymentCallbackService,
        config: HousekeepingConfig,
    ) -> Self {
        Self {
            db,
            callback,
            config,
        }
    }

    /// One idempotent sweep over both categories of stale pending orders.
    #[instrument(skip(self))]
    pub async fn sweep(&self) -> Result<SweepReport, ServiceError> {
        let mut report = SweepReport::default();
        report.cancelled = self.cancel_abandoned().await?;

        let (reconciled, failed) = self.reconcile_stuck().await?;
        report.reconciled = reconciled;
        report.failed = failed;

        info!(
            cancelled = report.cancelled,
            reconciled = report.reconciled.len(),
            failed = report.failed.len(),
            "housekeeping sweep complete"
        );

        Ok(report)
    }

    /// Pending past the long grace window with no gateway token: the buyer
    /// never reached the gateway, cancel outright.
    async fn cancel_abandoned(&self) -> Result<u64, ServiceError> {
        let cutoff = Utc::now() - Duration::minutes(self.config.abandoned_after_mins);

        let result = order::Entity::update_many()
            .col_expr(
                order::Column::Status,
                Expr::value(OrderStatus::Cancelled.to_string()),
            )
            .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
            .col_expr(
                order::Column::Version,
                Expr::col(order::Column::Version).add(1),
            )
            .filter(order::Column::Status.eq(OrderStatus::Pending.to_string()))
            .filter(order::Column::CreatedAt.lt(cutoff))
            .filter(order::Column::PaymentToken.is_null())
            .exec(&*self.db)
            .await?;

        Ok(result.rows_affected)
    }

    /// Pending past the short grace window with a token: one bounded
    /// re-resolution through the callback retrieval path, then forced
    /// failure so nothing stays pending.
    async fn reconcile_stuck(&self) -> Result<(Vec<Uuid>, Vec<Uuid>), ServiceError> {
        let cutoff = Utc::now() - Duration::minutes(self.config.reconcile_after_mins);

        let stuck = order::Entity::find()
            .filter(order::Column::Status.eq(OrderStatus::Pending.to_string()))
            .filter(order::Column::CreatedAt.lt(cutoff))
            .filter(order::Column::PaymentToken.is_not_null())
            .limit(self.config.batch_limit)
            .all(&*self.db)
            .await?;

        let mut reconciled = Vec::new();
        let mut failed = Vec::new();

        for stale in stuck {
            let params = CallbackParams {
                order_id: Some(stale.id),
                ..Default::default()
            };
            let resolved = self.callback.resolve(&params).await;

            match resolved {
                Ok(resolution) if resolution.status == CallbackStatus::Success => {
                    reconciled.push(stale.id);
                }
                outcome => {
                    if let Err(e) = &outcome {
                        warn!(order_id = %stale.id, error = %e, "re-resolution errored, forcing failed");
                    }
                    self.force_failed(stale.id).await?;
                    failed.push(stale.id);
                }
            }
        }

        Ok((reconciled, failed))
    }

    /// Conditional pending -> failed; a no-op if the callback already moved
    /// the order.
    async fn force_failed(&self, order_id: Uuid) -> Result<(), ServiceError> {
        order::Entity::update_many()
            .col_expr(
                order::Column::Status,
                Expr::value(OrderStatus::Failed.to_string()),
            )
            .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
            .col_expr(
                order::Column::Version,
                Expr::col(order::Column::Version).add(1),
            )
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::Status.eq(OrderStatus::Pending.to_string()))
            .exec(&*self.db)
            .await?;
        Ok(())
    }
}

/// Timer trigger for deployments without an external scheduler. The sweep
/// itself is trigger-agnostic.
pub async fn run_scheduler(service: HousekeepingService, interval_secs: u64) {
    let mut ticker = tokio::time::interval(std::time::Duration::from_secs(interval_secs.max(1)));
    // The first tick fires immediately; skip it so startup isn't a sweep.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        if let Err(e) = service.sweep().await {
            warn!(error = %e, "housekeeping sweep failed");
        }
    }
}
