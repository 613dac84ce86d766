//! Refunds and cancellations with compensating stock reversal.
//!
//! Full-amount reversals void the payment by gateway payment id and restore
//! stock; partial refunds target a payment-transaction id and accumulate in
//! the refund ledger until it reaches the original total. Gateway failures
//! change nothing locally.

use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::db::DbPool;
use crate::entities::{order, order_item, product, refund_event};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::gateway::{GatewayError, PaymentGateway};
use crate::models::{OrderStatus, PaymentStatus};

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct RefundRequest {
    /// Minor units; absent means the full remaining amount.
    pub amount_minor: Option<i64>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RefundStatus {
    Refunded,
    PartialRefunded,
    AlreadyRefunded,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RefundOutcome {
    pub order_id: Uuid,
    pub status: RefundStatus,
    pub amount_minor: i64,
    pub refunded_total_minor: i64,
}

#[derive(Clone)]
pub struct RefundService {
    db: Arc<DbPool>,
    gateway: Arc<dyn PaymentGateway>,
    event_sender: Option<EventSender>,
    currency: String,
}

impl RefundService {
    pub fn new(
        db: Arc<DbPool>,
        gateway: Arc<dyn PaymentGateway>,
        event_sender: Option<EventSender>,
        currency: String,
    ) -> Self {
        Self {
            db,
            gateway,
            event_sender,
            currency,
        }
    }

    /// Refunds or cancels an order. Authorized for admins and the order's
    /// owner; already-refunded orders are a no-op success.
    #[instrument(skip(self, caller, request), fields(order_id = %order_id))]
    pub async fn refund(
        &self,
        order_id: Uuid,
        caller: &AuthenticatedUser,
        request: RefundRequest,
    ) -> Result<RefundOutcome, ServiceError> {
        let db = &*self.db;

        let found = order::Entity::find_by_id(order_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("order {} not found", order_id)))?;

        let is_owner = found.user_id == Some(caller.user_id);
        if !(caller.is_admin() || is_owner) {
            return Err(ServiceError::Forbidden(
                "only an admin or the order owner may refund".to_string(),
            ));
        }

        if found.payment_state() == PaymentStatus::Refunded {
            return Ok(RefundOutcome {
                order_id,
                status: RefundStatus::AlreadyRefunded,
                amount_minor: 0,
                refunded_total_minor: found.refunded_total_minor,
            });
        }

        let total = found.total_amount_minor;
        let ledger = found.refunded_total_minor;

        if let Some(amount) = request.amount_minor {
            if amount <= 0 {
                return Err(ServiceError::ValidationError(
                    "refund amount must be positive".to_string(),
                ));
            }
            if ledger + amount > total {
                return Err(ServiceError::ValidationError(format!(
                    "refund of {} exceeds the remaining refundable amount {}",
                    amount,
                    total - ledger
                )));
            }
        }

        // An unpaid order has nothing to void at the gateway; it is closed
        // out locally.
        if found.payment_state() == PaymentStatus::Unpaid {
            if request.amount_minor.is_some() && request.amount_minor != Some(total) {
                return Err(ServiceError::InvalidOperation(
                    "cannot partially refund an unpaid order".to_string(),
                ));
            }
            // Stock was never decremented for an unpaid order, so none is
            // restored here.
            return self
                .finalize(&found, "cancel", 0, None, request.reason, false)
                .await;
        }

        let amount = request.amount_minor.unwrap_or(total - ledger);
        let is_full_cancel = ledger == 0 && amount == total;

        let (kind, reference) = if is_full_cancel {
            let payment_id = found.payment_id.clone().ok_or_else(|| {
                ServiceError::ValidationError(
                    "order has no gateway payment id to cancel".to_string(),
                )
            })?;
            let ack = self
                .gateway
                .cancel_payment(&payment_id)
                .await
                .map_err(map_gateway_error)?;
            ("cancel", ack.reference)
        } else {
            // Partial refunds need the transaction id; never guess.
            let transaction_id = found.payment_transaction_id.clone().ok_or_else(|| {
                ServiceError::ValidationError(
                    "order has no payment transaction id for a partial refund".to_string(),
                )
            })?;
            let ack = self
                .gateway
                .refund_transaction(&transaction_id, amount, &self.currency)
                .await
                .map_err(map_gateway_error)?;
            ("refund", ack.reference)
        };

        self.finalize(&found, kind, amount, reference, request.reason, is_full_cancel)
            .await
    }

    /// Applies the local effects after the gateway accepted the operation:
    /// ledger row, order state, stock restore for full cancels.
    async fn finalize(
        &self,
        found: &order::Model,
        kind: &str,
        amount: i64,
        gateway_reference: Option<String>,
        reason: Option<String>,
        restore_stock: bool,
    ) -> Result<RefundOutcome, ServiceError> {
        let db = &*self.db;
        let now = Utc::now();

        refund_event::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(found.id),
            kind: Set(kind.to_string()),
            amount_minor: Set(amount),
            gateway_reference: Set(gateway_reference.clone()),
            reason: Set(reason),
            created_at: Set(now),
        }
        .insert(db)
        .await?;

        let new_ledger = found.refunded_total_minor + amount;
        let fully_refunded = kind == "cancel" || new_ledger >= found.total_amount_minor;
        let new_payment_status = if fully_refunded {
            PaymentStatus::Refunded
        } else {
            PaymentStatus::PartialRefunded
        };

        // A refunded order becomes cancelled unless fulfillment already
        // advanced to shipped/delivered, which is preserved.
        let current_status = found.order_status();
        let new_status = if fully_refunded
            && !matches!(current_status, OrderStatus::Shipped | OrderStatus::Delivered)
        {
            OrderStatus::Cancelled
        } else {
            current_status
        };

        let debug = append_debug(found.payment_debug.as_deref(), kind, amount, &gateway_reference);

        let mut active: order::ActiveModel = found.clone().into();
        active.refunded_total_minor = Set(new_ledger);
        active.payment_status = Set(new_payment_status.to_string());
        active.status = Set(new_status.to_string());
        active.payment_debug = Set(Some(debug));
        active.updated_at = Set(now);
        active.version = Set(found.version + 1);
        active.update(db).await?;

        if restore_stock {
            self.restore_stock(found.id).await?;
        }

        if fully_refunded && new_status == OrderStatus::Cancelled {
            if let Some(sender) = &self.event_sender {
                if let Err(e) = sender.send(Event::OrderCancelled(found.id)).await {
                    warn!(order_id = %found.id, error = %e, "failed to send order cancelled event");
                }
            }
        }

        info!(
            order_id = %found.id,
            kind,
            amount_minor = amount,
            refunded_total_minor = new_ledger,
            "refund applied"
        );

        Ok(RefundOutcome {
            order_id: found.id,
            status: if fully_refunded {
                RefundStatus::Refunded
            } else {
                RefundStatus::PartialRefunded
            },
            amount_minor: amount,
            refunded_total_minor: new_ledger,
        })
    }

    /// Read current stock, add the quantity back, write. Full cancels only;
    /// partial refunds leave stock untouched.
    async fn restore_stock(&self, order_id: Uuid) -> Result<(), ServiceError> {
        let db = &*self.db;
        let items = order_item::Entity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(db)
            .await?;

        for item in items {
            let Some(found) = product::Entity::find_by_id(item.product_id).one(db).await? else {
                warn!(product_id = %item.product_id, "refunded order references missing product");
                continue;
            };

            let new_stock = found.stock_qty + item.quantity;
            let mut active: product::ActiveModel = found.into();
            active.stock_qty = Set(new_stock);
            active.updated_at = Set(Utc::now());
            active.update(db).await?;
        }

        Ok(())
    }
}

fn map_gateway_error(error: GatewayError) -> ServiceError {
    match error {
        GatewayError::Rejected(message) => ServiceError::PaymentFailed(message),
        other => ServiceError::GatewayError(other.to_string()),
    }
}

/// Appends the refund result to the order's audit trail without discarding
/// what earlier gateway calls recorded.
fn append_debug(
    existing: Option<&str>,
    kind: &str,
    amount: i64,
    reference: &Option<String>,
) -> String {
    let mut debug: serde_json::Value = existing
        .and_then(|text| serde_json::from_str(text).ok())
        .unwrap_or_else(|| json!({}));

    debug["refund_result"] = json!({
        "kind": kind,
        "amount_minor": amount,
        "gateway_reference": reference,
        "applied_at": Utc::now().to_rfc3339(),
    });

    debug.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_trail_preserves_existing_entries() {
        let existing = json!({ "paymentId": "pay-1" }).to_string();
        let merged = append_debug(Some(&existing), "refund", 2_000, &Some("tx-1".to_string()));
        let parsed: serde_json::Value = serde_json::from_str(&merged).unwrap();
        assert_eq!(parsed["paymentId"], "pay-1");
        assert_eq!(parsed["refund_result"]["amount_minor"], 2_000);
        assert_eq!(parsed["refund_result"]["kind"], "refund");
    }

    #[test]
    fn debug_trail_survives_unparseable_existing_state() {
        let merged = append_debug(Some("not json"), "cancel", 500, &None);
        let parsed: serde_json::Value = serde_json::from_str(&merged).unwrap();
        assert_eq!(parsed["refund_result"]["kind"], "cancel");
    }
}
