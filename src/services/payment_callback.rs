//! Asynchronous payment reconciliation.
//!
//! The gateway (or the housekeeper) hands over an opaque session token; the
//! outcome is established exclusively through server-to-server retrieval;
//! a client-asserted success flag is never trusted. Transitions are
//! conditional updates guarded by the transition table, which makes the
//! handler safely repeatable and gates the one-time stock decrement.

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::db::DbPool;
use crate::entities::{order, order_item, product};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::gateway::{GatewayPaymentStatus, PaymentGateway, RetrievedPayment};
use crate::models::{OrderStatus, PaymentStatus};

/// Callback input: any of the three identifiers, from body or query.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct CallbackParams {
    pub token: Option<String>,
    #[serde(rename = "conversationId", alias = "conversation_id")]
    pub conversation_id: Option<String>,
    #[serde(rename = "orderId", alias = "order_id")]
    pub order_id: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CallbackStatus {
    Success,
    Failure,
    Pending,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CallbackResolution {
    pub order_id: Option<Uuid>,
    pub status: CallbackStatus,
    /// Whether this call performed the transition (false on replays).
    pub updated: bool,
}

#[derive(Clone)]
pub struct PaymentCallbackService {
    db: Arc<DbPool>,
    gateway: Arc<dyn PaymentGateway>,
    event_sender: Option<EventSender>,
}

impl PaymentCallbackService {
    pub fn new(
        db: Arc<DbPool>,
        gateway: Arc<dyn PaymentGateway>,
        event_sender: Option<EventSender>,
    ) -> Self {
        Self {
            db,
            gateway,
            event_sender,
        }
    }

    /// Resolves a callback to a final order state. Identical calls
    /// re-resolve to the same answer without double effects.
    #[instrument(skip(self, params))]
    pub async fn resolve(&self, params: &CallbackParams) -> Result<CallbackResolution, ServiceError> {
        let Some(order) = self.find_order(params).await? else {
            // Nothing to correlate; acknowledge neutrally.
            return Ok(CallbackResolution {
                order_id: None,
                status: CallbackStatus::Pending,
                updated: false,
            });
        };

        // An order whose payment already resolved short-circuits: same final
        // status, no further gateway call, no repeated side effects.
        if order.order_status() == OrderStatus::Paid
            || order.payment_state() != PaymentStatus::Unpaid
        {
            return Ok(CallbackResolution {
                order_id: Some(order.id),
                status: CallbackStatus::Success,
                updated: false,
            });
        }

        let token = params
            .token
            .clone()
            .or_else(|| order.payment_token.clone());
        let Some(token) = token else {
            return Ok(CallbackResolution {
                order_id: Some(order.id),
                status: CallbackStatus::Pending,
                updated: false,
            });
        };

        // Persist a newly seen token right away so the housekeeper can
        // reconcile even if everything after this point fails.
        if order.payment_token.as_deref() != Some(token.as_str()) {
            let mut active: order::ActiveModel = order.clone().into();
            active.payment_token = Set(Some(token.clone()));
            active.updated_at = Set(Utc::now());
            active.update(&*self.db).await?;
        }

        let conversation_id = params
            .conversation_id
            .clone()
            .unwrap_or_else(|| order.conversation_id.clone());

        let retrieved = match self
            .gateway
            .retrieve_checkout(&token, Some(&conversation_id))
            .await
        {
            Ok(retrieved) => retrieved,
            Err(e) => {
                // Transport failure: leave the order exactly as it was.
                warn!(order_id = %order.id, error = %e, "gateway retrieval failed");
                return Ok(CallbackResolution {
                    order_id: Some(order.id),
                    status: CallbackStatus::Pending,
                    updated: false,
                });
            }
        };

        match retrieved.status {
            GatewayPaymentStatus::Success => {
                let updated = self.mark_paid(&order, &retrieved).await?;
                Ok(CallbackResolution {
                    order_id: Some(order.id),
                    status: CallbackStatus::Success,
                    updated,
                })
            }
            GatewayPaymentStatus::Failure => {
                let updated = self.mark_failed(&order, &retrieved).await?;
                Ok(CallbackResolution {
                    order_id: Some(order.id),
                    status: CallbackStatus::Failure,
                    updated,
                })
            }
        }
    }

    /// Matches first by order id, then by correlation id.
    async fn find_order(
        &self,
        params: &CallbackParams,
    ) -> Result<Option<order::Model>, ServiceError> {
        let db = &*self.db;

        if let Some(order_id) = params.order_id {
            if let Some(found) = order::Entity::find_by_id(order_id).one(db).await? {
                return Ok(Some(found));
            }
        }

        if let Some(conversation_id) = &params.conversation_id {
            let found = order::Entity::find()
                .filter(order::Column::ConversationId.eq(conversation_id.clone()))
                .order_by_desc(order::Column::CreatedAt)
                .one(db)
                .await?;
            return Ok(found);
        }

        Ok(None)
    }

    /// Conditional pending/failed -> paid transition. Returns true when this
    /// call performed it; stock decrement and notifications ride on that.
    async fn mark_paid(
        &self,
        order: &order::Model,
        retrieved: &RetrievedPayment,
    ) -> Result<bool, ServiceError> {
        let db = &*self.db;
        let now = Utc::now();
        let debug = payment_debug_json(retrieved);
        let allowed_from: Vec<String> = OrderStatus::sources_for(OrderStatus::Paid)
            .into_iter()
            .map(|status| status.to_string())
            .collect();

        let result = order::Entity::update_many()
            .col_expr(order::Column::Status, Expr::value(OrderStatus::Paid.to_string()))
            .col_expr(order::Column::PaymentStatus, Expr::value("paid"))
            .col_expr(order::Column::PaymentId, Expr::value(retrieved.payment_id.clone()))
            .col_expr(
                order::Column::PaymentTransactionId,
                Expr::value(retrieved.transaction_ids.first().cloned()),
            )
            .col_expr(order::Column::PaymentDebug, Expr::value(debug))
            .col_expr(order::Column::UpdatedAt, Expr::value(now))
            .col_expr(
                order::Column::Version,
                Expr::col(order::Column::Version).add(1),
            )
            .filter(order::Column::Id.eq(order.id))
            .filter(order::Column::Status.is_in(allowed_from))
            .exec(db)
            .await?;

        if result.rows_affected == 0 {
            return Ok(false);
        }

        info!(order_id = %order.id, "order paid");
        self.decrement_stock(order.id).await?;

        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender.send(Event::OrderPaid(order.id)).await {
                warn!(order_id = %order.id, error = %e, "failed to send order paid event");
            }
        }

        Ok(true)
    }

    /// Conditional pending -> failed transition.
    async fn mark_failed(
        &self,
        order: &order::Model,
        retrieved: &RetrievedPayment,
    ) -> Result<bool, ServiceError> {
        let db = &*self.db;
        let now = Utc::now();
        let debug = payment_debug_json(retrieved);

        let result = order::Entity::update_many()
            .col_expr(
                order::Column::Status,
                Expr::value(OrderStatus::Failed.to_string()),
            )
            .col_expr(order::Column::PaymentDebug, Expr::value(debug))
            .col_expr(order::Column::UpdatedAt, Expr::value(now))
            .col_expr(
                order::Column::Version,
                Expr::col(order::Column::Version).add(1),
            )
            .filter(order::Column::Id.eq(order.id))
            .filter(order::Column::Status.eq(OrderStatus::Pending.to_string()))
            .exec(db)
            .await?;

        let updated = result.rows_affected > 0;
        if updated {
            info!(order_id = %order.id, "order payment failed");
            if let Some(sender) = &self.event_sender {
                if let Err(e) = sender.send(Event::OrderPaymentFailed(order.id)).await {
                    warn!(order_id = %order.id, error = %e, "failed to send payment failed event");
                }
            }
        }

        Ok(updated)
    }

    /// Decrements live stock for every line of a freshly paid order and
    /// raises threshold alerts. Runs at most once per order, gated by the
    /// paid transition.
    async fn decrement_stock(&self, order_id: Uuid) -> Result<(), ServiceError> {
        let db = &*self.db;
        let items = order_item::Entity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(db)
            .await?;

        for item in items {
            let Some(found) = product::Entity::find_by_id(item.product_id).one(db).await? else {
                warn!(product_id = %item.product_id, "paid order references missing product");
                continue;
            };

            let new_stock = (found.stock_qty - item.quantity).max(0);
            let threshold = found.low_stock_threshold;
            let product_id = found.id;

            let mut active: product::ActiveModel = found.into();
            active.stock_qty = Set(new_stock);
            active.updated_at = Set(Utc::now());
            active.update(db).await?;

            if new_stock <= threshold {
                if let Some(sender) = &self.event_sender {
                    let _ = sender
                        .send(Event::StockLow {
                            product_id,
                            stock: new_stock,
                            threshold,
                        })
                        .await;
                }
            }
        }

        Ok(())
    }
}

fn payment_debug_json(retrieved: &RetrievedPayment) -> String {
    json!({
        "paymentStatus": match retrieved.status {
            GatewayPaymentStatus::Success => "SUCCESS",
            GatewayPaymentStatus::Failure => "FAILURE",
        },
        "paymentId": retrieved.payment_id,
        "errorCode": retrieved.error_code,
        "errorMessage": retrieved.error_message,
        "retrievedAt": Utc::now().to_rfc3339(),
        "raw": retrieved.raw,
    })
    .to_string()
}
