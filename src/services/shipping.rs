//! Shipping webhook receiver: carrier-agnostic, deduplicated, monotonic.
//!
//! Every processed event is journaled regardless of effect; the (source,
//! event id) journal doubles as the exactly-once gate for carrier retries.
//! Transitions consult the order-status rank table only, so a delayed
//! low-rank event can never undo shipped/delivered state.

use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::db::DbPool;
use crate::entities::{order, webhook_event};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::models::{map_carrier_status, OrderStatus};
use crate::webhooks::{body_hash, normalize, NormalizedEvent, SHIPPING_ALIASES};

pub const SOURCE_SHIPPING: &str = "shipping";

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct WebhookOutcome {
    pub ok: bool,
    pub order_id: Option<Uuid>,
    pub status: String,
    /// True when the event had no effect (regression blocked, same status).
    pub unchanged: bool,
    /// True when the event id was already processed.
    pub duplicate: bool,
}

#[derive(Clone)]
pub struct ShippingWebhookService {
    db: Arc<DbPool>,
    event_sender: Option<EventSender>,
}

impl ShippingWebhookService {
    pub fn new(db: Arc<DbPool>, event_sender: Option<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Processes one raw, already-authenticated carrier event.
    #[instrument(skip(self, raw_body, header_event_id))]
    pub async fn process(
        &self,
        raw_body: &[u8],
        header_event_id: Option<String>,
    ) -> Result<WebhookOutcome, ServiceError> {
        let payload: Value = serde_json::from_slice(raw_body)
            .map_err(|e| ServiceError::ValidationError(format!("invalid webhook body: {}", e)))?;
        let event = normalize(&payload, &SHIPPING_ALIASES);
        let event_id = header_event_id.or_else(|| event.event_id.clone());

        if let Some(event_id) = &event_id {
            if let Some(seen) = self.find_processed(event_id).await? {
                return Ok(WebhookOutcome {
                    ok: true,
                    order_id: seen.order_id,
                    status: seen.status_mapped,
                    unchanged: true,
                    duplicate: true,
                });
            }
        }

        let found = self.find_order(&event).await?.ok_or_else(|| {
            ServiceError::NotFound("no order matches the webhook payload".to_string())
        })?;

        let current = found.order_status();
        let mapped = event.status.as_deref().and_then(map_carrier_status);

        let has_tracking_fields = event.carrier.is_some()
            || event.tracking_number.is_some()
            || event.tracking_url.is_some();
        if mapped.is_none() && event.status.is_none() && !has_tracking_fields {
            return Err(ServiceError::ValidationError(
                "no usable fields in webhook payload".to_string(),
            ));
        }

        let (final_status, unchanged) = match mapped {
            Some(next) if next.rank() > current.rank() => {
                let applied = self.apply_transition(&found, next, &event).await?;
                if applied {
                    self.emit(next, found.id).await;
                    (next, false)
                } else {
                    (current, true)
                }
            }
            Some(_) => {
                // Lower or equal rank: a late event never regresses state.
                (current, true)
            }
            None => {
                let patched = self.patch_tracking_only(&found, &event).await?;
                (current, !patched)
            }
        };

        self.journal(&event, event_id, Some(found.id), raw_body, final_status.to_string())
            .await;

        Ok(WebhookOutcome {
            ok: true,
            order_id: Some(found.id),
            status: final_status.to_string(),
            unchanged,
            duplicate: false,
        })
    }

    async fn find_processed(
        &self,
        event_id: &str,
    ) -> Result<Option<webhook_event::Model>, ServiceError> {
        Ok(webhook_event::Entity::find()
            .filter(webhook_event::Column::Source.eq(SOURCE_SHIPPING))
            .filter(webhook_event::Column::EventId.eq(event_id))
            .one(&*self.db)
            .await?)
    }

    async fn find_order(
        &self,
        event: &NormalizedEvent,
    ) -> Result<Option<order::Model>, ServiceError> {
        let db = &*self.db;

        if let Some(raw_id) = &event.order_id {
            if let Ok(order_id) = raw_id.parse::<Uuid>() {
                if let Some(found) = order::Entity::find_by_id(order_id).one(db).await? {
                    return Ok(Some(found));
                }
            }
        }

        if let Some(order_number) = &event.order_number {
            let found = order::Entity::find()
                .filter(order::Column::OrderNumber.eq(order_number.clone()))
                .one(db)
                .await?;
            return Ok(found);
        }

        Ok(None)
    }

    /// Conditional update guarded by the currently-known status; shipped_at
    /// and delivered_at are set on first reach and never overwritten.
    async fn apply_transition(
        &self,
        found: &order::Model,
        next: OrderStatus,
        event: &NormalizedEvent,
    ) -> Result<bool, ServiceError> {
        let now = Utc::now();
        let occurred: DateTime<Utc> = event.occurred_at.unwrap_or(now);

        let mut update = order::Entity::update_many()
            .col_expr(order::Column::Status, Expr::value(next.to_string()))
            .col_expr(order::Column::UpdatedAt, Expr::value(now))
            .col_expr(
                order::Column::Version,
                Expr::col(order::Column::Version).add(1),
            );

        if let Some(carrier) = &event.carrier {
            update = update.col_expr(order::Column::Carrier, Expr::value(carrier.clone()));
        }
        if let Some(tracking_number) = &event.tracking_number {
            update = update.col_expr(
                order::Column::TrackingNumber,
                Expr::value(tracking_number.clone()),
            );
        }
        if let Some(tracking_url) = &event.tracking_url {
            update = update.col_expr(
                order::Column::TrackingUrl,
                Expr::value(tracking_url.clone()),
            );
        }

        if next == OrderStatus::Shipped && found.shipped_at.is_none() {
            update = update.col_expr(order::Column::ShippedAt, Expr::value(Some(occurred)));
        }
        if next == OrderStatus::Delivered && found.delivered_at.is_none() {
            update = update.col_expr(order::Column::DeliveredAt, Expr::value(Some(occurred)));
        }

        let result = update
            .filter(order::Column::Id.eq(found.id))
            .filter(order::Column::Status.eq(found.status.clone()))
            .exec(&*self.db)
            .await?;

        Ok(result.rows_affected > 0)
    }

    /// A payload carrying only tracking metadata updates those fields
    /// without touching the status axis.
    async fn patch_tracking_only(
        &self,
        found: &order::Model,
        event: &NormalizedEvent,
    ) -> Result<bool, ServiceError> {
        if event.carrier.is_none()
            && event.tracking_number.is_none()
            && event.tracking_url.is_none()
        {
            return Ok(false);
        }

        let mut active: order::ActiveModel = found.clone().into();
        if let Some(carrier) = &event.carrier {
            active.carrier = Set(Some(carrier.clone()));
        }
        if let Some(tracking_number) = &event.tracking_number {
            active.tracking_number = Set(Some(tracking_number.clone()));
        }
        if let Some(tracking_url) = &event.tracking_url {
            active.tracking_url = Set(Some(tracking_url.clone()));
        }
        active.updated_at = Set(Utc::now());
        active.update(&*self.db).await?;
        Ok(true)
    }

    /// Journals the event regardless of effect. Events without a caller
    /// event id get a generated one (no dedup possible for those).
    async fn journal(
        &self,
        event: &NormalizedEvent,
        event_id: Option<String>,
        order_id: Option<Uuid>,
        raw_body: &[u8],
        status_mapped: String,
    ) {
        let now = Utc::now();
        let row = webhook_event::ActiveModel {
            id: Set(Uuid::new_v4()),
            source: Set(SOURCE_SHIPPING.to_string()),
            event_id: Set(event_id.unwrap_or_else(|| Uuid::new_v4().to_string())),
            order_id: Set(order_id),
            return_id: Set(None),
            body_hash: Set(body_hash(raw_body)),
            status_raw: Set(event.status.clone()),
            status_mapped: Set(status_mapped),
            received_at: Set(now),
            processed_at: Set(now),
        };

        // Best-effort: journaling failure never fails the webhook.
        if let Err(e) = row.insert(&*self.db).await {
            warn!(error = %e, "failed to journal shipping webhook event");
        }
    }

    async fn emit(&self, status: OrderStatus, order_id: Uuid) {
        let Some(sender) = &self.event_sender else {
            return;
        };
        let event = match status {
            OrderStatus::Shipped => Event::OrderShipped(order_id),
            OrderStatus::Delivered => Event::OrderDelivered(order_id),
            _ => return,
        };
        if let Err(e) = sender.send(event).await {
            warn!(order_id = %order_id, error = %e, "failed to send shipping event");
        }
        info!(order_id = %order_id, status = %status, "shipping status advanced");
    }
}
