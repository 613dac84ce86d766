//! Returns webhook receiver: the reverse-logistics twin of the shipping
//! receiver, driving return_requests through its own rank table with the
//! same dedup, journaling and set-once timestamp discipline.

use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::db::DbPool;
use crate::entities::{return_request, webhook_event};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::models::{map_return_status, ReturnStatus};
use crate::webhooks::{body_hash, normalize, NormalizedEvent, RETURNS_ALIASES};

pub const SOURCE_RETURNS: &str = "returns";

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ReturnWebhookOutcome {
    pub ok: bool,
    pub return_id: Option<Uuid>,
    pub status: String,
    pub unchanged: bool,
    pub duplicate: bool,
}

#[derive(Clone)]
pub struct ReturnsWebhookService {
    db: Arc<DbPool>,
    event_sender: Option<EventSender>,
}

impl ReturnsWebhookService {
    pub fn new(db: Arc<DbPool>, event_sender: Option<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Processes one raw, already-authenticated return-carrier event.
    #[instrument(skip(self, raw_body, header_event_id))]
    pub async fn process(
        &self,
        raw_body: &[u8],
        header_event_id: Option<String>,
    ) -> Result<ReturnWebhookOutcome, ServiceError> {
        let payload: Value = serde_json::from_slice(raw_body)
            .map_err(|e| ServiceError::ValidationError(format!("invalid webhook body: {}", e)))?;
        let event = normalize(&payload, &RETURNS_ALIASES);
        let event_id = header_event_id.or_else(|| event.event_id.clone());

        if let Some(event_id) = &event_id {
            if let Some(seen) = self.find_processed(event_id).await? {
                return Ok(ReturnWebhookOutcome {
                    ok: true,
                    return_id: seen.return_id,
                    status: seen.status_mapped,
                    unchanged: true,
                    duplicate: true,
                });
            }
        }

        let found = self.find_return(&event).await?.ok_or_else(|| {
            ServiceError::NotFound("no return request matches the webhook payload".to_string())
        })?;

        let current = found.return_status();
        let mapped = event.status.as_deref().and_then(map_return_status);

        let (final_status, unchanged) = match mapped {
            Some(next) if next.rank() > current.rank() => {
                let applied = self.apply_transition(&found, next, &event).await?;
                if applied {
                    self.emit(found.id, next).await;
                    (next, false)
                } else {
                    (current, true)
                }
            }
            _ => (current, true),
        };

        self.journal(&event, event_id, &found, raw_body, final_status.to_string())
            .await;

        Ok(ReturnWebhookOutcome {
            ok: true,
            return_id: Some(found.id),
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
            .filter(webhook_event::Column::Source.eq(SOURCE_RETURNS))
            .filter(webhook_event::Column::EventId.eq(event_id))
            .one(&*self.db)
            .await?)
    }

    /// Resolves the return by id when given, else the most recent return
    /// for the referenced order.
    async fn find_return(
        &self,
        event: &NormalizedEvent,
    ) -> Result<Option<return_request::Model>, ServiceError> {
        let db = &*self.db;

        if let Some(raw_id) = &event.return_id {
            if let Ok(return_id) = raw_id.parse::<Uuid>() {
                if let Some(found) = return_request::Entity::find_by_id(return_id).one(db).await? {
                    return Ok(Some(found));
                }
            }
        }

        if let Some(raw_order_id) = &event.order_id {
            if let Ok(order_id) = raw_order_id.parse::<Uuid>() {
                let found = return_request::Entity::find()
                    .filter(return_request::Column::OrderId.eq(order_id))
                    .order_by_desc(return_request::Column::CreatedAt)
                    .one(db)
                    .await?;
                return Ok(found);
            }
        }

        Ok(None)
    }

    async fn apply_transition(
        &self,
        found: &return_request::Model,
        next: ReturnStatus,
        event: &NormalizedEvent,
    ) -> Result<bool, ServiceError> {
        let now = Utc::now();
        let mut active: return_request::ActiveModel = found.clone().into();
        active.status = Set(next.to_string());
        if let Some(carrier) = &event.carrier {
            active.carrier = Set(Some(carrier.clone()));
        }
        if let Some(tracking_number) = &event.tracking_number {
            active.tracking_number = Set(Some(tracking_number.clone()));
        }
        if next == ReturnStatus::Received && found.received_at.is_none() {
            active.received_at = Set(Some(event.occurred_at.unwrap_or(now)));
        }
        active.updated_at = Set(now);
        active.update(&*self.db).await?;
        Ok(true)
    }

    async fn journal(
        &self,
        event: &NormalizedEvent,
        event_id: Option<String>,
        found: &return_request::Model,
        raw_body: &[u8],
        status_mapped: String,
    ) {
        let now = Utc::now();
        let row = webhook_event::ActiveModel {
            id: Set(Uuid::new_v4()),
            source: Set(SOURCE_RETURNS.to_string()),
            event_id: Set(event_id.unwrap_or_else(|| Uuid::new_v4().to_string())),
            order_id: Set(Some(found.order_id)),
            return_id: Set(Some(found.id)),
            body_hash: Set(body_hash(raw_body)),
            status_raw: Set(event.status.clone()),
            status_mapped: Set(status_mapped),
            received_at: Set(now),
            processed_at: Set(now),
        };

        if let Err(e) = row.insert(&*self.db).await {
            warn!(error = %e, "failed to journal returns webhook event");
        }
    }

    async fn emit(&self, return_id: Uuid, status: ReturnStatus) {
        info!(return_id = %return_id, status = %status, "return status advanced");
        let Some(sender) = &self.event_sender else {
            return;
        };
        if let Err(e) = sender
            .send(Event::ReturnStatusChanged { return_id, status })
            .await
        {
            warn!(return_id = %return_id, error = %e, "failed to send return status event");
        }
    }
}
