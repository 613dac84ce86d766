use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Append-only journal of received carrier webhooks, one row per processed
/// event regardless of effect. (source, event_id) is the dedup gate: a
/// previously journaled id is acknowledged without reapplying.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "webhook_events")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// "shipping" or "returns".
    pub source: String,
    pub event_id: String,

    pub order_id: Option<Uuid>,
    pub return_id: Option<Uuid>,

    /// SHA-256 of the raw body, base64.
    pub body_hash: String,

    pub status_raw: Option<String>,
    pub status_mapped: String,

    pub received_at: DateTime<Utc>,
    pub processed_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
