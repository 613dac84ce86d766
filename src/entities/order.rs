use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{OrderStatus, PaymentStatus};

/// Durable record of a checkout attempt and its lifecycle. Orders are never
/// deleted; both status axes only advance per the transition tables.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(unique)]
    pub order_number: String,

    /// Null for guest checkouts.
    pub user_id: Option<Uuid>,

    /// Correlation id matching the order across the checkout initiator and
    /// asynchronous gateway callbacks when the order id is unavailable.
    pub conversation_id: String,

    pub status: String,
    pub payment_status: String,

    /// Authoritative total in minor units, fixed at creation and never
    /// recomputed from client input.
    pub total_amount_minor: i64,

    /// Partial-refund ledger sum; payment_status flips to refunded when this
    /// reaches total_amount_minor.
    pub refunded_total_minor: i64,

    pub currency: String,

    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: Option<String>,

    /// Address snapshots, serialized JSON.
    pub shipping_address: Option<String>,
    pub billing_address: Option<String>,
    pub shipping_method: Option<String>,

    /// Gateway checkout session token, persisted for reconciliation.
    pub payment_token: Option<String>,
    pub payment_id: Option<String>,
    pub payment_transaction_id: Option<String>,

    /// Structured audit trail of gateway calls and refund results (JSON).
    pub payment_debug: Option<String>,

    pub carrier: Option<String>,
    pub tracking_number: Option<String>,
    pub tracking_url: Option<String>,

    /// Set once on the first qualifying transition, never overwritten.
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order_item::Entity")]
    OrderItems,
}

impl Related<super::order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItems.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn order_status(&self) -> OrderStatus {
        self.status.parse().unwrap_or(OrderStatus::Pending)
    }

    pub fn payment_state(&self) -> PaymentStatus {
        self.payment_status.parse().unwrap_or(PaymentStatus::Unpaid)
    }
}
