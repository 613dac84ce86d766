use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::ReturnStatus;

/// Reverse-logistics record driven by the returns webhook receiver.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "return_requests")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub order_id: Uuid,
    pub status: String,

    pub carrier: Option<String>,
    pub tracking_number: Option<String>,
    pub reason: Option<String>,

    /// Set once when the return shipment first reaches "received".
    pub received_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn return_status(&self) -> ReturnStatus {
        self.status.parse().unwrap_or(ReturnStatus::Requested)
    }
}
