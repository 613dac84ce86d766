use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A priced row for a product within a price list (or the catalog default
/// rows when `price_list_id` is null). Resolution order inside a row:
/// sale price, then base reduced by discount percent, then plain base.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "product_prices")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub product_id: Uuid,
    pub price_list_id: Option<Uuid>,

    pub base_price_minor: i64,
    pub sale_price_minor: Option<i64>,
    pub discount_percent: Option<i32>,

    pub is_active: bool,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Whether the row's validity window covers `now`.
    pub fn covers(&self, now: DateTime<Utc>) -> bool {
        self.valid_from.map_or(true, |from| from <= now)
            && self.valid_until.map_or(true, |until| until >= now)
    }
}
