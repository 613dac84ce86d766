use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A price list scoped to buyer roles and/or organization tiers. The most
/// specific matching active list wins; the default list is the fallback.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "price_lists")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub name: String,
    pub is_default: bool,
    pub is_active: bool,

    pub effective_from: Option<DateTime<Utc>>,
    pub effective_to: Option<DateTime<Utc>>,

    /// Comma-separated role names; empty/null = any role.
    pub allowed_roles: Option<String>,
    /// Comma-separated organization tier levels; empty/null = any tier.
    pub organization_tiers: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn allows_role(&self, role: &str) -> bool {
        match self.allowed_roles.as_deref() {
            None | Some("") => true,
            Some(csv) => csv.split(',').any(|r| r.trim() == role),
        }
    }

    pub fn allows_tier(&self, tier: Option<i32>) -> bool {
        let Some(tier) = tier else { return true };
        match self.organization_tiers.as_deref() {
            None | Some("") => true,
            Some(csv) => csv
                .split(',')
                .filter_map(|t| t.trim().parse::<i32>().ok())
                .any(|t| t == tier),
        }
    }
}
