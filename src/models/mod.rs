pub mod status;

pub use status::{map_carrier_status, map_return_status, OrderStatus, PaymentStatus, ReturnStatus};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// A requested quantity the live catalog cannot satisfy. `available` doubles
/// as the clamped remediation suggestion returned to the caller.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StockShortfall {
    pub product_id: Uuid,
    pub requested: i32,
    pub available: i32,
}

/// A client-submitted unit price that differs from the authoritative one.
/// Mismatches are journaled and silently overridden, never blocking.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PriceMismatch {
    pub product_id: Uuid,
    pub submitted_minor: Option<i64>,
    pub authoritative_minor: i64,
    pub price_list_id: Option<Uuid>,
}
