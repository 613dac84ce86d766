//! Apply-time coupon validation. The discount never exceeds the subtotal,
//! and usage counters are not consumed here; application is a pure check
//! against the stored coupon.

use chrono::Utc;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::instrument;
use utoipa::ToSchema;

use crate::db::DbPool;
use crate::entities::coupon;
use crate::errors::ServiceError;
use crate::money::percent_of;

pub const DISCOUNT_TYPE_PERCENTAGE: &str = "percentage";
pub const DISCOUNT_TYPE_FIXED: &str = "fixed_amount";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CouponRejection {
    NotFound,
    NotApplicable,
    ZeroDiscount,
    InvalidCode,
    InvalidSubtotal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CouponOutcome {
    Valid {
        discount_minor: i64,
        final_total_minor: i64,
        /// The stored canonical code; round-trips regardless of input case.
        normalized_code: String,
    },
    Invalid { reason: CouponRejection },
}

#[derive(Clone)]
pub struct CouponService {
    db: Arc<DbPool>,
}

impl CouponService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    #[instrument(skip(self))]
    pub async fn apply(&self, code: &str, subtotal_minor: i64) -> Result<CouponOutcome, ServiceError> {
        let code = code.trim();
        if code.len() < 3 {
            return Ok(CouponOutcome::Invalid {
                reason: CouponRejection::InvalidCode,
            });
        }
        if subtotal_minor <= 0 {
            return Ok(CouponOutcome::Invalid {
                reason: CouponRejection::InvalidSubtotal,
            });
        }

        let normalized = code.to_ascii_uppercase();
        let found = coupon::Entity::find()
            .filter(coupon::Column::Code.eq(normalized))
            .one(&*self.db)
            .await?;

        let Some(found) = found else {
            return Ok(CouponOutcome::Invalid {
                reason: CouponRejection::NotFound,
            });
        };

        Ok(evaluate(&found, subtotal_minor))
    }
}

/// Pure coupon evaluation against a subtotal.
pub fn evaluate(row: &coupon::Model, subtotal_minor: i64) -> CouponOutcome {
    let now = Utc::now();

    let starts_ok = row.valid_from.map_or(true, |from| from <= now);
    let ends_ok = row.valid_until.map_or(true, |until| until > now);
    let limit_ok = row
        .usage_limit
        .map_or(true, |limit| row.used_count < limit);
    let minimum_ok = row
        .minimum_order_minor
        .map_or(true, |minimum| subtotal_minor >= minimum);

    if !(row.is_active && starts_ok && ends_ok && limit_ok && minimum_ok) {
        return CouponOutcome::Invalid {
            reason: CouponRejection::NotApplicable,
        };
    }

    let mut discount = match row.discount_type.as_str() {
        DISCOUNT_TYPE_PERCENTAGE => percent_of(subtotal_minor, row.discount_value),
        DISCOUNT_TYPE_FIXED => row.discount_value,
        _ => 0,
    };

    if discount <= 0 {
        return CouponOutcome::Invalid {
            reason: CouponRejection::ZeroDiscount,
        };
    }
    if discount > subtotal_minor {
        discount = subtotal_minor;
    }

    CouponOutcome::Valid {
        discount_minor: discount,
        final_total_minor: subtotal_minor - discount,
        normalized_code: row.code.clone(),
    }
}
