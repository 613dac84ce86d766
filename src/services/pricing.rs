//! Authoritative price/stock validation.
//!
//! Recomputes each cart line's unit price from the price list applicable to
//! the buyer and compares requested quantities against live stock. Pure
//! computation over loaded rows; callers decide what blocks (stock
//! shortfalls do, price mismatches never do).

use chrono::{DateTime, Utc};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::db::DbPool;
use crate::entities::{price_list, product, product_price};
use crate::errors::ServiceError;
use crate::models::{PriceMismatch, StockShortfall};
use crate::money::apply_percent_discount;

/// A client-submitted cart line. The unit price is advisory only and is
/// compared against the authoritative value, never trusted.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CartLine {
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price_minor: Option<i64>,
    pub product_name: Option<String>,
    pub product_image_url: Option<String>,
}

/// Buyer attributes that select the applicable price list.
#[derive(Debug, Clone)]
pub struct BuyerContext {
    pub role: String,
    pub organization_tier: Option<i32>,
}

impl Default for BuyerContext {
    fn default() -> Self {
        Self {
            role: "individual".to_string(),
            organization_tier: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ValidatedItem {
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price_minor: i64,
    pub line_total_minor: i64,
    pub price_list_id: Option<Uuid>,
    pub product_name: String,
    pub product_image_url: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CartValidation {
    pub items: Vec<ValidatedItem>,
    pub mismatches: Vec<PriceMismatch>,
    pub stock_issues: Vec<StockShortfall>,
    /// Authoritative subtotal over the (possibly clamped) quantities.
    pub subtotal_minor: i64,
}

#[derive(Clone)]
pub struct PricingService {
    db: Arc<DbPool>,
}

impl PricingService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Recomputes prices and availability for a cart.
    #[instrument(skip(self, lines), fields(line_count = lines.len()))]
    pub async fn validate_cart(
        &self,
        buyer: &BuyerContext,
        lines: &[CartLine],
    ) -> Result<CartValidation, ServiceError> {
        if lines.is_empty() {
            return Err(ServiceError::ValidationError("cart is empty".to_string()));
        }
        for line in lines {
            if line.quantity <= 0 {
                return Err(ServiceError::ValidationError(format!(
                    "quantity must be positive for product {}",
                    line.product_id
                )));
            }
        }

        let db = &*self.db;
        let now = Utc::now();

        let product_ids: Vec<Uuid> = lines.iter().map(|line| line.product_id).collect();

        let products: HashMap<Uuid, product::Model> = product::Entity::find()
            .filter(product::Column::Id.is_in(product_ids.clone()))
            .all(db)
            .await?
            .into_iter()
            .map(|model| (model.id, model))
            .collect();

        let lists = price_list::Entity::find()
            .filter(price_list::Column::IsActive.eq(true))
            .all(db)
            .await?;
        let chosen_list = choose_price_list(&lists, buyer, now);

        let price_rows = product_price::Entity::find()
            .filter(product_price::Column::ProductId.is_in(product_ids))
            .filter(product_price::Column::IsActive.eq(true))
            .all(db)
            .await?;
        let mut rows_by_product: HashMap<Uuid, Vec<product_price::Model>> = HashMap::new();
        for row in price_rows {
            rows_by_product.entry(row.product_id).or_default().push(row);
        }

        let mut validation = CartValidation::default();

        for line in lines {
            let product = products.get(&line.product_id).ok_or_else(|| {
                ServiceError::ValidationError(format!("unknown product {}", line.product_id))
            })?;
            if !product.is_active {
                return Err(ServiceError::ValidationError(format!(
                    "product {} is not available",
                    product.id
                )));
            }

            let rows = rows_by_product
                .get(&product.id)
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            let (unit_price_minor, price_list_id) =
                resolve_unit_price(product, rows, chosen_list, now);

            if let Some(submitted) = line.unit_price_minor {
                if submitted != unit_price_minor {
                    warn!(
                        product_id = %product.id,
                        submitted_minor = submitted,
                        authoritative_minor = unit_price_minor,
                        "client price mismatch, authoritative value substituted"
                    );
                    validation.mismatches.push(PriceMismatch {
                        product_id: product.id,
                        submitted_minor: Some(submitted),
                        authoritative_minor: unit_price_minor,
                        price_list_id,
                    });
                }
            }

            let mut quantity = line.quantity;
            if quantity > product.stock_qty {
                validation.stock_issues.push(StockShortfall {
                    product_id: product.id,
                    requested: quantity,
                    available: product.stock_qty.max(0),
                });
                quantity = product.stock_qty.max(0);
            }

            let line_total_minor = unit_price_minor * i64::from(quantity);
            validation.subtotal_minor += line_total_minor;
            validation.items.push(ValidatedItem {
                product_id: product.id,
                quantity,
                unit_price_minor,
                line_total_minor,
                price_list_id,
                product_name: if product.name.is_empty() {
                    line.product_name.clone().unwrap_or_default()
                } else {
                    product.name.clone()
                },
                product_image_url: product
                    .image_url
                    .clone()
                    .or_else(|| line.product_image_url.clone()),
            });
        }

        Ok(validation)
    }
}

/// The most specific matching active list wins: non-default lists beat the
/// default one, ties favor the most recently effective list.
fn choose_price_list(
    lists: &[price_list::Model],
    buyer: &BuyerContext,
    now: DateTime<Utc>,
) -> Option<Uuid> {
    let mut applicable: Vec<&price_list::Model> = lists
        .iter()
        .filter(|list| list.is_active)
        .filter(|list| list.effective_from.map_or(true, |from| from <= now))
        .filter(|list| list.effective_to.map_or(true, |to| to >= now))
        .filter(|list| list.allows_role(&buyer.role))
        .filter(|list| list.allows_tier(buyer.organization_tier))
        .collect();

    applicable.sort_by(|a, b| {
        a.is_default
            .cmp(&b.is_default)
            .then_with(|| b.effective_from.cmp(&a.effective_from))
    });

    applicable.first().map(|list| list.id)
}

/// Resolution order: rows of the chosen list, then catalog default rows,
/// then the product base price. Inside a row set: sale price, then base
/// reduced by discount percent, then plain base. Only rows whose validity
/// window covers now are preferred.
fn resolve_unit_price(
    product: &product::Model,
    rows: &[product_price::Model],
    chosen_list: Option<Uuid>,
    now: DateTime<Utc>,
) -> (i64, Option<Uuid>) {
    let mut candidates: Vec<Option<Uuid>> = Vec::new();
    if chosen_list.is_some() {
        candidates.push(chosen_list);
    }
    candidates.push(None);

    for list_id in candidates {
        let set: Vec<&product_price::Model> =
            rows.iter().filter(|row| row.price_list_id == list_id).collect();
        if set.is_empty() {
            continue;
        }

        let pick = set
            .iter()
            .find(|row| row.covers(now))
            .copied()
            .unwrap_or(set[0]);

        if let Some(sale) = pick.sale_price_minor {
            if sale > 0 {
                return (sale, list_id);
            }
        }
        if pick.base_price_minor > 0 {
            if let Some(discount) = pick.discount_percent.filter(|d| *d > 0) {
                return (
                    apply_percent_discount(pick.base_price_minor, i64::from(discount)),
                    list_id,
                );
            }
            return (pick.base_price_minor, list_id);
        }
    }

    (product.base_price_minor.max(0), None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn product(base_minor: i64) -> product::Model {
        product::Model {
            id: Uuid::new_v4(),
            name: "Inline Duct Fan".to_string(),
            sku: "FAN-200".to_string(),
            base_price_minor: base_minor,
            stock_qty: 10,
            low_stock_threshold: 3,
            image_url: None,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn price_row(
        product_id: Uuid,
        list_id: Option<Uuid>,
        base: i64,
        sale: Option<i64>,
        discount: Option<i32>,
    ) -> product_price::Model {
        product_price::Model {
            id: Uuid::new_v4(),
            product_id,
            price_list_id: list_id,
            base_price_minor: base,
            sale_price_minor: sale,
            discount_percent: discount,
            is_active: true,
            valid_from: None,
            valid_until: None,
        }
    }

    fn list(is_default: bool, effective_from: Option<DateTime<Utc>>) -> price_list::Model {
        price_list::Model {
            id: Uuid::new_v4(),
            name: "list".to_string(),
            is_default,
            is_active: true,
            effective_from,
            effective_to: None,
            allowed_roles: None,
            organization_tiers: None,
        }
    }

    #[test]
    fn sale_price_beats_discounted_base() {
        let now = Utc::now();
        let item = product(10_000);
        let list_id = Some(Uuid::new_v4());
        let rows = vec![price_row(item.id, list_id, 10_000, Some(8_500), Some(20))];
        assert_eq!(
            resolve_unit_price(&item, &rows, list_id, now),
            (8_500, list_id)
        );
    }

    #[test]
    fn discount_percent_reduces_base() {
        let now = Utc::now();
        let item = product(10_000);
        let list_id = Some(Uuid::new_v4());
        let rows = vec![price_row(item.id, list_id, 10_000, None, Some(25))];
        assert_eq!(
            resolve_unit_price(&item, &rows, list_id, now),
            (7_500, list_id)
        );
    }

    #[test]
    fn falls_back_to_default_rows_then_base_price() {
        let now = Utc::now();
        let item = product(4_200);
        let chosen = Some(Uuid::new_v4());

        let default_rows = vec![price_row(item.id, None, 3_900, None, None)];
        assert_eq!(
            resolve_unit_price(&item, &default_rows, chosen, now),
            (3_900, None)
        );

        assert_eq!(resolve_unit_price(&item, &[], chosen, now), (4_200, None));
    }

    #[test]
    fn expired_rows_are_skipped_for_covering_ones() {
        let now = Utc::now();
        let item = product(5_000);
        let list_id = Some(Uuid::new_v4());

        let mut expired = price_row(item.id, list_id, 9_999, None, None);
        expired.valid_until = Some(now - Duration::days(1));
        let current = price_row(item.id, list_id, 4_500, None, None);

        let rows = vec![expired, current];
        assert_eq!(
            resolve_unit_price(&item, &rows, list_id, now),
            (4_500, list_id)
        );
    }

    #[test]
    fn non_default_list_wins_over_default() {
        let now = Utc::now();
        let buyer = BuyerContext::default();
        let default_list = list(true, Some(now - Duration::days(30)));
        let dealer_list = list(false, Some(now - Duration::days(5)));
        let expected = dealer_list.id;

        let chosen = choose_price_list(&[default_list, dealer_list], &buyer, now);
        assert_eq!(chosen, Some(expected));
    }

    #[test]
    fn ties_favor_most_recently_effective_list() {
        let now = Utc::now();
        let buyer = BuyerContext::default();
        let older = list(false, Some(now - Duration::days(20)));
        let newer = list(false, Some(now - Duration::days(2)));
        let expected = newer.id;

        let chosen = choose_price_list(&[older, newer], &buyer, now);
        assert_eq!(chosen, Some(expected));
    }

    #[test]
    fn role_scoped_lists_exclude_other_roles() {
        let now = Utc::now();
        let mut dealer_only = list(false, None);
        dealer_only.allowed_roles = Some("dealer,distributor".to_string());

        let retail = BuyerContext::default();
        assert_eq!(choose_price_list(&[dealer_only.clone()], &retail, now), None);

        let dealer = BuyerContext {
            role: "dealer".to_string(),
            organization_tier: None,
        };
        assert_eq!(
            choose_price_list(&[dealer_only.clone()], &dealer, now),
            Some(dealer_only.id)
        );
    }
}
