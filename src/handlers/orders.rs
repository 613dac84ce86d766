use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::entities::{order, order_item};
use crate::errors::ServiceError;
use crate::services::refunds::{RefundOutcome, RefundRequest};
use crate::{ApiResponse, AppState};

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderItemView {
    pub product_id: Uuid,
    pub product_name: String,
    pub quantity: i32,
    pub unit_price_minor: i64,
    pub line_total_minor: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderView {
    pub id: Uuid,
    pub order_number: String,
    pub status: String,
    pub payment_status: String,
    pub total_amount_minor: i64,
    pub refunded_total_minor: i64,
    pub currency: String,
    pub customer_name: String,
    pub customer_email: String,
    pub shipping_method: Option<String>,
    pub carrier: Option<String>,
    pub tracking_number: Option<String>,
    pub tracking_url: Option<String>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub items: Vec<OrderItemView>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ShippingStatusView {
    pub order_id: Uuid,
    pub status: String,
    pub carrier: Option<String>,
    pub tracking_number: Option<String>,
    pub tracking_url: Option<String>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
}

impl From<&order::Model> for ShippingStatusView {
    fn from(model: &order::Model) -> Self {
        Self {
            order_id: model.id,
            status: model.status.clone(),
            carrier: model.carrier.clone(),
            tracking_number: model.tracking_number.clone(),
            tracking_url: model.tracking_url.clone(),
            shipped_at: model.shipped_at,
            delivered_at: model.delivered_at,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema, utoipa::IntoParams)]
pub struct TrackingQuery {
    pub tracking_number: String,
}

async fn load_order(state: &AppState, order_id: Uuid) -> Result<order::Model, ServiceError> {
    order::Entity::find_by_id(order_id)
        .one(&*state.db)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("order {} not found", order_id)))
}

/// Get an order with its lines. Owner or admin only.
#[utoipa::path(
    get,
    path = "/api/v1/orders/{order_id}",
    params(("order_id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order details", body = ApiResponse<OrderView>),
        (status = 403, description = "Not the owner", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown order", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> Result<Json<ApiResponse<OrderView>>, ServiceError> {
    let found = load_order(&state, order_id).await?;

    if !(user.is_admin() || found.user_id == Some(user.user_id)) {
        return Err(ServiceError::Forbidden(
            "only an admin or the order owner may view an order".to_string(),
        ));
    }

    let items = order_item::Entity::find()
        .filter(order_item::Column::OrderId.eq(order_id))
        .all(&*state.db)
        .await?;

    let view = OrderView {
        id: found.id,
        order_number: found.order_number,
        status: found.status,
        payment_status: found.payment_status,
        total_amount_minor: found.total_amount_minor,
        refunded_total_minor: found.refunded_total_minor,
        currency: found.currency,
        customer_name: found.customer_name,
        customer_email: found.customer_email,
        shipping_method: found.shipping_method,
        carrier: found.carrier,
        tracking_number: found.tracking_number,
        tracking_url: found.tracking_url,
        shipped_at: found.shipped_at,
        delivered_at: found.delivered_at,
        created_at: found.created_at,
        items: items
            .into_iter()
            .map(|item| OrderItemView {
                product_id: item.product_id,
                product_name: item.product_name,
                quantity: item.quantity,
                unit_price_minor: item.unit_price_minor,
                line_total_minor: item.line_total_minor,
            })
            .collect(),
    };

    Ok(Json(ApiResponse::success(view)))
}

/// Shipping status by order id. The order id itself is the capability here
/// (tracking pages for guests), so no bearer is required.
#[utoipa::path(
    get,
    path = "/api/v1/orders/{order_id}/shipping",
    params(("order_id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Shipping status", body = ApiResponse<ShippingStatusView>),
        (status = 404, description = "Unknown order", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn get_shipping_status(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<ApiResponse<ShippingStatusView>>, ServiceError> {
    let found = load_order(&state, order_id).await?;
    Ok(Json(ApiResponse::success(ShippingStatusView::from(&found))))
}

/// Shipping status by tracking number.
#[utoipa::path(
    get,
    path = "/api/v1/orders/shipping/status",
    params(TrackingQuery),
    responses(
        (status = 200, description = "Shipping status", body = ApiResponse<ShippingStatusView>),
        (status = 404, description = "Unknown tracking number", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn get_shipping_status_by_tracking(
    State(state): State<AppState>,
    Query(query): Query<TrackingQuery>,
) -> Result<Json<ApiResponse<ShippingStatusView>>, ServiceError> {
    let found = order::Entity::find()
        .filter(order::Column::TrackingNumber.eq(query.tracking_number.clone()))
        .one(&*state.db)
        .await?
        .ok_or_else(|| {
            ServiceError::NotFound(format!(
                "no order with tracking number {}",
                query.tracking_number
            ))
        })?;

    Ok(Json(ApiResponse::success(ShippingStatusView::from(&found))))
}

/// Refund or cancel an order (admin or owner). Full amounts void the
/// payment and restore stock; partial amounts accumulate in the ledger.
#[utoipa::path(
    post,
    path = "/api/v1/orders/{order_id}/refund",
    params(("order_id" = Uuid, Path, description = "Order ID")),
    request_body = RefundRequest,
    responses(
        (status = 200, description = "Refund applied (or already refunded)", body = ApiResponse<RefundOutcome>),
        (status = 400, description = "Invalid amount or missing gateway reference", body = crate::errors::ErrorResponse),
        (status = 402, description = "Gateway declined the refund", body = crate::errors::ErrorResponse),
        (status = 403, description = "Not admin or owner", body = crate::errors::ErrorResponse),
        (status = 502, description = "Gateway unavailable, nothing changed", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn refund_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    user: AuthenticatedUser,
    Json(request): Json<RefundRequest>,
) -> Result<Json<ApiResponse<RefundOutcome>>, ServiceError> {
    let outcome = state
        .services
        .refunds
        .refund(order_id, &user, request)
        .await?;
    Ok(Json(ApiResponse::success(outcome)))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/shipping/status", get(get_shipping_status_by_tracking))
        .route("/:order_id", get(get_order))
        .route("/:order_id/shipping", get(get_shipping_status))
        .route("/:order_id/refund", post(refund_order))
}
