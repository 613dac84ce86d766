use axum::{
    extract::{Json, State},
    http::StatusCode,
    routing::post,
    Router,
};

use crate::auth::MaybeUser;
use crate::errors::ServiceError;
use crate::services::checkout::{CheckoutRequest, CheckoutResponse};
use crate::services::pricing::BuyerContext;
use crate::{ApiResponse, AppState};

/// Initiate a checkout: validate the cart against authoritative price and
/// stock, create a pending order, open a gateway session.
#[utoipa::path(
    post,
    path = "/api/v1/checkout",
    request_body = CheckoutRequest,
    responses(
        (status = 201, description = "Order created, gateway session opened", body = ApiResponse<CheckoutResponse>),
        (status = 400, description = "Validation failed", body = crate::errors::ErrorResponse),
        (status = 409, description = "Stock shortfalls, cart must be adjusted", body = crate::errors::ErrorResponse),
        (status = 502, description = "Gateway unavailable, order left pending", body = crate::errors::ErrorResponse)
    ),
    tag = "Checkout"
)]
pub async fn initiate_checkout(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    Json(request): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<ApiResponse<CheckoutResponse>>), ServiceError> {
    let buyer = user
        .as_ref()
        .map(|u| BuyerContext {
            role: u.role.clone(),
            organization_tier: None,
        })
        .unwrap_or_default();

    let response = state
        .services
        .checkout
        .initiate(user.map(|u| u.user_id), &buyer, request)
        .await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::success(response))))
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/", post(initiate_checkout))
}
