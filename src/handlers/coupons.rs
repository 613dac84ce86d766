use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::errors::ServiceError;
use crate::services::coupons::{CouponOutcome, CouponRejection};
use crate::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct ApplyCouponRequest {
    pub code: String,
    pub subtotal_minor: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ApplyCouponResponse {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<CouponRejection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discount_amount_minor: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_total_minor: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub normalized_code: Option<String>,
}

/// Validate a coupon against a subtotal. Checks happen at apply time only;
/// nothing is consumed.
#[utoipa::path(
    post,
    path = "/api/v1/coupons/apply",
    request_body = ApplyCouponRequest,
    responses(
        (status = 200, description = "Coupon evaluated", body = ApplyCouponResponse),
        (status = 400, description = "Malformed code or subtotal", body = ApplyCouponResponse),
        (status = 404, description = "Unknown coupon code", body = ApplyCouponResponse)
    ),
    tag = "Coupons"
)]
pub async fn apply_coupon(
    State(state): State<AppState>,
    Json(request): Json<ApplyCouponRequest>,
) -> Result<Response, ServiceError> {
    let outcome = state
        .services
        .coupons
        .apply(&request.code, request.subtotal_minor)
        .await?;

    let (status, body) = match outcome {
        CouponOutcome::Valid {
            discount_minor,
            final_total_minor,
            normalized_code,
        } => (
            StatusCode::OK,
            ApplyCouponResponse {
                valid: true,
                reason: None,
                discount_amount_minor: Some(discount_minor),
                final_total_minor: Some(final_total_minor),
                normalized_code: Some(normalized_code),
            },
        ),
        CouponOutcome::Invalid { reason } => {
            let status = match reason {
                CouponRejection::InvalidCode | CouponRejection::InvalidSubtotal => {
                    StatusCode::BAD_REQUEST
                }
                CouponRejection::NotFound => StatusCode::NOT_FOUND,
                CouponRejection::NotApplicable | CouponRejection::ZeroDiscount => StatusCode::OK,
            };
            (
                status,
                ApplyCouponResponse {
                    valid: false,
                    reason: Some(reason),
                    discount_amount_minor: None,
                    final_total_minor: None,
                    normalized_code: None,
                },
            )
        }
    };

    Ok((status, Json(body)).into_response())
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/apply", post(apply_coupon))
}
