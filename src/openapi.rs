//! OpenAPI document for the pipeline's HTTP surface.

use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "orderflow-api",
        description = "Transactional order pipeline: checkout validation, hosted-gateway payments, webhook-driven fulfillment, refunds and housekeeping."
    ),
    paths(
        crate::handlers::health::health,
        crate::handlers::checkout::initiate_checkout,
        crate::handlers::payments::payment_callback,
        crate::handlers::payments::payment_callback_redirect,
        crate::handlers::orders::get_order,
        crate::handlers::orders::get_shipping_status,
        crate::handlers::orders::get_shipping_status_by_tracking,
        crate::handlers::orders::refund_order,
        crate::handlers::webhooks::shipping_webhook,
        crate::handlers::webhooks::returns_webhook,
        crate::handlers::coupons::apply_coupon,
        crate::handlers::housekeeping::run_housekeeping,
    ),
    components(schemas(
        crate::errors::ErrorResponse,
        crate::models::StockShortfall,
        crate::models::PriceMismatch,
        crate::models::OrderStatus,
        crate::models::PaymentStatus,
        crate::models::ReturnStatus,
        crate::services::pricing::CartLine,
        crate::services::checkout::CheckoutRequest,
        crate::services::checkout::CheckoutResponse,
        crate::services::checkout::CustomerInfo,
        crate::services::checkout::Address,
        crate::services::checkout::Consents,
        crate::services::payment_callback::CallbackParams,
        crate::services::payment_callback::CallbackStatus,
        crate::services::payment_callback::CallbackResolution,
        crate::services::refunds::RefundRequest,
        crate::services::refunds::RefundStatus,
        crate::services::refunds::RefundOutcome,
        crate::services::shipping::WebhookOutcome,
        crate::services::returns::ReturnWebhookOutcome,
        crate::services::housekeeping::SweepReport,
        crate::services::coupons::CouponRejection,
        crate::handlers::coupons::ApplyCouponRequest,
        crate::handlers::coupons::ApplyCouponResponse,
        crate::handlers::orders::OrderView,
        crate::handlers::orders::OrderItemView,
        crate::handlers::orders::ShippingStatusView,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "Checkout", description = "Cart validation and gateway session initiation"),
        (name = "Payments", description = "Gateway callback reconciliation"),
        (name = "Orders", description = "Order reads, shipping status, refunds"),
        (name = "Webhooks", description = "Carrier shipping and returns webhooks"),
        (name = "Coupons", description = "Apply-time coupon validation"),
        (name = "Admin", description = "Operational endpoints"),
        (name = "Health", description = "Liveness"),
    )
)]
pub struct ApiDoc;
