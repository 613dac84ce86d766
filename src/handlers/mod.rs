pub mod coupons;
pub mod checkout;
pub mod health;
pub mod housekeeping;
pub mod orders;
pub mod payments;
pub mod webhooks;

use std::sync::Arc;

use crate::config::AppConfig;
use crate::db::DbPool;
use crate::events::EventSender;
use crate::gateway::PaymentGateway;
use crate::services::checkout::CheckoutService;
use crate::services::coupons::CouponService;
use crate::services::housekeeping::HousekeepingService;
use crate::services::payment_callback::PaymentCallbackService;
use crate::services::pricing::PricingService;
use crate::services::refunds::RefundService;
use crate::services::returns::ReturnsWebhookService;
use crate::services::shipping::ShippingWebhookService;

/// All service instances the handlers dispatch into.
#[derive(Clone)]
pub struct AppServices {
    pub pricing: PricingService,
    pub checkout: CheckoutService,
    pub payment_callback: PaymentCallbackService,
    pub refunds: RefundService,
    pub shipping_webhooks: ShippingWebhookService,
    pub returns_webhooks: ReturnsWebhookService,
    pub housekeeping: HousekeepingService,
    pub coupons: CouponService,
}

impl AppServices {
    pub fn build(
        db: Arc<DbPool>,
        config: &AppConfig,
        gateway: Arc<dyn PaymentGateway>,
        event_sender: Option<EventSender>,
    ) -> Self {
        let payment_callback =
            PaymentCallbackService::new(db.clone(), gateway.clone(), event_sender.clone());

        Self {
            pricing: PricingService::new(db.clone()),
            checkout: CheckoutService::new(
                db.clone(),
                gateway.clone(),
                event_sender.clone(),
                config.currency.clone(),
            ),
            refunds: RefundService::new(
                db.clone(),
                gateway,
                event_sender.clone(),
                config.currency.clone(),
            ),
            shipping_webhooks: ShippingWebhookService::new(db.clone(), event_sender.clone()),
            returns_webhooks: ReturnsWebhookService::new(db.clone(), event_sender),
            housekeeping: HousekeepingService::new(
                db.clone(),
                payment_callback.clone(),
                config.housekeeping.clone(),
            ),
            coupons: CouponService::new(db),
            payment_callback,
        }
    }
}
