//! Checkout initiation: the anti-tampering boundary of the pipeline.
//!
//! Totals are always re-derived through the pricing validator; the client's
//! amounts never reach the order or the gateway. Stock shortfalls reject the
//! checkout before any row is written. A gateway failure after the order is
//! created leaves it pending for the housekeeper rather than guessing.

use chrono::Utc;
use rand::Rng;
use sea_orm::{ActiveModelTrait, Set, TransactionTrait};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::db::DbPool;
use crate::entities::{order, order_item};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::gateway::{
    AddressInfo, BasketItem, BuyerInfo, CheckoutSessionRequest, PaymentGateway,
};
use crate::models::{OrderStatus, PaymentStatus};
use crate::services::pricing::{BuyerContext, CartLine, PricingService};

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct CustomerInfo {
    #[validate(length(min = 1, message = "customer name is required"))]
    pub name: String,
    #[validate(email(message = "a valid customer email is required"))]
    pub email: String,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct Address {
    pub contact_name: Option<String>,
    #[validate(length(min = 1, message = "address line is required"))]
    pub address: String,
    #[validate(length(min = 1, message = "city is required"))]
    pub city: String,
    #[validate(length(min = 1, message = "country is required"))]
    pub country: String,
    pub postal_code: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct Consents {
    #[serde(default)]
    pub terms: bool,
    #[serde(default)]
    pub marketing: bool,
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct CheckoutRequest {
    #[validate]
    pub customer: CustomerInfo,
    #[validate]
    pub shipping_address: Address,
    #[validate]
    pub billing_address: Option<Address>,
    pub shipping_method: Option<String>,
    #[serde(default)]
    pub consents: Consents,
    #[validate(length(min = 1, message = "at least one cart item is required"))]
    pub items: Vec<CartLine>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CheckoutResponse {
    pub order_id: Uuid,
    pub order_number: String,
    pub conversation_id: String,
    pub checkout_token: String,
    pub redirect_url: String,
    pub amount_minor: i64,
    pub currency: String,
}

#[derive(Clone)]
pub struct CheckoutService {
    db: Arc<DbPool>,
    pricing: PricingService,
    gateway: Arc<dyn PaymentGateway>,
    event_sender: Option<EventSender>,
    currency: String,
}

impl CheckoutService {
    pub fn new(
        db: Arc<DbPool>,
        gateway: Arc<dyn PaymentGateway>,
        event_sender: Option<EventSender>,
        currency: String,
    ) -> Self {
        Self {
            pricing: PricingService::new(db.clone()),
            db,
            gateway,
            event_sender,
            currency,
        }
    }

    /// Creates a pending order from a cart and opens a gateway checkout
    /// session for it. Duplicate submissions create duplicate orders;
    /// preventing that is a caller-UI concern.
    #[instrument(skip(self, request), fields(item_count = request.items.len()))]
    pub async fn initiate(
        &self,
        user_id: Option<Uuid>,
        buyer: &BuyerContext,
        request: CheckoutRequest,
    ) -> Result<CheckoutResponse, ServiceError> {
        request.validate()?;
        if !request.consents.terms {
            return Err(ServiceError::ValidationError(
                "terms consent is required".to_string(),
            ));
        }

        let validation = self.pricing.validate_cart(buyer, &request.items).await?;
        if !validation.stock_issues.is_empty() {
            return Err(ServiceError::InsufficientStock(validation.stock_issues));
        }
        if validation.subtotal_minor <= 0 {
            return Err(ServiceError::ValidationError(
                "order total must be positive".to_string(),
            ));
        }

        let now = Utc::now();
        let order_id = Uuid::new_v4();
        let order_number = generate_order_number();
        let conversation_id = Uuid::new_v4().simple().to_string();
        let billing = request
            .billing_address
            .clone()
            .unwrap_or_else(|| request.shipping_address.clone());

        // Price mismatches never block; they are substituted and journaled.
        let payment_debug = if validation.mismatches.is_empty() {
            None
        } else {
            Some(json!({ "price_mismatches": validation.mismatches }).to_string())
        };

        let txn = self.db.begin().await?;

        let order_model = order::ActiveModel {
            id: Set(order_id),
            order_number: Set(order_number.clone()),
            user_id: Set(user_id),
            conversation_id: Set(conversation_id.clone()),
            status: Set(OrderStatus::Pending.to_string()),
            payment_status: Set(PaymentStatus::Unpaid.to_string()),
            total_amount_minor: Set(validation.subtotal_minor),
            refunded_total_minor: Set(0),
            currency: Set(self.currency.clone()),
            customer_name: Set(request.customer.name.clone()),
            customer_email: Set(request.customer.email.clone()),
            customer_phone: Set(request.customer.phone.clone()),
            shipping_address: Set(serde_json::to_string(&request.shipping_address).ok()),
            billing_address: Set(serde_json::to_string(&billing).ok()),
            shipping_method: Set(request.shipping_method.clone()),
            payment_token: Set(None),
            payment_id: Set(None),
            payment_transaction_id: Set(None),
            payment_debug: Set(payment_debug),
            carrier: Set(None),
            tracking_number: Set(None),
            tracking_url: Set(None),
            shipped_at: Set(None),
            delivered_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            version: Set(1),
        };
        let order_model = order_model.insert(&txn).await?;

        for item in &validation.items {
            order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(item.product_id),
                quantity: Set(item.quantity),
                unit_price_minor: Set(item.unit_price_minor),
                line_total_minor: Set(item.line_total_minor),
                product_name: Set(item.product_name.clone()),
                product_image_url: Set(item.product_image_url.clone()),
                created_at: Set(now),
            }
            .insert(&txn)
            .await?;
        }

        txn.commit().await?;

        info!(
            order_id = %order_id,
            order_number = %order_number,
            amount_minor = validation.subtotal_minor,
            "order created pending"
        );

        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender.send(Event::OrderCreated(order_id)).await {
                warn!(order_id = %order_id, error = %e, "failed to send order created event");
            }
        }

        let session_request = CheckoutSessionRequest {
            conversation_id: conversation_id.clone(),
            basket_id: order_id.to_string(),
            amount_minor: validation.subtotal_minor,
            currency: self.currency.clone(),
            buyer: BuyerInfo {
                id: user_id
                    .map(|id| id.to_string())
                    .unwrap_or_else(|| format!("guest-{}", order_id.simple())),
                name: request.customer.name.clone(),
                email: request.customer.email.clone(),
                phone: request.customer.phone.clone(),
            },
            shipping_address: to_gateway_address(&request.shipping_address, &request.customer.name),
            billing_address: to_gateway_address(&billing, &request.customer.name),
            items: validation
                .items
                .iter()
                .map(|item| BasketItem {
                    id: item.product_id.to_string(),
                    name: item.product_name.clone(),
                    line_total_minor: item.line_total_minor,
                })
                .collect(),
        };

        let session = match self.gateway.create_checkout(&session_request).await {
            Ok(session) => session,
            Err(e) => {
                // The pending order remains for the housekeeper to cancel.
                error!(order_id = %order_id, error = %e, "gateway checkout initialization failed");
                return Err(ServiceError::GatewayError(e.to_string()));
            }
        };

        let mut active: order::ActiveModel = order_model.into();
        active.payment_token = Set(Some(session.token.clone()));
        active.updated_at = Set(Utc::now());
        active.update(&*self.db).await?;

        Ok(CheckoutResponse {
            order_id,
            order_number,
            conversation_id,
            checkout_token: session.token,
            redirect_url: session.redirect_url,
            amount_minor: validation.subtotal_minor,
            currency: self.currency.clone(),
        })
    }
}

fn to_gateway_address(address: &Address, customer_name: &str) -> AddressInfo {
    AddressInfo {
        contact_name: address
            .contact_name
            .clone()
            .unwrap_or_else(|| customer_name.to_string()),
        city: address.city.clone(),
        country: address.country.clone(),
        address: address.address.clone(),
        zip_code: address.postal_code.clone(),
    }
}

fn generate_order_number() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&rand::distributions::Alphanumeric)
        .take(6)
        .map(|c| (c as char).to_ascii_uppercase())
        .collect();
    format!("ORD-{}-{}", Utc::now().timestamp_millis(), suffix)
}
