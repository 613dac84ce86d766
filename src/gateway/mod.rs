//! Payment-gateway boundary.
//!
//! The pipeline talks to a hosted redirect-checkout gateway through this
//! trait: create a checkout session, retrieve its server-side result, and
//! compensate via cancel (full, by payment id) or refund (partial, by
//! payment-transaction id). All amounts cross this boundary as two-decimal
//! strings derived from minor units.

pub mod hosted;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use hosted::HostedCheckoutGateway;

#[derive(Debug, Error)]
pub enum GatewayError {
    /// The gateway could not be reached or timed out. Callers treat this as
    /// failure without guessing an outcome.
    #[error("gateway transport error: {0}")]
    Transport(String),
    /// The gateway answered and declined the operation.
    #[error("gateway rejected the request: {0}")]
    Rejected(String),
    /// Required credentials are absent from configuration.
    #[error("gateway is not configured")]
    NotConfigured,
}

#[derive(Debug, Clone, Serialize)]
pub struct BuyerInfo {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AddressInfo {
    pub contact_name: String,
    pub city: String,
    pub country: String,
    pub address: String,
    pub zip_code: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BasketItem {
    pub id: String,
    pub name: String,
    pub line_total_minor: i64,
}

/// Everything the gateway needs to open a hosted checkout session. The
/// declared price always equals the authoritative order total.
#[derive(Debug, Clone)]
pub struct CheckoutSessionRequest {
    pub conversation_id: String,
    pub basket_id: String,
    pub amount_minor: i64,
    pub currency: String,
    pub buyer: BuyerInfo,
    pub shipping_address: AddressInfo,
    pub billing_address: AddressInfo,
    pub items: Vec<BasketItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSession {
    pub token: String,
    pub redirect_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayPaymentStatus {
    Success,
    Failure,
}

/// Result of the server-to-server retrieval of a checkout session.
#[derive(Debug, Clone)]
pub struct RetrievedPayment {
    pub status: GatewayPaymentStatus,
    pub payment_id: Option<String>,
    pub transaction_ids: Vec<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    /// Raw gateway response, journaled into the order's payment_debug.
    pub raw: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct GatewayAck {
    pub reference: Option<String>,
    pub raw: serde_json::Value,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Opens a hosted checkout session; returns the opaque token and the
    /// redirect URL for the buyer's browser.
    async fn create_checkout(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CheckoutSession, GatewayError>;

    /// Server-to-server retrieval of a session's payment result. The only
    /// trusted source of payment truth.
    async fn retrieve_checkout(
        &self,
        token: &str,
        conversation_id: Option<&str>,
    ) -> Result<RetrievedPayment, GatewayError>;

    /// Voids a completed payment in full, by gateway payment id.
    async fn cancel_payment(&self, payment_id: &str) -> Result<GatewayAck, GatewayError>;

    /// Refunds part of a payment, by gateway payment-transaction id.
    async fn refund_transaction(
        &self,
        transaction_id: &str,
        amount_minor: i64,
        currency: &str,
    ) -> Result<GatewayAck, GatewayError>;
}
