//! HTTP client for a hosted redirect-checkout gateway.
//!
//! Requests are HMAC-SHA256 signed over the serialized body. The gateway
//! rejects sessions whose price and paidPrice disagree, so both are derived
//! from the same minor-unit amount.

use base64::Engine;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde_json::{json, Value};
use sha2::Sha256;
use std::time::Duration;
use tracing::{debug, warn};

use super::{
    CheckoutSession, CheckoutSessionRequest, GatewayAck, GatewayError, GatewayPaymentStatus,
    PaymentGateway, RetrievedPayment,
};
use crate::config::GatewayConfig;
use crate::money::format_minor;

type HmacSha256 = Hmac<Sha256>;

pub struct HostedCheckoutGateway {
    http: Client,
    config: GatewayConfig,
}

impl HostedCheckoutGateway {
    pub fn new(config: GatewayConfig) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();
        Self { http, config }
    }

    fn credentials(&self) -> Result<(&str, &str), GatewayError> {
        match (&self.config.api_key, &self.config.secret_key) {
            (Some(api_key), Some(secret_key)) => Ok((api_key, secret_key)),
            _ => Err(GatewayError::NotConfigured),
        }
    }

    fn sign(body: &str, secret_key: &str) -> String {
        let mut mac =
            HmacSha256::new_from_slice(secret_key.as_bytes()).expect("hmac accepts any key length");
        mac.update(body.as_bytes());
        base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes())
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value, GatewayError> {
        let (api_key, secret_key) = self.credentials()?;
        let serialized = body.to_string();
        let signature = Self::sign(&serialized, secret_key);
        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), path);

        debug!(%url, "gateway call");

        let response = self
            .http
            .post(&url)
            .header("Accept", "application/json")
            .header("Content-Type", "application/json")
            .header("Authorization", format!("HMAC {}:{}", api_key, signature))
            .body(serialized)
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        let status = response.status();
        let payload: Value = response
            .json()
            .await
            .map_err(|e| GatewayError::Transport(format!("invalid gateway response: {}", e)))?;

        if !status.is_success() {
            warn!(status = %status, "gateway returned http error");
            return Err(GatewayError::Transport(format!(
                "gateway http status {}",
                status
            )));
        }

        Ok(payload)
    }
}

fn field_str(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_string)
}

#[async_trait::async_trait]
impl PaymentGateway for HostedCheckoutGateway {
    async fn create_checkout(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CheckoutSession, GatewayError> {
        let amount = format_minor(request.amount_minor);
        let body = json!({
            "locale": self.config.locale,
            "conversationId": request.conversation_id,
            "price": amount,
            "paidPrice": amount,
            "currency": request.currency,
            "basketId": request.basket_id,
            "callbackUrl": self.config.callback_url,
            "buyer": &request.buyer,
            "shippingAddress": &request.shipping_address,
            "billingAddress": &request.billing_address,
            "basketItems": request.items.iter().map(|item| json!({
                "id": item.id,
                "name": item.name,
                "price": format_minor(item.line_total_minor),
            })).collect::<Vec<_>>(),
        });

        let payload = self.post("/v1/checkout/sessions", body).await?;

        let ok = field_str(&payload, "status")
            .map(|s| s.eq_ignore_ascii_case("success"))
            .unwrap_or(false);
        if !ok {
            return Err(GatewayError::Rejected(
                field_str(&payload, "errorMessage")
                    .unwrap_or_else(|| "checkout initialization failed".to_string()),
            ));
        }

        let token = field_str(&payload, "token")
            .ok_or_else(|| GatewayError::Transport("missing session token".to_string()))?;
        let redirect_url = field_str(&payload, "paymentPageUrl")
            .ok_or_else(|| GatewayError::Transport("missing payment page url".to_string()))?;

        Ok(CheckoutSession {
            token,
            redirect_url,
        })
    }

    async fn retrieve_checkout(
        &self,
        token: &str,
        conversation_id: Option<&str>,
    ) -> Result<RetrievedPayment, GatewayError> {
        let mut body = json!({
            "locale": self.config.locale,
            "token": token,
        });
        if let Some(conversation_id) = conversation_id {
            body["conversationId"] = json!(conversation_id);
        }

        let payload = self.post("/v1/checkout/sessions/retrieve", body).await?;

        let payment_status = field_str(&payload, "paymentStatus").unwrap_or_default();
        let status = if payment_status.eq_ignore_ascii_case("success") {
            GatewayPaymentStatus::Success
        } else {
            GatewayPaymentStatus::Failure
        };

        let transaction_ids = payload
            .get("itemTransactions")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| field_str(item, "paymentTransactionId"))
                    .collect()
            })
            .unwrap_or_default();

        Ok(RetrievedPayment {
            status,
            payment_id: field_str(&payload, "paymentId"),
            transaction_ids,
            error_code: field_str(&payload, "errorCode"),
            error_message: field_str(&payload, "errorMessage"),
            raw: payload,
        })
    }

    async fn cancel_payment(&self, payment_id: &str) -> Result<GatewayAck, GatewayError> {
        let body = json!({
            "locale": self.config.locale,
            "paymentId": payment_id,
        });

        let payload = self.post("/v1/payments/cancel", body).await?;

        let ok = field_str(&payload, "status")
            .map(|s| s.eq_ignore_ascii_case("success"))
            .unwrap_or(false);
        if !ok {
            return Err(GatewayError::Rejected(
                field_str(&payload, "errorMessage")
                    .unwrap_or_else(|| "cancel was declined".to_string()),
            ));
        }

        Ok(GatewayAck {
            reference: field_str(&payload, "paymentId"),
            raw: payload,
        })
    }

    async fn refund_transaction(
        &self,
        transaction_id: &str,
        amount_minor: i64,
        currency: &str,
    ) -> Result<GatewayAck, GatewayError> {
        let body = json!({
            "locale": self.config.locale,
            "paymentTransactionId": transaction_id,
            "price": format_minor(amount_minor),
            "currency": currency,
        });

        let payload = self.post("/v1/payments/refund", body).await?;

        let ok = field_str(&payload, "status")
            .map(|s| s.eq_ignore_ascii_case("success"))
            .unwrap_or(false);
        if !ok {
            return Err(GatewayError::Rejected(
                field_str(&payload, "errorMessage")
                    .unwrap_or_else(|| "refund was declined".to_string()),
            ));
        }

        Ok(GatewayAck {
            reference: field_str(&payload, "paymentTransactionId"),
            raw: payload,
        })
    }
}
