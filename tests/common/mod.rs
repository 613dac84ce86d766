//! Shared harness: application state over a throwaway SQLite database plus
//! a scriptable in-process payment gateway.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use sea_orm::{ActiveModelTrait, Set};
use uuid::Uuid;

use orderflow_api::{
    auth,
    config::AppConfig,
    db::{self, DbPool},
    entities::{coupon, order, order_item, product, return_request},
    gateway::{
        CheckoutSession, CheckoutSessionRequest, GatewayAck, GatewayError, GatewayPaymentStatus,
        PaymentGateway, RetrievedPayment,
    },
    handlers::AppServices,
    models::{OrderStatus, PaymentStatus, ReturnStatus},
    AppState,
};

/// What the scripted gateway should answer per operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrieveOutcome {
    Success,
    Failure,
    Unreachable,
}

#[derive(Debug)]
pub struct MockGatewayState {
    pub checkout_succeeds: bool,
    pub retrieve_outcome: RetrieveOutcome,
    pub accept_operations: bool,
    pub retrieve_calls: usize,
    pub cancel_calls: usize,
    pub refund_calls: usize,
    pub last_checkout_amount_minor: Option<i64>,
    pub last_refund_amount_minor: Option<i64>,
}

impl Default for MockGatewayState {
    fn default() -> Self {
        Self {
            checkout_succeeds: true,
            retrieve_outcome: RetrieveOutcome::Success,
            accept_operations: true,
            retrieve_calls: 0,
            cancel_calls: 0,
            refund_calls: 0,
            last_checkout_amount_minor: None,
            last_refund_amount_minor: None,
        }
    }
}

pub struct MockGateway {
    pub state: Mutex<MockGatewayState>,
}

impl MockGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(MockGatewayState::default()),
        })
    }

    pub fn set_checkout_succeeds(&self, value: bool) {
        self.state.lock().unwrap().checkout_succeeds = value;
    }

    pub fn set_retrieve_outcome(&self, value: RetrieveOutcome) {
        self.state.lock().unwrap().retrieve_outcome = value;
    }

    pub fn set_accept_operations(&self, value: bool) {
        self.state.lock().unwrap().accept_operations = value;
    }

    pub fn retrieve_calls(&self) -> usize {
        self.state.lock().unwrap().retrieve_calls
    }

    pub fn cancel_calls(&self) -> usize {
        self.state.lock().unwrap().cancel_calls
    }

    pub fn refund_calls(&self) -> usize {
        self.state.lock().unwrap().refund_calls
    }

    pub fn last_checkout_amount_minor(&self) -> Option<i64> {
        self.state.lock().unwrap().last_checkout_amount_minor
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn create_checkout(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CheckoutSession, GatewayError> {
        let mut state = self.state.lock().unwrap();
        state.last_checkout_amount_minor = Some(request.amount_minor);
        if !state.checkout_succeeds {
            return Err(GatewayError::Transport("gateway down".to_string()));
        }
        let token = format!("tok-{}", Uuid::new_v4().simple());
        Ok(CheckoutSession {
            redirect_url: format!("https://gateway.test/pay/{}", token),
            token,
        })
    }

    async fn retrieve_checkout(
        &self,
        _token: &str,
        _conversation_id: Option<&str>,
    ) -> Result<RetrievedPayment, GatewayError> {
        let mut state = self.state.lock().unwrap();
        state.retrieve_calls += 1;
        match state.retrieve_outcome {
            RetrieveOutcome::Unreachable => {
                Err(GatewayError::Transport("connection refused".to_string()))
            }
            RetrieveOutcome::Success => Ok(RetrievedPayment {
                status: GatewayPaymentStatus::Success,
                payment_id: Some("pay-1".to_string()),
                transaction_ids: vec!["tx-1".to_string()],
                error_code: None,
                error_message: None,
                raw: serde_json::json!({ "paymentStatus": "SUCCESS", "paymentId": "pay-1" }),
            }),
            RetrieveOutcome::Failure => Ok(RetrievedPayment {
                status: GatewayPaymentStatus::Failure,
                payment_id: None,
                transaction_ids: vec![],
                error_code: Some("5006".to_string()),
                error_message: Some("card declined".to_string()),
                raw: serde_json::json!({ "paymentStatus": "FAILURE" }),
            }),
        }
    }

    async fn cancel_payment(&self, payment_id: &str) -> Result<GatewayAck, GatewayError> {
        let mut state = self.state.lock().unwrap();
        state.cancel_calls += 1;
        if !state.accept_operations {
            return Err(GatewayError::Rejected("cancel declined".to_string()));
        }
        Ok(GatewayAck {
            reference: Some(payment_id.to_string()),
            raw: serde_json::json!({ "status": "success" }),
        })
    }

    async fn refund_transaction(
        &self,
        transaction_id: &str,
        amount_minor: i64,
        _currency: &str,
    ) -> Result<GatewayAck, GatewayError> {
        let mut state = self.state.lock().unwrap();
        state.refund_calls += 1;
        state.last_refund_amount_minor = Some(amount_minor);
        if !state.accept_operations {
            return Err(GatewayError::Rejected("refund declined".to_string()));
        }
        Ok(GatewayAck {
            reference: Some(transaction_id.to_string()),
            raw: serde_json::json!({ "status": "success" }),
        })
    }
}

/// Application harness over a fresh file-backed SQLite database.
pub struct TestApp {
    pub state: AppState,
    pub db: Arc<DbPool>,
    pub config: AppConfig,
    pub gateway: Arc<MockGateway>,
    db_file: std::path::PathBuf,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config_tweaks(|_| {}).await
    }

    pub async fn with_config_tweaks(tweak: impl FnOnce(&mut AppConfig)) -> Self {
        let db_file =
            std::env::temp_dir().join(format!("orderflow_test_{}.db", Uuid::new_v4().simple()));
        let mut config = AppConfig::new(format!("sqlite://{}?mode=rwc", db_file.display()));
        config.db_max_connections = 1;
        config.db_min_connections = 1;
        config.webhooks.shipping_secret = Some("shipping-secret".to_string());
        config.webhooks.shipping_token = Some("shipping-token".to_string());
        config.webhooks.returns_secret = Some("returns-secret".to_string());
        tweak(&mut config);

        let pool = db::establish_connection_from_app_config(&config)
            .await
            .expect("failed to open test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations");

        let db = Arc::new(pool);
        let gateway = MockGateway::new();
        let gateway_dyn: Arc<dyn PaymentGateway> = gateway.clone();
        let state = AppState::new(db.clone(), config.clone(), gateway_dyn, None);

        Self {
            state,
            db,
            config,
            gateway,
            db_file,
        }
    }

    pub fn services(&self) -> &AppServices {
        &self.state.services
    }

    pub fn router(&self) -> axum::Router {
        orderflow_api::app(self.state.clone())
    }

    pub fn admin_token(&self) -> String {
        auth::issue_token(&self.config.jwt_secret, Uuid::new_v4(), auth::ROLE_ADMIN, 600)
            .expect("token")
    }

    pub fn user_token(&self, user_id: Uuid) -> String {
        auth::issue_token(&self.config.jwt_secret, user_id, "customer", 600).expect("token")
    }

    // ---- seeding ----

    pub async fn seed_product(&self, sku: &str, price_minor: i64, stock: i32) -> product::Model {
        let now = Utc::now();
        product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(format!("Product {}", sku)),
            sku: Set(sku.to_string()),
            base_price_minor: Set(price_minor),
            stock_qty: Set(stock),
            low_stock_threshold: Set(2),
            image_url: Set(None),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await
        .expect("seed product")
    }

    /// Inserts an order directly in a given state, bypassing checkout.
    pub async fn seed_order(&self, builder: OrderSeed) -> order::Model {
        let now = Utc::now();
        let created_at = now - Duration::minutes(builder.age_minutes);
        let id = Uuid::new_v4();

        let model = order::ActiveModel {
            id: Set(id),
            order_number: Set(format!("ORD-TEST-{}", id.simple())),
            user_id: Set(builder.user_id),
            conversation_id: Set(format!("conv-{}", id.simple())),
            status: Set(builder.status.to_string()),
            payment_status: Set(builder.payment_status.to_string()),
            total_amount_minor: Set(builder.total_minor),
            refunded_total_minor: Set(0),
            currency: Set("USD".to_string()),
            customer_name: Set("Test Buyer".to_string()),
            customer_email: Set("buyer@example.com".to_string()),
            customer_phone: Set(None),
            shipping_address: Set(None),
            billing_address: Set(None),
            shipping_method: Set(None),
            payment_token: Set(builder.payment_token),
            payment_id: Set(builder.payment_id),
            payment_transaction_id: Set(builder.payment_transaction_id),
            payment_debug: Set(None),
            carrier: Set(None),
            tracking_number: Set(None),
            tracking_url: Set(None),
            shipped_at: Set(None),
            delivered_at: Set(None),
            created_at: Set(created_at),
            updated_at: Set(created_at),
            version: Set(1),
        }
        .insert(&*self.db)
        .await
        .expect("seed order");

        for (product_id, quantity, unit_price_minor) in builder.items {
            order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(id),
                product_id: Set(product_id),
                quantity: Set(quantity),
                unit_price_minor: Set(unit_price_minor),
                line_total_minor: Set(unit_price_minor * i64::from(quantity)),
                product_name: Set("Seeded item".to_string()),
                product_image_url: Set(None),
                created_at: Set(now),
            }
            .insert(&*self.db)
            .await
            .expect("seed order item");
        }

        model
    }

    pub async fn seed_coupon(
        &self,
        code: &str,
        discount_type: &str,
        value: i64,
        minimum_order_minor: Option<i64>,
    ) -> coupon::Model {
        coupon::ActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(code.to_string()),
            discount_type: Set(discount_type.to_string()),
            discount_value: Set(value),
            minimum_order_minor: Set(minimum_order_minor),
            valid_from: Set(None),
            valid_until: Set(None),
            is_active: Set(true),
            usage_limit: Set(None),
            used_count: Set(0),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await
        .expect("seed coupon")
    }

    pub async fn seed_return(&self, order_id: Uuid, status: ReturnStatus) -> return_request::Model {
        let now = Utc::now();
        return_request::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            status: Set(status.to_string()),
            carrier: Set(None),
            tracking_number: Set(None),
            reason: Set(Some("defective".to_string())),
            received_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await
        .expect("seed return")
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.db_file);
    }
}

/// Declarative order seed.
pub struct OrderSeed {
    pub user_id: Option<Uuid>,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub total_minor: i64,
    pub payment_token: Option<String>,
    pub payment_id: Option<String>,
    pub payment_transaction_id: Option<String>,
    pub age_minutes: i64,
    pub items: Vec<(Uuid, i32, i64)>,
}

impl Default for OrderSeed {
    fn default() -> Self {
        Self {
            user_id: None,
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Unpaid,
            total_minor: 5_000,
            payment_token: None,
            payment_id: None,
            payment_transaction_id: None,
            age_minutes: 0,
            items: Vec::new(),
        }
    }
}

impl OrderSeed {
    pub fn paid(total_minor: i64) -> Self {
        Self {
            status: OrderStatus::Paid,
            payment_status: PaymentStatus::Paid,
            total_minor,
            payment_token: Some("tok-seeded".to_string()),
            payment_id: Some("pay-seeded".to_string()),
            payment_transaction_id: Some("tx-seeded".to_string()),
            ..Default::default()
        }
    }
}

/// Signs a webhook body the way carriers do: HMAC-SHA256 over the raw
/// bytes, base64.
pub fn sign_webhook(secret: &str, body: &[u8]) -> String {
    use base64::Engine;
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(body);
    base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes())
}
