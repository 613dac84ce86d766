//! orderflow-api
//!
//! Transactional core of an e-commerce order pipeline: authoritative
//! checkout validation, hosted-gateway payment handoff, asynchronous
//! callback reconciliation, webhook-driven shipping/returns lifecycle,
//! refunds with compensating stock reversal, and timer-driven housekeeping.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod gateway;
pub mod handlers;
pub mod migrator;
pub mod models;
pub mod money;
pub mod openapi;
pub mod rate_limiter;
pub mod services;
pub mod webhooks;

use axum::{routing::get, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};
use utoipa::ToSchema;
use utoipa_swagger_ui::SwaggerUi;

use crate::db::DbPool;
use crate::events::EventSender;
use crate::gateway::PaymentGateway;
use crate::rate_limiter::{parse_path_policies, RateLimitBackend, RateLimitConfig, RateLimitLayer};
use utoipa::OpenApi;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DbPool>,
    pub config: config::AppConfig,
    pub services: handlers::AppServices,
}

impl AppState {
    pub fn new(
        db: Arc<DbPool>,
        config: config::AppConfig,
        gateway: Arc<dyn PaymentGateway>,
        event_sender: Option<EventSender>,
    ) -> Self {
        let services = handlers::AppServices::build(db.clone(), &config, gateway, event_sender);
        Self {
            db,
            config,
            services,
        }
    }
}

// Common response wrappers
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message.into()),
        }
    }
}

/// Builds the rate limiter configured for this deployment; the same
/// instance should go to both the HTTP layer and the cleanup task.
pub fn build_rate_limiter(config: &config::AppConfig) -> rate_limiter::RateLimiter {
    let rate_config = RateLimitConfig {
        requests_per_window: config.rate_limit_requests_per_window,
        window_duration: Duration::from_secs(config.rate_limit_window_seconds),
        enable_headers: config.rate_limit_enable_headers,
    };

    let backend = match (&config.rate_limit_use_redis, &config.redis_url) {
        (true, Some(url)) => match redis::Client::open(url.as_str()) {
            Ok(client) => RateLimitBackend::Redis {
                client: Arc::new(client),
                namespace: config.rate_limit_namespace.clone(),
            },
            Err(e) => {
                tracing::warn!(error = %e, "invalid redis url, falling back to in-memory rate limiting");
                RateLimitBackend::InMemory
            }
        },
        _ => RateLimitBackend::InMemory,
    };

    rate_limiter::RateLimiter::new(rate_config, backend)
}

/// Builds the HTTP application: versioned API routes, docs, rate limiting
/// on mutation endpoints, request tracing.
pub fn app(state: AppState) -> Router {
    let limiter = build_rate_limiter(&state.config);
    app_with_limiter(state, limiter)
}

/// Variant taking an externally owned limiter (shared with the cleanup
/// task).
pub fn app_with_limiter(state: AppState, limiter: rate_limiter::RateLimiter) -> Router {
    let mut rate_limit_layer = RateLimitLayer::from_limiter(limiter);
    if let Some(policies) = &state.config.rate_limit_path_policies {
        let (parsed, warnings) = parse_path_policies(policies);
        for warning in warnings {
            tracing::warn!("{}", warning);
        }
        rate_limit_layer = rate_limit_layer.with_policies(parsed);
    }

    Router::new()
        .route("/health", get(handlers::health::health))
        .nest("/api/v1/checkout", handlers::checkout::routes())
        .nest("/api/v1/payments", handlers::payments::routes())
        .nest("/api/v1/orders", handlers::orders::routes())
        .nest("/api/v1/webhooks", handlers::webhooks::routes())
        .nest("/api/v1/coupons", handlers::coupons::routes())
        .nest("/api/v1/admin", handlers::housekeeping::routes())
        .merge(
            SwaggerUi::new("/docs").url("/api-docs/openapi.json", openapi::ApiDoc::openapi()),
        )
        .layer(rate_limit_layer)
        .layer(CorsLayer::permissive())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
