use axum::{
    extract::State,
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use bytes::Bytes;

use crate::errors::ServiceError;
use crate::services::returns::ReturnWebhookOutcome;
use crate::services::shipping::WebhookOutcome;
use crate::webhooks::{event_id_header, verify, WebhookAuth};
use crate::AppState;

/// Carrier shipping webhook. Authenticity: HMAC signature or legacy token
/// header over the raw body; optional event-id dedup and timestamp replay
/// window. Redelivering an event id yields one transition and one journal
/// row total.
#[utoipa::path(
    post,
    path = "/api/v1/webhooks/shipping",
    request_body = String,
    responses(
        (status = 200, description = "Event processed (possibly unchanged/duplicate)", body = WebhookOutcome),
        (status = 401, description = "Signature verification failed", body = crate::errors::ErrorResponse),
        (status = 404, description = "No matching order", body = crate::errors::ErrorResponse)
    ),
    tag = "Webhooks"
)]
pub async fn shipping_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookOutcome>, ServiceError> {
    let auth = WebhookAuth {
        secret: state.config.webhooks.shipping_secret.as_deref(),
        token: state.config.webhooks.shipping_token.as_deref(),
        tolerance_secs: state.config.webhooks.timestamp_tolerance_secs,
    };
    verify(&headers, &body, &auth)?;

    let outcome = state
        .services
        .shipping_webhooks
        .process(&body, event_id_header(&headers))
        .await?;

    Ok(Json(outcome))
}

/// Carrier returns webhook; reverse-logistics twin of the shipping one.
#[utoipa::path(
    post,
    path = "/api/v1/webhooks/returns",
    request_body = String,
    responses(
        (status = 200, description = "Event processed (possibly unchanged/duplicate)", body = ReturnWebhookOutcome),
        (status = 401, description = "Signature verification failed", body = crate::errors::ErrorResponse),
        (status = 404, description = "No matching return request", body = crate::errors::ErrorResponse)
    ),
    tag = "Webhooks"
)]
pub async fn returns_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ReturnWebhookOutcome>, ServiceError> {
    let auth = WebhookAuth {
        secret: state.config.webhooks.returns_secret.as_deref(),
        token: state.config.webhooks.returns_token.as_deref(),
        tolerance_secs: state.config.webhooks.timestamp_tolerance_secs,
    };
    verify(&headers, &body, &auth)?;

    let outcome = state
        .services
        .returns_webhooks
        .process(&body, event_id_header(&headers))
        .await?;

    Ok(Json(outcome))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/shipping", post(shipping_webhook))
        .route("/returns", post(returns_webhook))
}
