use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::post,
    Json, Router,
};
use bytes::Bytes;
use serde_json::json;
use tracing::warn;

use crate::services::payment_callback::{CallbackParams, CallbackResolution, CallbackStatus};
use crate::AppState;

/// Gateway-facing payment callback. The gateway posts form-encoded tokens,
/// browsers arrive via GET with query parameters, and internal callers send
/// JSON; all three shapes resolve identically. Always answers 200: a
/// non-200 would trigger aggressive gateway retries, and raw gateway errors
/// must never reach a browser.
#[utoipa::path(
    post,
    path = "/api/v1/payments/callback",
    request_body = CallbackParams,
    responses(
        (status = 200, description = "Resolution acknowledged (JSON) or auto-redirect document (HTML)")
    ),
    tag = "Payments"
)]
pub async fn payment_callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackParams>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let from_body = parse_callback_body(&headers, &body);
    let params = merge_params(query, from_body);
    respond(&state, &params).await
}

/// Browser-redirect variant of the callback.
#[utoipa::path(
    get,
    path = "/api/v1/payments/callback",
    params(
        ("token" = Option<String>, Query, description = "Gateway session token"),
        ("conversationId" = Option<String>, Query, description = "Correlation id"),
        ("orderId" = Option<uuid::Uuid>, Query, description = "Order id")
    ),
    responses(
        (status = 200, description = "Resolution acknowledged (JSON) or auto-redirect document (HTML)")
    ),
    tag = "Payments"
)]
pub async fn payment_callback_redirect(
    State(state): State<AppState>,
    Query(query): Query<CallbackParams>,
) -> Response {
    respond(&state, &query).await
}

async fn respond(state: &AppState, params: &CallbackParams) -> Response {
    let resolution = match state.services.payment_callback.resolve(params).await {
        Ok(resolution) => resolution,
        Err(e) => {
            // Fail neutral: the gateway only needs an acknowledgement.
            warn!(error = %e, "payment callback resolution errored");
            CallbackResolution {
                order_id: params.order_id,
                status: CallbackStatus::Pending,
                updated: false,
            }
        }
    };

    if let Some(target) = &state.config.gateway.success_redirect_url {
        return Html(redirect_document(target, &resolution)).into_response();
    }

    (
        StatusCode::OK,
        Json(json!({
            "status": resolution.status,
            "orderId": resolution.order_id,
            "updated": resolution.updated,
        })),
    )
        .into_response()
}

/// Auto-redirecting document for browsers coming back from the gateway.
/// Some gateways render the callback response instead of following a 302,
/// so the redirect is done client-side.
fn redirect_document(target: &str, resolution: &CallbackResolution) -> String {
    let status = match resolution.status {
        CallbackStatus::Success => "success",
        CallbackStatus::Failure => "failure",
        CallbackStatus::Pending => "pending",
    };
    let mut url = format!("{}?status={}", target.trim_end_matches('?'), status);
    if let Some(order_id) = resolution.order_id {
        url.push_str(&format!("&orderId={}", order_id));
    }

    format!(
        concat!(
            "<!doctype html><html><head><meta charset=\"utf-8\">",
            "<meta http-equiv=\"refresh\" content=\"0;url={url}\">",
            "<title>Redirecting...</title></head>",
            "<body><a href=\"{url}\">Continue</a>",
            "<script>try{{window.top.location.replace(\"{url}\");}}",
            "catch(e){{location.href=\"{url}\";}}</script></body></html>"
        ),
        url = url
    )
}

fn parse_callback_body(headers: &HeaderMap, body: &Bytes) -> CallbackParams {
    if body.is_empty() {
        return CallbackParams::default();
    }

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("")
        .to_ascii_lowercase();

    if content_type.contains("application/x-www-form-urlencoded") {
        serde_urlencoded::from_bytes(body).unwrap_or_default()
    } else {
        serde_json::from_slice(body).unwrap_or_default()
    }
}

/// Body values win; the query string fills the gaps (the gateway appends
/// identifiers to the callback URL it was given).
fn merge_params(query: CallbackParams, body: CallbackParams) -> CallbackParams {
    CallbackParams {
        token: body.token.or(query.token),
        conversation_id: body.conversation_id.or(query.conversation_id),
        order_id: body.order_id.or(query.order_id),
    }
}

pub fn routes() -> Router<AppState> {
    Router::new().route(
        "/callback",
        post(payment_callback).get(payment_callback_redirect),
    )
}
