//! Declarative normalization of heterogeneous carrier payloads.
//!
//! Each external source carries a field-alias table; one typed function
//! resolves the first present alias per canonical field. Unknown fields are
//! ignored, unknown status words survive into `status` for journaling.

use chrono::{DateTime, Utc};
use serde_json::Value;

/// Alias table for one webhook source.
pub struct FieldAliases {
    pub event_id: &'static [&'static str],
    pub order_id: &'static [&'static str],
    pub order_number: &'static [&'static str],
    pub return_id: &'static [&'static str],
    pub carrier: &'static [&'static str],
    pub tracking_number: &'static [&'static str],
    pub tracking_url: &'static [&'static str],
    pub status: &'static [&'static str],
    pub occurred_at: &'static [&'static str],
}

pub static SHIPPING_ALIASES: FieldAliases = FieldAliases {
    event_id: &["event_id", "eventId", "id"],
    order_id: &["order_id", "orderId"],
    order_number: &["order_number", "orderNumber", "reference"],
    return_id: &[],
    carrier: &["carrier", "provider"],
    tracking_number: &["tracking_number", "trackingNumber", "tn"],
    tracking_url: &["tracking_url", "trackingUrl"],
    status: &["status", "state"],
    occurred_at: &[
        "occurred_at",
        "occurredAt",
        "shipped_at",
        "shippedAt",
        "delivered_at",
        "deliveredAt",
        "timestamp",
    ],
};

pub static RETURNS_ALIASES: FieldAliases = FieldAliases {
    event_id: &["event_id", "eventId"],
    order_id: &["order_id", "orderId", "id"],
    order_number: &["order_number", "orderNumber"],
    return_id: &["return_id", "returnId", "rid"],
    carrier: &["carrier", "provider"],
    tracking_number: &["tracking_number", "trackingNumber", "tn"],
    tracking_url: &["tracking_url", "trackingUrl"],
    status: &["status", "state"],
    occurred_at: &["occurred_at", "delivered_at", "deliveredAt", "deliveryDate"],
};

/// A carrier event reduced to the canonical field set.
#[derive(Debug, Clone, Default)]
pub struct NormalizedEvent {
    pub event_id: Option<String>,
    pub order_id: Option<String>,
    pub order_number: Option<String>,
    pub return_id: Option<String>,
    pub carrier: Option<String>,
    pub tracking_number: Option<String>,
    pub tracking_url: Option<String>,
    pub status: Option<String>,
    pub occurred_at: Option<DateTime<Utc>>,
}

fn pick(payload: &Value, aliases: &[&str]) -> Option<String> {
    for key in aliases {
        match payload.get(*key) {
            Some(Value::String(text)) if !text.trim().is_empty() => {
                return Some(text.trim().to_string())
            }
            Some(Value::Number(number)) => return Some(number.to_string()),
            _ => continue,
        }
    }
    None
}

fn pick_datetime(payload: &Value, aliases: &[&str]) -> Option<DateTime<Utc>> {
    pick(payload, aliases)
        .and_then(|text| DateTime::parse_from_rfc3339(&text).ok())
        .map(|parsed| parsed.with_timezone(&Utc))
}

/// Resolves a raw payload through an alias table.
pub fn normalize(payload: &Value, aliases: &FieldAliases) -> NormalizedEvent {
    NormalizedEvent {
        event_id: pick(payload, aliases.event_id),
        order_id: pick(payload, aliases.order_id),
        order_number: pick(payload, aliases.order_number),
        return_id: pick(payload, aliases.return_id),
        carrier: pick(payload, aliases.carrier),
        tracking_number: pick(payload, aliases.tracking_number),
        tracking_url: pick(payload, aliases.tracking_url),
        status: pick(payload, aliases.status),
        occurred_at: pick_datetime(payload, aliases.occurred_at),
    }
}
