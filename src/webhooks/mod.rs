//! Shared machinery for the carrier-facing webhook receivers: raw-body
//! authenticity checks and declarative payload normalization.

pub mod normalize;
pub mod signature;

pub use normalize::{normalize, FieldAliases, NormalizedEvent, RETURNS_ALIASES, SHIPPING_ALIASES};
pub use signature::{body_hash, event_id_header, verify, WebhookAuth};
