//! Status axes for orders, payments and returns.
//!
//! Both axes of an order (fulfillment status and payment status) are explicit
//! finite state sets with a transition table consulted by every mutator, and
//! a rank table that gates webhook-driven transitions so a late, lower-ranked
//! event can never regress state.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use utoipa::ToSchema;

/// Order fulfillment/lifecycle status.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Paid,
    Failed,
    Confirmed,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 7] = [
        OrderStatus::Pending,
        OrderStatus::Paid,
        OrderStatus::Failed,
        OrderStatus::Confirmed,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ];

    /// States a given target may legally be reached from, per the
    /// transition table. Mutators use this as the conditional-update guard.
    pub fn sources_for(target: OrderStatus) -> Vec<OrderStatus> {
        Self::ALL
            .iter()
            .copied()
            .filter(|from| from.can_transition_to(target))
            .collect()
    }

    /// Allowed forward transitions. `Failed -> Paid` covers the lost-callback
    /// race where the housekeeper force-failed an order the gateway later
    /// reports as successfully paid.
    pub fn can_transition_to(self, to: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, to),
            (Pending, Paid)
                | (Pending, Failed)
                | (Pending, Cancelled)
                | (Failed, Paid)
                | (Paid, Confirmed)
                | (Paid, Shipped)
                | (Paid, Delivered)
                | (Paid, Cancelled)
                | (Confirmed, Shipped)
                | (Confirmed, Delivered)
                | (Confirmed, Cancelled)
                | (Shipped, Delivered)
        )
    }

    /// Rank used by the shipping webhook receiver: a carrier event mapping to
    /// a rank at or below the current one leaves the order unchanged.
    pub fn rank(self) -> u8 {
        match self {
            OrderStatus::Pending => 0,
            OrderStatus::Failed | OrderStatus::Cancelled => 1,
            OrderStatus::Paid => 2,
            OrderStatus::Confirmed => 3,
            OrderStatus::Shipped => 4,
            OrderStatus::Delivered => 5,
        }
    }
}

/// Payment status: a separate axis from the order lifecycle.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PaymentStatus {
    Unpaid,
    Paid,
    PartialRefunded,
    Refunded,
}

impl PaymentStatus {
    pub fn can_transition_to(self, to: PaymentStatus) -> bool {
        use PaymentStatus::*;
        matches!(
            (self, to),
            (Unpaid, Paid)
                | (Unpaid, Refunded)
                | (Paid, PartialRefunded)
                | (Paid, Refunded)
                | (PartialRefunded, PartialRefunded)
                | (PartialRefunded, Refunded)
        )
    }
}

/// Reverse-logistics status for a return request.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ReturnStatus {
    Requested,
    Approved,
    Rejected,
    InTransit,
    Received,
    Refunded,
    Cancelled,
}

impl ReturnStatus {
    pub fn rank(self) -> u8 {
        match self {
            ReturnStatus::Requested => 0,
            ReturnStatus::Approved | ReturnStatus::Rejected => 1,
            ReturnStatus::InTransit => 2,
            ReturnStatus::Received => 3,
            ReturnStatus::Refunded | ReturnStatus::Cancelled => 4,
        }
    }
}

/// Maps heterogeneous carrier vocabulary onto the internal order status set.
/// Unknown words map to `None` and are journaled without effect.
pub fn map_carrier_status(raw: &str) -> Option<OrderStatus> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "accepted" | "in_transit" | "in-transit" | "transit" | "picked_up" | "shipped" => {
            Some(OrderStatus::Shipped)
        }
        "delivered" | "completed" => Some(OrderStatus::Delivered),
        "failed" | "cancelled" | "canceled" => Some(OrderStatus::Failed),
        _ => None,
    }
}

/// Maps carrier vocabulary for return shipments onto the return status set.
pub fn map_return_status(raw: &str) -> Option<ReturnStatus> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "in_transit" | "in-transit" | "transit" | "return_in_transit" | "returning" => {
            Some(ReturnStatus::InTransit)
        }
        "received" | "delivered" | "returned" | "completed" => Some(ReturnStatus::Received),
        "cancelled" | "canceled" => Some(ReturnStatus::Cancelled),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn order_status_round_trips_through_strings() {
        for status in [
            OrderStatus::Pending,
            OrderStatus::Paid,
            OrderStatus::Failed,
            OrderStatus::Confirmed,
            OrderStatus::Shipped,
            OrderStatus::Delivered,
            OrderStatus::Cancelled,
        ] {
            let text = status.to_string();
            assert_eq!(OrderStatus::from_str(&text).unwrap(), status);
        }
        assert!(OrderStatus::from_str("unknown").is_err());
    }

    #[test]
    fn transition_table_blocks_regressions() {
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Paid));
        assert!(OrderStatus::Failed.can_transition_to(OrderStatus::Paid));
        assert!(OrderStatus::Shipped.can_transition_to(OrderStatus::Delivered));

        assert!(!OrderStatus::Paid.can_transition_to(OrderStatus::Pending));
        assert!(!OrderStatus::Delivered.can_transition_to(OrderStatus::Shipped));
        assert!(!OrderStatus::Cancelled.can_transition_to(OrderStatus::Paid));
        assert!(!OrderStatus::Delivered.can_transition_to(OrderStatus::Cancelled));
    }

    #[test]
    fn shipping_rank_is_monotonic() {
        assert!(OrderStatus::Delivered.rank() > OrderStatus::Shipped.rank());
        assert!(OrderStatus::Shipped.rank() > OrderStatus::Paid.rank());
        // A "failed" carrier event after payment never outranks paid.
        assert!(OrderStatus::Failed.rank() < OrderStatus::Paid.rank());
    }

    #[test]
    fn payment_status_machine() {
        assert!(PaymentStatus::Paid.can_transition_to(PaymentStatus::PartialRefunded));
        assert!(PaymentStatus::PartialRefunded.can_transition_to(PaymentStatus::Refunded));
        assert!(!PaymentStatus::Refunded.can_transition_to(PaymentStatus::PartialRefunded));
        assert!(!PaymentStatus::Refunded.can_transition_to(PaymentStatus::Paid));
    }

    #[test]
    fn carrier_vocabulary_mapping() {
        assert_eq!(map_carrier_status("IN_TRANSIT"), Some(OrderStatus::Shipped));
        assert_eq!(map_carrier_status("accepted"), Some(OrderStatus::Shipped));
        assert_eq!(
            map_carrier_status("completed"),
            Some(OrderStatus::Delivered)
        );
        assert_eq!(map_carrier_status("canceled"), Some(OrderStatus::Failed));
        assert_eq!(map_carrier_status("mystery"), None);
    }

    #[test]
    fn return_vocabulary_mapping() {
        assert_eq!(
            map_return_status("return_in_transit"),
            Some(ReturnStatus::InTransit)
        );
        assert_eq!(map_return_status("returned"), Some(ReturnStatus::Received));
        assert_eq!(
            map_return_status("cancelled"),
            Some(ReturnStatus::Cancelled)
        );
        assert_eq!(map_return_status(""), None);
    }

    #[test]
    fn return_rank_blocks_regression_to_transit() {
        assert!(ReturnStatus::Received.rank() > ReturnStatus::InTransit.rank());
        assert!(ReturnStatus::Refunded.rank() > ReturnStatus::Received.rank());
    }
}
