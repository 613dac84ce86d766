//! In-process event channel connecting state transitions to the
//! notification dispatcher. Sends are best-effort: a full or closed channel
//! is logged and never fails the transition that produced the event.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::db::DbPool;
use crate::models::ReturnStatus;
use crate::services::notifications::NotificationService;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    OrderCreated(Uuid),
    OrderPaid(Uuid),
    OrderPaymentFailed(Uuid),
    OrderCancelled(Uuid),
    OrderShipped(Uuid),
    OrderDelivered(Uuid),
    ReturnStatusChanged {
        return_id: Uuid,
        status: ReturnStatus,
    },
    StockLow {
        product_id: Uuid,
        stock: i32,
        threshold: i32,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("failed to send event: {}", e))
    }
}

/// Consumes events and routes qualifying ones to the notification
/// dispatcher. Pass `None` to drain events without side effects (tests,
/// notification-less deployments).
pub async fn process_events(
    mut receiver: mpsc::Receiver<Event>,
    notifier: Option<Arc<NotificationService>>,
    db: Option<Arc<DbPool>>,
) {
    while let Some(event) = receiver.recv().await {
        debug!(?event, "event received");
        let Some(notifier) = notifier.as_ref() else {
            continue;
        };

        match event {
            Event::OrderPaid(order_id) => {
                notifier.order_confirmation(db.as_deref(), order_id).await;
            }
            Event::OrderShipped(order_id) => {
                notifier.shipping_update(db.as_deref(), order_id).await;
            }
            Event::OrderDelivered(order_id) => {
                notifier.delivery_update(db.as_deref(), order_id).await;
            }
            Event::ReturnStatusChanged { return_id, status } => {
                notifier
                    .return_status_update(db.as_deref(), return_id, status)
                    .await;
            }
            Event::StockLow {
                product_id,
                stock,
                threshold,
            } => {
                notifier
                    .stock_threshold_alert(db.as_deref(), product_id, stock, threshold)
                    .await;
            }
            Event::OrderCreated(_) | Event::OrderPaymentFailed(_) | Event::OrderCancelled(_) => {}
        }
    }

    warn!("event channel closed, dispatcher stopping");
}
