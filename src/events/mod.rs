use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::entities::OrderStatus;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Publishes without blocking the caller. Events describe already committed
    /// state, so a full or closed channel is logged and the event dropped.
    pub fn send_or_log(&self, event: Event) {
        if let Err(err) = self.sender.try_send(event) {
            match err {
                mpsc::error::TrySendError::Full(event) => {
                    warn!(?event, "event channel full; dropping event")
                }
                mpsc::error::TrySendError::Closed(event) => {
                    warn!(?event, "event channel closed; dropping event")
                }
            }
        }
    }
}

/// Domain events emitted after a transaction commits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    CartsMerged {
        user_id: Uuid,
        user_cart_id: Uuid,
        merged_items: usize,
    },
    OrderCreated {
        order_id: Uuid,
        user_id: Uuid,
        amount_cents: i64,
    },
    OrderStatusChanged {
        order_id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
    },
    OrderDeleted(Uuid),
    InventoryDebited {
        variant_id: Uuid,
        quantity: i32,
        stock_after: i32,
    },
    InventoryCredited {
        variant_id: Uuid,
        quantity: i32,
        stock_after: i32,
    },
    LowStock {
        variant_id: Uuid,
        stock: i32,
    },
}

/// Drains the event channel until every sender is dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::CartsMerged {
                user_id,
                user_cart_id,
                merged_items,
            } => info!(%user_id, %user_cart_id, merged_items, "carts merged"),
            Event::OrderCreated {
                order_id,
                user_id,
                amount_cents,
            } => info!(%order_id, %user_id, amount_cents, "order created"),
            Event::OrderStatusChanged { order_id, from, to } => {
                info!(%order_id, %from, %to, "order status changed")
            }
            Event::OrderDeleted(order_id) => info!(%order_id, "order deleted"),
            Event::InventoryDebited {
                variant_id,
                quantity,
                stock_after,
            } => info!(%variant_id, quantity, stock_after, "inventory debited"),
            Event::InventoryCredited {
                variant_id,
                quantity,
                stock_after,
            } => info!(%variant_id, quantity, stock_after, "inventory credited"),
            Event::LowStock { variant_id, stock } => {
                warn!(%variant_id, stock, "variant stock is low")
            }
        }
    }

    warn!("Event processing loop has ended");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_or_log_drops_when_full() {
        let (tx, mut rx) = mpsc::channel(1);
        let sender = EventSender::new(tx);
        let first = Event::OrderDeleted(Uuid::new_v4());

        sender.send_or_log(first.clone());
        sender.send_or_log(Event::OrderDeleted(Uuid::new_v4()));

        assert_eq!(rx.recv().await, Some(first));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn send_reports_closed_channel() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sender = EventSender::new(tx);
        assert!(sender
            .send(Event::OrderDeleted(Uuid::new_v4()))
            .await
            .is_err());
    }
}
