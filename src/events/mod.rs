use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::entities::InvoiceStatus;

/// Domain events emitted by services after their transaction commits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    // Invoice events
    InvoiceCreated {
        invoice_id: Uuid,
        user_id: Uuid,
        invoice_number: String,
    },
    InvoiceUpdated(Uuid),
    InvoiceDeleted(Uuid),
    InvoiceStatusChanged {
        invoice_id: Uuid,
        from: InvoiceStatus,
        to: InvoiceStatus,
    },
    InvoicePaymentRecorded {
        invoice_id: Uuid,
        amount: Decimal,
        balance_due: Decimal,
    },
    InvoiceSent {
        invoice_id: Uuid,
        recipient: String,
    },

    // Client events
    ClientCreated(Uuid),
    ClientDeleted(Uuid),

    // Profile events
    ProfileCreated(Uuid),
}

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

    /// Sends an event, logging instead of failing. Used after commits, where
    /// the write has already happened and the caller must still succeed.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!(error = %e, "Dropping domain event");
        }
    }
}

/// Creates a bounded event channel
pub fn channel(capacity: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (EventSender::new(tx), rx)
}

/// Consumes events until every sender is dropped
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::InvoiceStatusChanged {
                invoice_id,
                from,
                to,
            } => {
                info!(invoice_id = %invoice_id, from = %from, to = %to, "Invoice status changed");
            }
            Event::InvoicePaymentRecorded {
                invoice_id,
                amount,
                balance_due,
            } => {
                info!(
                    invoice_id = %invoice_id,
                    amount = %amount,
                    balance_due = %balance_due,
                    "Payment recorded"
                );
            }
            Event::InvoiceSent {
                invoice_id,
                recipient,
            } => {
                info!(invoice_id = %invoice_id, recipient = %recipient, "Invoice sent");
            }
            other => info!("Received event: {:?}", other),
        }
    }

    info!("Event processing loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_are_delivered_in_order() {
        let (sender, mut rx) = channel(4);
        let id = Uuid::new_v4();

        sender.send(Event::InvoiceUpdated(id)).await.unwrap();
        sender.send(Event::InvoiceDeleted(id)).await.unwrap();

        assert_eq!(rx.recv().await, Some(Event::InvoiceUpdated(id)));
        assert_eq!(rx.recv().await, Some(Event::InvoiceDeleted(id)));
    }

    #[tokio::test]
    async fn send_or_log_swallows_closed_channel() {
        let (sender, rx) = channel(1);
        drop(rx);

        assert!(sender.send(Event::ClientCreated(Uuid::new_v4())).await.is_err());
        sender.send_or_log(Event::ClientCreated(Uuid::new_v4())).await;
    }
}
