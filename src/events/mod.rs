use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

use crate::entities::order::OrderStatus;
use crate::entities::otp_code::OtpPurpose;

/// Domain events emitted after a transaction commits. Consumers (projection
/// builders, the notification dispatcher, audit sinks) subscribe to the
/// receiving end of the channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    OrderPlaced {
        order_id: Uuid,
        user_id: Uuid,
        store_id: Uuid,
    },
    OrderStatusChanged {
        order_id: Uuid,
        old_status: OrderStatus,
        new_status: OrderStatus,
    },
    PaymentConfirmed {
        order_id: Uuid,
    },
    CouponRedeemed {
        code: String,
        user_id: Uuid,
        order_id: Uuid,
    },
    OtpIssued {
        email: String,
        purpose: OtpPurpose,
        expires_at: DateTime<Utc>,
    },
    OtpVerified {
        email: String,
        purpose: OtpPurpose,
    },
    RatingSubmitted {
        user_id: Uuid,
        product_id: Uuid,
        order_id: Uuid,
        score: i32,
    },
    ProductStockChanged {
        product_id: Uuid,
        in_stock: bool,
    },
    MessageSent {
        message_id: Uuid,
        sender_id: Uuid,
        receiver_id: Uuid,
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
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Fire-and-forget emission for the post-commit path: a full or closed
    /// channel is logged and swallowed, never rolled back into the
    /// originating operation.
    pub async fn emit(&self, event: Event) {
        if let Err(err) = self.send(event).await {
            warn!("dropping domain event: {}", err);
        }
    }
}

/// Creates a bounded event channel pair.
pub fn channel(capacity: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(capacity);
    (EventSender::new(tx), rx)
}
