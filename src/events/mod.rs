use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::entities::order_cancellation::CancellationReason;

/// Domain events emitted by the order core. Consumers (notifications,
/// analytics) subscribe via the processor task; sends are fire-and-forget
/// and never fail the emitting operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    DraftSaved(Uuid),
    OrderFinalized {
        order_id: Uuid,
        estimated_total: String,
    },
    OrderCancelled {
        order_id: Uuid,
        reason: CancellationReason,
    },
    OrderRescheduled(Uuid),
    CouponApplied {
        order_id: Uuid,
        coupon_id: Uuid,
    },
    CouponRemoved(Uuid),
    RewardCouponGranted {
        user_id: Uuid,
        coupon_id: Uuid,
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
}

/// Background task that drains the event channel. Currently events are
/// logged; downstream consumers hook in here.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    info!("Event processor started");
    while let Some(event) = receiver.recv().await {
        debug!(?event, "Processing event");
    }
    info!("Event processor stopped");
}
