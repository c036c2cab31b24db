//! Notification dispatch port.

use serde::Serialize;

use crate::domain::{Credits, ItemId, Money, OwnerId, Purpose, TargetId};

/// Error type for notification dispatch.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Notification queue full")]
    QueueFull,

    #[error("Notification dispatcher closed")]
    Closed,

    #[error("Delivery failed: {0}")]
    Delivery(String),
}

/// A successful state transition worth telling someone about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Notification {
    /// Credits were spent on a catalog item for a target.
    ItemPurchased {
        item_id: ItemId,
        buyer_id: OwnerId,
        target_id: TargetId,
        price: Credits,
    },
    /// A checkout-funded record was paid.
    PaymentCompleted {
        item_id: ItemId,
        buyer_id: OwnerId,
        target_id: TargetId,
        purpose: Purpose,
        amount: Money,
    },
}

/// Port for the external notification collaborator.
///
/// Callers treat delivery as best-effort: errors are logged, never propagated.
#[async_trait::async_trait]
pub trait NotificationDispatch: Send + Sync {
    async fn notify(&self, notification: Notification) -> Result<(), NotifyError>;
}
