//! Outbound adapters: the payment gateway client and notification dispatch.

mod gateway;
mod notify;

pub use gateway::{GatewaySettings, HttpPaymentGateway};
pub use notify::{LogNotifier, NotificationDispatcher, NotificationWorker, wait_for_drain};
