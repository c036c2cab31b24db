//! Port traits (interfaces for adapters).
//!
//! These are the contracts that adapters must implement.
//! The application layer depends on these traits, not concrete implementations.

mod clock;
mod gateway;
mod notify;
mod store;

pub use clock::{Clock, SystemClock};
pub use gateway::{CheckoutSession, CheckoutSessionRequest, GatewayError, PaymentGateway};
pub use notify::{Notification, NotificationDispatch, NotifyError};
pub use store::{LedgerStore, LedgerUnit};
