//! # Gifting Types
//!
//! Domain types and port traits for the credit ledger and settlement engine.
//! This crate has ZERO external IO dependencies - only data structures,
//! business rules, and trait definitions.
//!
//! ## Architecture
//!
//! This crate represents the **innermost core** of the hexagonal architecture:
//! - `domain/` - Pure domain types (Ledger, Transaction, SettledItem, catalog)
//! - `ports/` - Trait definitions that adapters must implement
//! - `dto/` - Data Transfer Objects for API boundaries
//! - `error/` - Domain and application error types

pub mod domain;
pub mod dto;
pub mod error;
pub mod ports;

// Re-export commonly used types
pub use domain::{
    ApiKey, BundleId, CatalogEntry, CatalogEntryId, CreditBundle, Credits, Currency,
    EventOutcome, GatewayEvent, GatewayEventKind, GatewayEventRecord, ItemId, ItemKind,
    ItemStatus, Ledger, Money, OwnerId, Purpose, SettledItem, TargetId, Transaction,
    TransactionId, TransactionType, Transition,
};
pub use dto::*;
pub use error::{AppError, DomainError, RepoError};
pub use ports::{
    CheckoutSession, CheckoutSessionRequest, Clock, GatewayError, LedgerStore, LedgerUnit,
    Notification, NotificationDispatch, NotifyError, PaymentGateway, SystemClock,
};
