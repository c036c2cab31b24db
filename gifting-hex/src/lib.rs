//! # Gifting Hex
//!
//! Settlement service and its adapters for the credit ledger.
//!
//! ## Architecture
//!
//! - `service/` - Application service (settlement, checkout, reconciliation)
//! - `inbound/` - HTTP adapter (Axum server)
//! - `outbound/` - Payment gateway client and notification dispatch
//!
//! The service is generic over `S: LedgerStore`, so the Postgres and
//! in-memory stores plug in without dynamic dispatch on the hot path.

pub mod inbound;
pub mod openapi;
pub mod outbound;
pub mod service;

#[cfg(test)]
mod service_tests;

pub use service::{GiftingService, ServiceConfig};
