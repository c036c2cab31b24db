//! HTTP Inbound Adapter
//!
//! Axum-based HTTP server that drives the settlement service.

mod auth;
mod handlers;
mod rate_limit;
mod server;
mod webhook_guard;

pub use handlers::AuthenticatedOwner;
pub use server::{HttpServer, WEBHOOK_PATH};
