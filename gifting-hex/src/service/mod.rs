//! Settlement Application Service
//!
//! Orchestrates domain operations through the store, gateway and notification
//! ports. Contains NO infrastructure logic - pure business orchestration.
//!
//! - `settlement` - spending credits on catalog items
//! - `checkout` - opening cash checkouts (donations, credit bundles)
//! - `reconciliation` - applying signed gateway callbacks

mod checkout;
mod reconciliation;
mod settlement;

use std::sync::Arc;
use std::time::Duration;

use gifting_types::{
    AppError, Clock, Credits, Currency, ItemId, LedgerResponse, LedgerStore, Money, Notification,
    NotificationDispatch, OwnerId, PaymentGateway, SettledItem, SystemClock, Transaction,
    domain::{RELATED_SETTLED_ITEM, RelatedEntity},
};

/// Tunables of the settlement service.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Currency checkouts are opened in
    pub currency: Currency,
    /// Cash value of one credit, in minor units
    pub cents_per_credit: i64,
    /// Largest accepted checkout amount, in minor units
    pub max_checkout_amount: i64,
    /// Bound on a single gateway call
    pub gateway_timeout: Duration,
    /// Shared secret for gateway webhook signatures
    pub webhook_secret: String,
    /// Accepted skew of signature timestamps
    pub webhook_tolerance_secs: i64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            currency: Currency::USD,
            cents_per_credit: 20,
            max_checkout_amount: 100_000,
            gateway_timeout: Duration::from_secs(10),
            webhook_secret: String::new(),
            webhook_tolerance_secs: gifting_repo::security::DEFAULT_TOLERANCE_SECS,
        }
    }
}

/// Application service for the credit ledger and settlement engine.
///
/// Generic over `S: LedgerStore` - the store adapter is injected at compile time.
/// Gateway, notifier and clock are trait objects so tests can swap them freely.
pub struct GiftingService<S: LedgerStore> {
    store: S,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn NotificationDispatch>,
    clock: Arc<dyn Clock>,
    config: ServiceConfig,
}

impl<S: LedgerStore> GiftingService<S> {
    /// Creates a new service using the system clock.
    pub fn new(
        store: S,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn NotificationDispatch>,
        config: ServiceConfig,
    ) -> Self {
        Self {
            store,
            gateway,
            notifier,
            clock: Arc::new(SystemClock),
            config,
        }
    }

    /// Replaces the clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────────────

    /// Returns the owner's balance; owners without a ledger read as zero.
    pub async fn get_ledger(&self, owner_id: OwnerId) -> Result<LedgerResponse, AppError> {
        let ledger = self.store.get_ledger(owner_id).await?;
        Ok(LedgerResponse::from_ledger(owner_id, ledger))
    }

    /// Lists the owner's transactions, newest first.
    pub async fn list_transactions(&self, owner_id: OwnerId) -> Result<Vec<Transaction>, AppError> {
        self.store
            .list_transactions(owner_id)
            .await
            .map_err(Into::into)
    }

    /// Gets an item bought by `owner_id`. Items of other buyers are not found.
    pub async fn get_item(&self, owner_id: OwnerId, id: ItemId) -> Result<SettledItem, AppError> {
        self.store
            .get_item(id)
            .await?
            .filter(|item| item.buyer_id == owner_id)
            .ok_or_else(|| AppError::NotFound(format!("Item {}", id)))
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Helpers shared by the operations
    // ─────────────────────────────────────────────────────────────────────────────

    /// Cash value of spent credits.
    fn credits_cash_value(&self, credits: Credits) -> Result<Money, AppError> {
        let amount = credits
            .value()
            .checked_mul(self.config.cents_per_credit)
            .ok_or_else(|| AppError::Internal("credit value overflow".into()))?;
        Money::new(amount, self.config.currency).map_err(Into::into)
    }

    /// Best-effort delivery; failures are logged and swallowed.
    async fn dispatch(&self, notification: Notification) {
        if let Err(e) = self.notifier.notify(notification).await {
            tracing::warn!(error = %e, "Notification dispatch failed");
        }
    }
}

/// Back-reference from a ledger transaction to a settled item.
fn item_reference(id: ItemId) -> Option<RelatedEntity> {
    Some(RelatedEntity {
        entity_type: RELATED_SETTLED_ITEM.to_string(),
        entity_id: id.into_uuid(),
    })
}
