//! Ledger store port.
//!
//! This is the primary port in our hexagonal architecture.
//! Adapters (Postgres, in-memory) implement both traits.

use chrono::{DateTime, Utc};

use crate::domain::{
    BundleId, CatalogEntry, CatalogEntryId, CreditBundle, Credits, GatewayEventRecord, ItemId,
    Ledger, OwnerId, SettledItem, Transaction,
};
use crate::error::RepoError;

/// One atomic unit of work against the store.
///
/// Everything done through a unit becomes visible only on [`LedgerUnit::commit`].
/// Dropping the unit without committing rolls it back. Row locks taken by the
/// `*_for_update` methods are held until the unit ends.
#[async_trait::async_trait]
pub trait LedgerUnit: Send {
    // ─────────────────────────────────────────────────────────────────────────────
    // Ledger (lock first, then mutate)
    // ─────────────────────────────────────────────────────────────────────────────

    /// Locks the owner's ledger row exclusively. Blocks while another unit
    /// holds the same owner. `None` if the owner has no ledger yet.
    async fn ledger_for_update(&mut self, owner_id: OwnerId) -> Result<Option<Ledger>, RepoError>;

    /// Like [`LedgerUnit::ledger_for_update`], opening an empty ledger first
    /// if the owner has none.
    async fn open_ledger_for_update(
        &mut self,
        owner_id: OwnerId,
        now: DateTime<Utc>,
    ) -> Result<Ledger, RepoError>;

    /// Removes credits. The caller must already hold the owner's lock.
    /// Fails with `InsufficientBalance` and changes nothing if the balance is short.
    async fn debit(
        &mut self,
        owner_id: OwnerId,
        credits: Credits,
        now: DateTime<Utc>,
    ) -> Result<Ledger, RepoError>;

    /// Adds credits. The caller must already hold the owner's lock.
    async fn credit(
        &mut self,
        owner_id: OwnerId,
        credits: Credits,
        now: DateTime<Utc>,
    ) -> Result<Ledger, RepoError>;

    /// Appends an immutable transaction.
    async fn append(&mut self, tx: &Transaction) -> Result<(), RepoError>;

    // ─────────────────────────────────────────────────────────────────────────────
    // Settled items
    // ─────────────────────────────────────────────────────────────────────────────

    async fn insert_item(&mut self, item: &SettledItem) -> Result<(), RepoError>;

    /// Locks an item row by id.
    async fn item_for_update(&mut self, id: ItemId) -> Result<Option<SettledItem>, RepoError>;

    /// Locks an item row by its gateway session id.
    async fn item_for_update_by_session(
        &mut self,
        session_id: &str,
    ) -> Result<Option<SettledItem>, RepoError>;

    /// Persists status, gateway ids and completion time of an item.
    ///
    /// Refuses with `AlreadySettled` when the stored row is already `paid`,
    /// and with `Conflict` when the session id belongs to another item.
    async fn update_item(&mut self, item: &SettledItem) -> Result<(), RepoError>;

    async fn commit(self: Box<Self>) -> Result<(), RepoError>;
}

/// The store: opens units of work and answers read-only queries.
#[async_trait::async_trait]
pub trait LedgerStore: Send + Sync + 'static {
    /// Opens a new atomic unit of work.
    async fn begin(&self) -> Result<Box<dyn LedgerUnit>, RepoError>;

    // ─────────────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────────────

    async fn get_ledger(&self, owner_id: OwnerId) -> Result<Option<Ledger>, RepoError>;

    /// Lists an owner's transactions, newest first.
    async fn list_transactions(&self, owner_id: OwnerId) -> Result<Vec<Transaction>, RepoError>;

    async fn get_item(&self, id: ItemId) -> Result<Option<SettledItem>, RepoError>;

    async fn get_catalog_entry(
        &self,
        id: CatalogEntryId,
    ) -> Result<Option<CatalogEntry>, RepoError>;

    async fn get_credit_bundle(&self, id: BundleId) -> Result<Option<CreditBundle>, RepoError>;

    // ─────────────────────────────────────────────────────────────────────────────
    // API keys & audit
    // ─────────────────────────────────────────────────────────────────────────────

    /// Resolves the owner of an active API key by its hash.
    async fn find_owner_by_api_key(&self, key_hash: &str) -> Result<Option<OwnerId>, RepoError>;

    /// Issues a new API key for an owner. Returns the raw key (shown once).
    async fn create_api_key(&self, owner_id: OwnerId) -> Result<String, RepoError>;

    /// Upserts the journal entry of a gateway event, bumping its attempt count.
    async fn record_gateway_event(&self, record: &GatewayEventRecord) -> Result<(), RepoError>;
}
