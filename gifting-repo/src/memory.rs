//! In-process ledger store.
//!
//! A unit of work holds the single store mutex from `begin` until it is
//! committed or dropped, so units are fully serialized. Writes go to a working
//! copy that replaces the shared state only on commit.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use gifting_types::{
    ApiKey, BundleId, CatalogEntry, CatalogEntryId, CreditBundle, Credits, DomainError,
    GatewayEventRecord, ItemId, Ledger, LedgerStore, LedgerUnit, OwnerId, RepoError, SettledItem,
    Transaction,
};

use crate::security::{generate_api_key, hash_api_key};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    ledgers: HashMap<OwnerId, Ledger>,
    /// Append order is creation order.
    transactions: Vec<Transaction>,
    items: HashMap<ItemId, SettledItem>,
    sessions: HashMap<String, ItemId>,
    catalog: HashMap<CatalogEntryId, CatalogEntry>,
    bundles: HashMap<BundleId, CreditBundle>,
    api_keys: HashMap<String, ApiKey>,
    gateway_events: HashMap<String, GatewayEventRecord>,
}

impl MemoryState {
    fn claim_session(&mut self, item: &SettledItem) -> Result<(), RepoError> {
        let Some(session_id) = &item.gateway_session_id else {
            return Ok(());
        };
        match self.sessions.get(session_id) {
            Some(owner) if *owner != item.id => Err(RepoError::Conflict(format!(
                "session {} already bound",
                session_id
            ))),
            _ => {
                self.sessions.insert(session_id.clone(), item.id);
                Ok(())
            }
        }
    }
}

/// In-memory store for tests and local runs.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a catalog entry.
    pub async fn insert_catalog_entry(&self, entry: CatalogEntry) {
        self.state.lock().await.catalog.insert(entry.id, entry);
    }

    /// Seeds a credit bundle.
    pub async fn insert_credit_bundle(&self, bundle: CreditBundle) {
        self.state.lock().await.bundles.insert(bundle.id, bundle);
    }

    /// Returns the journal entry for a gateway event, if any.
    pub async fn gateway_event(&self, event_id: &str) -> Option<GatewayEventRecord> {
        self.state.lock().await.gateway_events.get(event_id).cloned()
    }
}

/// Unit of work over a [`MemoryStore`].
pub struct MemoryUnit {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
    locked: HashSet<OwnerId>,
}

impl MemoryUnit {
    fn locked_ledger(&mut self, owner_id: OwnerId) -> Result<&mut Ledger, RepoError> {
        if !self.locked.contains(&owner_id) {
            return Err(RepoError::Conflict(format!(
                "ledger {} not locked by this unit",
                owner_id
            )));
        }
        self.working
            .ledgers
            .get_mut(&owner_id)
            .ok_or(RepoError::NotFound)
    }
}

#[async_trait]
impl LedgerUnit for MemoryUnit {
    async fn ledger_for_update(&mut self, owner_id: OwnerId) -> Result<Option<Ledger>, RepoError> {
        let ledger = self.working.ledgers.get(&owner_id).cloned();
        if ledger.is_some() {
            self.locked.insert(owner_id);
        }
        Ok(ledger)
    }

    async fn open_ledger_for_update(
        &mut self,
        owner_id: OwnerId,
        now: DateTime<Utc>,
    ) -> Result<Ledger, RepoError> {
        let ledger = self
            .working
            .ledgers
            .entry(owner_id)
            .or_insert_with(|| Ledger::open(owner_id, now))
            .clone();
        self.locked.insert(owner_id);
        Ok(ledger)
    }

    async fn debit(
        &mut self,
        owner_id: OwnerId,
        credits: Credits,
        now: DateTime<Utc>,
    ) -> Result<Ledger, RepoError> {
        let ledger = self.locked_ledger(owner_id)?;
        ledger.debit(credits, now)?;
        Ok(ledger.clone())
    }

    async fn credit(
        &mut self,
        owner_id: OwnerId,
        credits: Credits,
        now: DateTime<Utc>,
    ) -> Result<Ledger, RepoError> {
        let ledger = self.locked_ledger(owner_id)?;
        ledger.credit(credits, now)?;
        Ok(ledger.clone())
    }

    async fn append(&mut self, tx: &Transaction) -> Result<(), RepoError> {
        self.working.transactions.push(tx.clone());
        Ok(())
    }

    async fn insert_item(&mut self, item: &SettledItem) -> Result<(), RepoError> {
        if self.working.items.contains_key(&item.id) {
            return Err(RepoError::Conflict(format!("item {} exists", item.id)));
        }
        self.working.claim_session(item)?;
        self.working.items.insert(item.id, item.clone());
        Ok(())
    }

    async fn item_for_update(&mut self, id: ItemId) -> Result<Option<SettledItem>, RepoError> {
        Ok(self.working.items.get(&id).cloned())
    }

    async fn item_for_update_by_session(
        &mut self,
        session_id: &str,
    ) -> Result<Option<SettledItem>, RepoError> {
        Ok(self
            .working
            .sessions
            .get(session_id)
            .and_then(|id| self.working.items.get(id))
            .cloned())
    }

    async fn update_item(&mut self, item: &SettledItem) -> Result<(), RepoError> {
        let stored = self.working.items.get(&item.id).ok_or(RepoError::NotFound)?;
        if stored.is_paid() {
            return Err(DomainError::AlreadySettled(item.id).into());
        }
        self.working.claim_session(item)?;
        self.working.items.insert(item.id, item.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), RepoError> {
        let MemoryUnit {
            mut guard, working, ..
        } = *self;
        *guard = working;
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn LedgerUnit>, RepoError> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryUnit {
            guard,
            working,
            locked: HashSet::new(),
        }))
    }

    async fn get_ledger(&self, owner_id: OwnerId) -> Result<Option<Ledger>, RepoError> {
        Ok(self.state.lock().await.ledgers.get(&owner_id).cloned())
    }

    async fn list_transactions(&self, owner_id: OwnerId) -> Result<Vec<Transaction>, RepoError> {
        let state = self.state.lock().await;
        Ok(state
            .transactions
            .iter()
            .rev()
            .filter(|tx| tx.owner_id == owner_id)
            .cloned()
            .collect())
    }

    async fn get_item(&self, id: ItemId) -> Result<Option<SettledItem>, RepoError> {
        Ok(self.state.lock().await.items.get(&id).cloned())
    }

    async fn get_catalog_entry(
        &self,
        id: CatalogEntryId,
    ) -> Result<Option<CatalogEntry>, RepoError> {
        Ok(self.state.lock().await.catalog.get(&id).cloned())
    }

    async fn get_credit_bundle(&self, id: BundleId) -> Result<Option<CreditBundle>, RepoError> {
        Ok(self.state.lock().await.bundles.get(&id).cloned())
    }

    async fn find_owner_by_api_key(&self, key_hash: &str) -> Result<Option<OwnerId>, RepoError> {
        Ok(self
            .state
            .lock()
            .await
            .api_keys
            .get(key_hash)
            .filter(|key| key.is_active)
            .map(|key| key.owner_id))
    }

    async fn create_api_key(&self, owner_id: OwnerId) -> Result<String, RepoError> {
        let raw_key = generate_api_key();
        let key_hash = hash_api_key(&raw_key);
        let api_key = ApiKey::new(key_hash.clone(), owner_id, Utc::now());
        self.state.lock().await.api_keys.insert(key_hash, api_key);
        Ok(raw_key)
    }

    async fn record_gateway_event(&self, record: &GatewayEventRecord) -> Result<(), RepoError> {
        let mut state = self.state.lock().await;
        match state.gateway_events.get_mut(&record.event_id) {
            Some(existing) => {
                existing.attempts += 1;
                existing.outcome = record.outcome;
                existing.last_error = record.last_error.clone();
                if record.session_id.is_some() {
                    existing.session_id = record.session_id.clone();
                }
            }
            None => {
                state
                    .gateway_events
                    .insert(record.event_id.clone(), record.clone());
            }
        }
        Ok(())
    }
}
