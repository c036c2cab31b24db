//! PostgreSQL ledger store with row-level locking.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres};

use gifting_types::{
    BundleId, CatalogEntry, CatalogEntryId, CreditBundle, Credits, DomainError,
    GatewayEventRecord, ItemId, Ledger, LedgerStore, LedgerUnit, OwnerId, RepoError, SettledItem,
    Transaction,
};

use crate::security::{generate_api_key, hash_api_key};
use crate::types::{
    DbBalance, DbCatalogEntry, DbCreditBundle, DbLedger, DbSettledItem, DbTransaction,
    ItemKindColumns,
};

const LEDGER_COLUMNS: &str = "owner_id, balance_credits, created_at, updated_at";
const ITEM_COLUMNS: &str = "id, buyer_id, target_id, purpose, catalog_entry_id, bundle_id, \
     price_credits, credits, amount, currency, status, gateway_session_id, gateway_charge_id, \
     created_at, completed_at";
const TRANSACTION_COLUMNS: &str = "id, owner_id, transaction_type, amount, currency, \
     amount_credits, reason, related_entity_type, related_entity_id, created_at";

/// Executes SQL statements from a migration file, splitting by semicolons.
async fn execute_migration(pool: &PgPool, sql: &str, name: &str) -> Result<(), anyhow::Error> {
    for statement in sql.split(';') {
        let stmt = statement.trim();
        if !stmt.is_empty() {
            sqlx::query(stmt)
                .execute(pool)
                .await
                .map_err(|e| anyhow::anyhow!("Migration {} failed: {}", name, e))?;
        }
    }
    Ok(())
}

/// Runs all database migrations.
async fn run_migrations(pool: &PgPool) -> Result<(), anyhow::Error> {
    execute_migration(
        pool,
        include_str!("../migrations/0001_create_ledgers_pg.sql"),
        "0001",
    )
    .await?;

    execute_migration(
        pool,
        include_str!("../migrations/0002_create_settled_items_pg.sql"),
        "0002",
    )
    .await?;

    execute_migration(
        pool,
        include_str!("../migrations/0003_create_api_keys_pg.sql"),
        "0003",
    )
    .await?;

    execute_migration(
        pool,
        include_str!("../migrations/0004_create_gateway_events_pg.sql"),
        "0004",
    )
    .await?;

    Ok(())
}

fn db_err(e: sqlx::Error) -> RepoError {
    RepoError::Database(e.to_string())
}

/// Maps unique violations to `Conflict`, everything else to `Database`.
fn write_err(e: sqlx::Error) -> RepoError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            RepoError::Conflict(db.message().to_string())
        }
        _ => db_err(e),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Store
// ─────────────────────────────────────────────────────────────────────────────

/// PostgreSQL store. Locks are database row locks, valid across instances.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connects and runs migrations.
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl LedgerStore for PgStore {
    async fn begin(&self) -> Result<Box<dyn LedgerUnit>, RepoError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RepoError::Transaction(e.to_string()))?;
        Ok(Box::new(PgUnit {
            tx,
            locked: HashSet::new(),
        }))
    }

    async fn get_ledger(&self, owner_id: OwnerId) -> Result<Option<Ledger>, RepoError> {
        let row: Option<DbLedger> = sqlx::query_as(&format!(
            "SELECT {} FROM ledgers WHERE owner_id = $1",
            LEDGER_COLUMNS
        ))
        .bind(owner_id.into_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(DbLedger::into_domain).transpose()
    }

    async fn list_transactions(&self, owner_id: OwnerId) -> Result<Vec<Transaction>, RepoError> {
        let rows: Vec<DbTransaction> = sqlx::query_as(&format!(
            "SELECT {} FROM transactions WHERE owner_id = $1 ORDER BY created_at DESC, id DESC",
            TRANSACTION_COLUMNS
        ))
        .bind(owner_id.into_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(DbTransaction::into_domain).collect()
    }

    async fn get_item(&self, id: ItemId) -> Result<Option<SettledItem>, RepoError> {
        let row: Option<DbSettledItem> = sqlx::query_as(&format!(
            "SELECT {} FROM settled_items WHERE id = $1",
            ITEM_COLUMNS
        ))
        .bind(id.into_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(DbSettledItem::into_domain).transpose()
    }

    async fn get_catalog_entry(
        &self,
        id: CatalogEntryId,
    ) -> Result<Option<CatalogEntry>, RepoError> {
        let row: Option<DbCatalogEntry> = sqlx::query_as(
            r#"SELECT id, name, cost_credits, is_active FROM catalog_entries WHERE id = $1"#,
        )
        .bind(id.into_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(DbCatalogEntry::into_domain).transpose()
    }

    async fn get_credit_bundle(&self, id: BundleId) -> Result<Option<CreditBundle>, RepoError> {
        let row: Option<DbCreditBundle> = sqlx::query_as(
            r#"SELECT id, name, credits, price_amount, currency, is_active
               FROM credit_bundles WHERE id = $1"#,
        )
        .bind(id.into_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(DbCreditBundle::into_domain).transpose()
    }

    async fn find_owner_by_api_key(&self, key_hash: &str) -> Result<Option<OwnerId>, RepoError> {
        let row: Option<(uuid::Uuid,)> = sqlx::query_as(
            r#"SELECT owner_id FROM api_keys WHERE key_hash = $1 AND is_active = TRUE"#,
        )
        .bind(key_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(row.map(|(id,)| OwnerId::from_uuid(id)))
    }

    async fn create_api_key(&self, owner_id: OwnerId) -> Result<String, RepoError> {
        let raw_key = generate_api_key();

        sqlx::query(
            r#"INSERT INTO api_keys (key_hash, owner_id, is_active, created_at)
               VALUES ($1, $2, TRUE, $3)"#,
        )
        .bind(hash_api_key(&raw_key))
        .bind(owner_id.into_uuid())
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(write_err)?;

        Ok(raw_key)
    }

    async fn record_gateway_event(&self, record: &GatewayEventRecord) -> Result<(), RepoError> {
        sqlx::query(
            r#"INSERT INTO gateway_events
                   (event_id, event_type, session_id, outcome, received_at, attempts, last_error)
               VALUES ($1, $2, $3, $4, $5, $6, $7)
               ON CONFLICT (event_id) DO UPDATE SET
                   outcome = EXCLUDED.outcome,
                   last_error = EXCLUDED.last_error,
                   session_id = COALESCE(EXCLUDED.session_id, gateway_events.session_id),
                   attempts = gateway_events.attempts + 1"#,
        )
        .bind(&record.event_id)
        .bind(&record.event_type)
        .bind(&record.session_id)
        .bind(record.outcome.as_ref())
        .bind(record.received_at)
        .bind(record.attempts)
        .bind(&record.last_error)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Unit of work
// ─────────────────────────────────────────────────────────────────────────────

/// One database transaction. Dropping it rolls back.
pub struct PgUnit {
    tx: sqlx::Transaction<'static, Postgres>,
    locked: HashSet<OwnerId>,
}

impl PgUnit {
    fn ensure_locked(&self, owner_id: OwnerId) -> Result<(), RepoError> {
        if self.locked.contains(&owner_id) {
            Ok(())
        } else {
            Err(RepoError::Conflict(format!(
                "ledger {} not locked by this unit",
                owner_id
            )))
        }
    }
}

#[async_trait]
impl LedgerUnit for PgUnit {
    async fn ledger_for_update(&mut self, owner_id: OwnerId) -> Result<Option<Ledger>, RepoError> {
        let row: Option<DbLedger> = sqlx::query_as(&format!(
            "SELECT {} FROM ledgers WHERE owner_id = $1 FOR UPDATE",
            LEDGER_COLUMNS
        ))
        .bind(owner_id.into_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_err)?;

        if row.is_some() {
            self.locked.insert(owner_id);
        }
        row.map(DbLedger::into_domain).transpose()
    }

    async fn open_ledger_for_update(
        &mut self,
        owner_id: OwnerId,
        now: DateTime<Utc>,
    ) -> Result<Ledger, RepoError> {
        sqlx::query(
            r#"INSERT INTO ledgers (owner_id, balance_credits, created_at, updated_at)
               VALUES ($1, 0, $2, $2)
               ON CONFLICT (owner_id) DO NOTHING"#,
        )
        .bind(owner_id.into_uuid())
        .bind(now)
        .execute(&mut *self.tx)
        .await
        .map_err(db_err)?;

        self.ledger_for_update(owner_id)
            .await?
            .ok_or(RepoError::NotFound)
    }

    async fn debit(
        &mut self,
        owner_id: OwnerId,
        credits: Credits,
        now: DateTime<Utc>,
    ) -> Result<Ledger, RepoError> {
        self.ensure_locked(owner_id)?;

        let row: Option<DbLedger> = sqlx::query_as(&format!(
            "UPDATE ledgers SET balance_credits = balance_credits - $1, updated_at = $3
             WHERE owner_id = $2 AND balance_credits >= $1
             RETURNING {}",
            LEDGER_COLUMNS
        ))
        .bind(credits.value())
        .bind(owner_id.into_uuid())
        .bind(now)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_err)?;

        if let Some(row) = row {
            return row.into_domain();
        }

        let current: Option<DbBalance> =
            sqlx::query_as(r#"SELECT balance_credits FROM ledgers WHERE owner_id = $1"#)
                .bind(owner_id.into_uuid())
                .fetch_optional(&mut *self.tx)
                .await
                .map_err(db_err)?;

        match current {
            Some(current) => Err(RepoError::Domain(DomainError::InsufficientBalance {
                required: credits.value(),
                available: current.balance_credits,
            })),
            None => Err(RepoError::NotFound),
        }
    }

    async fn credit(
        &mut self,
        owner_id: OwnerId,
        credits: Credits,
        now: DateTime<Utc>,
    ) -> Result<Ledger, RepoError> {
        self.ensure_locked(owner_id)?;

        let row: Option<DbLedger> = sqlx::query_as(&format!(
            "UPDATE ledgers SET balance_credits = balance_credits + $1, updated_at = $3
             WHERE owner_id = $2
             RETURNING {}",
            LEDGER_COLUMNS
        ))
        .bind(credits.value())
        .bind(owner_id.into_uuid())
        .bind(now)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_err)?;

        row.ok_or(RepoError::NotFound)?.into_domain()
    }

    async fn append(&mut self, tx: &Transaction) -> Result<(), RepoError> {
        let (related_type, related_id) = match &tx.related {
            Some(r) => (Some(r.entity_type.as_str()), Some(r.entity_id)),
            None => (None, None),
        };

        sqlx::query(
            r#"INSERT INTO transactions
                   (id, owner_id, transaction_type, amount, currency, amount_credits, reason,
                    related_entity_type, related_entity_id, created_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"#,
        )
        .bind(tx.id.into_uuid())
        .bind(tx.owner_id.into_uuid())
        .bind(tx.transaction_type.as_ref())
        .bind(tx.amount)
        .bind(tx.currency.to_string())
        .bind(tx.amount_credits)
        .bind(&tx.reason)
        .bind(related_type)
        .bind(related_id)
        .bind(tx.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(write_err)?;

        Ok(())
    }

    async fn insert_item(&mut self, item: &SettledItem) -> Result<(), RepoError> {
        let cols = ItemKindColumns::from(&item.kind);

        sqlx::query(
            r#"INSERT INTO settled_items
                   (id, buyer_id, target_id, purpose, catalog_entry_id, bundle_id,
                    price_credits, credits, amount, currency, status, gateway_session_id,
                    gateway_charge_id, created_at, completed_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)"#,
        )
        .bind(item.id.into_uuid())
        .bind(item.buyer_id.into_uuid())
        .bind(item.target_id.into_uuid())
        .bind(item.purpose().as_ref())
        .bind(cols.catalog_entry_id)
        .bind(cols.bundle_id)
        .bind(cols.price_credits)
        .bind(cols.credits)
        .bind(cols.amount)
        .bind(cols.currency)
        .bind(item.status.as_ref())
        .bind(&item.gateway_session_id)
        .bind(&item.gateway_charge_id)
        .bind(item.created_at)
        .bind(item.completed_at)
        .execute(&mut *self.tx)
        .await
        .map_err(write_err)?;

        Ok(())
    }

    async fn item_for_update(&mut self, id: ItemId) -> Result<Option<SettledItem>, RepoError> {
        let row: Option<DbSettledItem> = sqlx::query_as(&format!(
            "SELECT {} FROM settled_items WHERE id = $1 FOR UPDATE",
            ITEM_COLUMNS
        ))
        .bind(id.into_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_err)?;

        row.map(DbSettledItem::into_domain).transpose()
    }

    async fn item_for_update_by_session(
        &mut self,
        session_id: &str,
    ) -> Result<Option<SettledItem>, RepoError> {
        let row: Option<DbSettledItem> = sqlx::query_as(&format!(
            "SELECT {} FROM settled_items WHERE gateway_session_id = $1 FOR UPDATE",
            ITEM_COLUMNS
        ))
        .bind(session_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_err)?;

        row.map(DbSettledItem::into_domain).transpose()
    }

    async fn update_item(&mut self, item: &SettledItem) -> Result<(), RepoError> {
        let result = sqlx::query(
            r#"UPDATE settled_items
               SET status = $2, gateway_session_id = $3, gateway_charge_id = $4, completed_at = $5
               WHERE id = $1 AND status <> 'paid'"#,
        )
        .bind(item.id.into_uuid())
        .bind(item.status.as_ref())
        .bind(&item.gateway_session_id)
        .bind(&item.gateway_charge_id)
        .bind(item.completed_at)
        .execute(&mut *self.tx)
        .await
        .map_err(write_err)?;

        if result.rows_affected() > 0 {
            return Ok(());
        }

        let stored: Option<(String,)> =
            sqlx::query_as(r#"SELECT status FROM settled_items WHERE id = $1"#)
                .bind(item.id.into_uuid())
                .fetch_optional(&mut *self.tx)
                .await
                .map_err(db_err)?;

        match stored {
            Some(_) => Err(DomainError::AlreadySettled(item.id).into()),
            None => Err(RepoError::NotFound),
        }
    }

    async fn commit(self: Box<Self>) -> Result<(), RepoError> {
        self.tx
            .commit()
            .await
            .map_err(|e| RepoError::Transaction(e.to_string()))
    }
}
