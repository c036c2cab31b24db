//! PostgreSQL row types and their mapping to domain types.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use gifting_types::{
    BundleId, CatalogEntry, CatalogEntryId, CreditBundle, Credits, Currency, ItemId, ItemKind,
    ItemStatus, Ledger, Money, OwnerId, Purpose, RepoError, SettledItem, TargetId, Transaction,
    TransactionId, TransactionType, domain::RelatedEntity,
};

// ─────────────────────────────────────────────────────────────────────────────
// Database row structs (derive FromRow for automatic mapping)
// ─────────────────────────────────────────────────────────────────────────────

/// Ledger row from database.
#[derive(FromRow)]
pub struct DbLedger {
    pub owner_id: Uuid,
    pub balance_credits: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DbLedger {
    pub fn into_domain(self) -> Result<Ledger, RepoError> {
        Ok(Ledger {
            owner_id: OwnerId::from_uuid(self.owner_id),
            balance: credits(self.balance_credits)?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Transaction row from database.
#[derive(FromRow)]
pub struct DbTransaction {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub transaction_type: String,
    pub amount: i64,
    pub currency: String,
    pub amount_credits: i64,
    pub reason: String,
    pub related_entity_type: Option<String>,
    pub related_entity_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl DbTransaction {
    pub fn into_domain(self) -> Result<Transaction, RepoError> {
        let related = match (self.related_entity_type, self.related_entity_id) {
            (Some(entity_type), Some(entity_id)) => Some(RelatedEntity {
                entity_type,
                entity_id,
            }),
            _ => None,
        };

        Ok(Transaction::from_parts(
            TransactionId::from_uuid(self.id),
            OwnerId::from_uuid(self.owner_id),
            parse_transaction_type(&self.transaction_type)?,
            self.amount,
            parse_currency(&self.currency)?,
            self.amount_credits,
            self.reason,
            related,
            self.created_at,
        ))
    }
}

/// Settled item row from database. Kind-specific columns are nullable.
#[derive(FromRow)]
pub struct DbSettledItem {
    pub id: Uuid,
    pub buyer_id: Uuid,
    pub target_id: Uuid,
    pub purpose: String,
    pub catalog_entry_id: Option<Uuid>,
    pub bundle_id: Option<Uuid>,
    pub price_credits: Option<i64>,
    pub credits: Option<i64>,
    pub amount: Option<i64>,
    pub currency: Option<String>,
    pub status: String,
    pub gateway_session_id: Option<String>,
    pub gateway_charge_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl DbSettledItem {
    pub fn into_domain(self) -> Result<SettledItem, RepoError> {
        let purpose: Purpose = self.purpose.parse()?;
        let kind = match purpose {
            Purpose::Gift => ItemKind::Gift {
                catalog_entry_id: CatalogEntryId::from_uuid(required(
                    self.catalog_entry_id,
                    "catalog_entry_id",
                )?),
                price: credits(required(self.price_credits, "price_credits")?)?,
            },
            Purpose::Donation => ItemKind::Donation {
                amount: money(self.amount, self.currency.as_deref())?,
            },
            Purpose::CreditPurchase => ItemKind::CreditPurchase {
                bundle_id: BundleId::from_uuid(required(self.bundle_id, "bundle_id")?),
                credits: credits(required(self.credits, "credits")?)?,
                amount: money(self.amount, self.currency.as_deref())?,
            },
        };

        Ok(SettledItem {
            id: ItemId::from_uuid(self.id),
            buyer_id: OwnerId::from_uuid(self.buyer_id),
            target_id: TargetId::from_uuid(self.target_id),
            kind,
            status: self.status.parse::<ItemStatus>()?,
            gateway_session_id: self.gateway_session_id,
            gateway_charge_id: self.gateway_charge_id,
            created_at: self.created_at,
            completed_at: self.completed_at,
        })
    }
}

/// Catalog entry row from database.
#[derive(FromRow)]
pub struct DbCatalogEntry {
    pub id: Uuid,
    pub name: String,
    pub cost_credits: i64,
    pub is_active: bool,
}

impl DbCatalogEntry {
    pub fn into_domain(self) -> Result<CatalogEntry, RepoError> {
        Ok(CatalogEntry {
            id: CatalogEntryId::from_uuid(self.id),
            name: self.name,
            cost: credits(self.cost_credits)?,
            is_active: self.is_active,
        })
    }
}

/// Credit bundle row from database.
#[derive(FromRow)]
pub struct DbCreditBundle {
    pub id: Uuid,
    pub name: String,
    pub credits: i64,
    pub price_amount: i64,
    pub currency: String,
    pub is_active: bool,
}

impl DbCreditBundle {
    pub fn into_domain(self) -> Result<CreditBundle, RepoError> {
        Ok(CreditBundle {
            id: BundleId::from_uuid(self.id),
            name: self.name,
            credits: credits(self.credits)?,
            price: money(Some(self.price_amount), Some(&self.currency))?,
            is_active: self.is_active,
        })
    }
}

/// Balance-only row, used to explain a refused debit.
#[derive(FromRow)]
pub struct DbBalance {
    pub balance_credits: i64,
}

// ─────────────────────────────────────────────────────────────────────────────
// Domain -> columns
// ─────────────────────────────────────────────────────────────────────────────

/// Flattened kind columns of a settled item, ready for binding.
pub struct ItemKindColumns {
    pub catalog_entry_id: Option<Uuid>,
    pub bundle_id: Option<Uuid>,
    pub price_credits: Option<i64>,
    pub credits: Option<i64>,
    pub amount: Option<i64>,
    pub currency: Option<String>,
}

impl From<&ItemKind> for ItemKindColumns {
    fn from(kind: &ItemKind) -> Self {
        let cash = kind.cash_amount();
        let (catalog_entry_id, bundle_id, price_credits, credits) = match kind {
            ItemKind::Gift {
                catalog_entry_id,
                price,
            } => (Some(catalog_entry_id.into_uuid()), None, Some(price.value()), None),
            ItemKind::Donation { .. } => (None, None, None, None),
            ItemKind::CreditPurchase {
                bundle_id, credits, ..
            } => (None, Some(bundle_id.into_uuid()), None, Some(credits.value())),
        };

        Self {
            catalog_entry_id,
            bundle_id,
            price_credits,
            credits,
            amount: cash.map(|m| m.amount()),
            currency: cash.map(|m| m.currency().to_string()),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Parsing helpers
// ─────────────────────────────────────────────────────────────────────────────

pub fn parse_currency(s: &str) -> Result<Currency, RepoError> {
    s.parse()
        .map_err(|_| RepoError::Database(format!("Unknown currency: {}", s)))
}

pub fn parse_transaction_type(s: &str) -> Result<TransactionType, RepoError> {
    match s {
        "debit" => Ok(TransactionType::Debit),
        "credit" => Ok(TransactionType::Credit),
        _ => Err(RepoError::Database(format!(
            "Unknown transaction type: {}",
            s
        ))),
    }
}

fn credits(value: i64) -> Result<Credits, RepoError> {
    Credits::new(value).map_err(|e| RepoError::Database(e.to_string()))
}

fn money(amount: Option<i64>, currency: Option<&str>) -> Result<Money, RepoError> {
    let amount = required(amount, "amount")?;
    let currency = parse_currency(required(currency, "currency")?)?;
    Money::new(amount, currency).map_err(|e| RepoError::Database(e.to_string()))
}

fn required<T>(value: Option<T>, column: &str) -> Result<T, RepoError> {
    value.ok_or_else(|| RepoError::Database(format!("column {} unexpectedly null", column)))
}
