//! Ledger transaction (immutable balance history entry).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::credits::Credits;
use super::ids::{OwnerId, TransactionId};
use super::money::{Currency, Money};

/// Reason recorded when credits are spent on a catalog item.
pub const REASON_ITEM_PURCHASE: &str = "item_purchase";
/// Reason recorded when a credit bundle checkout completes.
pub const REASON_CREDIT_PURCHASE: &str = "credit_purchase";
/// Entity type used in back-references to settled items.
pub const RELATED_SETTLED_ITEM: &str = "settled_item";

/// The direction of a ledger transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    /// Credits leaving the balance
    Debit,
    /// Credits added to the balance
    Credit,
}

impl AsRef<str> for TransactionType {
    fn as_ref(&self) -> &str {
        match self {
            Self::Debit => "debit",
            Self::Credit => "credit",
        }
    }
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_ref())
    }
}

/// Back-reference from a transaction to the entity that caused it.
///
/// Not an ownership link: the referenced entity may live in another table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedEntity {
    pub entity_type: String,
    pub entity_id: Uuid,
}

/// A recorded ledger transaction.
///
/// Amounts are signed: debits are negative, credits positive. Transactions are
/// never mutated or deleted once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub owner_id: OwnerId,
    pub transaction_type: TransactionType,
    /// Signed cash value in smallest currency unit
    pub amount: i64,
    pub currency: Currency,
    /// Signed credit delta applied to the balance
    pub amount_credits: i64,
    /// Free-form category, e.g. `item_purchase`
    pub reason: String,
    pub related: Option<RelatedEntity>,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// Creates a debit entry for credits spent.
    pub fn debit(
        owner_id: OwnerId,
        credits: Credits,
        cash_value: Money,
        reason: impl Into<String>,
        related: Option<RelatedEntity>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: TransactionId::new(),
            owner_id,
            transaction_type: TransactionType::Debit,
            amount: -cash_value.amount(),
            currency: cash_value.currency(),
            amount_credits: -credits.value(),
            reason: reason.into(),
            related,
            created_at: now,
        }
    }

    /// Creates a credit entry for credits acquired.
    pub fn credit(
        owner_id: OwnerId,
        credits: Credits,
        cash_paid: Money,
        reason: impl Into<String>,
        related: Option<RelatedEntity>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: TransactionId::new(),
            owner_id,
            transaction_type: TransactionType::Credit,
            amount: cash_paid.amount(),
            currency: cash_paid.currency(),
            amount_credits: credits.value(),
            reason: reason.into(),
            related,
            created_at: now,
        }
    }

    /// Reconstructs a transaction from database fields.
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        id: TransactionId,
        owner_id: OwnerId,
        transaction_type: TransactionType,
        amount: i64,
        currency: Currency,
        amount_credits: i64,
        reason: String,
        related: Option<RelatedEntity>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            owner_id,
            transaction_type,
            amount,
            currency,
            amount_credits,
            reason,
            related,
            created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debit_is_negative() {
        let owner = OwnerId::new();
        let tx = Transaction::debit(
            owner,
            Credits::new(100).unwrap(),
            Money::new(2000, Currency::USD).unwrap(),
            REASON_ITEM_PURCHASE,
            None,
            Utc::now(),
        );

        assert_eq!(tx.transaction_type, TransactionType::Debit);
        assert_eq!(tx.amount_credits, -100);
        assert_eq!(tx.amount, -2000);
        assert_eq!(tx.owner_id, owner);
    }

    #[test]
    fn test_credit_is_positive() {
        let item = Uuid::new_v4();
        let tx = Transaction::credit(
            OwnerId::new(),
            Credits::new(175).unwrap(),
            Money::new(3500, Currency::USD).unwrap(),
            REASON_CREDIT_PURCHASE,
            Some(RelatedEntity {
                entity_type: RELATED_SETTLED_ITEM.into(),
                entity_id: item,
            }),
            Utc::now(),
        );

        assert_eq!(tx.transaction_type, TransactionType::Credit);
        assert_eq!(tx.amount_credits, 175);
        assert_eq!(tx.amount, 3500);
        assert_eq!(tx.related.unwrap().entity_id, item);
    }
}
