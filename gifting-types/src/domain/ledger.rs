//! Ledger domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::credits::Credits;
use super::ids::OwnerId;
use crate::error::DomainError;

/// Spendable credit balance of one owner.
///
/// The balance always equals the sum of the owner's transaction credit amounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ledger {
    /// Owning identity
    pub owner_id: OwnerId,
    /// Current balance
    pub balance: Credits,
    /// When the ledger was first opened
    pub created_at: DateTime<Utc>,
    /// Last balance change
    pub updated_at: DateTime<Utc>,
}

impl Ledger {
    /// Opens an empty ledger.
    pub fn open(owner_id: OwnerId, now: DateTime<Utc>) -> Self {
        Self {
            owner_id,
            balance: Credits::ZERO,
            created_at: now,
            updated_at: now,
        }
    }

    /// Adds credits to the balance.
    pub fn credit(&mut self, amount: Credits, now: DateTime<Utc>) -> Result<(), DomainError> {
        self.balance = self.balance.checked_add(amount)?;
        self.updated_at = now;
        Ok(())
    }

    /// Removes credits; fails without changing anything if the balance is short.
    pub fn debit(&mut self, amount: Credits, now: DateTime<Utc>) -> Result<(), DomainError> {
        self.balance = self.balance.checked_sub(amount)?;
        self.updated_at = now;
        Ok(())
    }

    pub fn has_sufficient_balance(&self, amount: Credits) -> bool {
        self.balance >= amount
    }
}
