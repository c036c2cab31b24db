//! Settled items: gifts, donations and credit purchases.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::credits::Credits;
use super::ids::{BundleId, CatalogEntryId, ItemId, OwnerId, TargetId};
use super::money::Money;
use crate::error::DomainError;

/// Lifecycle state of a settled item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Pending,
    Paid,
    Failed,
}

impl AsRef<str> for ItemStatus {
    fn as_ref(&self) -> &str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_ref())
    }
}

impl std::str::FromStr for ItemStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "paid" => Ok(Self::Paid),
            "failed" => Ok(Self::Failed),
            other => Err(DomainError::ValidationError(format!(
                "Unknown item status: {}",
                other
            ))),
        }
    }
}

/// Why a record exists. Decides whether completing it touches a ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Purpose {
    Gift,
    Donation,
    CreditPurchase,
}

impl AsRef<str> for Purpose {
    fn as_ref(&self) -> &str {
        match self {
            Self::Gift => "gift",
            Self::Donation => "donation",
            Self::CreditPurchase => "credit_purchase",
        }
    }
}

impl std::fmt::Display for Purpose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_ref())
    }
}

impl std::str::FromStr for Purpose {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gift" => Ok(Self::Gift),
            "donation" => Ok(Self::Donation),
            "credit_purchase" => Ok(Self::CreditPurchase),
            other => Err(DomainError::ValidationError(format!(
                "Unknown purpose: {}",
                other
            ))),
        }
    }
}

/// What was bought, with the price frozen at creation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ItemKind {
    /// Catalog item paid from the ledger.
    Gift {
        catalog_entry_id: CatalogEntryId,
        price: Credits,
    },
    /// One-off cash donation through checkout.
    Donation { amount: Money },
    /// Credit top-up through checkout.
    CreditPurchase {
        bundle_id: BundleId,
        credits: Credits,
        amount: Money,
    },
}

impl ItemKind {
    pub fn purpose(&self) -> Purpose {
        match self {
            ItemKind::Gift { .. } => Purpose::Gift,
            ItemKind::Donation { .. } => Purpose::Donation,
            ItemKind::CreditPurchase { .. } => Purpose::CreditPurchase,
        }
    }

    /// Cash charged through the gateway, if any.
    pub fn cash_amount(&self) -> Option<Money> {
        match self {
            ItemKind::Gift { .. } => None,
            ItemKind::Donation { amount } | ItemKind::CreditPurchase { amount, .. } => {
                Some(*amount)
            }
        }
    }
}

/// Result of applying a status transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Applied,
    /// The record was already in a state where the transition is a no-op.
    Unchanged,
}

/// A purchasable thing with a pending/paid/failed lifecycle.
///
/// Once `paid`, the status never changes again. A `failed` record may still
/// become `paid` when the gateway confirms a payment the caller gave up on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettledItem {
    pub id: ItemId,
    pub buyer_id: OwnerId,
    pub target_id: TargetId,
    #[serde(flatten)]
    pub kind: ItemKind,
    pub status: ItemStatus,
    /// Correlation key for gateway webhooks; unique across records
    pub gateway_session_id: Option<String>,
    pub gateway_charge_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl SettledItem {
    /// A gift paid from the ledger. There is no pending window for these.
    pub fn paid_gift(
        buyer_id: OwnerId,
        target_id: TargetId,
        catalog_entry_id: CatalogEntryId,
        price: Credits,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ItemId::new(),
            buyer_id,
            target_id,
            kind: ItemKind::Gift {
                catalog_entry_id,
                price,
            },
            status: ItemStatus::Paid,
            gateway_session_id: None,
            gateway_charge_id: None,
            created_at: now,
            completed_at: Some(now),
        }
    }

    /// A cash-funded record awaiting gateway confirmation.
    pub fn pending(
        buyer_id: OwnerId,
        target_id: TargetId,
        kind: ItemKind,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ItemId::new(),
            buyer_id,
            target_id,
            kind,
            status: ItemStatus::Pending,
            gateway_session_id: None,
            gateway_charge_id: None,
            created_at: now,
            completed_at: None,
        }
    }

    pub fn purpose(&self) -> Purpose {
        self.kind.purpose()
    }

    pub fn is_paid(&self) -> bool {
        self.status == ItemStatus::Paid
    }

    /// Records the gateway session opened for this item.
    pub fn attach_session(&mut self, session_id: impl Into<String>) -> Result<(), DomainError> {
        let session_id = session_id.into();
        match &self.gateway_session_id {
            Some(existing) if *existing != session_id => Err(DomainError::ValidationError(
                format!("item {} already bound to another session", self.id),
            )),
            _ => {
                self.gateway_session_id = Some(session_id);
                Ok(())
            }
        }
    }

    /// Moves the item to `paid`. A no-op when it already is.
    pub fn mark_paid(&mut self, charge_id: Option<String>, now: DateTime<Utc>) -> Transition {
        if self.is_paid() {
            return Transition::Unchanged;
        }
        self.status = ItemStatus::Paid;
        self.completed_at = Some(now);
        if charge_id.is_some() {
            self.gateway_charge_id = charge_id;
        }
        Transition::Applied
    }

    /// Moves a pending item to `failed`. Terminal items are left alone.
    pub fn mark_failed(&mut self, now: DateTime<Utc>) -> Transition {
        if self.status != ItemStatus::Pending {
            return Transition::Unchanged;
        }
        self.status = ItemStatus::Failed;
        self.completed_at = Some(now);
        Transition::Applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Currency;

    fn donation(now: DateTime<Utc>) -> SettledItem {
        SettledItem::pending(
            OwnerId::new(),
            TargetId::new(),
            ItemKind::Donation {
                amount: Money::new(3500, Currency::USD).unwrap(),
            },
            now,
        )
    }

    #[test]
    fn test_pending_to_paid() {
        let now = Utc::now();
        let mut item = donation(now);
        assert_eq!(item.mark_paid(Some("pi_1".into()), now), Transition::Applied);
        assert_eq!(item.status, ItemStatus::Paid);
        assert_eq!(item.completed_at, Some(now));
        assert_eq!(item.gateway_charge_id.as_deref(), Some("pi_1"));
    }

    #[test]
    fn test_paid_is_immutable() {
        let now = Utc::now();
        let mut item = donation(now);
        item.mark_paid(None, now);
        assert_eq!(item.mark_failed(now), Transition::Unchanged);
        assert_eq!(item.mark_paid(None, now), Transition::Unchanged);
        assert_eq!(item.status, ItemStatus::Paid);
    }

    #[test]
    fn test_failed_can_still_be_paid() {
        let now = Utc::now();
        let mut item = donation(now);
        assert_eq!(item.mark_failed(now), Transition::Applied);
        assert_eq!(item.mark_failed(now), Transition::Unchanged);
        assert_eq!(item.mark_paid(None, now), Transition::Applied);
        assert!(item.is_paid());
    }

    #[test]
    fn test_attach_session_once() {
        let mut item = donation(Utc::now());
        item.attach_session("cs_1").unwrap();
        item.attach_session("cs_1").unwrap();
        assert!(item.attach_session("cs_2").is_err());
    }

    #[test]
    fn test_purpose_follows_kind() {
        let item = SettledItem::pending(
            OwnerId::new(),
            TargetId::new(),
            ItemKind::CreditPurchase {
                bundle_id: BundleId::new(),
                credits: Credits::new(175).unwrap(),
                amount: Money::new(3500, Currency::USD).unwrap(),
            },
            Utc::now(),
        );
        assert_eq!(item.purpose(), Purpose::CreditPurchase);
        assert_eq!(item.kind.cash_amount().unwrap().amount(), 3500);
    }

    #[test]
    fn test_paid_gift_has_no_pending_window() {
        let now = Utc::now();
        let item = SettledItem::paid_gift(
            OwnerId::new(),
            TargetId::new(),
            CatalogEntryId::new(),
            Credits::new(100).unwrap(),
            now,
        );
        assert!(item.is_paid());
        assert_eq!(item.completed_at, Some(now));
        assert!(item.kind.cash_amount().is_none());
    }
}
