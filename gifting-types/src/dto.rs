//! Data Transfer Objects (DTOs) for requests and responses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::{
    BundleId, Currency, ItemId, ItemKind, ItemStatus, Ledger, OwnerId, Purpose, SettledItem,
    TargetId, Transaction, TransactionId, TransactionType,
};

// ─────────────────────────────────────────────────────────────────────────────
// Purchase DTOs
// ─────────────────────────────────────────────────────────────────────────────

/// Request to spend credits on a catalog item.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseRequest {
    /// Recipient of the gift (e.g. a pet)
    pub target_id: TargetId,
}

/// A settled item as exposed to its buyer.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ItemResponse {
    pub id: ItemId,
    pub buyer_id: OwnerId,
    pub target_id: TargetId,
    pub purpose: Purpose,
    pub status: ItemStatus,
    /// Frozen catalog price, for gifts
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(example = 100)]
    pub price_credits: Option<i64>,
    /// Credits bought, for credit purchases
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credits: Option<i64>,
    /// Cash amount in smallest currency unit, for checkout-funded items
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(example = 3500)]
    pub amount: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<Currency>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<SettledItem> for ItemResponse {
    fn from(item: SettledItem) -> Self {
        let purpose = item.purpose();
        let cash = item.kind.cash_amount();
        let (price_credits, credits) = match &item.kind {
            ItemKind::Gift { price, .. } => (Some(price.value()), None),
            ItemKind::CreditPurchase { credits, .. } => (None, Some(credits.value())),
            ItemKind::Donation { .. } => (None, None),
        };

        Self {
            id: item.id,
            buyer_id: item.buyer_id,
            target_id: item.target_id,
            purpose,
            status: item.status,
            price_credits,
            credits,
            amount: cash.map(|m| m.amount()),
            currency: cash.map(|m| m.currency()),
            created_at: item.created_at,
            completed_at: item.completed_at,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Checkout DTOs
// ─────────────────────────────────────────────────────────────────────────────

/// Request to open a cash checkout (donation).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub target_id: TargetId,
    /// Amount in smallest currency unit
    #[schema(example = 3500)]
    pub amount: i64,
}

/// Request to buy a credit bundle through checkout.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreditCheckoutRequest {
    pub bundle_id: BundleId,
}

/// Response after a checkout session was opened.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    /// Local pending record
    pub record_id: ItemId,
    /// Where to send the buyer
    #[schema(example = "https://pay.example.com/c/cs_1")]
    pub checkout_url: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Ledger DTOs
// ─────────────────────────────────────────────────────────────────────────────

/// Current balance of the caller.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LedgerResponse {
    pub owner_id: OwnerId,
    #[schema(example = 150)]
    pub balance_credits: i64,
}

impl LedgerResponse {
    /// Owners without a ledger read as a zero balance.
    pub fn from_ledger(owner_id: OwnerId, ledger: Option<Ledger>) -> Self {
        Self {
            owner_id,
            balance_credits: ledger.map(|l| l.balance.value()).unwrap_or(0),
        }
    }
}

/// One ledger transaction.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransactionResponse {
    pub id: TransactionId,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    /// Signed cash value in smallest currency unit
    pub amount: i64,
    pub currency: Currency,
    /// Signed credit delta
    pub amount_credits: i64,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related_entity_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related_entity_id: Option<uuid::Uuid>,
    pub created_at: DateTime<Utc>,
}

impl From<Transaction> for TransactionResponse {
    fn from(tx: Transaction) -> Self {
        let (related_entity_type, related_entity_id) = match tx.related {
            Some(r) => (Some(r.entity_type), Some(r.entity_id)),
            None => (None, None),
        };

        Self {
            id: tx.id,
            transaction_type: tx.transaction_type,
            amount: tx.amount,
            currency: tx.currency,
            amount_credits: tx.amount_credits,
            reason: tx.reason,
            related_entity_type,
            related_entity_id,
            created_at: tx.created_at,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Webhook DTOs
// ─────────────────────────────────────────────────────────────────────────────

/// Acknowledgement returned to the payment gateway.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WebhookAck {
    pub received: bool,
}
