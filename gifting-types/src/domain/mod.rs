//! Domain models for the credit ledger and settlement engine.

pub mod api_key;
pub mod catalog;
pub mod credits;
pub mod ids;
pub mod item;
pub mod ledger;
pub mod money;
pub mod transaction;
pub mod webhook;

pub use api_key::ApiKey;
pub use catalog::{CatalogEntry, CreditBundle};
pub use credits::Credits;
pub use ids::{BundleId, CatalogEntryId, ItemId, OwnerId, TargetId, TransactionId};
pub use item::{ItemKind, ItemStatus, Purpose, SettledItem, Transition};
pub use ledger::Ledger;
pub use money::{Currency, Money};
pub use transaction::{
    REASON_CREDIT_PURCHASE, REASON_ITEM_PURCHASE, RELATED_SETTLED_ITEM, RelatedEntity,
    Transaction, TransactionType,
};
pub use webhook::{
    CheckoutMetadata, CheckoutSessionObject, EventOutcome, GatewayEvent, GatewayEventData,
    GatewayEventKind, GatewayEventRecord,
};
