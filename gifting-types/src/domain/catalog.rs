//! Read-only catalog: gift types and credit bundles.

use serde::{Deserialize, Serialize};

use super::credits::Credits;
use super::ids::{BundleId, CatalogEntryId};
use super::money::Money;

/// A priced gift type. Prices are resolved here, never taken from the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: CatalogEntryId,
    pub name: String,
    pub cost: Credits,
    pub is_active: bool,
}

/// A purchasable credit top-up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditBundle {
    pub id: BundleId,
    pub name: String,
    pub credits: Credits,
    pub price: Money,
    pub is_active: bool,
}
