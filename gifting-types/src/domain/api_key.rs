//! API key domain type.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::OwnerId;

/// An API key that authenticates requests on behalf of one owner.
///
/// Only the SHA-256 hash of the raw key is ever stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    pub key_hash: String,
    pub owner_id: OwnerId,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl ApiKey {
    /// Creates a new active API key for the given owner.
    pub fn new(key_hash: String, owner_id: OwnerId, now: DateTime<Utc>) -> Self {
        Self {
            key_hash,
            owner_id,
            is_active: true,
            created_at: now,
        }
    }
}
