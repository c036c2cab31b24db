//! Credit quantities.

use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

use crate::error::DomainError;

/// A non-negative number of credits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct Credits(i64);

impl Credits {
    pub const ZERO: Credits = Credits(0);

    pub fn new(value: i64) -> Result<Self, DomainError> {
        if value < 0 {
            return Err(DomainError::NegativeAmount);
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Adds credits, failing on overflow rather than wrapping.
    pub fn checked_add(self, other: Credits) -> Result<Credits, DomainError> {
        self.0
            .checked_add(other.0)
            .map(Credits)
            .ok_or_else(|| DomainError::ValidationError("credit balance overflow".into()))
    }

    /// Subtracts credits; the result may never go below zero.
    pub fn checked_sub(self, other: Credits) -> Result<Credits, DomainError> {
        if self.0 < other.0 {
            return Err(DomainError::InsufficientBalance {
                required: other.0,
                available: self.0,
            });
        }
        Ok(Credits(self.0 - other.0))
    }
}

impl fmt::Display for Credits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} credits", self.0)
    }
}
