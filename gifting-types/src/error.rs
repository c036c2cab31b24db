//! Error types for the settlement engine.

use crate::domain::ItemId;

/// Domain-level errors (business rule violations).
#[derive(Debug, thiserror::Error)]
pub enum DomainError {
    #[error("Amount cannot be negative")]
    NegativeAmount,

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance { required: i64, available: i64 },

    #[error("Item {0} is already settled")]
    AlreadySettled(ItemId),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// Repository-level errors (data access failures).
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Entity not found")]
    NotFound,

    #[error("Conflict: {0}")]
    Conflict(String),
}

/// Application-level errors (for HTTP responses).
///
/// Maps cleanly to HTTP status codes.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance { required: i64, available: i64 },

    #[error("No wallet exists for this owner")]
    WalletNotFound,

    #[error("Catalog entry not found or inactive")]
    CatalogEntryNotFound,

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Gateway call failed or timed out. The detail is for logs only.
    #[error("Payment gateway unavailable: {0}")]
    GatewayUnavailable(String),

    #[error("Invalid webhook signature")]
    InvalidSignature,

    #[error("Item already settled")]
    AlreadySettled,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<DomainError> for AppError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::InsufficientBalance {
                required,
                available,
            } => AppError::InsufficientBalance {
                required,
                available,
            },
            DomainError::NegativeAmount => {
                AppError::InvalidAmount("amount cannot be negative".into())
            }
            DomainError::InvalidAmount(msg) => AppError::InvalidAmount(msg),
            DomainError::AlreadySettled(_) => AppError::AlreadySettled,
            DomainError::ValidationError(msg) => AppError::BadRequest(msg),
        }
    }
}

impl From<RepoError> for AppError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::Domain(e) => e.into(),
            RepoError::NotFound => AppError::NotFound("Resource not found".into()),
            RepoError::Database(e) => AppError::Internal(e),
            RepoError::Transaction(e) => AppError::Internal(e),
            RepoError::Conflict(e) => AppError::Internal(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_balance_survives_layers() {
        let repo_err = RepoError::Domain(DomainError::InsufficientBalance {
            required: 100,
            available: 50,
        });
        let app_err: AppError = repo_err.into();
        assert!(matches!(
            app_err,
            AppError::InsufficientBalance {
                required: 100,
                available: 50
            }
        ));
    }

    #[test]
    fn test_database_errors_become_internal() {
        let app_err: AppError = RepoError::Database("connection reset".into()).into();
        assert!(matches!(app_err, AppError::Internal(_)));
    }

    #[test]
    fn test_already_settled_maps() {
        let app_err: AppError =
            RepoError::Domain(DomainError::AlreadySettled(ItemId::new())).into();
        assert!(matches!(app_err, AppError::AlreadySettled));
    }
}
