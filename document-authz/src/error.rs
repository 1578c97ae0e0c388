use crate::models::PermissionKind;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthzError {
    #[error("Unsupported relation: {0}")]
    UnsupportedRelation(String),

    #[error("Invalid grant kind: {0} cannot be shared")]
    InvalidGrantKind(PermissionKind),

    #[error("Unsupported permission: {0}")]
    UnsupportedPermission(String),

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl AuthzError {
    /// Whether re-issuing the same call may succeed.
    ///
    /// Only storage faults qualify. Input errors are fatal and retrying them
    /// cannot change the outcome.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StorageError(_))
    }
}

pub type Result<T> = std::result::Result<T, AuthzError>;
