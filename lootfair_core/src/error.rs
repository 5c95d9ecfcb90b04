use thiserror::Error;

/// Failures reported by a [`crate::store::SeedStore`] backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The record changed (or already exists) since it was read.
    #[error("seed record for {user_id} changed concurrently")]
    Conflict { user_id: String },

    #[error("seed store backend error: {0}")]
    Backend(String),
}

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit log persistence failed: {0}")]
    Persistence(String),
}

#[derive(Debug, Error)]
pub enum FairError {
    #[error("no seed record for user {user_id}")]
    SeedNotFound { user_id: String },

    #[error("client seed must not be empty")]
    InvalidClientSeed,

    #[error("case has no items")]
    EmptyItemSet,

    #[error("invalid item weights: {0}")]
    InvalidWeight(String),

    #[error("roll value {0} outside [0, 1)")]
    InvalidRoll(f64),

    #[error("case {case_id} not found")]
    CaseNotFound { case_id: String },

    #[error("nonce update for {user_id} lost the race {attempts} times")]
    ConcurrencyConflict { user_id: String, attempts: u32 },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl FairError {
    /// Errors the caller may resolve by initialising seeds or re-running the whole operation.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FairError::SeedNotFound { .. } | FairError::ConcurrencyConflict { .. }
        )
    }

    /// Catalog data faults: the case cannot be opened until its data is fixed.
    pub fn is_case_unavailable(&self) -> bool {
        matches!(
            self,
            FairError::EmptyItemSet | FairError::InvalidWeight(_) | FairError::InvalidRoll(_)
        )
    }
}

pub type FairResult<T> = Result<T, FairError>;
