use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AuditError;
use crate::rng::derive_roll;

/// Immutable transcript of one roll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollRecord {
    pub user_id: String,
    pub case_id: String,
    pub server_seed: String,
    pub server_seed_hash: String,
    pub client_seed: String,
    pub nonce: u64,
    pub roll_value: f64,
    pub item_won_id: String,
    pub created_at: DateTime<Utc>,
}

impl RollRecord {
    /// Recomputes the roll from the stored seeds; a faithful transcript reproduces it exactly.
    pub fn recompute(&self) -> f64 {
        derive_roll(&self.server_seed, &self.client_seed, self.nonce)
    }

    pub fn is_consistent(&self) -> bool {
        self.recompute() == self.roll_value
    }
}

/// Append-only roll transcript log.
#[async_trait]
pub trait RollAuditLog: Send + Sync {
    /// Appends a transcript. A second record for the same
    /// `(user_id, server_seed, nonce)` is rejected.
    async fn record(&self, record: RollRecord) -> Result<(), AuditError>;

    /// Newest transcript for `user_id` carrying `nonce`. Nonces restart after a
    /// rotation, so the most recent seed period wins.
    async fn get(&self, user_id: &str, nonce: u64) -> Result<Option<RollRecord>, AuditError>;

    /// Newest first, at most `limit`.
    async fn recent(&self, user_id: &str, limit: usize) -> Result<Vec<RollRecord>, AuditError>;
}

#[derive(Debug, Default)]
pub struct MemoryAuditLog {
    entries: Mutex<Vec<RollRecord>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> Result<usize, AuditError> {
        self.entries
            .lock()
            .map(|e| e.len())
            .map_err(|e| AuditError::Persistence(e.to_string()))
    }
}

#[async_trait]
impl RollAuditLog for MemoryAuditLog {
    async fn record(&self, record: RollRecord) -> Result<(), AuditError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| AuditError::Persistence(e.to_string()))?;
        let duplicate = entries.iter().any(|e| {
            e.user_id == record.user_id
                && e.server_seed == record.server_seed
                && e.nonce == record.nonce
        });
        if duplicate {
            return Err(AuditError::Persistence(format!(
                "roll {} for {} already recorded",
                record.nonce, record.user_id
            )));
        }
        entries.push(record);
        Ok(())
    }

    async fn get(&self, user_id: &str, nonce: u64) -> Result<Option<RollRecord>, AuditError> {
        let entries = self
            .entries
            .lock()
            .map_err(|e| AuditError::Persistence(e.to_string()))?;
        Ok(entries
            .iter()
            .rev()
            .find(|e| e.user_id == user_id && e.nonce == nonce)
            .cloned())
    }

    async fn recent(&self, user_id: &str, limit: usize) -> Result<Vec<RollRecord>, AuditError> {
        let entries = self
            .entries
            .lock()
            .map_err(|e| AuditError::Persistence(e.to_string()))?;
        Ok(entries
            .iter()
            .rev()
            .filter(|e| e.user_id == user_id)
            .take(limit)
            .cloned()
            .collect())
    }
}
