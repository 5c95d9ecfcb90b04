use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::rng::{commitment_hash, generate_client_seed, generate_server_seed};

/// Per-user seed state. `version` is bumped by the store on every successful
/// write and is what rolls and rotations are serialized on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedRecord {
    pub user_id: String,
    pub server_seed: String, // secret while active
    pub client_seed: String,
    pub nonce: u64,
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

impl SeedRecord {
    /// Fresh record with generated seeds and nonce 0, not yet persisted.
    pub fn generate(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            server_seed: generate_server_seed(),
            client_seed: generate_client_seed(),
            nonce: 0,
            version: 0,
            updated_at: Utc::now(),
        }
    }

    pub fn server_seed_hash(&self) -> String {
        commitment_hash(&self.server_seed)
    }

    /// What the player may see while the server seed is active.
    pub fn public_info(&self) -> SeedInfo {
        SeedInfo {
            server_seed_hash: self.server_seed_hash(),
            client_seed: self.client_seed.clone(),
            nonce: self.nonce,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedInfo {
    pub server_seed_hash: String,
    pub client_seed: String,
    pub nonce: u64,
}

/// Result of a server seed rotation. The previous seed is revealed in the clear
/// so every roll made under it can be checked against its old commitment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rotation {
    pub revealed_server_seed: String,
    pub previous_server_seed_hash: String,
    pub new_server_seed_hash: String,
    pub client_seed: String,
    pub nonce: u64,
}

/// Inputs and output of one roll, as handed back by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollContext {
    pub roll_value: f64,
    pub nonce_used: u64,
    pub server_seed_used: String,
    pub server_seed_hash: String,
    pub client_seed_used: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_record_starts_at_zero() {
        let rec = SeedRecord::generate("u1");
        assert_eq!(rec.nonce, 0);
        assert_eq!(rec.version, 0);
        assert_eq!(rec.server_seed.len(), 64);
        assert_eq!(rec.client_seed.len(), 32);
    }

    #[test]
    fn public_info_hides_server_seed() {
        let rec = SeedRecord::generate("u1");
        let info = rec.public_info();
        assert_eq!(info.server_seed_hash, commitment_hash(&rec.server_seed));
        assert_ne!(info.server_seed_hash, rec.server_seed);
    }
}
