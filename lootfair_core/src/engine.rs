use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::{
    error::{FairError, FairResult, StoreError},
    rng::{commitment_hash, derive_roll, generate_client_seed, generate_server_seed},
    seeds::{RollContext, Rotation, SeedInfo, SeedRecord},
    store::SeedStore,
};

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How many times a versioned write is attempted before giving up with
    /// [`FairError::ConcurrencyConflict`].
    pub max_attempts: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { max_attempts: 8 }
    }
}

/// Owns the seed lifecycle: commitment, roll derivation and rotation.
///
/// Every write goes through the store's optimistic version check, so rolls and
/// rotations for the same user serialize without a lock and a lost race is
/// retried against a fresh read.
#[derive(Clone)]
pub struct FairnessEngine {
    store: Arc<dyn SeedStore>,
    config: EngineConfig,
}

impl FairnessEngine {
    pub fn new(store: Arc<dyn SeedStore>, config: EngineConfig) -> Self {
        let max_attempts = config.max_attempts.max(1);
        Self {
            store,
            config: EngineConfig { max_attempts },
        }
    }

    pub fn store(&self) -> &Arc<dyn SeedStore> {
        &self.store
    }

    pub fn commitment_hash(server_seed: &str) -> String {
        commitment_hash(server_seed)
    }

    pub fn derive_roll(server_seed: &str, client_seed: &str, nonce: u64) -> f64 {
        derive_roll(server_seed, client_seed, nonce)
    }

    async fn load(&self, user_id: &str) -> FairResult<SeedRecord> {
        self.store
            .get(user_id)
            .await?
            .ok_or_else(|| FairError::SeedNotFound {
                user_id: user_id.to_string(),
            })
    }

    /// Read-modify-write with version check. Returns the record as it was read
    /// and as it was stored.
    async fn mutate<F>(&self, user_id: &str, mut change: F) -> FairResult<(SeedRecord, SeedRecord)>
    where
        F: FnMut(&mut SeedRecord) + Send,
    {
        for attempt in 1..=self.config.max_attempts {
            let current = self.load(user_id).await?;
            let mut next = current.clone();
            change(&mut next);
            next.updated_at = Utc::now();
            match self.store.upsert(next, Some(current.version)).await {
                Ok(stored) => return Ok((current, stored)),
                Err(StoreError::Conflict { .. }) => {
                    warn!(user_id, attempt, "seed record changed underneath us, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(FairError::ConcurrencyConflict {
            user_id: user_id.to_string(),
            attempts: self.config.max_attempts,
        })
    }

    /// Returns the user's seed record, creating it with fresh seeds if absent.
    pub async fn ensure_seeds(&self, user_id: &str) -> FairResult<SeedRecord> {
        if let Some(record) = self.store.get(user_id).await? {
            return Ok(record);
        }
        match self.store.upsert(SeedRecord::generate(user_id), None).await {
            Ok(record) => {
                info!(user_id, server_seed_hash = %record.server_seed_hash(), "initialised seeds");
                Ok(record)
            }
            // a concurrent first request inserted before us
            Err(StoreError::Conflict { .. }) => self.load(user_id).await,
            Err(e) => Err(e.into()),
        }
    }

    pub async fn seed_info(&self, user_id: &str) -> FairResult<SeedInfo> {
        Ok(self.ensure_seeds(user_id).await?.public_info())
    }

    /// Replaces the client seed; nonce and server seed are untouched.
    pub async fn set_client_seed(&self, user_id: &str, client_seed: &str) -> FairResult<SeedRecord> {
        check_client_seed(client_seed)?;
        let (_, stored) = self
            .mutate(user_id, |record| record.client_seed = client_seed.to_string())
            .await?;
        debug!(user_id, nonce = stored.nonce, "client seed updated");
        Ok(stored)
    }

    /// Swaps in a fresh server seed, resets the nonce and reveals the old seed.
    pub async fn rotate_server_seed(
        &self,
        user_id: &str,
        client_seed: Option<&str>,
    ) -> FairResult<Rotation> {
        if let Some(seed) = client_seed {
            check_client_seed(seed)?;
        }
        self.ensure_seeds(user_id).await?;
        let (previous, stored) = self
            .mutate(user_id, |record| {
                record.server_seed = generate_server_seed();
                record.client_seed = client_seed
                    .map(str::to_string)
                    .unwrap_or_else(generate_client_seed);
                record.nonce = 0;
            })
            .await?;
        let rotation = Rotation {
            previous_server_seed_hash: previous.server_seed_hash(),
            revealed_server_seed: previous.server_seed,
            new_server_seed_hash: stored.server_seed_hash(),
            client_seed: stored.client_seed,
            nonce: stored.nonce,
        };
        info!(
            user_id,
            previous_hash = %rotation.previous_server_seed_hash,
            new_hash = %rotation.new_server_seed_hash,
            rolls_under_previous = previous.nonce,
            "rotated server seed"
        );
        Ok(rotation)
    }

    /// Consumes the next nonce and derives its roll. The nonce stays consumed
    /// even if the caller never reports the result.
    pub async fn perform_roll(&self, user_id: &str) -> FairResult<RollContext> {
        self.perform_roll_with(user_id, None).await
    }

    /// Like [`perform_roll`](Self::perform_roll), but first switches to
    /// `client_seed` in the same versioned write, so the roll is guaranteed to
    /// use it.
    pub async fn perform_roll_with(
        &self,
        user_id: &str,
        client_seed: Option<&str>,
    ) -> FairResult<RollContext> {
        if let Some(seed) = client_seed {
            check_client_seed(seed)?;
        }
        let (_, stored) = self
            .mutate(user_id, |record| {
                if let Some(seed) = client_seed {
                    record.client_seed = seed.to_string();
                }
                record.nonce += 1;
            })
            .await?;
        let roll_value = derive_roll(&stored.server_seed, &stored.client_seed, stored.nonce);
        debug!(user_id, nonce = stored.nonce, roll_value, "roll derived");
        Ok(RollContext {
            roll_value,
            nonce_used: stored.nonce,
            server_seed_hash: stored.server_seed_hash(),
            server_seed_used: stored.server_seed,
            client_seed_used: stored.client_seed,
        })
    }
}

fn check_client_seed(seed: &str) -> FairResult<()> {
    if seed.trim().is_empty() {
        return Err(FairError::InvalidClientSeed);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemorySeedStore;

    fn engine() -> FairnessEngine {
        FairnessEngine::new(Arc::new(MemorySeedStore::new()), EngineConfig::default())
    }

    #[tokio::test]
    async fn ensure_seeds_is_idempotent() {
        let engine = engine();
        let first = engine.ensure_seeds("u1").await.unwrap();
        let second = engine.ensure_seeds("u1").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.nonce, 0);
    }

    #[tokio::test]
    async fn roll_without_seeds_is_seed_not_found() {
        let engine = engine();
        let err = engine.perform_roll("nobody").await.unwrap_err();
        assert!(matches!(err, FairError::SeedNotFound { .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn rolls_use_consecutive_nonces() {
        let engine = engine();
        let rec = engine.ensure_seeds("u1").await.unwrap();
        for expected in 1..=5u64 {
            let ctx = engine.perform_roll("u1").await.unwrap();
            assert_eq!(ctx.nonce_used, expected);
            assert_eq!(ctx.server_seed_used, rec.server_seed);
            assert_eq!(
                ctx.roll_value,
                derive_roll(&rec.server_seed, &rec.client_seed, expected)
            );
        }
    }

    #[tokio::test]
    async fn client_seed_update_keeps_nonce() {
        let engine = engine();
        engine.ensure_seeds("u1").await.unwrap();
        engine.perform_roll("u1").await.unwrap();
        let rec = engine.set_client_seed("u1", "lucky").await.unwrap();
        assert_eq!(rec.nonce, 1);
        assert_eq!(rec.client_seed, "lucky");
        let ctx = engine.perform_roll("u1").await.unwrap();
        assert_eq!(ctx.client_seed_used, "lucky");
        assert_eq!(ctx.nonce_used, 2);
    }

    #[tokio::test]
    async fn roll_with_client_seed_switches_and_rolls_once() {
        let engine = engine();
        let rec = engine.ensure_seeds("u1").await.unwrap();
        let ctx = engine.perform_roll_with("u1", Some("mine")).await.unwrap();
        assert_eq!(ctx.client_seed_used, "mine");
        assert_eq!(ctx.nonce_used, 1);
        assert_eq!(ctx.roll_value, derive_roll(&rec.server_seed, "mine", 1));
        assert!(matches!(
            engine.perform_roll_with("u1", Some(" ")).await,
            Err(FairError::InvalidClientSeed)
        ));
        assert_eq!(engine.seed_info("u1").await.unwrap().nonce, 1);
    }

    #[tokio::test]
    async fn empty_client_seed_rejected() {
        let engine = engine();
        engine.ensure_seeds("u1").await.unwrap();
        assert!(matches!(
            engine.set_client_seed("u1", "  ").await,
            Err(FairError::InvalidClientSeed)
        ));
        assert!(matches!(
            engine.rotate_server_seed("u1", Some("")).await,
            Err(FairError::InvalidClientSeed)
        ));
    }

    #[tokio::test]
    async fn rotation_reveals_committed_seed() {
        let engine = engine();
        let before = engine.seed_info("u1").await.unwrap();
        engine.perform_roll("u1").await.unwrap();
        let rotation = engine.rotate_server_seed("u1", None).await.unwrap();
        assert_eq!(commitment_hash(&rotation.revealed_server_seed), before.server_seed_hash);
        assert_eq!(rotation.previous_server_seed_hash, before.server_seed_hash);
        assert_ne!(rotation.new_server_seed_hash, before.server_seed_hash);
        assert_eq!(rotation.nonce, 0);

        let after = engine.seed_info("u1").await.unwrap();
        assert_eq!(after.server_seed_hash, rotation.new_server_seed_hash);
        assert_eq!(after.nonce, 0);
        assert_eq!(engine.perform_roll("u1").await.unwrap().nonce_used, 1);
    }

    #[tokio::test]
    async fn rotation_with_client_seed() {
        let engine = engine();
        let rotation = engine.rotate_server_seed("u1", Some("mine")).await.unwrap();
        assert_eq!(rotation.client_seed, "mine");
    }

    #[test]
    fn published_formula() {
        let server = "a".repeat(64);
        assert_eq!(
            FairnessEngine::derive_roll(&server, &"b".repeat(32), 1),
            0.07293107872828841
        );
        assert_eq!(FairnessEngine::commitment_hash(&server), commitment_hash(&server));
    }

    #[test]
    fn zero_attempts_clamped() {
        let engine = FairnessEngine::new(
            Arc::new(MemorySeedStore::new()),
            EngineConfig { max_attempts: 0 },
        );
        assert_eq!(engine.config.max_attempts, 1);
    }
}
