pub mod audit;
pub mod catalog;
pub mod engine;
pub mod error;
pub mod opener;
pub mod rng;
pub mod seeds;
pub mod selector;
pub mod store;
pub mod verify;

pub use crate::audit::{MemoryAuditLog, RollAuditLog, RollRecord};
pub use crate::catalog::{ItemCatalog, StaticCatalog};
pub use crate::engine::{EngineConfig, FairnessEngine};
pub use crate::error::{AuditError, FairError, FairResult, StoreError};
pub use crate::opener::{CaseOpener, CaseOpening};
pub use crate::rng::{commitment_hash, derive_roll, generate_client_seed, generate_server_seed, ProvablyFairRng};
pub use crate::seeds::{RollContext, Rotation, SeedInfo, SeedRecord};
pub use crate::selector::{select_winner, validate_items, WeightedItem};
pub use crate::store::{MemorySeedStore, SeedStore};
pub use crate::verify::{verify_roll, Verification};
