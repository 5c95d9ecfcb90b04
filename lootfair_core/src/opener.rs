use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::{
    audit::{RollAuditLog, RollRecord},
    catalog::ItemCatalog,
    engine::FairnessEngine,
    error::{FairError, FairResult},
    selector::{select_winner, validate_items},
};

/// What a player is owed for one case open, plus the fairness disclosure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseOpening {
    pub case_id: String,
    pub winning_item_id: String,
    pub roll_value: f64,
    pub nonce_used: u64,
    pub server_seed_hash: String,
    pub client_seed: String,
    /// False when the transcript could not be written; the outcome still stands.
    pub audit_logged: bool,
}

/// Runs a case open end to end: catalog -> seeds -> roll -> winner -> audit.
#[derive(Clone)]
pub struct CaseOpener {
    engine: FairnessEngine,
    catalog: Arc<dyn ItemCatalog>,
    audit: Arc<dyn RollAuditLog>,
}

impl CaseOpener {
    pub fn new(
        engine: FairnessEngine,
        catalog: Arc<dyn ItemCatalog>,
        audit: Arc<dyn RollAuditLog>,
    ) -> Self {
        Self {
            engine,
            catalog,
            audit,
        }
    }

    pub fn engine(&self) -> &FairnessEngine {
        &self.engine
    }

    pub fn audit(&self) -> &Arc<dyn RollAuditLog> {
        &self.audit
    }

    pub fn catalog(&self) -> &Arc<dyn ItemCatalog> {
        &self.catalog
    }

    /// A `client_seed` passed here is applied before the roll it came with.
    pub async fn open_case(
        &self,
        user_id: &str,
        case_id: &str,
        client_seed: Option<&str>,
    ) -> FairResult<CaseOpening> {
        let items = self
            .catalog
            .items_for_case(case_id)
            .await?
            .ok_or_else(|| FairError::CaseNotFound {
                case_id: case_id.to_string(),
            })?;
        // reject broken cases before a nonce is spent
        validate_items(&items)?;

        self.engine.ensure_seeds(user_id).await?;
        let roll = self.engine.perform_roll_with(user_id, client_seed).await?;
        let winner = select_winner(&items, roll.roll_value)?;

        let record = RollRecord {
            user_id: user_id.to_string(),
            case_id: case_id.to_string(),
            server_seed: roll.server_seed_used,
            server_seed_hash: roll.server_seed_hash.clone(),
            client_seed: roll.client_seed_used.clone(),
            nonce: roll.nonce_used,
            roll_value: roll.roll_value,
            item_won_id: winner.id.clone(),
            created_at: Utc::now(),
        };
        let audit_logged = match self.audit.record(record).await {
            Ok(()) => true,
            Err(e) => {
                error!(
                    user_id,
                    case_id,
                    nonce = roll.nonce_used,
                    item = %winner.id,
                    error = %e,
                    "roll transcript not persisted"
                );
                false
            }
        };

        info!(user_id, case_id, nonce = roll.nonce_used, item = %winner.id, "case opened");
        Ok(CaseOpening {
            case_id: case_id.to_string(),
            winning_item_id: winner.id.clone(),
            roll_value: roll.roll_value,
            nonce_used: roll.nonce_used,
            server_seed_hash: roll.server_seed_hash,
            client_seed: roll.client_seed_used,
            audit_logged,
        })
    }
}
