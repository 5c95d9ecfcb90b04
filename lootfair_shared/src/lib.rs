use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct SeedInfoResponse {
    pub server_seed_hash: String,
    pub client_seed: String,
    pub nonce: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct RotateSeedRequest {
    #[serde(default)]
    pub client_seed: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RotateSeedResponse {
    pub revealed_previous_server_seed: String,
    pub previous_server_seed_hash: String,
    pub new_server_seed_hash: String,
    pub client_seed: String,
    pub nonce: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SetClientSeedRequest {
    pub client_seed: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OpenCaseRequest {
    pub case_id: String,
    /// Applied before this open's roll.
    #[serde(default)]
    pub client_seed: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct OpenCaseResponse {
    pub winning_item_id: String,
    pub roll_value: f64,
    pub nonce_used: u64,
    pub server_seed_hash_at_time: String,
    pub client_seed: String,
    pub audit_logged: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct VerifyRequest {
    pub server_seed: String,
    pub client_seed: String,
    pub nonce: u64,
    /// When set, the winner is resolved against this case's current item list.
    #[serde(default)]
    pub case_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct VerifyResponse {
    pub server_seed_hash: String,
    pub roll_integer: u32,
    pub roll_value: f64,
    pub winning_item_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CaseItemEntry {
    pub id: String,
    pub weight: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CaseItemsResponse {
    pub case_id: String,
    pub items: Vec<CaseItemEntry>,
}

/// Audit transcript as shown to players. `server_seed` stays `None` until the
/// seed it was rolled under has been rotated out.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RollLogEntry {
    pub case_id: String,
    pub server_seed: Option<String>,
    pub server_seed_hash: String,
    pub client_seed: String,
    pub nonce: u64,
    pub roll_value: f64,
    pub item_won_id: String,
    pub ts: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("missing user identity")]
    Unauthorized,
    #[error("invalid request: {0}")]
    Invalid(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("case unavailable: {0}")]
    CaseUnavailable(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("internal server error")]
    Internal,
}

impl ApiError {
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::Unauthorized => 401,
            ApiError::Invalid(_) => 400,
            ApiError::NotFound(_) => 404,
            ApiError::CaseUnavailable(_) => 422,
            ApiError::Conflict(_) => 409,
            ApiError::Internal => 500,
        }
    }

    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            error: self.to_string(),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
