use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::Bytes,
    extract::{FromRequestParts, Path, Query, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::error;

use lootfair_core::{verify_roll, AuditError, CaseOpener, FairError, RollRecord, StoreError};
use lootfair_shared::{
    ApiError, CaseItemEntry, CaseItemsResponse, OpenCaseRequest, OpenCaseResponse, RollLogEntry,
    RotateSeedRequest, RotateSeedResponse, SeedInfoResponse, SetClientSeedRequest, VerifyRequest,
    VerifyResponse,
};

/// Header set by the upstream auth layer with the caller's user id.
pub const USER_HEADER: &str = "x-user-id";
const DEFAULT_HISTORY: usize = 20;
const MAX_HISTORY: usize = 200;

#[derive(Clone)]
pub struct AppState {
    pub opener: CaseOpener,
}

pub struct HttpError(pub ApiError);

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.0.body())).into_response()
    }
}

impl From<ApiError> for HttpError {
    fn from(e: ApiError) -> Self {
        Self(e)
    }
}

impl From<FairError> for HttpError {
    fn from(e: FairError) -> Self {
        let api = match &e {
            FairError::SeedNotFound { .. } | FairError::CaseNotFound { .. } => {
                ApiError::NotFound(e.to_string())
            }
            FairError::InvalidClientSeed => ApiError::Invalid(e.to_string()),
            FairError::EmptyItemSet | FairError::InvalidWeight(_) | FairError::InvalidRoll(_) => {
                ApiError::CaseUnavailable(e.to_string())
            }
            FairError::ConcurrencyConflict { .. } => ApiError::Conflict(e.to_string()),
            FairError::Store(inner) => {
                error!(error = %inner, "seed store failure");
                ApiError::Internal
            }
        };
        Self(api)
    }
}

impl From<StoreError> for HttpError {
    fn from(e: StoreError) -> Self {
        FairError::from(e).into()
    }
}

impl From<AuditError> for HttpError {
    fn from(e: AuditError) -> Self {
        error!(error = %e, "audit log read failed");
        Self(ApiError::Internal)
    }
}

/// Caller identity, taken from [`USER_HEADER`].
pub struct UserId(pub String);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for UserId {
    type Rejection = HttpError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| UserId(v.to_string()))
            .ok_or(HttpError(ApiError::Unauthorized))
    }
}

async fn route_health() -> &'static str {
    "ok"
}

async fn route_seed_info(
    State(state): State<Arc<AppState>>,
    UserId(user_id): UserId,
) -> Result<Json<SeedInfoResponse>, HttpError> {
    let info = state.opener.engine().seed_info(&user_id).await?;
    Ok(Json(SeedInfoResponse {
        server_seed_hash: info.server_seed_hash,
        client_seed: info.client_seed,
        nonce: info.nonce,
    }))
}

async fn route_rotate_seed(
    State(state): State<Arc<AppState>>,
    UserId(user_id): UserId,
    body: Bytes,
) -> Result<Json<RotateSeedResponse>, HttpError> {
    let req = parse_rotate_body(&body)?;
    let rotation = state
        .opener
        .engine()
        .rotate_server_seed(&user_id, req.client_seed.as_deref())
        .await?;
    Ok(Json(RotateSeedResponse {
        revealed_previous_server_seed: rotation.revealed_server_seed,
        previous_server_seed_hash: rotation.previous_server_seed_hash,
        new_server_seed_hash: rotation.new_server_seed_hash,
        client_seed: rotation.client_seed,
        nonce: rotation.nonce,
    }))
}

/// An empty body rotates with a generated client seed; anything else must be a
/// well-formed [`RotateSeedRequest`].
fn parse_rotate_body(body: &[u8]) -> Result<RotateSeedRequest, HttpError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(RotateSeedRequest::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| HttpError(ApiError::Invalid(format!("malformed rotate request: {e}"))))
}

async fn route_set_client_seed(
    State(state): State<Arc<AppState>>,
    UserId(user_id): UserId,
    Json(req): Json<SetClientSeedRequest>,
) -> Result<Json<SeedInfoResponse>, HttpError> {
    let engine = state.opener.engine();
    engine.ensure_seeds(&user_id).await?;
    let record = engine.set_client_seed(&user_id, &req.client_seed).await?;
    let info = record.public_info();
    Ok(Json(SeedInfoResponse {
        server_seed_hash: info.server_seed_hash,
        client_seed: info.client_seed,
        nonce: info.nonce,
    }))
}

async fn route_open_case(
    State(state): State<Arc<AppState>>,
    UserId(user_id): UserId,
    Json(req): Json<OpenCaseRequest>,
) -> Result<Json<OpenCaseResponse>, HttpError> {
    let opening = state
        .opener
        .open_case(&user_id, &req.case_id, req.client_seed.as_deref())
        .await?;
    Ok(Json(OpenCaseResponse {
        winning_item_id: opening.winning_item_id,
        roll_value: opening.roll_value,
        nonce_used: opening.nonce_used,
        server_seed_hash_at_time: opening.server_seed_hash,
        client_seed: opening.client_seed,
        audit_logged: opening.audit_logged,
    }))
}

/// Hides the server seed while it is still the user's active one.
fn disclose(record: RollRecord, active_server_seed: Option<&str>) -> RollLogEntry {
    let revealed = active_server_seed != Some(record.server_seed.as_str());
    RollLogEntry {
        case_id: record.case_id,
        server_seed: revealed.then_some(record.server_seed),
        server_seed_hash: record.server_seed_hash,
        client_seed: record.client_seed,
        nonce: record.nonce,
        roll_value: record.roll_value,
        item_won_id: record.item_won_id,
        ts: record.created_at,
    }
}

async fn active_seed(state: &AppState, user_id: &str) -> Result<Option<String>, HttpError> {
    Ok(state
        .opener
        .engine()
        .store()
        .get(user_id)
        .await?
        .map(|r| r.server_seed))
}

async fn route_roll(
    State(state): State<Arc<AppState>>,
    UserId(user_id): UserId,
    Path(nonce): Path<u64>,
) -> Result<Json<RollLogEntry>, HttpError> {
    let record = state
        .opener
        .audit()
        .get(&user_id, nonce)
        .await?
        .ok_or_else(|| HttpError(ApiError::NotFound(format!("roll {nonce}"))))?;
    let active = active_seed(&state, &user_id).await?;
    Ok(Json(disclose(record, active.as_deref())))
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    limit: Option<usize>,
}

async fn route_history(
    State(state): State<Arc<AppState>>,
    UserId(user_id): UserId,
    Query(q): Query<HistoryQuery>,
) -> Result<Json<Vec<RollLogEntry>>, HttpError> {
    let limit = q.limit.unwrap_or(DEFAULT_HISTORY).min(MAX_HISTORY);
    let records = state.opener.audit().recent(&user_id, limit).await?;
    let active = active_seed(&state, &user_id).await?;
    Ok(Json(
        records
            .into_iter()
            .map(|r| disclose(r, active.as_deref()))
            .collect(),
    ))
}

async fn route_verify(
    State(state): State<Arc<AppState>>,
    Json(req): Json<VerifyRequest>,
) -> Result<Json<VerifyResponse>, HttpError> {
    let items = match &req.case_id {
        Some(case_id) => Some(
            state
                .opener
                .catalog()
                .items_for_case(case_id)
                .await?
                .ok_or_else(|| HttpError(ApiError::NotFound(format!("case {case_id}"))))?,
        ),
        None => None,
    };
    let v = verify_roll(&req.server_seed, &req.client_seed, req.nonce, items.as_deref())?;
    Ok(Json(VerifyResponse {
        server_seed_hash: v.server_seed_hash,
        roll_integer: v.roll_integer,
        roll_value: v.roll_value,
        winning_item_id: v.winning_item_id,
    }))
}

async fn route_case_items(
    State(state): State<Arc<AppState>>,
    Path(case_id): Path<String>,
) -> Result<Json<CaseItemsResponse>, HttpError> {
    let items = state
        .opener
        .catalog()
        .items_for_case(&case_id)
        .await?
        .ok_or_else(|| HttpError(ApiError::NotFound(format!("case {case_id}"))))?;
    Ok(Json(CaseItemsResponse {
        case_id,
        items: items
            .into_iter()
            .map(|i| CaseItemEntry {
                id: i.id,
                weight: i.weight,
            })
            .collect(),
    }))
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(route_health))
        .route("/seed-info", get(route_seed_info))
        .route("/rotate-seed", post(route_rotate_seed))
        .route("/client-seed", post(route_set_client_seed))
        .route("/open-case", post(route_open_case))
        .route("/rolls", get(route_history))
        .route("/rolls/:nonce", get(route_roll))
        .route("/verify", post(route_verify))
        .route("/cases/:case_id/items", get(route_case_items))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}
