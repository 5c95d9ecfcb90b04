use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use lootfair_core::{
    AuditError, ItemCatalog, RollAuditLog, RollRecord, SeedRecord, SeedStore, StoreError,
    WeightedItem,
};

pub async fn init_db(db: &SqlitePool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(db).await?;
    Ok(())
}

fn backend(e: impl std::fmt::Display) -> StoreError {
    StoreError::Backend(e.to_string())
}

fn persistence(e: impl std::fmt::Display) -> AuditError {
    AuditError::Persistence(e.to_string())
}

fn parse_ts(ts: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    Ok(DateTime::parse_from_rfc3339(ts)?.with_timezone(&Utc))
}

#[derive(Debug, sqlx::FromRow)]
struct SeedRow {
    user_id: String,
    server_seed: String,
    client_seed: String,
    nonce: i64,
    version: i64,
    updated_at: String,
}

impl SeedRow {
    fn into_record(self) -> Result<SeedRecord, StoreError> {
        Ok(SeedRecord {
            user_id: self.user_id,
            server_seed: self.server_seed,
            client_seed: self.client_seed,
            nonce: u64::try_from(self.nonce).map_err(backend)?,
            version: u64::try_from(self.version).map_err(backend)?,
            updated_at: parse_ts(&self.updated_at).map_err(backend)?,
        })
    }
}

/// `user_seeds` table; the `version` column carries the optimistic check.
#[derive(Clone)]
pub struct SqliteSeedStore {
    db: SqlitePool,
}

impl SqliteSeedStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SeedStore for SqliteSeedStore {
    async fn get(&self, user_id: &str) -> Result<Option<SeedRecord>, StoreError> {
        let row = sqlx::query_as::<_, SeedRow>(
            "SELECT user_id, server_seed, client_seed, nonce, version, updated_at FROM user_seeds WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.db)
        .await
        .map_err(backend)?;
        row.map(SeedRow::into_record).transpose()
    }

    async fn upsert(
        &self,
        mut record: SeedRecord,
        expected_version: Option<u64>,
    ) -> Result<SeedRecord, StoreError> {
        let nonce = i64::try_from(record.nonce).map_err(backend)?;
        let ts = record.updated_at.to_rfc3339();
        let affected = match expected_version {
            None => {
                record.version = 0;
                sqlx::query(
                    "INSERT INTO user_seeds (user_id, server_seed, client_seed, nonce, version, updated_at) \
                     VALUES (?, ?, ?, ?, 0, ?) ON CONFLICT (user_id) DO NOTHING",
                )
                .bind(&record.user_id)
                .bind(&record.server_seed)
                .bind(&record.client_seed)
                .bind(nonce)
                .bind(ts)
                .execute(&self.db)
                .await
                .map_err(backend)?
                .rows_affected()
            }
            Some(expected) => {
                let expected_i64 = i64::try_from(expected).map_err(backend)?;
                record.version = expected + 1;
                sqlx::query(
                    "UPDATE user_seeds SET server_seed = ?, client_seed = ?, nonce = ?, version = version + 1, updated_at = ? \
                     WHERE user_id = ? AND version = ?",
                )
                .bind(&record.server_seed)
                .bind(&record.client_seed)
                .bind(nonce)
                .bind(ts)
                .bind(&record.user_id)
                .bind(expected_i64)
                .execute(&self.db)
                .await
                .map_err(backend)?
                .rows_affected()
            }
        };
        if affected == 0 {
            return Err(StoreError::Conflict {
                user_id: record.user_id,
            });
        }
        Ok(record)
    }
}

#[derive(Debug, sqlx::FromRow)]
struct RollRow {
    user_id: String,
    case_id: String,
    server_seed: String,
    server_seed_hash: String,
    client_seed: String,
    nonce: i64,
    roll_value: f64,
    item_won_id: String,
    created_at: String,
}

impl RollRow {
    fn into_record(self) -> Result<RollRecord, AuditError> {
        Ok(RollRecord {
            user_id: self.user_id,
            case_id: self.case_id,
            server_seed: self.server_seed,
            server_seed_hash: self.server_seed_hash,
            client_seed: self.client_seed,
            nonce: u64::try_from(self.nonce).map_err(persistence)?,
            roll_value: self.roll_value,
            item_won_id: self.item_won_id,
            created_at: parse_ts(&self.created_at).map_err(persistence)?,
        })
    }
}

const ROLL_COLUMNS: &str =
    "user_id, case_id, server_seed, server_seed_hash, client_seed, nonce, roll_value, item_won_id, created_at";

/// Append-only `rolls` table. Rows are never updated or deleted.
#[derive(Clone)]
pub struct SqliteAuditLog {
    db: SqlitePool,
}

impl SqliteAuditLog {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl RollAuditLog for SqliteAuditLog {
    async fn record(&self, record: RollRecord) -> Result<(), AuditError> {
        let nonce = i64::try_from(record.nonce).map_err(persistence)?;
        sqlx::query(&format!(
            "INSERT INTO rolls ({ROLL_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(&record.user_id)
        .bind(&record.case_id)
        .bind(&record.server_seed)
        .bind(&record.server_seed_hash)
        .bind(&record.client_seed)
        .bind(nonce)
        .bind(record.roll_value)
        .bind(&record.item_won_id)
        .bind(record.created_at.to_rfc3339())
        .execute(&self.db)
        .await
        .map_err(persistence)?;
        Ok(())
    }

    async fn get(&self, user_id: &str, nonce: u64) -> Result<Option<RollRecord>, AuditError> {
        let nonce = i64::try_from(nonce).map_err(persistence)?;
        let row = sqlx::query_as::<_, RollRow>(&format!(
            "SELECT {ROLL_COLUMNS} FROM rolls WHERE user_id = ? AND nonce = ? ORDER BY id DESC LIMIT 1"
        ))
        .bind(user_id)
        .bind(nonce)
        .fetch_optional(&self.db)
        .await
        .map_err(persistence)?;
        row.map(RollRow::into_record).transpose()
    }

    async fn recent(&self, user_id: &str, limit: usize) -> Result<Vec<RollRecord>, AuditError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = sqlx::query_as::<_, RollRow>(&format!(
            "SELECT {ROLL_COLUMNS} FROM rolls WHERE user_id = ? ORDER BY id DESC LIMIT ?"
        ))
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.db)
        .await
        .map_err(persistence)?;
        rows.into_iter().map(RollRow::into_record).collect()
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ItemRow {
    item_id: String,
    weight: f64,
}

/// Read side of the `cases` / `case_items` tables, ordered by `position`.
#[derive(Clone)]
pub struct SqliteCatalog {
    db: SqlitePool,
}

impl SqliteCatalog {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ItemCatalog for SqliteCatalog {
    async fn items_for_case(&self, case_id: &str) -> Result<Option<Vec<WeightedItem>>, StoreError> {
        let exists: Option<(String,)> = sqlx::query_as("SELECT id FROM cases WHERE id = ?")
            .bind(case_id)
            .fetch_optional(&self.db)
            .await
            .map_err(backend)?;
        if exists.is_none() {
            return Ok(None);
        }
        let rows = sqlx::query_as::<_, ItemRow>(
            "SELECT item_id, weight FROM case_items WHERE case_id = ? ORDER BY position ASC, item_id ASC",
        )
        .bind(case_id)
        .fetch_all(&self.db)
        .await
        .map_err(backend)?;
        Ok(Some(
            rows.into_iter()
                .map(|r| WeightedItem::new(r.item_id, r.weight))
                .collect(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lootfair_core::{commitment_hash, derive_roll};
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_db() -> SqlitePool {
        let db = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        init_db(&db).await.unwrap();
        db
    }

    #[tokio::test]
    async fn seed_store_versioning() {
        let store = SqliteSeedStore::new(memory_db().await);
        let rec = SeedRecord::generate("u1");
        let stored = store.upsert(rec.clone(), None).await.unwrap();
        assert_eq!(stored.version, 0);
        assert!(matches!(
            store.upsert(SeedRecord::generate("u1"), None).await,
            Err(StoreError::Conflict { .. })
        ));

        let mut next = stored.clone();
        next.nonce = 1;
        let updated = store.upsert(next.clone(), Some(0)).await.unwrap();
        assert_eq!(updated.version, 1);
        assert!(matches!(
            store.upsert(next, Some(0)).await,
            Err(StoreError::Conflict { .. })
        ));

        let fetched = store.get("u1").await.unwrap().unwrap();
        assert_eq!(fetched.nonce, 1);
        assert_eq!(fetched.version, 1);
        assert_eq!(fetched.server_seed, rec.server_seed);
        assert!(store.get("u2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn audit_log_round_trips_and_rejects_duplicates() {
        let log = SqliteAuditLog::new(memory_db().await);
        let roll_value = derive_roll("srv", "cli", 1);
        let record = RollRecord {
            user_id: "u1".into(),
            case_id: "starter".into(),
            server_seed: "srv".into(),
            server_seed_hash: commitment_hash("srv"),
            client_seed: "cli".into(),
            nonce: 1,
            roll_value,
            item_won_id: "usp-cortex".into(),
            created_at: Utc::now(),
        };
        log.record(record.clone()).await.unwrap();
        assert!(log.record(record.clone()).await.is_err());

        let got = log.get("u1", 1).await.unwrap().unwrap();
        assert_eq!(got.roll_value.to_bits(), roll_value.to_bits());
        assert!(got.is_consistent());
        assert_eq!(log.recent("u1", 5).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn catalog_returns_disclosed_order() {
        let catalog = SqliteCatalog::new(memory_db().await);
        let items = catalog.items_for_case("starter").await.unwrap().unwrap();
        let ids: Vec<&str> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(
            ids,
            ["karambit-fade", "awp-asiimov", "ak47-redline", "usp-cortex", "sticker-capsule"]
        );
        assert!(catalog.items_for_case("nope").await.unwrap().is_none());
    }
}
