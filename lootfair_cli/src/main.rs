use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use sqlx::{sqlite::SqlitePoolOptions, Row, SqlitePool};

use lootfair_core::{
    verify_roll, EngineConfig, FairnessEngine, ItemCatalog, Rotation, SeedRecord, SeedStore,
    WeightedItem,
};
use lootfair_server::db::{SqliteCatalog, SqliteSeedStore};

#[derive(Parser)]
#[command(name = "lootfair-cli", about = "Operator and verifier CLI for the lootfair server")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Database URL, default sqlite://lootfair.db
    #[arg(long, value_parser, env = "DATABASE_URL")]
    database_url: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Recompute a roll from revealed seeds (works offline)
    Verify {
        #[arg(long)]
        server_seed: String,
        #[arg(long)]
        client_seed: String,
        #[arg(long)]
        nonce: u64,
        /// Resolve the winner against this case's items in the database
        #[arg(long)]
        case: Option<String>,
        /// Resolve the winner against a JSON file of [{"id": .., "weight": ..}]
        #[arg(long, conflicts_with = "case")]
        items: Option<String>,
    },
    /// Show a user's public seed commitment
    SeedInfo { user_id: String },
    /// Rotate a user's server seed, revealing the old one
    RotateSeed {
        user_id: String,
        #[arg(long)]
        client_seed: Option<String>,
    },
    /// View last N roll transcripts
    ViewLogs {
        #[arg(default_value_t = 20)]
        n: i64,
        #[arg(long)]
        user: Option<String>,
    },
    /// Recompute every stored roll and report transcripts that do not reproduce
    Audit {
        #[arg(long)]
        user: Option<String>,
    },
    /// Export roll transcripts to CSV path
    ExportCsv { path: String },
}

async fn get_pool(url: Option<String>) -> anyhow::Result<SqlitePool> {
    let url = url.unwrap_or_else(|| "sqlite://lootfair.db".into());
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await
        .with_context(|| format!("connecting to {url}"))?;
    Ok(pool)
}

async fn load_seeds(pool: &SqlitePool, user_id: &str) -> anyhow::Result<SeedRecord> {
    SqliteSeedStore::new(pool.clone())
        .get(user_id)
        .await?
        .with_context(|| format!("no seeds for user {user_id}"))
}

async fn case_items(pool: &SqlitePool, case_id: &str) -> anyhow::Result<Vec<WeightedItem>> {
    SqliteCatalog::new(pool.clone())
        .items_for_case(case_id)
        .await?
        .with_context(|| format!("no case {case_id}"))
}

/// Rotates through the engine so the version check and seed validation match
/// the server. Users without seeds are reported rather than created.
async fn rotate_seed(
    pool: &SqlitePool,
    user_id: &str,
    client_seed: Option<&str>,
) -> anyhow::Result<Rotation> {
    load_seeds(pool, user_id).await?;
    let engine = FairnessEngine::new(
        Arc::new(SqliteSeedStore::new(pool.clone())),
        EngineConfig::default(),
    );
    Ok(engine.rotate_server_seed(user_id, client_seed).await?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Verify {
            server_seed,
            client_seed,
            nonce,
            case,
            items,
        } => {
            let items = match (case, items) {
                (Some(case_id), _) => {
                    let pool = get_pool(cli.database_url).await?;
                    Some(case_items(&pool, &case_id).await?)
                }
                (None, Some(path)) => {
                    let raw = std::fs::read_to_string(&path)
                        .with_context(|| format!("reading {path}"))?;
                    Some(serde_json::from_str::<Vec<WeightedItem>>(&raw)?)
                }
                (None, None) => None,
            };
            let v = verify_roll(&server_seed, &client_seed, nonce, items.as_deref())?;
            println!("server_seed_hash = {}", v.server_seed_hash);
            println!("roll_integer     = {}", v.roll_integer);
            println!("roll_value       = {}", v.roll_value);
            if let Some(item) = v.winning_item_id {
                println!("winning_item     = {}", item);
            }
        }
        Commands::SeedInfo { user_id } => {
            let pool = get_pool(cli.database_url).await?;
            let info = load_seeds(&pool, &user_id).await?.public_info();
            println!(
                "user={} hash={} client_seed={} nonce={}",
                user_id, info.server_seed_hash, info.client_seed, info.nonce
            );
        }
        Commands::RotateSeed {
            user_id,
            client_seed,
        } => {
            let pool = get_pool(cli.database_url).await?;
            let rotation = rotate_seed(&pool, &user_id, client_seed.as_deref()).await?;
            println!("Revealed server seed: {}", rotation.revealed_server_seed);
            println!("  (committed hash {})", rotation.previous_server_seed_hash);
            println!("New hash: {}", rotation.new_server_seed_hash);
            println!("Client seed: {}", rotation.client_seed);
        }
        Commands::ViewLogs { n, user } => {
            let pool = get_pool(cli.database_url).await?;
            let rows = sqlx::query(
                "SELECT id, created_at, user_id, case_id, client_seed, nonce, server_seed_hash, roll_value, item_won_id \
                 FROM rolls WHERE (?1 IS NULL OR user_id = ?1) ORDER BY id DESC LIMIT ?2",
            )
            .bind(user)
            .bind(n)
            .fetch_all(&pool)
            .await?;
            for r in rows {
                let id: i64 = r.get("id");
                let ts: String = r.get("created_at");
                let user_id: String = r.get("user_id");
                let case_id: String = r.get("case_id");
                let client_seed: String = r.get("client_seed");
                let nonce: i64 = r.get("nonce");
                let server_seed_hash: String = r.get("server_seed_hash");
                let roll_value: f64 = r.get("roll_value");
                let item: String = r.get("item_won_id");
                println!(
                    "#{:>6} {} user={} case={} seed={} nonce={} hash={} roll={:.8} item={}",
                    id, ts, user_id, case_id, client_seed, nonce, server_seed_hash, roll_value, item
                );
            }
        }
        Commands::Audit { user } => {
            let pool = get_pool(cli.database_url).await?;
            let rows = sqlx::query(
                "SELECT id, user_id, server_seed, server_seed_hash, client_seed, nonce, roll_value \
                 FROM rolls WHERE (?1 IS NULL OR user_id = ?1) ORDER BY id ASC",
            )
            .bind(user)
            .fetch_all(&pool)
            .await?;
            let mut bad = 0usize;
            for r in &rows {
                let server_seed: String = r.get("server_seed");
                let client_seed: String = r.get("client_seed");
                let nonce = u64::try_from(r.get::<i64, _>("nonce"))?;
                let stored: f64 = r.get("roll_value");
                let v = verify_roll(&server_seed, &client_seed, nonce, None)?;
                let hash_ok = v.server_seed_hash == r.get::<String, _>("server_seed_hash");
                if v.roll_value != stored || !hash_ok {
                    bad += 1;
                    println!(
                        "MISMATCH #{} user={} nonce={} stored={} recomputed={} hash_ok={}",
                        r.get::<i64, _>("id"),
                        r.get::<String, _>("user_id"),
                        nonce,
                        stored,
                        v.roll_value,
                        hash_ok
                    );
                }
            }
            println!("Checked {} rolls, {} mismatched", rows.len(), bad);
            if bad > 0 {
                bail!("{bad} transcripts failed verification");
            }
        }
        Commands::ExportCsv { path } => {
            let mut wtr = csv::Writer::from_path(&path)?;
            wtr.write_record([
                "id",
                "created_at",
                "user_id",
                "case_id",
                "server_seed_hash",
                "client_seed",
                "nonce",
                "roll_value",
                "item_won_id",
            ])?;
            let pool = get_pool(cli.database_url).await?;
            let rows = sqlx::query("SELECT id, created_at, user_id, case_id, server_seed_hash, client_seed, nonce, roll_value, item_won_id FROM rolls ORDER BY id ASC")
                .fetch_all(&pool).await?;
            let total = rows.len();
            for r in &rows {
                wtr.write_record(&[
                    r.get::<i64, _>("id").to_string(),
                    r.get::<String, _>("created_at"),
                    r.get::<String, _>("user_id"),
                    r.get::<String, _>("case_id"),
                    r.get::<String, _>("server_seed_hash"),
                    r.get::<String, _>("client_seed"),
                    r.get::<i64, _>("nonce").to_string(),
                    r.get::<f64, _>("roll_value").to_string(),
                    r.get::<String, _>("item_won_id"),
                ])?;
            }
            wtr.flush()?;
            println!("Exported {} rows to {}", total, path);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lootfair_core::commitment_hash;
    use lootfair_server::db::init_db;

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
    async fn rotate_reveals_committed_seed() {
        let db = memory_db().await;
        let store = SqliteSeedStore::new(db.clone());
        let before = store.upsert(SeedRecord::generate("u1"), None).await.unwrap();

        let rotation = rotate_seed(&db, "u1", Some("operator")).await.unwrap();
        assert_eq!(rotation.revealed_server_seed, before.server_seed);
        assert_eq!(rotation.previous_server_seed_hash, commitment_hash(&before.server_seed));

        let after = load_seeds(&db, "u1").await.unwrap();
        assert_eq!(after.version, before.version + 1);
        assert_eq!(after.client_seed, "operator");
        assert_eq!(after.nonce, 0);
        assert_eq!(commitment_hash(&after.server_seed), rotation.new_server_seed_hash);
    }

    #[tokio::test]
    async fn rotate_rejects_unknown_user_and_blank_seed() {
        let db = memory_db().await;
        assert!(rotate_seed(&db, "ghost", None).await.is_err());
        assert!(load_seeds(&db, "ghost").await.is_err());

        let store = SqliteSeedStore::new(db.clone());
        let before = store.upsert(SeedRecord::generate("u1"), None).await.unwrap();
        assert!(rotate_seed(&db, "u1", Some("  ")).await.is_err());
        assert_eq!(load_seeds(&db, "u1").await.unwrap().server_seed, before.server_seed);
    }

    #[tokio::test]
    async fn case_lookup_uses_catalog_order() {
        let db = memory_db().await;
        let items = case_items(&db, "starter").await.unwrap();
        let ids: Vec<&str> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(
            ids,
            ["karambit-fade", "awp-asiimov", "ak47-redline", "usp-cortex", "sticker-capsule"]
        );
        assert!(case_items(&db, "missing").await.is_err());
    }
}
