use std::sync::Arc;

use sqlx::sqlite::SqlitePoolOptions;
use tracing::info;
use tracing_subscriber::EnvFilter;

use lootfair_core::{CaseOpener, EngineConfig, FairnessEngine};
use lootfair_server::config::Config;
use lootfair_server::db::{self, SqliteAuditLog, SqliteCatalog, SqliteSeedStore};
use lootfair_server::routes::{router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;
    let db = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.db_timeout)
        .connect(&config.database_url)
        .await?;
    db::init_db(&db).await?;

    let engine = FairnessEngine::new(
        Arc::new(SqliteSeedStore::new(db.clone())),
        EngineConfig {
            max_attempts: config.roll_max_attempts,
        },
    );
    let opener = CaseOpener::new(
        engine,
        Arc::new(SqliteCatalog::new(db.clone())),
        Arc::new(SqliteAuditLog::new(db)),
    );
    let app = router(Arc::new(AppState { opener }));

    let listener = tokio::net::TcpListener::bind(&config.bind).await?;
    info!(bind = %config.bind, database = %config.database_url, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
