use anyhow::{Context, Result};
use sqlx::MySqlPool;
use sqlx::mysql::MySqlPoolOptions;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::store::{MemoryRecordStore, MySqlRecordStore, RecordStore};

pub async fn init_db(database_url: &str) -> Result<MySqlPool> {
    MySqlPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
        .context("Failed to connect to database")
}

/// Picks the record store backend named by `DATABASE_URL`.
pub async fn init_store(config: &Config) -> Result<Arc<dyn RecordStore>> {
    if config.uses_memory_store() {
        tracing::warn!("Using in-memory record store, data is lost on restart");
        return Ok(Arc::new(MemoryRecordStore::new()));
    }

    let pool = init_db(&config.database_url).await?;
    Ok(Arc::new(MySqlRecordStore::new(pool)))
}
