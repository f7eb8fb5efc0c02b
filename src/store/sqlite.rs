//! SQLite pool construction with the sqlite-vec extension installed.

use std::sync::Once;

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};

use crate::config::DatabaseConfig;
use crate::errors::Result;

static VEC_EXTENSION: Once = Once::new();

/// Register sqlite-vec as an auto extension so every connection sqlx opens
/// carries `vec_distance_cosine`. Must run before the first pool is built;
/// both open helpers call it.
pub(crate) fn register_vector_extension() {
    VEC_EXTENSION.call_once(|| unsafe {
        libsqlite3_sys::sqlite3_auto_extension(Some(std::mem::transmute(
            sqlite_vec::sqlite3_vec_init as *const (),
        )));
    });
}

/// Open a file-backed pool in WAL mode.
pub async fn open_pool(path: &str, max_connections: u32) -> Result<SqlitePool> {
    register_vector_extension();
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .min_connections(1)
        .max_connections(max_connections.max(1))
        .connect_with(options)
        .await?;
    tracing::info!(path = %path, "opened sqlite pool");
    Ok(pool)
}

/// Open an in-memory pool. A `:memory:` database is per-connection, so the
/// pool is pinned to a single connection that is never recycled.
pub async fn open_memory_pool() -> Result<SqlitePool> {
    register_vector_extension();
    let options = SqliteConnectOptions::new()
        .in_memory(true)
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .min_connections(1)
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;
    Ok(pool)
}

/// Open a pool from engine configuration.
pub async fn connect(config: &DatabaseConfig) -> Result<SqlitePool> {
    if config.in_memory {
        open_memory_pool().await
    } else {
        open_pool(&config.path, config.max_connections).await
    }
}
