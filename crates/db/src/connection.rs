use std::time::Duration;

use sqlx::sqlite::{SqliteConnection, SqlitePoolOptions};

pub type DbPool = sqlx::SqlitePool;

/// How long a connection waits on a locked database before giving up.
/// Approval decisions are short writes, so contention clears quickly.
const BUSY_TIMEOUT_MS: u32 = 5_000;

/// Open a pool with the default sizing used by the CLI when no
/// configuration is supplied.
pub async fn connect(database_url: &str) -> Result<DbPool, sqlx::Error> {
    connect_with_settings(database_url, 5, 30).await
}

/// Open a pool sized from configuration. Every connection gets foreign
/// keys, WAL journaling, and a busy timeout: the workflow relies on FK
/// integrity between tickets and approval records, and WAL keeps reads of
/// the pending-approval queue from blocking decision writes.
pub async fn connect_with_settings(
    database_url: &str,
    max_connections: u32,
    timeout_secs: u64,
) -> Result<DbPool, sqlx::Error> {
    SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .acquire_timeout(Duration::from_secs(timeout_secs.max(1)))
        .after_connect(|conn, _meta| Box::pin(prepare_connection(conn)))
        .connect(database_url)
        .await
}

async fn prepare_connection(conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query("PRAGMA foreign_keys = ON").execute(&mut *conn).await?;
    sqlx::query("PRAGMA journal_mode = WAL").execute(&mut *conn).await?;
    sqlx::query(&format!("PRAGMA busy_timeout = {BUSY_TIMEOUT_MS}"))
        .execute(&mut *conn)
        .await?;
    Ok(())
}
