//! Connection pool creation and migration (spec §6.5).

use jobpulse_core::JobPulseError;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;

/// Open a pool against `database_url` and run pending migrations.
///
/// `database_url` is expected to be a `sqlite:` URL for the default
/// deployment target; the schema uses only portable SQL so the same
/// migrations apply unchanged against a Postgres-backed store (spec §6.5).
pub async fn open(database_url: &str) -> Result<SqlitePool, JobPulseError> {
    let options = SqliteConnectOptions::from_str(database_url)
        .map_err(|e| JobPulseError::database(format!("invalid database_url: {e}")))?
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .connect_with(options)
        .await
        .map_err(|e| JobPulseError::database(format!("failed to connect: {e}")))?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| JobPulseError::database(format!("migration failed: {e}")))?;

    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn opens_in_memory_and_migrates() {
        let pool = open("sqlite::memory:").await.unwrap();
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM scheduler_locks")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(row.0, 0);
    }
}
