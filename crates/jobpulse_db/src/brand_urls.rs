//! Admin-managed per-job public application URLs (spec §6.2 `url`).
//!
//! Written by the out-of-scope admin surface; this crate only ever reads it.

use jobpulse_core::JobPulseError;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;

/// All configured brand URLs, keyed by `job_id`. Loaded once per feed build
/// rather than queried per-job, since the feed already holds every job in
/// memory for deterministic sorting.
pub async fn all(pool: &SqlitePool) -> Result<HashMap<String, String>, JobPulseError> {
    let rows = sqlx::query("SELECT job_id, url FROM feed_brand_urls")
        .fetch_all(pool)
        .await
        .map_err(|e| JobPulseError::database(format!("brand_urls all: {e}")))?;

    rows.into_iter()
        .map(|row| {
            let job_id: String = row.try_get("job_id").map_err(|e| JobPulseError::database(e.to_string()))?;
            let url: String = row.try_get("url").map_err(|e| JobPulseError::database(e.to_string()))?;
            Ok((job_id, url))
        })
        .collect()
}

pub async fn set(pool: &SqlitePool, job_id: &str, url: &str) -> Result<(), JobPulseError> {
    sqlx::query(
        r#"
        INSERT INTO feed_brand_urls (job_id, url)
        VALUES (?, ?)
        ON CONFLICT(job_id) DO UPDATE SET url = excluded.url
        "#,
    )
    .bind(job_id)
    .bind(url)
    .execute(pool)
    .await
    .map_err(|e| JobPulseError::database(format!("brand_urls set: {e}")))?;
    Ok(())
}
