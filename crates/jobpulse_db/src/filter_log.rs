//! Audit log for embedding-filter decisions (spec §4.7, P-MINPASS).

use jobpulse_core::types::FilterLogEntry;
use jobpulse_core::JobPulseError;
use sqlx::SqlitePool;

pub async fn record(pool: &SqlitePool, entry: &FilterLogEntry) -> Result<(), JobPulseError> {
    sqlx::query(
        r#"
        INSERT INTO filter_log (candidate_id, job_id, similarity, threshold_used, filtered, safeguard, logged_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&entry.candidate_id)
    .bind(&entry.job_id)
    .bind(entry.similarity)
    .bind(entry.threshold_used)
    .bind(entry.filtered)
    .bind(entry.safeguard)
    .bind(chrono::Utc::now().to_rfc3339())
    .execute(pool)
    .await
    .map_err(|e| JobPulseError::database(format!("filter_log record: {e}")))?;
    Ok(())
}
