//! Admin-managed feed inputs and publication bookkeeping (spec §4.4).
//!
//! `monitored_tearsheets` and `feed_exclusions` are written by the
//! out-of-scope admin surface; this crate only ever reads them.
//! `feed_publication_state` lets the zero-job safeguard (SG-1) compare a
//! fresh tearsheet pull against the size of the last successful publish
//! without re-downloading the remote file.

use chrono::{DateTime, Utc};
use jobpulse_core::JobPulseError;
use sqlx::{Row, SqlitePool};

pub async fn monitored_tearsheet_ids(pool: &SqlitePool) -> Result<Vec<String>, JobPulseError> {
    let rows = sqlx::query("SELECT tearsheet_id FROM monitored_tearsheets")
        .fetch_all(pool)
        .await
        .map_err(|e| JobPulseError::database(format!("monitored_tearsheet_ids: {e}")))?;
    rows.into_iter()
        .map(|row| row.try_get("tearsheet_id").map_err(|e| JobPulseError::database(e.to_string())))
        .collect()
}

pub async fn excluded_job_ids(pool: &SqlitePool) -> Result<Vec<String>, JobPulseError> {
    let rows = sqlx::query("SELECT job_id FROM feed_exclusions")
        .fetch_all(pool)
        .await
        .map_err(|e| JobPulseError::database(format!("excluded_job_ids: {e}")))?;
    rows.into_iter()
        .map(|row| row.try_get("job_id").map_err(|e| JobPulseError::database(e.to_string())))
        .collect()
}

/// Job count of the last feed that was actually uploaded, if any.
pub async fn last_published_job_count(pool: &SqlitePool) -> Result<Option<i64>, JobPulseError> {
    let row: Option<(i64,)> = sqlx::query_as("SELECT job_count FROM feed_publication_state WHERE id = 1")
        .fetch_optional(pool)
        .await
        .map_err(|e| JobPulseError::database(format!("last_published_job_count: {e}")))?;
    Ok(row.map(|(count,)| count))
}

pub async fn record_publication(pool: &SqlitePool, job_count: i64, published_at: DateTime<Utc>) -> Result<(), JobPulseError> {
    sqlx::query(
        r#"
        INSERT INTO feed_publication_state (id, job_count, published_at)
        VALUES (1, ?, ?)
        ON CONFLICT(id) DO UPDATE SET job_count = excluded.job_count, published_at = excluded.published_at
        "#,
    )
    .bind(job_count)
    .bind(published_at.to_rfc3339())
    .execute(pool)
    .await
    .map_err(|e| JobPulseError::database(format!("record_publication: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::open;

    #[tokio::test]
    async fn publication_state_round_trips() {
        let pool = open("sqlite::memory:").await.unwrap();
        assert_eq!(last_published_job_count(&pool).await.unwrap(), None);

        let now = Utc::now();
        record_publication(&pool, 6, now).await.unwrap();
        assert_eq!(last_published_job_count(&pool).await.unwrap(), Some(6));

        record_publication(&pool, 7, now).await.unwrap();
        assert_eq!(last_published_job_count(&pool).await.unwrap(), Some(7));
    }
}
