//! Job reference token store (spec §3, §4.4). Enforces RI-1: once a
//! `reference_token` is assigned to a `job_id` it is never rewritten by an
//! automated path.

use chrono::{DateTime, Utc};
use jobpulse_core::types::JobReference;
use jobpulse_core::JobPulseError;
use jobpulse_ids::mint_reference_token;
use sqlx::{Row, SqlitePool};

/// Return the existing reference for `job_id`, minting and persisting a new
/// one if none exists yet. Uses `INSERT ... ON CONFLICT DO NOTHING` followed
/// by a read-back so concurrent callers racing on the same `job_id` converge
/// on a single token instead of each minting their own.
pub async fn load_or_mint(pool: &SqlitePool, job_id: &str) -> Result<JobReference, JobPulseError> {
    let candidate_token = mint_reference_token();
    let now = Utc::now();

    sqlx::query(
        r#"
        INSERT INTO job_references (job_id, reference_token, last_updated)
        VALUES (?, ?, ?)
        ON CONFLICT(job_id) DO NOTHING
        "#,
    )
    .bind(job_id)
    .bind(&candidate_token)
    .bind(now.to_rfc3339())
    .execute(pool)
    .await
    .map_err(|e| JobPulseError::database(format!("insert job_reference: {e}")))?;

    fetch(pool, job_id)
        .await?
        .ok_or_else(|| JobPulseError::fatal("job_reference missing immediately after insert"))
}

/// Operator-initiated refresh: explicitly overwrite the token for `job_id`.
/// The only path in the system permitted to rewrite an existing token.
pub async fn operator_refresh(pool: &SqlitePool, job_id: &str) -> Result<JobReference, JobPulseError> {
    let new_token = mint_reference_token();
    let now = Utc::now();

    sqlx::query(
        r#"
        INSERT INTO job_references (job_id, reference_token, last_updated)
        VALUES (?, ?, ?)
        ON CONFLICT(job_id) DO UPDATE SET
            reference_token = excluded.reference_token,
            last_updated = excluded.last_updated
        "#,
    )
    .bind(job_id)
    .bind(&new_token)
    .bind(now.to_rfc3339())
    .execute(pool)
    .await
    .map_err(|e| JobPulseError::database(format!("operator_refresh: {e}")))?;

    fetch(pool, job_id)
        .await?
        .ok_or_else(|| JobPulseError::fatal("job_reference missing immediately after refresh"))
}

pub async fn fetch(pool: &SqlitePool, job_id: &str) -> Result<Option<JobReference>, JobPulseError> {
    let row = sqlx::query("SELECT job_id, reference_token, last_updated FROM job_references WHERE job_id = ?")
        .bind(job_id)
        .fetch_optional(pool)
        .await
        .map_err(|e| JobPulseError::database(format!("fetch job_reference: {e}")))?;

    row.map(row_to_reference).transpose()
}

fn row_to_reference(row: sqlx::sqlite::SqliteRow) -> Result<JobReference, JobPulseError> {
    let last_updated: String = row.try_get("last_updated")
        .map_err(|e| JobPulseError::database(e.to_string()))?;
    Ok(JobReference {
        job_id: row.try_get("job_id").map_err(|e| JobPulseError::database(e.to_string()))?,
        reference_token: row.try_get("reference_token").map_err(|e| JobPulseError::database(e.to_string()))?,
        last_updated: parse_timestamp(&last_updated)?,
    })
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, JobPulseError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| JobPulseError::database(format!("bad timestamp {raw}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::open;

    #[tokio::test]
    async fn mints_once_and_is_stable_across_repeat_lookups() {
        let pool = open("sqlite::memory:").await.unwrap();
        let first = load_or_mint(&pool, "job-1").await.unwrap();
        let second = load_or_mint(&pool, "job-1").await.unwrap();
        assert_eq!(first.reference_token, second.reference_token);
    }

    #[tokio::test]
    async fn operator_refresh_changes_the_token() {
        let pool = open("sqlite::memory:").await.unwrap();
        let first = load_or_mint(&pool, "job-2").await.unwrap();
        let refreshed = operator_refresh(&pool, "job-2").await.unwrap();
        assert_ne!(first.reference_token, refreshed.reference_token);
    }
}
