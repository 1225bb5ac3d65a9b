//! Job requirements store (spec §4.8, §4.9). Invariant RQ-1: syncing
//! `ai_extracted` from a fresh extraction must never touch `custom_override`
//! or `threshold` — those are operator-owned fields.

use chrono::{DateTime, Utc};
use jobpulse_core::types::JobRequirements;
use jobpulse_core::JobPulseError;
use sqlx::{Row, SqlitePool};

pub async fn fetch(pool: &SqlitePool, job_id: &str) -> Result<Option<JobRequirements>, JobPulseError> {
    let row = sqlx::query(
        "SELECT job_id, ai_extracted, custom_override, threshold, last_extraction FROM job_requirements WHERE job_id = ?",
    )
    .bind(job_id)
    .fetch_optional(pool)
    .await
    .map_err(|e| JobPulseError::database(format!("fetch requirements: {e}")))?;

    row.map(row_to_requirements).transpose()
}

/// Insert a first-seen job with its AI-extracted requirements and a default
/// threshold, or update only `ai_extracted`/`last_extraction` for a job that
/// already has a row — `custom_override` and `threshold` are left untouched.
pub async fn sync_extraction(
    pool: &SqlitePool,
    job_id: &str,
    ai_extracted: &str,
    default_threshold: i32,
    extracted_at: DateTime<Utc>,
) -> Result<(), JobPulseError> {
    sqlx::query(
        r#"
        INSERT INTO job_requirements (job_id, ai_extracted, custom_override, threshold, last_extraction)
        VALUES (?, ?, NULL, ?, ?)
        ON CONFLICT(job_id) DO UPDATE SET
            ai_extracted = excluded.ai_extracted,
            last_extraction = excluded.last_extraction
        "#,
    )
    .bind(job_id)
    .bind(ai_extracted)
    .bind(default_threshold)
    .bind(extracted_at.to_rfc3339())
    .execute(pool)
    .await
    .map_err(|e| JobPulseError::database(format!("sync_extraction: {e}")))?;
    Ok(())
}

/// Operator override of requirements text and/or threshold.
pub async fn set_override(pool: &SqlitePool, job_id: &str, custom_override: Option<&str>, threshold: i32) -> Result<(), JobPulseError> {
    sqlx::query("UPDATE job_requirements SET custom_override = ?, threshold = ? WHERE job_id = ?")
        .bind(custom_override)
        .bind(threshold)
        .bind(job_id)
        .execute(pool)
        .await
        .map_err(|e| JobPulseError::database(format!("set_override: {e}")))?;
    Ok(())
}

/// "Sync with active jobs" (spec §3, RQ-1): remove requirements rows whose
/// `job_id` is no longer among `active_job_ids`. Never touches
/// `custom_override` or `threshold` on surviving rows — it only deletes
/// orphans.
pub async fn remove_orphaned(pool: &SqlitePool, active_job_ids: &[String]) -> Result<u64, JobPulseError> {
    if active_job_ids.is_empty() {
        let result = sqlx::query("DELETE FROM job_requirements")
            .execute(pool)
            .await
            .map_err(|e| JobPulseError::database(format!("remove_orphaned (empty): {e}")))?;
        return Ok(result.rows_affected());
    }

    let placeholders = active_job_ids.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
    let sql = format!("DELETE FROM job_requirements WHERE job_id NOT IN ({placeholders})");
    let mut query = sqlx::query(&sql);
    for id in active_job_ids {
        query = query.bind(id);
    }
    let result = query
        .execute(pool)
        .await
        .map_err(|e| JobPulseError::database(format!("remove_orphaned: {e}")))?;
    Ok(result.rows_affected())
}

fn row_to_requirements(row: sqlx::sqlite::SqliteRow) -> Result<JobRequirements, JobPulseError> {
    let last_extraction: Option<String> = row.try_get("last_extraction").map_err(|e| JobPulseError::database(e.to_string()))?;
    Ok(JobRequirements {
        job_id: row.try_get("job_id").map_err(|e| JobPulseError::database(e.to_string()))?,
        ai_extracted: row.try_get("ai_extracted").map_err(|e| JobPulseError::database(e.to_string()))?,
        custom_override: row.try_get("custom_override").map_err(|e| JobPulseError::database(e.to_string()))?,
        threshold: row.try_get("threshold").map_err(|e| JobPulseError::database(e.to_string()))?,
        last_extraction: last_extraction.map(|ts| parse_ts(&ts)).transpose()?,
    })
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>, JobPulseError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| JobPulseError::database(format!("bad timestamp {raw}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::open;

    #[tokio::test]
    async fn re_sync_never_touches_operator_fields() {
        let pool = open("sqlite::memory:").await.unwrap();
        sync_extraction(&pool, "job-1", "v1 requirements", 70, Utc::now()).await.unwrap();
        set_override(&pool, "job-1", Some("operator text"), 85).await.unwrap();

        sync_extraction(&pool, "job-1", "v2 requirements", 70, Utc::now()).await.unwrap();

        let reqs = fetch(&pool, "job-1").await.unwrap().unwrap();
        assert_eq!(reqs.ai_extracted, "v2 requirements");
        assert_eq!(reqs.custom_override.as_deref(), Some("operator text"));
        assert_eq!(reqs.threshold, 85);
        assert_eq!(reqs.active(), "operator text");
    }

    #[tokio::test]
    async fn orphan_sync_drops_rows_but_preserves_overrides_on_survivors() {
        let pool = open("sqlite::memory:").await.unwrap();
        sync_extraction(&pool, "job-1", "reqs-1", 70, Utc::now()).await.unwrap();
        sync_extraction(&pool, "job-2", "reqs-2", 70, Utc::now()).await.unwrap();
        set_override(&pool, "job-2", Some("custom"), 90).await.unwrap();

        let removed = remove_orphaned(&pool, &["job-2".to_string()]).await.unwrap();
        assert_eq!(removed, 1);

        assert!(fetch(&pool, "job-1").await.unwrap().is_none());
        let survivor = fetch(&pool, "job-2").await.unwrap().unwrap();
        assert_eq!(survivor.custom_override.as_deref(), Some("custom"));
        assert_eq!(survivor.threshold, 90);
    }
}
