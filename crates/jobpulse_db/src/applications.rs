//! Application inbox (spec §4.5, §6.3). Inserts are idempotent on
//! `message_id` (P-IDEMPOTENT-INBOUND): re-delivery of the same inbound
//! message never creates a second row or re-triggers vetting.

use chrono::{DateTime, Utc};
use jobpulse_core::types::{Application, ApplicationStatus};
use jobpulse_core::JobPulseError;
use sqlx::{Row, SqlitePool};

/// Insert a freshly-received application. A duplicate `message_id` is a
/// no-op — the first delivery wins.
pub async fn insert_if_new(pool: &SqlitePool, app: &Application) -> Result<bool, JobPulseError> {
    let result = sqlx::query(
        r#"
        INSERT INTO applications (message_id, candidate_id, applied_job_id, received_at, status, vetted_at)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(message_id) DO NOTHING
        "#,
    )
    .bind(&app.message_id)
    .bind(&app.candidate_id)
    .bind(&app.applied_job_id)
    .bind(app.received_at.to_rfc3339())
    .bind(status_str(app.status))
    .bind(app.vetted_at.map(|ts| ts.to_rfc3339()))
    .execute(pool)
    .await
    .map_err(|e| JobPulseError::database(format!("insert application: {e}")))?;

    Ok(result.rows_affected() > 0)
}

/// All applications awaiting vetting: `status = 'processed'` and `vetted_at IS NULL`.
pub async fn needing_vetting(pool: &SqlitePool, batch_size: i64) -> Result<Vec<Application>, JobPulseError> {
    let rows = sqlx::query(
        r#"
        SELECT message_id, candidate_id, applied_job_id, received_at, status, vetted_at
        FROM applications
        WHERE status = 'processed' AND vetted_at IS NULL AND dead_lettered = 0
        ORDER BY received_at ASC
        LIMIT ?
        "#,
    )
    .bind(batch_size)
    .fetch_all(pool)
    .await
    .map_err(|e| JobPulseError::database(format!("select applications needing vetting: {e}")))?;

    rows.into_iter().map(row_to_application).collect()
}

pub async fn mark_vetted(pool: &SqlitePool, message_id: &str, vetted_at: DateTime<Utc>) -> Result<(), JobPulseError> {
    sqlx::query("UPDATE applications SET vetted_at = ? WHERE message_id = ?")
        .bind(vetted_at.to_rfc3339())
        .bind(message_id)
        .execute(pool)
        .await
        .map_err(|e| JobPulseError::database(format!("mark_vetted: {e}")))?;
    Ok(())
}

pub async fn mark_processed(pool: &SqlitePool, message_id: &str) -> Result<(), JobPulseError> {
    sqlx::query("UPDATE applications SET status = 'processed' WHERE message_id = ?")
        .bind(message_id)
        .execute(pool)
        .await
        .map_err(|e| JobPulseError::database(format!("mark_processed: {e}")))?;
    Ok(())
}

/// Record a resume-extraction failure for this application. Once the count
/// reaches 3 the row is dead-lettered and drops out of `needing_vetting`
/// (spec §4.6: retried next cycle up to 3 times, then dead-lettered).
pub async fn record_resume_failure(pool: &SqlitePool, message_id: &str) -> Result<i64, JobPulseError> {
    sqlx::query(
        r#"
        UPDATE applications
        SET resume_attempts = resume_attempts + 1,
            dead_lettered = CASE WHEN resume_attempts + 1 >= 3 THEN 1 ELSE 0 END
        WHERE message_id = ?
        "#,
    )
    .bind(message_id)
    .execute(pool)
    .await
    .map_err(|e| JobPulseError::database(format!("record_resume_failure: {e}")))?;

    let attempts: i64 = sqlx::query_scalar("SELECT resume_attempts FROM applications WHERE message_id = ?")
        .bind(message_id)
        .fetch_one(pool)
        .await
        .map_err(|e| JobPulseError::database(format!("record_resume_failure read-back: {e}")))?;
    Ok(attempts)
}

fn status_str(status: ApplicationStatus) -> &'static str {
    match status {
        ApplicationStatus::Received => "received",
        ApplicationStatus::Processed => "processed",
    }
}

fn row_to_application(row: sqlx::sqlite::SqliteRow) -> Result<Application, JobPulseError> {
    let received_at: String = get(&row, "received_at")?;
    let vetted_at: Option<String> = row.try_get("vetted_at").map_err(|e| JobPulseError::database(e.to_string()))?;
    let status: String = get(&row, "status")?;

    Ok(Application {
        message_id: get(&row, "message_id")?,
        candidate_id: get(&row, "candidate_id")?,
        applied_job_id: get(&row, "applied_job_id")?,
        received_at: parse_ts(&received_at)?,
        status: parse_status(&status)?,
        vetted_at: vetted_at.map(|ts| parse_ts(&ts)).transpose()?,
    })
}

fn get(row: &sqlx::sqlite::SqliteRow, col: &str) -> Result<String, JobPulseError> {
    row.try_get(col).map_err(|e| JobPulseError::database(format!("{col}: {e}")))
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>, JobPulseError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| JobPulseError::database(format!("bad timestamp {raw}: {e}")))
}

fn parse_status(raw: &str) -> Result<ApplicationStatus, JobPulseError> {
    match raw {
        "received" => Ok(ApplicationStatus::Received),
        "processed" => Ok(ApplicationStatus::Processed),
        other => Err(JobPulseError::database(format!("unknown application status {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::open;

    fn sample(message_id: &str) -> Application {
        Application {
            message_id: message_id.to_string(),
            candidate_id: "cand-1".to_string(),
            applied_job_id: "job-1".to_string(),
            received_at: Utc::now(),
            status: ApplicationStatus::Processed,
            vetted_at: None,
        }
    }

    #[tokio::test]
    async fn duplicate_message_id_is_a_no_op() {
        let pool = open("sqlite::memory:").await.unwrap();
        let app = sample("msg-1");
        assert!(insert_if_new(&pool, &app).await.unwrap());
        assert!(!insert_if_new(&pool, &app).await.unwrap());

        let pending = needing_vetting(&pool, 10).await.unwrap();
        assert_eq!(pending.len(), 1);
    }

    #[tokio::test]
    async fn vetted_applications_are_excluded_from_the_queue() {
        let pool = open("sqlite::memory:").await.unwrap();
        let app = sample("msg-2");
        insert_if_new(&pool, &app).await.unwrap();
        mark_vetted(&pool, "msg-2", Utc::now()).await.unwrap();

        let pending = needing_vetting(&pool, 10).await.unwrap();
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn dead_letters_after_three_resume_failures() {
        let pool = open("sqlite::memory:").await.unwrap();
        let app = sample("msg-3");
        insert_if_new(&pool, &app).await.unwrap();

        assert_eq!(record_resume_failure(&pool, "msg-3").await.unwrap(), 1);
        assert_eq!(needing_vetting(&pool, 10).await.unwrap().len(), 1);

        assert_eq!(record_resume_failure(&pool, "msg-3").await.unwrap(), 2);
        assert_eq!(needing_vetting(&pool, 10).await.unwrap().len(), 1);

        assert_eq!(record_resume_failure(&pool, "msg-3").await.unwrap(), 3);
        assert!(needing_vetting(&pool, 10).await.unwrap().is_empty());
    }
}
