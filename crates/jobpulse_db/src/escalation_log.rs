//! Audit log for L2 -> L3 escalation decisions (spec §4.10).

use jobpulse_core::types::EscalationLogEntry;
use jobpulse_core::JobPulseError;
use sqlx::SqlitePool;

pub async fn record(pool: &SqlitePool, entry: &EscalationLogEntry) -> Result<(), JobPulseError> {
    sqlx::query(
        r#"
        INSERT INTO escalation_log (candidate_id, job_id, l2_score, l3_score, delta, crossed_threshold, logged_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&entry.candidate_id)
    .bind(&entry.job_id)
    .bind(entry.l2_score)
    .bind(entry.l3_score)
    .bind(entry.delta)
    .bind(entry.crossed_threshold)
    .bind(chrono::Utc::now().to_rfc3339())
    .execute(pool)
    .await
    .map_err(|e| JobPulseError::database(format!("escalation_log record: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::open;

    #[tokio::test]
    async fn records_an_escalation_decision() {
        let pool = open("sqlite::memory:").await.unwrap();
        record(&pool, &EscalationLogEntry {
            candidate_id: "cand-1".into(),
            job_id: "job-1".into(),
            l2_score: 72,
            l3_score: 88,
            delta: 16,
            crossed_threshold: true,
        }).await.unwrap();

        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM escalation_log").fetch_one(&pool).await.unwrap();
        assert_eq!(row.0, 1);
    }
}
