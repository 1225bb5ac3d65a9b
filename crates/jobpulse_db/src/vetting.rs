//! Vetting runs and their per-job matches (spec §3, §4.9, §4.10).

use chrono::{DateTime, Utc};
use jobpulse_core::types::{JobMatch, ScoringLayer, VettingRun, VettingStatus, YearsRequirement};
use jobpulse_core::JobPulseError;
use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;

pub async fn start_run(pool: &SqlitePool, id: &str, candidate_id: &str, started_at: DateTime<Utc>) -> Result<(), JobPulseError> {
    sqlx::query(
        r#"
        INSERT INTO vetting_runs (id, candidate_id, started_at, status)
        VALUES (?, ?, ?, 'running')
        "#,
    )
    .bind(id)
    .bind(candidate_id)
    .bind(started_at.to_rfc3339())
    .execute(pool)
    .await
    .map_err(|e| JobPulseError::database(format!("start_run: {e}")))?;
    Ok(())
}

pub async fn finish_run(
    pool: &SqlitePool,
    run: &VettingRun,
) -> Result<(), JobPulseError> {
    sqlx::query(
        r#"
        UPDATE vetting_runs
        SET finished_at = ?, highest_score = ?, qualified = ?, note_id = ?, error = ?, status = ?
        WHERE id = ?
        "#,
    )
    .bind(run.finished_at.map(|ts| ts.to_rfc3339()))
    .bind(run.highest_score)
    .bind(run.qualified)
    .bind(&run.note_id)
    .bind(&run.error)
    .bind(status_str(run.status))
    .bind(&run.id)
    .execute(pool)
    .await
    .map_err(|e| JobPulseError::database(format!("finish_run: {e}")))?;
    Ok(())
}

pub async fn record_match(pool: &SqlitePool, m: &JobMatch) -> Result<(), JobPulseError> {
    let skills_json = serde_json::to_string(&m.skills).map_err(|e| JobPulseError::data(e.to_string()))?;
    let gaps_json = serde_json::to_string(&m.gaps).map_err(|e| JobPulseError::data(e.to_string()))?;
    let years_json = serde_json::to_string(&m.years_analysis).map_err(|e| JobPulseError::data(e.to_string()))?;

    sqlx::query(
        r#"
        INSERT INTO job_matches
            (vetting_run_id, job_id, score, summary, skills, experience, gaps, years_analysis, layer_used, is_applied_job, is_qualified, error)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(vetting_run_id, job_id) DO UPDATE SET
            score = excluded.score,
            summary = excluded.summary,
            skills = excluded.skills,
            experience = excluded.experience,
            gaps = excluded.gaps,
            years_analysis = excluded.years_analysis,
            layer_used = excluded.layer_used,
            is_applied_job = excluded.is_applied_job,
            is_qualified = excluded.is_qualified,
            error = excluded.error
        "#,
    )
    .bind(&m.vetting_run_id)
    .bind(&m.job_id)
    .bind(m.score)
    .bind(&m.summary)
    .bind(skills_json)
    .bind(&m.experience)
    .bind(gaps_json)
    .bind(years_json)
    .bind(layer_str(m.layer_used))
    .bind(m.is_applied_job)
    .bind(m.is_qualified)
    .bind(&m.error)
    .execute(pool)
    .await
    .map_err(|e| JobPulseError::database(format!("record_match: {e}")))?;
    Ok(())
}

/// Most recent completion time for any run belonging to `candidate_id`, used
/// by the applicant detector's supplementary strategy to skip candidates
/// vetted within the last 24h (spec §4.5).
pub async fn last_completed_run_at(pool: &SqlitePool, candidate_id: &str) -> Result<Option<DateTime<Utc>>, JobPulseError> {
    let row: Option<(String,)> = sqlx::query_as(
        r#"
        SELECT finished_at FROM vetting_runs
        WHERE candidate_id = ? AND status = 'completed' AND finished_at IS NOT NULL
        ORDER BY finished_at DESC
        LIMIT 1
        "#,
    )
    .bind(candidate_id)
    .fetch_optional(pool)
    .await
    .map_err(|e| JobPulseError::database(format!("last_completed_run_at: {e}")))?;

    row.map(|(ts,)| {
        DateTime::parse_from_rfc3339(&ts)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| JobPulseError::database(format!("bad timestamp {ts}: {e}")))
    })
    .transpose()
}

pub async fn matches_for_run(pool: &SqlitePool, vetting_run_id: &str) -> Result<Vec<JobMatch>, JobPulseError> {
    let rows = sqlx::query(
        r#"
        SELECT vetting_run_id, job_id, score, summary, skills, experience, gaps, years_analysis, layer_used, is_applied_job, is_qualified, error
        FROM job_matches
        WHERE vetting_run_id = ?
        ORDER BY score DESC
        "#,
    )
    .bind(vetting_run_id)
    .fetch_all(pool)
    .await
    .map_err(|e| JobPulseError::database(format!("matches_for_run: {e}")))?;

    rows.into_iter().map(row_to_match).collect()
}

#[derive(Debug, Clone, Default)]
pub struct DigestSummary {
    pub completed: i64,
    pub qualified: i64,
    pub failed: i64,
}

/// Counts of runs finished since `since`, for the daily digest cycle.
pub async fn summary_since(pool: &SqlitePool, since: DateTime<Utc>) -> Result<DigestSummary, JobPulseError> {
    let row: (i64, i64, i64) = sqlx::query_as(
        r#"
        SELECT
            COUNT(*) FILTER (WHERE status = 'completed'),
            COUNT(*) FILTER (WHERE status = 'completed' AND qualified = 1),
            COUNT(*) FILTER (WHERE status = 'failed')
        FROM vetting_runs
        WHERE finished_at IS NOT NULL AND finished_at >= ?
        "#,
    )
    .bind(since.to_rfc3339())
    .fetch_one(pool)
    .await
    .map_err(|e| JobPulseError::database(format!("summary_since: {e}")))?;

    Ok(DigestSummary { completed: row.0, qualified: row.1, failed: row.2 })
}

fn status_str(status: VettingStatus) -> &'static str {
    match status {
        VettingStatus::Pending => "pending",
        VettingStatus::Running => "running",
        VettingStatus::Completed => "completed",
        VettingStatus::Failed => "failed",
    }
}

fn layer_str(layer: ScoringLayer) -> &'static str {
    match layer {
        ScoringLayer::L2 => "l2",
        ScoringLayer::L3 => "l3",
    }
}

fn parse_layer(raw: &str) -> Result<ScoringLayer, JobPulseError> {
    match raw {
        "l2" => Ok(ScoringLayer::L2),
        "l3" => Ok(ScoringLayer::L3),
        other => Err(JobPulseError::database(format!("unknown scoring layer {other}"))),
    }
}

fn row_to_match(row: sqlx::sqlite::SqliteRow) -> Result<JobMatch, JobPulseError> {
    let skills_json: String = get(&row, "skills")?;
    let gaps_json: String = get(&row, "gaps")?;
    let years_json: String = get(&row, "years_analysis")?;
    let layer_used: String = get(&row, "layer_used")?;

    Ok(JobMatch {
        vetting_run_id: get(&row, "vetting_run_id")?,
        job_id: get(&row, "job_id")?,
        score: row.try_get("score").map_err(|e| JobPulseError::database(e.to_string()))?,
        summary: get(&row, "summary")?,
        skills: serde_json::from_str(&skills_json).map_err(|e| JobPulseError::data(e.to_string()))?,
        experience: get(&row, "experience")?,
        gaps: serde_json::from_str(&gaps_json).map_err(|e| JobPulseError::data(e.to_string()))?,
        years_analysis: serde_json::from_str::<BTreeMap<String, YearsRequirement>>(&years_json)
            .map_err(|e| JobPulseError::data(e.to_string()))?,
        layer_used: parse_layer(&layer_used)?,
        is_applied_job: row.try_get::<i64, _>("is_applied_job").map_err(|e| JobPulseError::database(e.to_string()))? != 0,
        is_qualified: row.try_get::<i64, _>("is_qualified").map_err(|e| JobPulseError::database(e.to_string()))? != 0,
        error: row.try_get("error").map_err(|e| JobPulseError::database(e.to_string()))?,
    })
}

fn get(row: &sqlx::sqlite::SqliteRow, col: &str) -> Result<String, JobPulseError> {
    row.try_get(col).map_err(|e| JobPulseError::database(format!("{col}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::open;

    #[tokio::test]
    async fn records_and_retrieves_matches_sorted_by_score() {
        let pool = open("sqlite::memory:").await.unwrap();
        start_run(&pool, "run-1", "cand-1", Utc::now()).await.unwrap();

        let low = JobMatch {
            vetting_run_id: "run-1".into(),
            job_id: "job-a".into(),
            score: 40,
            summary: "s".into(),
            skills: "rust".into(),
            experience: "e".into(),
            gaps: vec![],
            years_analysis: BTreeMap::new(),
            layer_used: ScoringLayer::L2,
            is_applied_job: false,
            is_qualified: false,
            error: None,
        };
        let high = JobMatch { job_id: "job-b".into(), score: 90, ..low.clone() };

        record_match(&pool, &low).await.unwrap();
        record_match(&pool, &high).await.unwrap();

        let results = matches_for_run(&pool, "run-1").await.unwrap();
        assert_eq!(results[0].job_id, "job-b");
        assert_eq!(results[1].job_id, "job-a");
    }

    #[tokio::test]
    async fn last_completed_run_at_ignores_unfinished_and_failed_runs() {
        let pool = open("sqlite::memory:").await.unwrap();
        assert!(last_completed_run_at(&pool, "cand-1").await.unwrap().is_none());

        start_run(&pool, "run-1", "cand-1", Utc::now()).await.unwrap();
        assert!(last_completed_run_at(&pool, "cand-1").await.unwrap().is_none());

        let finished = Utc::now();
        finish_run(
            &pool,
            &VettingRun {
                id: "run-1".into(),
                candidate_id: "cand-1".into(),
                started_at: Utc::now(),
                finished_at: Some(finished),
                highest_score: Some(90),
                qualified: true,
                note_id: None,
                error: None,
                status: VettingStatus::Completed,
            },
        )
        .await
        .unwrap();

        let last = last_completed_run_at(&pool, "cand-1").await.unwrap().unwrap();
        assert_eq!(last.timestamp(), finished.timestamp());
    }

    #[tokio::test]
    async fn summary_since_counts_by_outcome() {
        let pool = open("sqlite::memory:").await.unwrap();
        let since = Utc::now() - chrono::Duration::hours(1);

        start_run(&pool, "run-1", "cand-1", Utc::now()).await.unwrap();
        finish_run(
            &pool,
            &VettingRun {
                id: "run-1".into(),
                candidate_id: "cand-1".into(),
                started_at: Utc::now(),
                finished_at: Some(Utc::now()),
                highest_score: Some(90),
                qualified: true,
                note_id: None,
                error: None,
                status: VettingStatus::Completed,
            },
        )
        .await
        .unwrap();

        start_run(&pool, "run-2", "cand-2", Utc::now()).await.unwrap();
        finish_run(
            &pool,
            &VettingRun {
                id: "run-2".into(),
                candidate_id: "cand-2".into(),
                started_at: Utc::now(),
                finished_at: Some(Utc::now()),
                highest_score: None,
                qualified: false,
                note_id: None,
                error: Some("boom".into()),
                status: VettingStatus::Failed,
            },
        )
        .await
        .unwrap();

        let summary = summary_since(&pool, since).await.unwrap();
        assert_eq!(summary.completed, 1);
        assert_eq!(summary.qualified, 1);
        assert_eq!(summary.failed, 1);
    }
}
