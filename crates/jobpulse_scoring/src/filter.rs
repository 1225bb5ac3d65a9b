//! Embedding pre-filter — Layer 1 (spec §4.7, C7). Eliminates obviously
//! mismatched `(resume, job)` pairs before Layer 2 is ever invoked.

use jobpulse_core::types::FilterLogEntry;
use jobpulse_core::JobPulseError;
use sqlx::SqlitePool;

use crate::embedding::{cosine_similarity, estimate_tokens, truncate_head_tail, EmbeddingClient};

pub struct JobForFilter {
    pub job_id: String,
    pub description_html: String,
    pub description_hash: String,
}

#[derive(Debug, Clone)]
pub struct Layer1Decision {
    pub job_id: String,
    pub similarity: f32,
    pub passed: bool,
    /// Set when the pass is due to S1 (minimum-pass), S2 (applied-job
    /// bypass), or the fail-safe embedding-failure bypass, rather than
    /// clearing the threshold on its own.
    pub safeguard: bool,
}

/// Run the full Layer 1 algorithm for one candidate against `jobs`. `jobs`
/// must already include the applied job's entry if S2 needs it — this
/// function bypasses threshold filtering for `applied_job_id` but does not
/// fetch it from the ATS itself.
pub async fn filter_jobs(
    pool: &SqlitePool,
    embedding_client: &dyn EmbeddingClient,
    embedding_model: &str,
    candidate_id: &str,
    resume_text: &str,
    jobs: &[JobForFilter],
    applied_job_id: Option<&str>,
    threshold: f32,
    min_jobs: usize,
    max_tokens: usize,
) -> Result<Vec<Layer1Decision>, JobPulseError> {
    let truncated = truncate_head_tail(resume_text, max_tokens);
    tracing::debug!(candidate_id, estimated_tokens = estimate_tokens(&truncated), "layer 1 resume truncation");

    let resume_embedding = match embedding_client.embed(embedding_model, &truncated).await {
        Ok(vector) => vector,
        Err(err) => {
            tracing::warn!(candidate_id, error = %err, "layer 1 embedding failed, bypassing filter for this candidate");
            let decisions: Vec<Layer1Decision> = jobs
                .iter()
                .map(|job| Layer1Decision { job_id: job.job_id.clone(), similarity: 0.0, passed: true, safeguard: true })
                .collect();
            record_all(pool, candidate_id, &decisions, threshold).await?;
            return Ok(decisions);
        }
    };

    let mut scored = Vec::with_capacity(jobs.len());
    for job in jobs {
        let job_embedding = job_embedding(pool, embedding_client, embedding_model, &job.job_id, &job.description_html, &job.description_hash).await?;
        let similarity = cosine_similarity(&resume_embedding, &job_embedding);
        scored.push((job.job_id.clone(), similarity));
    }

    let mut passed: std::collections::HashSet<String> =
        scored.iter().filter(|(_, sim)| *sim >= threshold).map(|(id, _)| id.clone()).collect();

    let mut safeguarded: std::collections::HashSet<String> = std::collections::HashSet::new();

    if passed.len() < min_jobs {
        let mut by_similarity = scored.clone();
        by_similarity.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        for (job_id, _) in by_similarity.into_iter().take(min_jobs) {
            if passed.insert(job_id.clone()) {
                safeguarded.insert(job_id);
            }
        }
    }

    if let Some(applied) = applied_job_id {
        if passed.insert(applied.to_string()) {
            safeguarded.insert(applied.to_string());
        } else if !scored.iter().any(|(id, sim)| id == applied && *sim >= threshold) {
            safeguarded.insert(applied.to_string());
        }
    }

    let decisions: Vec<Layer1Decision> = scored
        .into_iter()
        .map(|(job_id, similarity)| {
            let is_passed = passed.contains(&job_id);
            let safeguard = is_passed && safeguarded.contains(&job_id);
            Layer1Decision { job_id, similarity, passed: is_passed, safeguard }
        })
        .collect();

    record_all(pool, candidate_id, &decisions, threshold).await?;
    Ok(decisions)
}

async fn job_embedding(
    pool: &SqlitePool,
    embedding_client: &dyn EmbeddingClient,
    embedding_model: &str,
    job_id: &str,
    description_html: &str,
    description_hash: &str,
) -> Result<Vec<f32>, JobPulseError> {
    if let Some(cached) = jobpulse_db::embedding_cache::get(pool, job_id, description_hash).await? {
        return Ok(cached.vector);
    }

    let vector = embedding_client.embed(embedding_model, description_html).await?;
    jobpulse_db::embedding_cache::put(
        pool,
        &jobpulse_core::types::EmbeddingCacheEntry {
            job_id: job_id.to_string(),
            description_hash: description_hash.to_string(),
            vector: vector.clone(),
        },
    )
    .await?;
    Ok(vector)
}

async fn record_all(pool: &SqlitePool, candidate_id: &str, decisions: &[Layer1Decision], threshold: f32) -> Result<(), JobPulseError> {
    for decision in decisions {
        jobpulse_db::filter_log::record(
            pool,
            &FilterLogEntry {
                candidate_id: candidate_id.to_string(),
                job_id: decision.job_id.clone(),
                similarity: decision.similarity,
                threshold_used: threshold,
                filtered: !decision.passed,
                safeguard: decision.safeguard,
            },
        )
        .await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::DeterministicFakeEmbeddingClient;
    use jobpulse_db::pool::open;

    fn job(id: &str, description: &str) -> JobForFilter {
        JobForFilter { job_id: id.to_string(), description_html: description.to_string(), description_hash: format!("hash-{id}") }
    }

    #[tokio::test]
    async fn minimum_pass_safeguard_tops_up_below_threshold_matches() {
        let pool = open("sqlite::memory:").await.unwrap();
        let client = DeterministicFakeEmbeddingClient::default();
        let jobs = vec![job("1", "alpha"), job("2", "beta"), job("3", "gamma"), job("4", "delta"), job("5", "epsilon"), job("6", "zeta")];

        let decisions = filter_jobs(&pool, &client, "m", "cand-1", "completely unrelated text", &jobs, None, 0.99, 5, 8000).await.unwrap();

        assert_eq!(decisions.iter().filter(|d| d.passed).count(), 5);
        assert!(decisions.iter().filter(|d| d.passed).all(|d| d.safeguard));
    }

    #[tokio::test]
    async fn applied_job_always_passes_even_below_threshold() {
        let pool = open("sqlite::memory:").await.unwrap();
        let client = DeterministicFakeEmbeddingClient::default();
        let jobs = vec![job("applied-1", "totally unrelated content")];

        let decisions = filter_jobs(&pool, &client, "m", "cand-1", "resume text", &jobs, Some("applied-1"), 0.99, 1, 8000).await.unwrap();

        let applied = decisions.iter().find(|d| d.job_id == "applied-1").unwrap();
        assert!(applied.passed);
        assert!(applied.safeguard);
    }

    #[tokio::test]
    async fn every_pair_is_logged_regardless_of_outcome() {
        let pool = open("sqlite::memory:").await.unwrap();
        let client = DeterministicFakeEmbeddingClient::default();
        let jobs = vec![job("1", "alpha")];

        filter_jobs(&pool, &client, "m", "cand-1", "alpha", &jobs, None, 0.1, 1, 8000).await.unwrap();

        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM filter_log").fetch_one(&pool).await.unwrap();
        assert_eq!(row.0, 1);
    }
}
