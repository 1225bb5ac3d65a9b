//! The full Layer 2 / Layer 3 cascade (spec §4.8, §4.9, C8/C9): scores a
//! single candidate against a batch of jobs concurrently, escalates where
//! policy says to, and applies the deterministic post-processing gate to
//! every model response before it's trusted.

use jobpulse_core::types::{EscalationLogEntry, ScoringLayer, WorkType, YearsRequirement};
use jobpulse_core::{Config, JobPulseError};
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

use crate::llm::{ChatCompletionClient, RawScoreResponse};
use crate::postprocess::apply_years_gate;

const PER_CALL_TIMEOUT: Duration = Duration::from_secs(60);
const MAX_ATTEMPTS: u32 = 3;
const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

pub struct PairInput {
    pub job_id: String,
    pub requirements: String,
    pub location: String,
    pub work_type: WorkType,
    pub is_applied_job: bool,
    pub effective_threshold: i32,
}

#[derive(Debug, Clone)]
pub struct ScoreOutcome {
    pub job_id: String,
    pub score: i32,
    pub summary: String,
    pub skills: String,
    pub experience: String,
    pub gaps: Vec<String>,
    pub years_analysis: BTreeMap<String, YearsRequirement>,
    pub layer_used: ScoringLayer,
    pub is_applied_job: bool,
    pub error: Option<String>,
}

impl ScoreOutcome {
    pub fn is_qualified(&self, threshold: i32) -> bool {
        self.score >= threshold
    }
}

#[allow(clippy::too_many_arguments)]
pub async fn score_candidate_jobs(
    pool: &SqlitePool,
    candidate_id: &str,
    resume_text: &str,
    pairs: Vec<PairInput>,
    primary_client: Arc<dyn ChatCompletionClient>,
    escalation_client: Arc<dyn ChatCompletionClient>,
    config: Arc<Config>,
    worker_pool: Arc<Semaphore>,
) -> Vec<ScoreOutcome> {
    let mut tasks = Vec::with_capacity(pairs.len());

    for pair in pairs {
        let primary_client = Arc::clone(&primary_client);
        let escalation_client = Arc::clone(&escalation_client);
        let config = Arc::clone(&config);
        let worker_pool = Arc::clone(&worker_pool);
        let pool = pool.clone();
        let candidate_id = candidate_id.to_string();
        let resume_text = resume_text.to_string();

        tasks.push(tokio::spawn(async move {
            let _permit = worker_pool.acquire().await.expect("worker pool semaphore closed");
            score_one_pair(&pool, &candidate_id, &resume_text, pair, primary_client.as_ref(), escalation_client.as_ref(), &config).await
        }));
    }

    let mut outcomes = Vec::with_capacity(tasks.len());
    for task in tasks {
        match task.await {
            Ok(outcome) => outcomes.push(outcome),
            Err(e) => tracing::error!(error = %e, "scoring worker task panicked"),
        }
    }
    outcomes
}

async fn score_one_pair(
    pool: &SqlitePool,
    candidate_id: &str,
    resume_text: &str,
    pair: PairInput,
    primary_client: &dyn ChatCompletionClient,
    escalation_client: &dyn ChatCompletionClient,
    config: &Config,
) -> ScoreOutcome {
    let system_prompt = build_system_prompt();
    let user_prompt = build_user_prompt(&pair, resume_text);

    let l2_raw = match call_with_retry(primary_client, &config.llm_primary_model, &system_prompt, &user_prompt).await {
        Ok(raw) => raw,
        Err(err) => {
            tracing::warn!(candidate_id, job_id = %pair.job_id, error = %err, "layer 2 scoring failed permanently");
            return ScoreOutcome {
                job_id: pair.job_id,
                score: 0,
                summary: String::new(),
                skills: String::new(),
                experience: String::new(),
                gaps: Vec::new(),
                years_analysis: BTreeMap::new(),
                layer_used: ScoringLayer::L2,
                is_applied_job: pair.is_applied_job,
                error: Some(err.to_string()),
            };
        }
    };

    let l2_gated = apply_years_gate(l2_raw.clone());

    let should_escalate = config.llm_primary_model != config.llm_escalation_model && config.escalation_applies(l2_gated.score);

    if !should_escalate {
        return ScoreOutcome {
            job_id: pair.job_id,
            score: l2_gated.score,
            summary: l2_raw.match_summary,
            skills: l2_raw.skills_match,
            experience: l2_raw.experience_match,
            gaps: l2_gated.gaps,
            years_analysis: l2_gated.years_analysis,
            layer_used: ScoringLayer::L2,
            is_applied_job: pair.is_applied_job,
            error: None,
        };
    }

    let l3_raw = match call_with_retry(escalation_client, &config.llm_escalation_model, &system_prompt, &user_prompt).await {
        Ok(raw) => raw,
        Err(err) => {
            tracing::warn!(candidate_id, job_id = %pair.job_id, error = %err, "layer 3 escalation failed, keeping layer 2 score");
            return ScoreOutcome {
                job_id: pair.job_id,
                score: l2_gated.score,
                summary: l2_raw.match_summary,
                skills: l2_raw.skills_match,
                experience: l2_raw.experience_match,
                gaps: l2_gated.gaps,
                years_analysis: l2_gated.years_analysis,
                layer_used: ScoringLayer::L2,
                is_applied_job: pair.is_applied_job,
                error: None,
            };
        }
    };

    let l3_gated = apply_years_gate(l3_raw.clone());

    let l2_qualified = l2_gated.score >= pair.effective_threshold;
    let l3_qualified = l3_gated.score >= pair.effective_threshold;

    if let Err(e) = jobpulse_db::escalation_log::record(
        pool,
        &EscalationLogEntry {
            candidate_id: candidate_id.to_string(),
            job_id: pair.job_id.clone(),
            l2_score: l2_gated.score,
            l3_score: l3_gated.score,
            delta: l3_gated.score - l2_gated.score,
            crossed_threshold: l2_qualified != l3_qualified,
        },
    )
    .await
    {
        tracing::error!(candidate_id, job_id = %pair.job_id, error = %e, "failed to record escalation log entry");
    }

    ScoreOutcome {
        job_id: pair.job_id,
        score: l3_gated.score,
        summary: l3_raw.match_summary,
        skills: l3_raw.skills_match,
        experience: l3_raw.experience_match,
        gaps: l3_gated.gaps,
        years_analysis: l3_gated.years_analysis,
        layer_used: ScoringLayer::L3,
        is_applied_job: pair.is_applied_job,
        error: None,
    }
}

async fn call_with_retry(
    client: &dyn ChatCompletionClient,
    model: &str,
    system_prompt: &str,
    user_prompt: &str,
) -> Result<RawScoreResponse, JobPulseError> {
    let mut attempt = 0u32;
    loop {
        let call = client.complete(model, system_prompt, user_prompt);
        let result = tokio::time::timeout(PER_CALL_TIMEOUT, call).await;

        let outcome = match result {
            Ok(Ok(raw_json)) => serde_json::from_str::<RawScoreResponse>(&raw_json).map_err(|e| JobPulseError::data(format!("malformed scorer json: {e}"))),
            Ok(Err(err)) => Err(err),
            Err(_) => Err(JobPulseError::transient(format!("scorer call exceeded {PER_CALL_TIMEOUT:?}"))),
        };

        match outcome {
            Ok(raw) => return Ok(raw),
            Err(err) if err.is_retryable() && attempt + 1 < MAX_ATTEMPTS => {
                let delay = RETRY_BASE_DELAY * (attempt + 1);
                tracing::warn!(attempt, ?delay, model, error = %err, "retrying scorer call");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

fn build_system_prompt() -> String {
    "You are a recruiting match-scoring assistant. Respond with a single JSON object matching the requested schema. \
     Weigh only mandatory requirements; treat \"preferred\" requirements as informational only. \
     Weight years of experience: full-time counts 100%, internship/part-time 50%, coursework/university projects 0%, \
     and roles marked \"present\" count through today."
        .to_string()
}

fn build_user_prompt(pair: &PairInput, resume_text: &str) -> String {
    let location_rule = match pair.work_type {
        WorkType::OnSite | WorkType::Hybrid => {
            "Location rule: candidate must be in the same city or a commutable metro area as the job.".to_string()
        }
        WorkType::Remote => {
            "Location rule: candidate must be in the same country as the job, unless the requirements explicitly name \
             eligible foreign countries or use international-eligibility language, in which case score against that allowlist."
                .to_string()
        }
    };

    format!(
        "JOB_ID: {}\n\
         REQUIREMENTS:\n{}\n\n\
         LOCATION: {}\n\
         WORK_TYPE: {}\n\
         {location_rule}\n\n\
         RESUME:\n{resume_text}\n\n\
         Respond with JSON containing: match_score (0-100 integer), match_summary, skills_match, experience_match, \
         gaps_identified (array), key_requirements (array), years_analysis (map of skill to {{required_years, estimated_years, meets_requirement}}).",
        pair.job_id,
        pair.requirements,
        pair.location,
        pair.work_type.as_str(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{DeterministicFakeChatClient, RawYearsRequirement};

    fn config(primary: &str, escalation: &str) -> Config {
        Config {
            database_url: "sqlite::memory:".into(),
            ats_client_id: String::new(),
            ats_client_secret: String::new(),
            ats_user: String::new(),
            ats_password: String::new(),
            mail_api_key: String::new(),
            mail_from: String::new(),
            mail_reply_to: None,
            mail_admin_bcc: String::new(),
            remote_host: String::new(),
            remote_user: String::new(),
            remote_password: String::new(),
            remote_port: 22,
            remote_path: String::new(),
            llm_api_key: String::new(),
            llm_primary_model: primary.to_string(),
            llm_escalation_model: escalation.to_string(),
            llm_embedding_model: "embed".into(),
            vetting_enabled: true,
            vetting_batch_size: 25,
            vetting_tick: Duration::from_secs(300),
            publish_tick: Duration::from_secs(1800),
            digest_daily_utc: "09:00".into(),
            match_threshold_default: 80,
            escalation_low: 60,
            escalation_high: 85,
            embedding_threshold: 0.35,
            embedding_min_jobs: 5,
            embedding_max_tokens: 8000,
            feed_frozen: false,
            cron_bearer_secret: String::new(),
        }
    }

    fn pair(job_id: &str, threshold: i32) -> PairInput {
        PairInput {
            job_id: job_id.to_string(),
            requirements: "5 years Rust".into(),
            location: "Austin, TX".into(),
            work_type: WorkType::Remote,
            is_applied_job: false,
            effective_threshold: threshold,
        }
    }

    #[tokio::test]
    async fn score_in_escalation_band_triggers_layer_3_and_replaces_score() {
        let pool = jobpulse_db::pool::open("sqlite::memory:").await.unwrap();
        let primary = Arc::new(DeterministicFakeChatClient::new(72)) as Arc<dyn ChatCompletionClient>;
        let escalation = Arc::new(
            DeterministicFakeChatClient::new(0).with_response(
                "job-1",
                crate::llm::RawScoreResponse {
                    match_score: 91,
                    match_summary: "escalated summary".into(),
                    skills_match: "sk".into(),
                    experience_match: "ex".into(),
                    gaps_identified: vec![],
                    key_requirements: vec![],
                    years_analysis: BTreeMap::new(),
                },
            ),
        ) as Arc<dyn ChatCompletionClient>;

        let outcomes = score_candidate_jobs(
            &pool,
            "cand-1",
            "resume text",
            vec![pair("job-1", 80)],
            primary,
            escalation,
            Arc::new(config("gpt-4o-mini", "gpt-4o")),
            Arc::new(Semaphore::new(4)),
        )
        .await;

        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].score, 91);
        assert_eq!(outcomes[0].layer_used, ScoringLayer::L3);

        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM escalation_log").fetch_one(&pool).await.unwrap();
        assert_eq!(row.0, 1);
    }

    #[tokio::test]
    async fn already_premium_primary_model_never_escalates() {
        let pool = jobpulse_db::pool::open("sqlite::memory:").await.unwrap();
        let primary = Arc::new(DeterministicFakeChatClient::new(72)) as Arc<dyn ChatCompletionClient>;
        let escalation = Arc::new(DeterministicFakeChatClient::new(99)) as Arc<dyn ChatCompletionClient>;

        let outcomes = score_candidate_jobs(
            &pool,
            "cand-1",
            "resume text",
            vec![pair("job-1", 80)],
            primary,
            escalation,
            Arc::new(config("premium-model", "premium-model")),
            Arc::new(Semaphore::new(4)),
        )
        .await;

        assert_eq!(outcomes[0].score, 72);
        assert_eq!(outcomes[0].layer_used, ScoringLayer::L2);

        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM escalation_log").fetch_one(&pool).await.unwrap();
        assert_eq!(row.0, 0);
    }

    #[tokio::test]
    async fn years_gate_cap_survives_the_cascade() {
        let pool = jobpulse_db::pool::open("sqlite::memory:").await.unwrap();
        let mut years_analysis = BTreeMap::new();
        years_analysis.insert("Python".to_string(), RawYearsRequirement { required_years: 5.0, estimated_years: 2.0, meets_requirement: false });

        let canned = crate::llm::RawScoreResponse {
            match_score: 88,
            match_summary: "s".into(),
            skills_match: "sk".into(),
            experience_match: "ex".into(),
            gaps_identified: vec![],
            key_requirements: vec![],
            years_analysis,
        };
        let primary = Arc::new(DeterministicFakeChatClient::new(0).with_response("job-1", canned.clone())) as Arc<dyn ChatCompletionClient>;
        let escalation = Arc::new(DeterministicFakeChatClient::new(0).with_response("job-1", canned)) as Arc<dyn ChatCompletionClient>;

        let outcomes = score_candidate_jobs(
            &pool,
            "cand-1",
            "resume text",
            vec![pair("job-1", 80)],
            primary,
            escalation,
            Arc::new(config("gpt-4o-mini", "gpt-4o")),
            Arc::new(Semaphore::new(4)),
        )
        .await;

        assert_eq!(outcomes[0].score, 60);
        assert!(outcomes[0].gaps.iter().any(|g| g.starts_with("CRITICAL:")));
    }
}
