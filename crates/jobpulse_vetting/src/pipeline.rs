//! The full per-cycle vetting pipeline (spec §4.5–§4.10, §5): detect,
//! extract, filter, score, aggregate, write — one candidate at a time on
//! its own coordinator task, up to a small concurrency ceiling.

use chrono::{Duration as ChronoDuration, Utc};
use jobpulse_ats::AtsClient;
use jobpulse_core::types::{Job, JobMatch, Location, VettingRun, VettingStatus, WorkType};
use jobpulse_core::{Config, JobPulseError};
use jobpulse_ids::VettingRunId;
use jobpulse_mail::MailSender;
use jobpulse_resume::ResumeExtractor;
use jobpulse_scoring::{filter_jobs, score_candidate_jobs, ChatCompletionClient, EmbeddingClient, JobForFilter, PairInput};
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration as StdDuration, Instant};
use tokio::sync::Semaphore;

use crate::aggregator::{aggregate_and_write, AggregatedPair};
use crate::detector::{cap_to_batch, detect, DetectedCandidate};

/// Overall vetting cycle deadline (spec §5): remaining candidates are
/// skipped past this point and re-discovered next cycle.
const VETTING_CYCLE_DEADLINE: StdDuration = StdDuration::from_secs(6 * 60);
/// Candidates processed in parallel (spec §5 default ceiling).
const MAX_CONCURRENT_CANDIDATES: usize = 3;
/// LLM scoring workers per candidate (spec §4.8 default).
const SCORING_WORKER_POOL_SIZE: usize = 8;
/// Fallback-strategy lookback window (spec §4.5 default N minutes).
const FALLBACK_DETECTION_WINDOW: ChronoDuration = ChronoDuration::minutes(30);

#[derive(Debug, Clone, Default)]
pub struct VettingCycleReport {
    pub candidates_detected: usize,
    pub candidates_completed: usize,
    pub candidates_skipped_resume: usize,
    pub candidates_skipped_deadline: usize,
}

/// Everything the pipeline needs from the outside world, collected so
/// `main.rs` constructs it once per process and hands it to every tick.
pub struct VettingDeps {
    pub ats: Arc<AtsClient>,
    pub resume_extractor: Arc<ResumeExtractor>,
    pub embedding_client: Arc<dyn EmbeddingClient>,
    pub primary_chat_client: Arc<dyn ChatCompletionClient>,
    pub escalation_chat_client: Arc<dyn ChatCompletionClient>,
    pub mail: Arc<MailSender>,
    pub config: Arc<Config>,
}

pub async fn run_vetting_cycle(pool: &SqlitePool, deps: &VettingDeps) -> Result<VettingCycleReport, JobPulseError> {
    if !deps.config.vetting_enabled {
        tracing::info!("vetting is disabled by configuration, skipping cycle");
        return Ok(VettingCycleReport::default());
    }

    let deadline = Instant::now() + VETTING_CYCLE_DEADLINE;

    // The integration's own ATS identity doubles as the "well-known
    // automation agent" the supplementary detection strategy searches for
    // (spec §4.5) — there is no separate configuration key for it (spec
    // §6.1's table is closed).
    let detected = detect(pool, &deps.ats, &deps.config.ats_user, FALLBACK_DETECTION_WINDOW).await?;
    let candidates = cap_to_batch(detected, deps.config.vetting_batch_size);
    let candidates_detected = candidates.len();

    let active_jobs = gather_active_jobs(pool, &deps.ats).await?;
    let worker_pool = Arc::new(Semaphore::new(SCORING_WORKER_POOL_SIZE));
    let concurrency = Arc::new(Semaphore::new(MAX_CONCURRENT_CANDIDATES));

    let mut tasks = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let pool = pool.clone();
        let ats = Arc::clone(&deps.ats);
        let resume_extractor = Arc::clone(&deps.resume_extractor);
        let embedding_client = Arc::clone(&deps.embedding_client);
        let primary_chat_client = Arc::clone(&deps.primary_chat_client);
        let escalation_chat_client = Arc::clone(&deps.escalation_chat_client);
        let mail = Arc::clone(&deps.mail);
        let config = Arc::clone(&deps.config);
        let active_jobs = active_jobs.clone();
        let worker_pool = Arc::clone(&worker_pool);
        let concurrency = Arc::clone(&concurrency);

        tasks.push(tokio::spawn(async move {
            let _permit = concurrency.acquire().await.expect("candidate concurrency semaphore closed");
            if Instant::now() >= deadline {
                return CandidateOutcome::SkippedDeadline;
            }
            process_candidate(
                &pool,
                ats.as_ref(),
                resume_extractor.as_ref(),
                embedding_client.as_ref(),
                primary_chat_client,
                escalation_chat_client,
                mail.as_ref(),
                config.as_ref(),
                &active_jobs,
                candidate,
                worker_pool,
            )
            .await
        }));
    }

    let mut report = VettingCycleReport { candidates_detected, ..Default::default() };
    for task in tasks {
        match task.await {
            Ok(CandidateOutcome::Completed) => report.candidates_completed += 1,
            Ok(CandidateOutcome::SkippedResumeUnavailable) => report.candidates_skipped_resume += 1,
            Ok(CandidateOutcome::SkippedDeadline) => report.candidates_skipped_deadline += 1,
            Ok(CandidateOutcome::Failed(err)) => {
                tracing::warn!(error = %err, "candidate vetting pipeline ended in error");
            }
            Err(join_err) => {
                tracing::error!(error = %join_err, "candidate vetting task panicked");
            }
        }
    }

    Ok(report)
}

enum CandidateOutcome {
    Completed,
    SkippedResumeUnavailable,
    SkippedDeadline,
    Failed(JobPulseError),
}

/// Jobs in monitored tearsheets, not excluded (spec §4.4's universe, reused
/// here as the Layer 1 candidate pool — spec §4.7 only ever discusses
/// "active" jobs, and the feed's monitored-tearsheet set is the system's
/// only durable notion of which jobs are currently active).
async fn gather_active_jobs(pool: &SqlitePool, ats: &AtsClient) -> Result<Vec<Job>, JobPulseError> {
    let tearsheet_ids = jobpulse_db::feed_state::monitored_tearsheet_ids(pool).await?;
    let excluded: HashSet<String> = jobpulse_db::feed_state::excluded_job_ids(pool).await?.into_iter().collect();

    let mut jobs = Vec::new();
    for tearsheet_id in &tearsheet_ids {
        let fetched = ats.list_tearsheet_jobs(tearsheet_id).await?;
        jobs.extend(fetched.into_iter().filter(|job| !excluded.contains(&job.job_id)));
    }
    jobs.sort_by(|a, b| a.job_id.cmp(&b.job_id));
    jobs.dedup_by(|a, b| a.job_id == b.job_id);
    Ok(jobs)
}

#[allow(clippy::too_many_arguments)]
async fn process_candidate(
    pool: &SqlitePool,
    ats: &AtsClient,
    resume_extractor: &ResumeExtractor,
    embedding_client: &dyn EmbeddingClient,
    primary_chat_client: Arc<dyn ChatCompletionClient>,
    escalation_chat_client: Arc<dyn ChatCompletionClient>,
    mail: &MailSender,
    config: &Config,
    active_jobs: &[Job],
    detected: DetectedCandidate,
    worker_pool: Arc<Semaphore>,
) -> CandidateOutcome {
    match process_candidate_inner(
        pool,
        ats,
        resume_extractor,
        embedding_client,
        primary_chat_client,
        escalation_chat_client,
        mail,
        config,
        active_jobs,
        &detected,
        worker_pool,
    )
    .await
    {
        Ok(true) => CandidateOutcome::Completed,
        Ok(false) => CandidateOutcome::SkippedResumeUnavailable,
        Err(e) => CandidateOutcome::Failed(e),
    }
}

/// Returns `Ok(true)` if a full `VettingRun` was written, `Ok(false)` if the
/// candidate was skipped this cycle because its resume was unavailable
/// (spec §4.6 — not a terminal failure, retried next cycle).
#[allow(clippy::too_many_arguments)]
async fn process_candidate_inner(
    pool: &SqlitePool,
    ats: &AtsClient,
    resume_extractor: &ResumeExtractor,
    embedding_client: &dyn EmbeddingClient,
    primary_chat_client: Arc<dyn ChatCompletionClient>,
    escalation_chat_client: Arc<dyn ChatCompletionClient>,
    mail: &MailSender,
    config: &Config,
    active_jobs: &[Job],
    detected: &DetectedCandidate,
    worker_pool: Arc<Semaphore>,
) -> Result<bool, JobPulseError> {
    let run_id = VettingRunId::new().to_string();
    let started_at = Utc::now();
    jobpulse_db::vetting::start_run(pool, &run_id, &detected.candidate_id, started_at).await?;

    let candidate = match ats.get_candidate(&detected.candidate_id).await? {
        Some(candidate) => candidate,
        None => {
            finish_failed_run(pool, &run_id, &detected.candidate_id, started_at, "candidate record not found in ATS").await?;
            return Err(JobPulseError::data("candidate not found in ATS"));
        }
    };

    let resume = match resume_extractor.fetch_and_extract(&detected.candidate_id).await {
        Ok(resume) => resume,
        Err(e) => {
            tracing::warn!(candidate_id = %detected.candidate_id, error = %e, "resume unavailable, skipping this cycle");
            if let Some(message_id) = &detected.message_id {
                let attempts = jobpulse_db::applications::record_resume_failure(pool, message_id).await?;
                tracing::info!(candidate_id = %detected.candidate_id, attempts, "recorded resume extraction failure");
            }
            // Leave the VettingRun row `running`; it is never finished for
            // this attempt and carries no further meaning once re-detected.
            return Ok(false);
        }
    };

    let (jobs_for_filter, job_lookup) = build_job_universe(active_jobs, ats, detected.applied_job_id.as_deref()).await?;

    let decisions = filter_jobs(
        pool,
        embedding_client,
        &config.llm_embedding_model,
        &detected.candidate_id,
        &resume.raw_text,
        &jobs_for_filter,
        detected.applied_job_id.as_deref(),
        config.embedding_threshold,
        config.embedding_min_jobs,
        config.embedding_max_tokens,
    )
    .await?;

    let passed_job_ids: Vec<String> = decisions.iter().filter(|d| d.passed).map(|d| d.job_id.clone()).collect();

    let mut thresholds: HashMap<String, i32> = HashMap::with_capacity(passed_job_ids.len());
    let mut pairs = Vec::with_capacity(passed_job_ids.len());
    for job_id in &passed_job_ids {
        let Some(job) = job_lookup.get(job_id) else { continue };
        let requirements = jobpulse_db::requirements::fetch(pool, job_id).await?;
        let (requirements_text, effective_threshold) = match &requirements {
            Some(req) => (req.active().to_string(), config.threshold_for(Some(req.threshold))),
            None => {
                tracing::debug!(job_id, "no extracted requirements on file yet, scoring against the raw job description");
                (job.description_html.clone(), config.threshold_for(None))
            }
        };
        thresholds.insert(job_id.clone(), effective_threshold);
        pairs.push(PairInput {
            job_id: job_id.clone(),
            requirements: requirements_text,
            location: format_location(&job.location),
            work_type: job.work_type,
            is_applied_job: detected.applied_job_id.as_deref() == Some(job_id.as_str()),
            effective_threshold,
        });
    }

    let outcomes = score_candidate_jobs(
        pool,
        &detected.candidate_id,
        &resume.raw_text,
        pairs,
        primary_chat_client,
        escalation_chat_client,
        Arc::new(config.clone()),
        worker_pool,
    )
    .await;

    let mut aggregated = Vec::with_capacity(outcomes.len());
    for outcome in outcomes {
        let Some(job) = job_lookup.get(&outcome.job_id) else { continue };
        let threshold = *thresholds.get(&outcome.job_id).unwrap_or(&config.match_threshold_default);
        let qualified = outcome.is_qualified(threshold);
        aggregated.push(AggregatedPair { qualified, job_title: job.title.clone(), owner_name: job.owner.name.clone(), owner_email: job.owner.email.clone(), outcome });
    }

    let now = Utc::now();
    let aggregation = aggregate_and_write(pool, ats, mail, &config.mail_admin_bcc, &candidate, &resume.content_hash, &aggregated, now).await?;

    for pair in &aggregated {
        let job_match = JobMatch {
            vetting_run_id: run_id.clone(),
            job_id: pair.outcome.job_id.clone(),
            score: pair.outcome.score,
            summary: pair.outcome.summary.clone(),
            skills: pair.outcome.skills.clone(),
            experience: pair.outcome.experience.clone(),
            gaps: pair.outcome.gaps.clone(),
            years_analysis: pair.outcome.years_analysis.clone(),
            layer_used: pair.outcome.layer_used,
            is_applied_job: pair.outcome.is_applied_job,
            is_qualified: pair.qualified,
            error: pair.outcome.error.clone(),
        };
        jobpulse_db::vetting::record_match(pool, &job_match).await?;
    }

    let run = VettingRun {
        id: run_id.clone(),
        candidate_id: detected.candidate_id.clone(),
        started_at,
        finished_at: Some(now),
        highest_score: Some(aggregation.highest_score),
        qualified: aggregation.qualified,
        note_id: aggregation.note_id.clone(),
        error: None,
        status: VettingStatus::Completed,
    };
    jobpulse_db::vetting::finish_run(pool, &run).await?;

    if let Some(message_id) = &detected.message_id {
        jobpulse_db::applications::mark_vetted(pool, message_id, started_at).await?;
    }

    Ok(true)
}

async fn finish_failed_run(
    pool: &SqlitePool,
    run_id: &str,
    candidate_id: &str,
    started_at: chrono::DateTime<Utc>,
    error: &str,
) -> Result<(), JobPulseError> {
    let run = VettingRun {
        id: run_id.to_string(),
        candidate_id: candidate_id.to_string(),
        started_at,
        finished_at: Some(Utc::now()),
        highest_score: None,
        qualified: false,
        note_id: None,
        error: Some(error.to_string()),
        status: VettingStatus::Failed,
    };
    jobpulse_db::vetting::finish_run(pool, &run).await
}

/// Builds the Layer 1 job list plus a lookup map. The applied job is
/// guaranteed a lookup entry: if it is already in `active_jobs` that copy is
/// used, otherwise it is fetched directly from the ATS provided it is open
/// (spec §4.7 S2).
async fn build_job_universe(
    active_jobs: &[Job],
    ats: &AtsClient,
    applied_job_id: Option<&str>,
) -> Result<(Vec<JobForFilter>, HashMap<String, Job>), JobPulseError> {
    let mut lookup: HashMap<String, Job> = active_jobs.iter().map(|job| (job.job_id.clone(), job.clone())).collect();

    if let Some(applied_job_id) = applied_job_id {
        if !lookup.contains_key(applied_job_id) {
            if let Some(job) = ats.get_job(applied_job_id).await? {
                if job.is_open() {
                    lookup.insert(job.job_id.clone(), job);
                }
            }
        }
    }

    let jobs_for_filter = lookup.values().map(to_job_for_filter).collect();
    Ok((jobs_for_filter, lookup))
}

fn to_job_for_filter(job: &Job) -> JobForFilter {
    JobForFilter { job_id: job.job_id.clone(), description_html: job.description_html.clone(), description_hash: description_hash(&job.description_html) }
}

fn description_hash(description_html: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(description_html.as_bytes());
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

fn format_location(location: &Location) -> String {
    let parts: Vec<&str> = [location.city.as_deref(), location.state.as_deref(), location.country.as_deref()]
        .into_iter()
        .flatten()
        .collect();
    if parts.is_empty() {
        "unspecified".to_string()
    } else {
        parts.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_location_joins_present_parts() {
        let location = Location { city: Some("Austin".into()), state: Some("TX".into()), country: None };
        assert_eq!(format_location(&location), "Austin, TX");
    }

    #[test]
    fn format_location_falls_back_when_empty() {
        let location = Location::default();
        assert_eq!(format_location(&location), "unspecified");
    }

    #[test]
    fn description_hash_is_stable() {
        assert_eq!(description_hash("same text"), description_hash("same text"));
        assert_ne!(description_hash("a"), description_hash("b"));
    }
}
