//! Applicant detector (spec §4.5, C5): three layered strategies unioned and
//! deduplicated by `candidate_id`, primary taking precedence when more than
//! one strategy names the same candidate.

use chrono::{DateTime, Duration, Utc};
use jobpulse_ats::AtsClient;
use jobpulse_core::JobPulseError;
use sqlx::SqlitePool;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionSource {
    Primary,
    Fallback,
    Supplementary,
}

#[derive(Debug, Clone)]
pub struct DetectedCandidate {
    pub candidate_id: String,
    /// `Some` only for the primary strategy, whose `Application` rows carry
    /// the job the candidate actually applied to (spec §4.7 S2 input).
    pub applied_job_id: Option<String>,
    /// The `Application.message_id` this detection came from, when sourced
    /// from the primary strategy. Needed to mark the application vetted or
    /// to count a resume-extraction failure against it (spec §4.5, §4.6).
    pub message_id: Option<String>,
    pub source: DetectionSource,
}

const PRIMARY_LOOKUP_CAP: i64 = 10_000;

/// Run all three detection strategies and merge their results. `fallback_window`
/// bounds strategy 2 ("Online Applicant" candidates created recently);
/// strategy 3 looks back 24h regardless, per spec §4.5.
pub async fn detect(
    pool: &SqlitePool,
    ats: &AtsClient,
    automation_agent_id: &str,
    fallback_window: Duration,
) -> Result<Vec<DetectedCandidate>, JobPulseError> {
    let mut merged: HashMap<String, DetectedCandidate> = HashMap::new();

    for app in jobpulse_db::applications::needing_vetting(pool, PRIMARY_LOOKUP_CAP).await? {
        merged.insert(
            app.candidate_id.clone(),
            DetectedCandidate {
                candidate_id: app.candidate_id,
                applied_job_id: Some(app.applied_job_id),
                message_id: Some(app.message_id),
                source: DetectionSource::Primary,
            },
        );
    }

    let fallback_since = Utc::now() - fallback_window;
    let fallback = ats.search_candidates("status:\"Online Applicant\"", fallback_since).await?;
    for raw in fallback {
        merged.entry(raw.id.to_string()).or_insert(DetectedCandidate {
            candidate_id: raw.id.to_string(),
            applied_job_id: None,
            message_id: None,
            source: DetectionSource::Fallback,
        });
    }

    let supplementary_since = Utc::now() - Duration::hours(24);
    let supplementary = ats.search_candidates(&format!("owner.id:{automation_agent_id}"), supplementary_since).await?;
    for raw in supplementary {
        let candidate_id = raw.id.to_string();
        if merged.contains_key(&candidate_id) {
            continue;
        }
        if was_vetted_recently(pool, &candidate_id, supplementary_since).await? {
            continue;
        }
        merged.insert(candidate_id.clone(), DetectedCandidate { candidate_id, applied_job_id: None, message_id: None, source: DetectionSource::Supplementary });
    }

    Ok(merged.into_values().collect())
}

async fn was_vetted_recently(pool: &SqlitePool, candidate_id: &str, since: DateTime<Utc>) -> Result<bool, JobPulseError> {
    match jobpulse_db::vetting::last_completed_run_at(pool, candidate_id).await? {
        Some(last) => Ok(last >= since),
        None => Ok(false),
    }
}

/// Batch policy (spec §4.5): process at most `batch_size` per cycle;
/// overflow is simply left undetected this cycle (no queue — re-detected
/// next time). Order is not meaningful beyond "some deterministic cap".
pub fn cap_to_batch(mut candidates: Vec<DetectedCandidate>, batch_size: usize) -> Vec<DetectedCandidate> {
    candidates.sort_by(|a, b| a.candidate_id.cmp(&b.candidate_id));
    candidates.truncate(batch_size);
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_cap_truncates_deterministically() {
        let candidates = vec![
            DetectedCandidate { candidate_id: "3".into(), applied_job_id: None, message_id: None, source: DetectionSource::Fallback },
            DetectedCandidate { candidate_id: "1".into(), applied_job_id: None, message_id: None, source: DetectionSource::Fallback },
            DetectedCandidate { candidate_id: "2".into(), applied_job_id: None, message_id: None, source: DetectionSource::Fallback },
        ];
        let capped = cap_to_batch(candidates, 2);
        assert_eq!(capped.len(), 2);
        assert_eq!(capped[0].candidate_id, "1");
        assert_eq!(capped[1].candidate_id, "2");
    }
}
