//! Aggregator & Writer (spec §4.10, C10): merges every `(candidate, job)`
//! match into one ATS note and, when warranted, one consolidated email,
//! gated by the deduplication ledger (C11) so re-detection never spams.

use chrono::{DateTime, Duration, Utc};
use jobpulse_ats::AtsClient;
use jobpulse_core::keys::{email_dedup_key, note_dedup_key};
use jobpulse_core::types::{Candidate, DeliveryChannel, DeliveryLedgerEntry, DeliveryStatus};
use jobpulse_core::JobPulseError;
use jobpulse_mail::{MailSender, Message};
use jobpulse_scoring::ScoreOutcome;
use sqlx::SqlitePool;
use std::collections::BTreeSet;

const NOTE_DEDUP_WINDOW: Duration = Duration::hours(24);
const EMAIL_DEDUP_WINDOW: Duration = Duration::minutes(5);
const NOT_RECOMMENDED_TOP_N: usize = 5;

/// A scored pair plus the job metadata the note/email text needs, which
/// `jobpulse_scoring::ScoreOutcome` itself has no notion of.
#[derive(Debug, Clone)]
pub struct AggregatedPair {
    pub outcome: ScoreOutcome,
    pub job_title: String,
    pub owner_name: String,
    pub owner_email: String,
    /// `outcome.score >= effective_threshold` for this job, computed by the
    /// caller since thresholds are per-job, not something the scoring
    /// crate's `ScoreOutcome` carries.
    pub qualified: bool,
}

pub struct AggregationResult {
    pub highest_score: i32,
    pub qualified: bool,
    pub note_id: Option<String>,
    pub note_suppressed: bool,
    pub email_suppressed: bool,
}

#[allow(clippy::too_many_arguments)]
pub async fn aggregate_and_write(
    pool: &SqlitePool,
    ats: &AtsClient,
    mail: &MailSender,
    admin_bcc: &str,
    candidate: &Candidate,
    resume_content_hash: &str,
    pairs: &[AggregatedPair],
    now: DateTime<Utc>,
) -> Result<AggregationResult, JobPulseError> {
    let highest_score = pairs.iter().map(|p| p.outcome.score).max().unwrap_or(0);
    let qualified_pairs: Vec<&AggregatedPair> = pairs.iter().filter(|p| p.qualified).collect();
    let any_qualified = !qualified_pairs.is_empty();

    let note_title = if any_qualified { "QUALIFIED CANDIDATE" } else { "NOT RECOMMENDED" };
    let note_body = if any_qualified {
        compose_qualified_note(pairs, &qualified_pairs)
    } else {
        compose_not_recommended_note(pairs)
    };

    let note_dedup = note_dedup_key(&candidate.candidate_id, resume_content_hash);
    let note_blocked = jobpulse_db::ledger::has_recent(pool, DeliveryChannel::Note, &note_dedup, now, NOTE_DEDUP_WINDOW).await?;

    let mut note_id = None;
    let note_suppressed = note_blocked;
    if !note_blocked {
        ats.create_candidate_note(&candidate.candidate_id, note_title, &note_body).await?;
        jobpulse_db::ledger::record(
            pool,
            &DeliveryLedgerEntry { channel: DeliveryChannel::Note, key: note_dedup, sent_at: now, external_id: None, status: DeliveryStatus::Sent },
        )
        .await?;
        note_id = Some(format!("{}-note-{}", candidate.candidate_id, now.timestamp()));
    } else {
        jobpulse_db::ledger::record(
            pool,
            &DeliveryLedgerEntry { channel: DeliveryChannel::Note, key: note_dedup, sent_at: now, external_id: None, status: DeliveryStatus::DedupSkipped },
        )
        .await?;
    }

    let mut email_suppressed = false;
    if any_qualified {
        email_suppressed = send_qualified_email(pool, mail, admin_bcc, candidate, &qualified_pairs, now).await?;
    }

    Ok(AggregationResult { highest_score, qualified: any_qualified, note_id, note_suppressed, email_suppressed })
}

fn compose_qualified_note(all_pairs: &[AggregatedPair], qualified: &[&AggregatedPair]) -> String {
    let mut body = String::from("<h3>QUALIFIED CANDIDATE</h3><ul>");
    let applied = all_pairs.iter().find(|p| p.outcome.is_applied_job);

    if let Some(applied) = applied {
        let label = if applied.qualified { "APPLIED POSITION (QUALIFIED)" } else { "APPLIED POSITION:" };
        body.push_str(&pair_line(label, applied));
    }

    let others: Vec<&AggregatedPair> = qualified.iter().copied().filter(|p| !p.outcome.is_applied_job).collect();
    if !others.is_empty() {
        body.push_str("</ul><h4>OTHER QUALIFIED POSITIONS</h4><ul>");
        for pair in others {
            body.push_str(&pair_line(&pair.job_title, pair));
        }
    }
    body.push_str("</ul>");
    body
}

fn compose_not_recommended_note(all_pairs: &[AggregatedPair]) -> String {
    let mut sorted: Vec<&AggregatedPair> = all_pairs.iter().collect();
    sorted.sort_by(|a, b| b.outcome.score.cmp(&a.outcome.score));

    let mut body = String::from("<h3>NOT RECOMMENDED</h3><ul>");
    let applied = all_pairs.iter().find(|p| p.outcome.is_applied_job);
    if let Some(applied) = applied {
        body.push_str(&pair_line_with_gaps("APPLIED POSITION:", applied));
    }
    for pair in sorted.into_iter().filter(|p| !p.outcome.is_applied_job).take(NOT_RECOMMENDED_TOP_N) {
        body.push_str(&pair_line_with_gaps(&pair.job_title, pair));
    }
    body.push_str("</ul>");
    body
}

fn pair_line(label: &str, pair: &AggregatedPair) -> String {
    format!(
        "<li><strong>{label}</strong> — {title} (score {score}): {summary}. Skills: {skills}</li>",
        label = label,
        title = pair.job_title,
        score = pair.outcome.score,
        summary = pair.outcome.summary,
        skills = pair.outcome.skills,
    )
}

fn pair_line_with_gaps(label: &str, pair: &AggregatedPair) -> String {
    format!(
        "<li><strong>{label}</strong> — {title} (score {score}): gaps: {gaps}</li>",
        label = label,
        title = pair.job_title,
        score = pair.outcome.score,
        gaps = if pair.outcome.gaps.is_empty() { "none noted".to_string() } else { pair.outcome.gaps.join("; ") },
    )
}

async fn send_qualified_email(
    pool: &SqlitePool,
    mail: &MailSender,
    admin_bcc: &str,
    candidate: &Candidate,
    qualified: &[&AggregatedPair],
    now: DateTime<Utc>,
) -> Result<bool, JobPulseError> {
    let applied = qualified.iter().find(|p| p.outcome.is_applied_job);
    let primary_recipient = applied.map(|p| &p.owner_email).unwrap_or(&qualified[0].owner_email);

    let mut cc: BTreeSet<String> = BTreeSet::new();
    for pair in qualified {
        if &pair.owner_email != primary_recipient {
            cc.insert(pair.owner_email.clone());
        }
    }

    let to = vec![primary_recipient.clone()];
    let cc: Vec<String> = cc.into_iter().collect();
    let bcc = vec![admin_bcc.to_string()];

    let mut recipients: Vec<&str> = to.iter().map(String::as_str).chain(cc.iter().map(String::as_str)).collect();
    recipients.sort_unstable();
    let dedup_key = email_dedup_key("email_qualified", &recipients, &candidate.candidate_id);

    if jobpulse_db::ledger::has_recent(pool, DeliveryChannel::EmailQualified, &dedup_key, now, EMAIL_DEDUP_WINDOW).await? {
        jobpulse_db::ledger::record(
            pool,
            &DeliveryLedgerEntry { channel: DeliveryChannel::EmailQualified, key: dedup_key, sent_at: now, external_id: None, status: DeliveryStatus::DedupSkipped },
        )
        .await?;
        return Ok(true);
    }

    let subject = format!("{} is a match for {} qualifying position(s)", candidate.name, qualified.len());
    let body = compose_email_body(candidate, primary_recipient, qualified);

    let external_id = mail
        .send(Message { to: &to, cc: &cc, bcc: &bcc, subject: &subject, html_body: &body, text_fallback: &body, attachments: &[] })
        .await?;

    jobpulse_db::ledger::record(
        pool,
        &DeliveryLedgerEntry {
            channel: DeliveryChannel::EmailQualified,
            key: dedup_key,
            sent_at: now,
            external_id: Some(external_id),
            status: DeliveryStatus::Sent,
        },
    )
    .await?;

    Ok(false)
}

fn compose_email_body(candidate: &Candidate, primary_recipient: &str, qualified: &[&AggregatedPair]) -> String {
    let mut body = format!("<p>{} matched the following position(s):</p><ul>", candidate.name);
    for pair in qualified {
        let owner_label = if pair.owner_email == primary_recipient { "YOUR JOB".to_string() } else { format!("[{}]'s Job", pair.owner_name) };
        let applied_badge = if pair.outcome.is_applied_job { " (applied)" } else { "" };
        body.push_str(&format!(
            "<li>{owner_label} — {title} (score {score}){badge} — candidate {candidate_id} in the ATS</li>",
            owner_label = owner_label,
            title = pair.job_title,
            score = pair.outcome.score,
            badge = applied_badge,
            candidate_id = candidate.candidate_id,
        ));
    }
    body.push_str("</ul>");
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobpulse_core::types::ScoringLayer;
    use std::collections::BTreeMap;

    fn outcome(job_id: &str, score: i32, is_applied: bool) -> ScoreOutcome {
        ScoreOutcome {
            job_id: job_id.to_string(),
            score,
            summary: "summary".into(),
            skills: "rust".into(),
            experience: "5 years".into(),
            gaps: vec![],
            years_analysis: BTreeMap::new(),
            layer_used: ScoringLayer::L2,
            is_applied_job: is_applied,
            error: None,
        }
    }

    fn pair(job_id: &str, score: i32, is_applied: bool, qualified: bool) -> AggregatedPair {
        let mut outcome = outcome(job_id, score, is_applied);
        outcome.score = if qualified { score.max(80) } else { score.min(79) };
        AggregatedPair { outcome, job_title: format!("Title {job_id}"), owner_name: "Recruiter".into(), owner_email: "recruiter@example.com".into(), qualified }
    }

    #[test]
    fn qualified_note_labels_applied_job_correctly() {
        let pairs = vec![pair("applied", 90, true, true), pair("other", 85, false, true)];
        let qualified: Vec<&AggregatedPair> = pairs.iter().filter(|p| p.qualified).collect();
        let body = compose_qualified_note(&pairs, &qualified);
        assert!(body.contains("APPLIED POSITION (QUALIFIED)"));
        assert!(body.contains("OTHER QUALIFIED POSITIONS"));
    }

    #[test]
    fn not_recommended_note_always_includes_applied_job() {
        let pairs = vec![pair("applied", 40, true, false), pair("other1", 30, false, false)];
        let body = compose_not_recommended_note(&pairs);
        assert!(body.contains("APPLIED POSITION:"));
    }

    #[test]
    fn email_subject_counts_qualifying_positions() {
        let pairs = vec![pair("applied", 90, true, true), pair("other", 85, false, true)];
        let qualified: Vec<&AggregatedPair> = pairs.iter().filter(|p| p.qualified).collect();
        let candidate = Candidate { candidate_id: "cand-1".into(), name: "Jane Doe".into(), email: "jane@example.com".into(), phone: None, resume_file_pointer: None };
        let body = compose_email_body(&candidate, "recruiter@example.com", &qualified);
        assert!(body.contains("YOUR JOB"));
        assert!(body.contains("Jane Doe"));
    }
}
