//! Top-level Freshness Engine cycle (spec §4.4, C3/C4): gather jobs across
//! monitored tearsheets, guard against a collapsed feed (SG-1), build the
//! XML, publish it, and record the outcome.

use chrono::Utc;
use jobpulse_ats::AtsClient;
use jobpulse_core::types::{DeliveryChannel, DeliveryLedgerEntry, DeliveryStatus};
use jobpulse_core::JobPulseError;
use jobpulse_mail::{MailSender, Message};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;

use crate::builder::{self, BuildInput};
use crate::classify::ClassificationProvider;
use crate::publish::{self, RemoteTarget};

/// Minimum job count the previous feed must have had for SG-1 to treat a
/// fresh zero-job pull as a collapse rather than a genuinely empty feed.
const ZERO_JOB_SAFEGUARD_FLOOR: i64 = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    Published { job_count: usize },
    Frozen,
    SkippedZeroJobSafeguard,
}

pub struct PublishService {
    pool: SqlitePool,
    ats: Arc<AtsClient>,
    mail: Arc<MailSender>,
    classifier: Arc<dyn ClassificationProvider>,
    remote_host: String,
    remote_port: u16,
    remote_user: String,
    remote_password: String,
    remote_path: String,
    feed_title: String,
    feed_link: String,
    mail_admin_bcc: String,
}

impl PublishService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pool: SqlitePool,
        ats: Arc<AtsClient>,
        mail: Arc<MailSender>,
        classifier: Arc<dyn ClassificationProvider>,
        remote_host: impl Into<String>,
        remote_port: u16,
        remote_user: impl Into<String>,
        remote_password: impl Into<String>,
        remote_path: impl Into<String>,
        feed_title: impl Into<String>,
        feed_link: impl Into<String>,
        mail_admin_bcc: impl Into<String>,
    ) -> Self {
        Self {
            pool,
            ats,
            mail,
            classifier,
            remote_host: remote_host.into(),
            remote_port,
            remote_user: remote_user.into(),
            remote_password: remote_password.into(),
            remote_path: remote_path.into(),
            feed_title: feed_title.into(),
            feed_link: feed_link.into(),
            mail_admin_bcc: mail_admin_bcc.into(),
        }
    }

    pub async fn run_cycle(&self, frozen: bool) -> Result<PublishOutcome, JobPulseError> {
        if frozen {
            tracing::info!("feed publish skipped: freeze switch is on");
            return Ok(PublishOutcome::Frozen);
        }

        let tearsheet_ids = jobpulse_db::feed_state::monitored_tearsheet_ids(&self.pool).await?;
        let excluded = jobpulse_db::feed_state::excluded_job_ids(&self.pool).await?
            .into_iter()
            .collect::<std::collections::HashSet<_>>();

        let mut jobs = Vec::new();
        for tearsheet_id in &tearsheet_ids {
            let fetched = self.ats.list_tearsheet_jobs(tearsheet_id).await?;
            jobs.extend(fetched.into_iter().filter(|job| !excluded.contains(&job.job_id)));
        }
        jobs.sort_by(|a, b| a.job_id.cmp(&b.job_id));
        jobs.dedup_by(|a, b| a.job_id == b.job_id);

        if jobs.is_empty() {
            let last_count = jobpulse_db::feed_state::last_published_job_count(&self.pool).await?.unwrap_or(0);
            if last_count >= ZERO_JOB_SAFEGUARD_FLOOR {
                tracing::error!(last_count, "feed pull returned zero jobs, tripping SG-1 safeguard");
                self.send_zero_job_alert(last_count).await?;
                return Ok(PublishOutcome::SkippedZeroJobSafeguard);
            }
        }

        let mut reference_tokens = HashMap::with_capacity(jobs.len());
        for job in &jobs {
            let reference = jobpulse_db::reference_store::load_or_mint(&self.pool, &job.job_id).await?;
            reference_tokens.insert(job.job_id.clone(), reference.reference_token);
        }

        let mut classification = HashMap::with_capacity(jobs.len());
        for job in &jobs {
            let tags = self.classifier.classify(&job.job_id, &job.title, &job.description_html).await?;
            classification.insert(job.job_id.clone(), tags);
        }

        let brand_urls = jobpulse_db::brand_urls::all(&self.pool).await?;

        let job_count = jobs.len();
        let built = builder::build(BuildInput {
            jobs,
            reference_tokens,
            classification,
            recruiter_tag_map: HashMap::new(),
            brand_urls,
            feed_title: self.feed_title.clone(),
            feed_link: self.feed_link.clone(),
        })?;

        publish::publish(
            RemoteTarget {
                host: &self.remote_host,
                port: self.remote_port,
                user: &self.remote_user,
                password: &self.remote_password,
                path: &self.remote_path,
            },
            built.xml_bytes,
        )
        .await?;

        let now = Utc::now();
        jobpulse_db::feed_state::record_publication(&self.pool, job_count as i64, now).await?;
        self.record_upload_delivery(now).await?;

        tracing::info!(job_count, "feed published");
        Ok(PublishOutcome::Published { job_count })
    }

    async fn send_zero_job_alert(&self, last_count: i64) -> Result<(), JobPulseError> {
        let now = Utc::now();
        let dedup_key = jobpulse_core::keys::email_dedup_key("zero_job_alert", &[&self.mail_admin_bcc], "feed");
        if jobpulse_db::ledger::has_recent(
            &self.pool,
            DeliveryChannel::EmailZeroJobAlert,
            &dedup_key,
            now,
            chrono::Duration::hours(24),
        )
        .await?
        {
            return Ok(());
        }

        let subject = "JobPulse feed safeguard: zero jobs returned";
        let body = format!(
            "The tearsheet pull returned 0 jobs, but the last published feed had {last_count}. \
             Publication was skipped and the previous feed on the remote drop was left in place."
        );
        let to = vec![self.mail_admin_bcc.clone()];
        let external_id = self
            .mail
            .send(Message {
                to: &to,
                cc: &[],
                bcc: &[],
                subject,
                html_body: &body,
                text_fallback: &body,
                attachments: &[],
            })
            .await?;

        jobpulse_db::ledger::record(
            &self.pool,
            &DeliveryLedgerEntry {
                channel: DeliveryChannel::EmailZeroJobAlert,
                key: dedup_key,
                sent_at: now,
                external_id: Some(external_id),
                status: DeliveryStatus::Sent,
            },
        )
        .await
    }

    async fn record_upload_delivery(&self, now: chrono::DateTime<Utc>) -> Result<(), JobPulseError> {
        jobpulse_db::ledger::record(
            &self.pool,
            &DeliveryLedgerEntry {
                channel: DeliveryChannel::EmailXmlUpload,
                key: now.to_rfc3339(),
                sent_at: now,
                external_id: None,
                status: DeliveryStatus::Sent,
            },
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_variants_are_distinguishable() {
        assert_ne!(PublishOutcome::Frozen, PublishOutcome::SkippedZeroJobSafeguard);
        assert_ne!(PublishOutcome::Published { job_count: 0 }, PublishOutcome::Frozen);
    }
}
