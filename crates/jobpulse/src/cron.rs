//! The daily digest cycle (spec §4.1's third cycle, §6.4's cron ingress).
//!
//! The spec names `digest` as a scheduled cycle and separately describes a
//! bearer-authenticated `daily_digest` trigger, without detailing the
//! digest's content beyond "the digest composition" — see DESIGN.md for
//! how this implementation resolved that gap. It summarizes the day's
//! vetting activity (how many candidates were run, how many qualified,
//! how many failed) and the feed's last publication, and mails it to the
//! admin address. It carries no dedup window of its own: the scheduler's
//! distributed lock (spec §4.1) already keeps two replicas from double
//! sending on the same scheduled tick, and the cron-triggered path is an
//! operator-invoked supplement, not a second automatic schedule.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use jobpulse_core::JobPulseError;
use jobpulse_mail::{MailSender, Message};
use jobpulse_scheduler::CycleHandler;
use sqlx::SqlitePool;
use std::sync::Arc;

pub struct DigestHandler {
    pool: SqlitePool,
    mail: Arc<MailSender>,
    admin_bcc: String,
}

impl DigestHandler {
    pub fn new(pool: SqlitePool, mail: Arc<MailSender>, admin_bcc: String) -> Self {
        Self { pool, mail, admin_bcc }
    }

    pub async fn compose_and_send(&self) -> Result<(), JobPulseError> {
        let since = Utc::now() - Duration::hours(24);
        let summary = jobpulse_db::vetting::summary_since(&self.pool, since).await?;
        let last_published = jobpulse_db::feed_state::last_published_job_count(&self.pool).await?;

        let subject = "JobPulse daily digest";
        let body = format!(
            "Vetting activity in the last 24h:\n\
             - candidates completed: {}\n\
             - qualified: {}\n\
             - failed: {}\n\n\
             Feed: last published job count: {}.",
            summary.completed,
            summary.qualified,
            summary.failed,
            last_published.map(|n| n.to_string()).unwrap_or_else(|| "never published".to_string()),
        );

        let to = vec![self.admin_bcc.clone()];
        self.mail
            .send(Message { to: &to, cc: &[], bcc: &[], subject, html_body: &body, text_fallback: &body, attachments: &[] })
            .await?;

        tracing::info!(completed = summary.completed, qualified = summary.qualified, failed = summary.failed, "daily digest sent");
        Ok(())
    }
}

#[async_trait]
impl CycleHandler for DigestHandler {
    async fn run(&self) -> Result<(), JobPulseError> {
        self.compose_and_send().await
    }
}
