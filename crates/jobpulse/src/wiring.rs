//! Wires every component crate together into the three scheduled cycles
//! (spec §4.1) plus the background readiness prober (spec §4.13).
//!
//! This is the only place in the workspace that knows concrete
//! implementations of the scoring/embedding/resume-formatting seams, the
//! ATS's real OAuth endpoints, and the LLM provider's base URL — every
//! other crate is wired against trait objects.

use async_trait::async_trait;
use jobpulse_ats::{AtsClient, Credentials};
use jobpulse_core::{Config, JobPulseError};
use jobpulse_feed::{NullClassifier, PublishService};
use jobpulse_mail::MailSender;
use jobpulse_resume::ResumeExtractor;
use jobpulse_scheduler::{CycleHandler, CycleSpec, HealthMonitor, Scheduler, TickSchedule};
use jobpulse_scoring::{ChatCompletionClient, EmbeddingClient, OpenAiChatClient, OpenAiEmbeddingClient};
use jobpulse_vetting::{run_vetting_cycle, VettingDeps};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;

use crate::cron::DigestHandler;

/// Bullhorn's fixed OAuth/REST endpoints. Not in spec §6.1's configuration
/// table (which is closed) because they are a property of the ATS vendor,
/// not a per-deployment tunable.
const ATS_AUTH_BASE_URL: &str = "https://auth.bullhornstaffing.com";
const ATS_LOGIN_BASE_URL: &str = "https://rest.bullhornstaffing.com";

/// OpenAI-compatible LLM provider base URL. Like the ATS endpoints, this is
/// a vendor constant; only the model names and API key are configuration.
const LLM_API_BASE_URL: &str = "https://api.openai.com";

/// The feed's `<link>` metadata element (spec §6.2) — the careers-site
/// landing page the feed as a whole represents, as distinct from each
/// job's own `url` element (spec §6.2, sourced per-job from `brand_urls`).
const FEED_LINK: &str = "https://careers.example.com";

/// Transactional mail provider base URL (vendor constant, like the ATS and
/// LLM endpoints above).
const MAIL_API_BASE_URL: &str = "https://api.mailprovider.example";

const READINESS_PROBE_INTERVAL: Duration = Duration::from_secs(60);

/// Publish cycle expected runtime (spec §5: 90s overall deadline feeds the lock TTL).
const PUBLISH_EXPECTED_RUNTIME: chrono::Duration = chrono::Duration::seconds(90);
/// Vetting cycle expected runtime (spec §5: 6 minute overall deadline).
const VETTING_EXPECTED_RUNTIME: chrono::Duration = chrono::Duration::minutes(6);
/// Digest composition is a handful of queries plus one email.
const DIGEST_EXPECTED_RUNTIME: chrono::Duration = chrono::Duration::seconds(30);

pub struct Built {
    pub scheduler: Scheduler,
    pub health: Arc<HealthMonitor>,
    pub digest_handler: Arc<DigestHandler>,
}

pub async fn build(config: Arc<Config>, pool: SqlitePool, environment: &str) -> anyhow::Result<Built> {
    let ats = Arc::new(AtsClient::new(Credentials {
        client_id: config.ats_client_id.clone(),
        client_secret: config.ats_client_secret.clone(),
        username: config.ats_user.clone(),
        password: config.ats_password.clone(),
        auth_base_url: ATS_AUTH_BASE_URL.to_string(),
        login_base_url: ATS_LOGIN_BASE_URL.to_string(),
    }));

    let mail = Arc::new(MailSender::new(MAIL_API_BASE_URL, config.mail_api_key.clone(), config.mail_from.clone()));

    let chat_client: Arc<dyn ChatCompletionClient> = Arc::new(OpenAiChatClient::new(LLM_API_BASE_URL, config.llm_api_key.clone()));
    let embedding_client: Arc<dyn EmbeddingClient> = Arc::new(OpenAiEmbeddingClient::new(LLM_API_BASE_URL, config.llm_api_key.clone()));

    let resume_extractor = Arc::new(ResumeExtractor::new(ats.clone(), pool.clone()));

    let publish_service = Arc::new(PublishService::new(
        pool.clone(),
        ats.clone(),
        mail.clone(),
        Arc::new(NullClassifier),
        config.remote_host.clone(),
        config.remote_port,
        config.remote_user.clone(),
        config.remote_password.clone(),
        config.remote_path.clone(),
        "JobPulse Job Feed",
        FEED_LINK,
        config.mail_admin_bcc.clone(),
    ));

    let vetting_deps = Arc::new(VettingDeps {
        ats: ats.clone(),
        resume_extractor,
        embedding_client,
        primary_chat_client: chat_client.clone(),
        escalation_chat_client: chat_client,
        mail: mail.clone(),
        config: config.clone(),
    });

    let mut scheduler = Scheduler::new(pool.clone(), environment.to_string());
    let health = scheduler.health();

    scheduler.spawn_cycle(
        CycleSpec { name: "vetting", schedule: TickSchedule::Interval(config.vetting_tick), expected_runtime: VETTING_EXPECTED_RUNTIME },
        Arc::new(VettingCycleHandler { pool: pool.clone(), deps: vetting_deps }),
    );

    scheduler.spawn_cycle(
        CycleSpec { name: "publish", schedule: TickSchedule::Interval(config.publish_tick), expected_runtime: PUBLISH_EXPECTED_RUNTIME },
        Arc::new(PublishCycleHandler { service: publish_service, frozen: config.feed_frozen }),
    );

    let digest_handler = Arc::new(DigestHandler::new(pool.clone(), mail, config.mail_admin_bcc.clone()));

    let digest_schedule = parse_daily_utc(&config.digest_daily_utc).unwrap_or_else(|| {
        tracing::warn!(raw = %config.digest_daily_utc, "invalid digest_daily_utc, defaulting to 09:00 UTC");
        chrono::NaiveTime::from_hms_opt(9, 0, 0).expect("9:00:00 is a valid time")
    });
    scheduler.spawn_cycle(
        CycleSpec { name: "digest", schedule: TickSchedule::DailyAt(digest_schedule), expected_runtime: DIGEST_EXPECTED_RUNTIME },
        digest_handler.clone(),
    );

    spawn_readiness_prober(pool, ats, health.clone());

    Ok(Built { scheduler, health, digest_handler })
}

fn parse_daily_utc(raw: &str) -> Option<chrono::NaiveTime> {
    chrono::NaiveTime::parse_from_str(raw, "%H:%M").ok()
}

struct VettingCycleHandler {
    pool: SqlitePool,
    deps: Arc<VettingDeps>,
}

#[async_trait]
impl CycleHandler for VettingCycleHandler {
    async fn run(&self) -> Result<(), JobPulseError> {
        let report = run_vetting_cycle(&self.pool, &self.deps).await?;
        tracing::info!(
            detected = report.candidates_detected,
            completed = report.candidates_completed,
            skipped_resume = report.candidates_skipped_resume,
            skipped_deadline = report.candidates_skipped_deadline,
            "vetting cycle finished"
        );
        Ok(())
    }
}

struct PublishCycleHandler {
    service: Arc<PublishService>,
    frozen: bool,
}

#[async_trait]
impl CycleHandler for PublishCycleHandler {
    async fn run(&self) -> Result<(), JobPulseError> {
        let outcome = self.service.run_cycle(self.frozen).await?;
        tracing::info!(?outcome, "publish cycle finished");
        Ok(())
    }
}

/// Background loop (spec §4.13): periodically exercises the database and
/// the ATS session so `ready`/`healthy` reflect live collaborator state
/// between cycle runs, not just the last cycle's outcome.
fn spawn_readiness_prober(pool: SqlitePool, ats: Arc<AtsClient>, health: Arc<HealthMonitor>) {
    tokio::spawn(async move {
        loop {
            let db_ok = sqlx::query("SELECT 1").execute(&pool).await.is_ok();
            health.set_probe("database", db_ok);

            let ats_ok = ats.ensure_session().await.is_ok();
            health.set_probe("ats_auth", ats_ok);

            tokio::time::sleep(READINESS_PROBE_INTERVAL).await;
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_daily_utc() {
        assert_eq!(parse_daily_utc("13:45"), chrono::NaiveTime::from_hms_opt(13, 45, 0));
    }

    #[test]
    fn rejects_malformed_daily_utc() {
        assert_eq!(parse_daily_utc("not-a-time"), None);
    }
}
