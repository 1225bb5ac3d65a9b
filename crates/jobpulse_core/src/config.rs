//! Process configuration (spec §6.1).
//!
//! Loaded once at startup from environment variables into a single typed
//! value and passed by `Arc` to every component — no component reads
//! `std::env` directly. Unrecognized environment variables are ignored;
//! only the keys below influence behavior.

use std::env::VarError;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    Missing(String),
    #[error("invalid value for {key}: {source}")]
    Invalid {
        key: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,

    pub ats_client_id: String,
    pub ats_client_secret: String,
    pub ats_user: String,
    pub ats_password: String,

    pub mail_api_key: String,
    pub mail_from: String,
    pub mail_reply_to: Option<String>,
    pub mail_admin_bcc: String,

    pub remote_host: String,
    pub remote_user: String,
    pub remote_password: String,
    pub remote_port: u16,
    pub remote_path: String,

    pub llm_api_key: String,
    pub llm_primary_model: String,
    pub llm_escalation_model: String,
    pub llm_embedding_model: String,

    pub vetting_enabled: bool,
    pub vetting_batch_size: usize,
    pub vetting_tick: Duration,
    pub publish_tick: Duration,
    /// UTC "HH:MM" wall-clock time for the daily digest cycle.
    pub digest_daily_utc: String,

    pub match_threshold_default: i32,
    pub escalation_low: i32,
    pub escalation_high: i32,

    pub embedding_threshold: f32,
    pub embedding_min_jobs: usize,
    pub embedding_max_tokens: usize,

    pub feed_frozen: bool,

    pub cron_bearer_secret: String,
}

fn required(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::Missing(key.to_string()))
}

fn optional(key: &str) -> Option<String> {
    match std::env::var(key) {
        Ok(v) => Some(v),
        Err(VarError::NotPresent) => None,
        Err(VarError::NotUnicode(_)) => None,
    }
}

fn with_default(key: &str, default: &str) -> String {
    optional(key).unwrap_or_else(|| default.to_string())
}

fn parse<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional(key) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|e| ConfigError::Invalid {
            key: key.to_string(),
            source: Box::new(e),
        }),
    }
}

impl Config {
    /// Load configuration from the process environment. Missing required
    /// keys are a startup error, not a runtime panic.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            database_url: required("database_url")?,

            ats_client_id: required("ats_client_id")?,
            ats_client_secret: required("ats_client_secret")?,
            ats_user: required("ats_user")?,
            ats_password: required("ats_password")?,

            mail_api_key: required("mail_api_key")?,
            mail_from: required("mail_from")?,
            mail_reply_to: optional("mail_reply_to"),
            mail_admin_bcc: required("mail_admin_bcc")?,

            remote_host: required("remote_host")?,
            remote_user: required("remote_user")?,
            remote_password: required("remote_password")?,
            remote_port: parse("remote_port", 22)?,
            remote_path: required("remote_path")?,

            llm_api_key: required("llm_api_key")?,
            llm_primary_model: with_default("llm_primary_model", "gpt-4o-mini"),
            llm_escalation_model: with_default("llm_escalation_model", "gpt-4o"),
            llm_embedding_model: with_default("llm_embedding_model", "text-embedding-3-small"),

            vetting_enabled: parse("vetting_enabled", true)?,
            vetting_batch_size: parse("vetting_batch_size", 25usize)?,
            vetting_tick: Duration::from_secs(60 * parse::<u64>("vetting_tick_minutes", 5)?),
            publish_tick: Duration::from_secs(60 * parse::<u64>("publish_tick_minutes", 30)?),
            digest_daily_utc: with_default("digest_daily_utc", "09:00"),

            match_threshold_default: parse("match_threshold_default", 80)?,
            escalation_low: parse("escalation_low", 60)?,
            escalation_high: parse("escalation_high", 85)?,

            embedding_threshold: parse("embedding_threshold", 0.35f32)?,
            embedding_min_jobs: parse("embedding_min_jobs", 5usize)?,
            embedding_max_tokens: parse("embedding_max_tokens", 8000usize)?,

            feed_frozen: parse("feed_frozen", false)?,

            cron_bearer_secret: required("cron_bearer_secret")?,
        })
    }

    /// Escalation range is inclusive-inclusive on both ends (spec §9, Open
    /// Questions — the source code was ambiguous, this adopts inclusive).
    pub fn escalation_applies(&self, l2_score: i32) -> bool {
        l2_score >= self.escalation_low && l2_score <= self.escalation_high
    }

    pub fn threshold_for(&self, job_threshold: Option<i32>) -> i32 {
        job_threshold.unwrap_or(self.match_threshold_default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn set_minimal_env() {
        for (k, v) in [
            ("database_url", "sqlite::memory:"),
            ("ats_client_id", "id"),
            ("ats_client_secret", "secret"),
            ("ats_user", "user"),
            ("ats_password", "pw"),
            ("mail_api_key", "key"),
            ("mail_from", "noreply@example.com"),
            ("mail_admin_bcc", "admin@example.com"),
            ("remote_host", "drop.example.com"),
            ("remote_user", "ftpuser"),
            ("remote_password", "ftppw"),
            ("remote_path", "/incoming/feed.xml"),
            ("llm_api_key", "llmkey"),
            ("cron_bearer_secret", "bearer"),
        ] {
            std::env::set_var(k, v);
        }
    }

    #[test]
    fn loads_with_defaults() {
        let _guard = ENV_LOCK.lock().unwrap();
        set_minimal_env();
        std::env::remove_var("vetting_batch_size");
        let config = Config::from_env().unwrap();
        assert_eq!(config.vetting_batch_size, 25);
        assert_eq!(config.escalation_low, 60);
        assert_eq!(config.escalation_high, 85);
        assert!(!config.feed_frozen);
    }

    #[test]
    fn missing_required_key_is_an_error() {
        let _guard = ENV_LOCK.lock().unwrap();
        set_minimal_env();
        std::env::remove_var("database_url");
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::Missing(k) if k == "database_url"));
        std::env::set_var("database_url", "sqlite::memory:");
    }

    #[test]
    fn escalation_range_is_inclusive_inclusive() {
        let _guard = ENV_LOCK.lock().unwrap();
        set_minimal_env();
        let config = Config::from_env().unwrap();
        assert!(config.escalation_applies(60));
        assert!(config.escalation_applies(85));
        assert!(!config.escalation_applies(59));
        assert!(!config.escalation_applies(86));
    }
}
