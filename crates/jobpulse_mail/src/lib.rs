//! Transactional email delivery (spec §4.12, C12).
//!
//! `send` retries transient provider errors with exponential backoff (up
//! to 3 attempts) and makes a single attempt for 4xx rejections. Logging
//! to the durable `DeliveryLedger` is the caller's responsibility (spec
//! §4.11) since the ledger's dedup key varies by notification kind.

use jobpulse_core::JobPulseError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const MAX_ATTEMPTS: u32 = 3;
const BASE_DELAY: Duration = Duration::from_millis(500);
const CAP_DELAY: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Default)]
pub struct Message<'a> {
    pub to: &'a [String],
    pub cc: &'a [String],
    pub bcc: &'a [String],
    pub subject: &'a str,
    pub html_body: &'a str,
    pub text_fallback: &'a str,
    pub attachments: &'a [Attachment],
}

pub struct MailSender {
    http: reqwest::Client,
    api_base_url: String,
    api_key: String,
    from_address: String,
}

#[derive(Debug, Serialize)]
struct SendPayload<'a> {
    from: &'a str,
    to: &'a [String],
    cc: &'a [String],
    bcc: &'a [String],
    subject: &'a str,
    html: &'a str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    id: String,
}

impl MailSender {
    pub fn new(api_base_url: impl Into<String>, api_key: impl Into<String>, from_address: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base_url: api_base_url.into(),
            api_key: api_key.into(),
            from_address: from_address.into(),
        }
    }

    pub async fn send(&self, message: Message<'_>) -> Result<String, JobPulseError> {
        let mut attempt = 0u32;
        loop {
            match self.send_once(&message).await {
                Ok(delivery_id) => return Ok(delivery_id),
                Err(err) if err.is_retryable() && attempt + 1 < MAX_ATTEMPTS => {
                    let delay = backoff(attempt);
                    tracing::warn!(attempt, ?delay, to_count = message.to.len(), "retrying mail send");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn send_once(&self, message: &Message<'_>) -> Result<String, JobPulseError> {
        let payload = SendPayload {
            from: &self.from_address,
            to: message.to,
            cc: message.cc,
            bcc: message.bcc,
            subject: message.subject,
            html: message.html_body,
            text: message.text_fallback,
        };

        let response = self
            .http
            .post(format!("{}/v1/messages", self.api_base_url.trim_end_matches('/')))
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| JobPulseError::transient(format!("mail provider request failed: {e}")))?;

        let status = response.status();
        tracing::info!(status = %status, subject = message.subject, "mail provider response");

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Err(JobPulseError::transient(format!("mail provider returned {status}")));
        }
        if status.is_client_error() {
            return Err(JobPulseError::data(format!("mail provider rejected message: {status}")));
        }
        if !status.is_success() {
            return Err(JobPulseError::transient(format!("mail provider returned {status}")));
        }

        let parsed: SendResponse = response
            .json()
            .await
            .map_err(|e| JobPulseError::data(format!("malformed mail provider response: {e}")))?;

        Ok(parsed.id)
    }
}

fn backoff(attempt: u32) -> Duration {
    let exp = BASE_DELAY.saturating_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX));
    exp.min(CAP_DELAY)
}
