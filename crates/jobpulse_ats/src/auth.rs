//! OAuth 2.0 authorization-code-by-password flow (spec §4.2).
//!
//! Two hops: an OAuth token exchange using the configured username/password
//! as the grant, followed by a REST login that exchanges the access token
//! for a `BhRestToken` + `restUrl` pair. Adapted from the device-code-flow
//! shape of an Azure AD client: same `reqwest::Client` + typed response
//! pattern, collapsed to a single round trip since the ATS never requires
//! out-of-band user interaction.

use jobpulse_core::JobPulseError;
use serde::Deserialize;
use std::time::{Duration, Instant};

use crate::models::LoginResponse;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub rest_token: String,
    pub rest_url: String,
    obtained_at: Instant,
}

impl Session {
    /// Sessions are treated as stale after 10 minutes so a 401 is rarely
    /// the first sign of expiry; conservative relative to typical ATS TTLs.
    pub fn is_stale(&self) -> bool {
        self.obtained_at.elapsed() > Duration::from_secs(600)
    }
}

pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    pub username: String,
    pub password: String,
    pub auth_base_url: String,
    pub login_base_url: String,
}

/// Run the full authorization-code-by-password + REST login sequence.
pub async fn authenticate(http: &reqwest::Client, creds: &Credentials) -> Result<Session, JobPulseError> {
    let access_token = exchange_password_grant(http, creds).await?;
    rest_login(http, creds, &access_token).await
}

async fn exchange_password_grant(http: &reqwest::Client, creds: &Credentials) -> Result<String, JobPulseError> {
    let url = format!("{}/oauth/token", creds.auth_base_url.trim_end_matches('/'));
    let params = [
        ("grant_type", "password"),
        ("client_id", creds.client_id.as_str()),
        ("client_secret", creds.client_secret.as_str()),
        ("username", creds.username.as_str()),
        ("password", creds.password.as_str()),
    ];

    let response = http
        .post(&url)
        .form(&params)
        .send()
        .await
        .map_err(|e| JobPulseError::transient(format!("oauth token request failed: {e}")))?;

    let status = response.status();
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return Err(JobPulseError::Auth(format!("oauth token exchange rejected: {status}")));
    }
    if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(JobPulseError::transient(format!("oauth token endpoint returned {status}")));
    }
    if !status.is_success() {
        return Err(JobPulseError::data(format!("oauth token endpoint returned {status}")));
    }

    let token: TokenResponse = response
        .json()
        .await
        .map_err(|e| JobPulseError::data(format!("malformed oauth token response: {e}")))?;

    tracing::debug!(has_refresh_token = token.refresh_token.is_some(), "obtained ats access token");
    Ok(token.access_token)
}

async fn rest_login(http: &reqwest::Client, creds: &Credentials, access_token: &str) -> Result<Session, JobPulseError> {
    let url = format!("{}/login", creds.login_base_url.trim_end_matches('/'));

    let response = http
        .get(&url)
        .query(&[("version", "*"), ("access_token", access_token)])
        .send()
        .await
        .map_err(|e| JobPulseError::transient(format!("rest login request failed: {e}")))?;

    let status = response.status();
    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(JobPulseError::Auth(format!("rest login rejected: {status}")));
    }
    if status.is_server_error() {
        return Err(JobPulseError::transient(format!("rest login returned {status}")));
    }
    if !status.is_success() {
        return Err(JobPulseError::data(format!("rest login returned {status}")));
    }

    let body: LoginResponse = response
        .json()
        .await
        .map_err(|e| JobPulseError::data(format!("malformed rest login response: {e}")))?;

    tracing::info!("ats session established");
    Ok(Session {
        rest_token: body.rest_token,
        rest_url: body.rest_url,
        obtained_at: Instant::now(),
    })
}
