//! The ATS client (spec §4.2, C2): authenticated, rate-aware access to
//! jobs, tearsheets, candidates, resumes, and notes.

use chrono::{DateTime, TimeZone, Utc};
use jobpulse_core::types::{Candidate, Job, Location, Owner, WorkType};
use jobpulse_core::{ErrorKind, JobPulseError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, Semaphore};

use crate::auth::{self, Credentials, Session};
use crate::models::{JobPage, RawAttachment, RawCandidate, RawJob};
use crate::retry::backoff_delay;

const PAGE_SIZE: i64 = 100;
const PER_CALL_CEILING: Duration = Duration::from_secs(120);
const MAX_ATTEMPTS: u32 = 6;

pub struct AtsClient {
    http: reqwest::Client,
    credentials: Credentials,
    session: RwLock<Option<Session>>,
    connection_limit: Arc<Semaphore>,
}

type AttemptOutcome<T> = Result<T, (JobPulseError, Option<Duration>)>;

impl AtsClient {
    pub fn new(credentials: Credentials) -> Self {
        Self::with_connection_limit(credentials, 8)
    }

    pub fn with_connection_limit(credentials: Credentials, max_connections: usize) -> Self {
        Self {
            http: reqwest::Client::new(),
            credentials,
            session: RwLock::new(None),
            connection_limit: Arc::new(Semaphore::new(max_connections)),
        }
    }

    async fn session(&self) -> Result<Session, JobPulseError> {
        {
            let guard = self.session.read().await;
            if let Some(session) = guard.as_ref() {
                if !session.is_stale() {
                    return Ok(session.clone());
                }
            }
        }
        let fresh = auth::authenticate(&self.http, &self.credentials).await?;
        *self.session.write().await = Some(fresh.clone());
        Ok(fresh)
    }

    async fn invalidate_session(&self) {
        *self.session.write().await = None;
    }

    /// Readiness probe (spec §4.13): confirm the session is present or can
    /// be refreshed, without performing any domain operation.
    pub async fn ensure_session(&self) -> Result<(), JobPulseError> {
        self.session().await.map(|_| ())
    }

    /// Acquire a connection permit, obtain/refresh a session, and retry the
    /// given attempt up to `MAX_ATTEMPTS` times on transient failures,
    /// invalidating the cached session once on an auth failure. The whole
    /// call (including retries) is bounded by `PER_CALL_CEILING`.
    async fn run<T>(
        &self,
        mut attempt_once: impl FnMut(reqwest::Client, Session) -> std::pin::Pin<Box<dyn std::future::Future<Output = AttemptOutcome<T>> + Send>>,
    ) -> Result<T, JobPulseError> {
        let _permit = self
            .connection_limit
            .acquire()
            .await
            .map_err(|_| JobPulseError::fatal("ats connection semaphore closed"))?;

        let call = async {
            let mut attempt = 0u32;
            loop {
                let session = self.session().await?;
                match attempt_once(self.http.clone(), session).await {
                    Ok(value) => return Ok(value),
                    Err((err, retry_after)) => {
                        if err.kind() == ErrorKind::Auth {
                            self.invalidate_session().await;
                        }
                        if !err.is_retryable() || attempt + 1 >= MAX_ATTEMPTS {
                            return Err(err);
                        }
                        let delay = backoff_delay(attempt, retry_after);
                        tracing::warn!(attempt, ?delay, error = %err, "retrying ats call");
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                }
            }
        };

        match tokio::time::timeout(PER_CALL_CEILING, call).await {
            Ok(inner) => inner,
            Err(_) => Err(JobPulseError::transient("ats call exceeded the 2 minute ceiling")),
        }
    }

    pub async fn list_tearsheet_jobs(&self, tearsheet_id: &str) -> Result<Vec<Job>, JobPulseError> {
        let mut jobs = Vec::new();
        let mut start = 0i64;

        loop {
            let tearsheet_id = tearsheet_id.to_string();
            let page: JobPage = self
                .run(move |http, session| {
                    let tearsheet_id = tearsheet_id.clone();
                    Box::pin(async move { fetch_job_page(&http, &session, &tearsheet_id, start, PAGE_SIZE).await })
                })
                .await?;

            let fetched = page.data.len() as i64;
            for raw in page.data {
                jobs.push(raw_job_to_job(raw)?);
            }

            if fetched < PAGE_SIZE || (page.total > 0 && start + fetched >= page.total) {
                break;
            }
            start += PAGE_SIZE;
        }

        Ok(jobs)
    }

    pub async fn get_job(&self, job_id: &str) -> Result<Option<Job>, JobPulseError> {
        let job_id = job_id.to_string();
        let raw: Option<RawJob> = self
            .run(move |http, session| {
                let job_id = job_id.clone();
                Box::pin(async move { fetch_single_job(&http, &session, &job_id).await })
            })
            .await?;
        raw.map(raw_job_to_job).transpose()
    }

    pub async fn get_candidate(&self, candidate_id: &str) -> Result<Option<Candidate>, JobPulseError> {
        let candidate_id = candidate_id.to_string();
        let raw: Option<RawCandidate> = self
            .run(move |http, session| {
                let candidate_id = candidate_id.clone();
                Box::pin(async move { fetch_candidate(&http, &session, &candidate_id).await })
            })
            .await?;
        Ok(raw.map(raw_candidate_to_candidate))
    }

    pub async fn download_resume(&self, candidate_id: &str) -> Result<(Vec<u8>, String, String), JobPulseError> {
        let candidate_id = candidate_id.to_string();
        let attachments: Vec<RawAttachment> = self
            .run(move |http, session| {
                let candidate_id = candidate_id.clone();
                Box::pin(async move { fetch_attachments(&http, &session, &candidate_id).await })
            })
            .await?;

        let best = select_best_attachment(attachments)
            .ok_or_else(|| JobPulseError::data("candidate has no usable resume attachment"))?;

        let bytes = best
            .file_content
            .as_deref()
            .map(base64_decode)
            .transpose()?
            .ok_or_else(|| JobPulseError::data("attachment has no file content"))?;

        let content_type = best.content_type.clone().unwrap_or_else(|| "application/octet-stream".to_string());
        let filename = if best.name.is_empty() {
            format!("resume.{}", extension_for(&best.name, &content_type))
        } else {
            best.name.clone()
        };
        Ok((bytes, filename, content_type))
    }

    pub async fn create_candidate_note(&self, candidate_id: &str, title: &str, body_html: &str) -> Result<(), JobPulseError> {
        let candidate_id = candidate_id.to_string();
        let title = title.to_string();
        let body_html = body_html.to_string();
        self.run(move |http, session| {
            let candidate_id = candidate_id.clone();
            let title = title.clone();
            let body_html = body_html.clone();
            Box::pin(async move { post_note(&http, &session, &candidate_id, &title, &body_html).await })
        })
        .await
    }

    pub async fn search_candidates(&self, query: &str, created_since: DateTime<Utc>) -> Result<Vec<RawCandidate>, JobPulseError> {
        let query = query.to_string();
        self.run(move |http, session| {
            let query = query.clone();
            Box::pin(async move { search(&http, &session, &query, created_since).await })
        })
        .await
    }
}

async fn fetch_job_page(
    http: &reqwest::Client,
    session: &Session,
    tearsheet_id: &str,
    start: i64,
    count: i64,
) -> AttemptOutcome<JobPage> {
    let url = format!("{}/entity/Tearsheet/{}/jobOrders", session.rest_url.trim_end_matches('/'), tearsheet_id);
    let response = http
        .get(&url)
        .query(&[("BhRestToken", session.rest_token.as_str())])
        .query(&[("start", start.to_string()), ("count", count.to_string())])
        .send()
        .await
        .map_err(|e| (JobPulseError::transient(format!("list_tearsheet_jobs request failed: {e}")), None))?;

    handle_response(response).await
}

async fn fetch_single_job(
    http: &reqwest::Client,
    session: &Session,
    job_id: &str,
) -> AttemptOutcome<Option<RawJob>> {
    let url = format!("{}/entity/JobOrder/{}", session.rest_url.trim_end_matches('/'), job_id);
    let response = http
        .get(&url)
        .query(&[("BhRestToken", session.rest_token.as_str())])
        .send()
        .await
        .map_err(|e| (JobPulseError::transient(format!("get_job request failed: {e}")), None))?;

    if response.status() == reqwest::StatusCode::NOT_FOUND {
        return Ok(None);
    }
    handle_response::<RawJob>(response).await.map(Some)
}

async fn fetch_candidate(
    http: &reqwest::Client,
    session: &Session,
    candidate_id: &str,
) -> AttemptOutcome<Option<RawCandidate>> {
    let url = format!("{}/entity/Candidate/{}", session.rest_url.trim_end_matches('/'), candidate_id);
    let response = http
        .get(&url)
        .query(&[("BhRestToken", session.rest_token.as_str())])
        .query(&[("fields", "id,firstName,lastName,email,phone")])
        .send()
        .await
        .map_err(|e| (JobPulseError::transient(format!("get_candidate request failed: {e}")), None))?;

    if response.status() == reqwest::StatusCode::NOT_FOUND {
        return Ok(None);
    }
    handle_response::<RawCandidate>(response).await.map(Some)
}

fn raw_candidate_to_candidate(raw: RawCandidate) -> Candidate {
    Candidate {
        candidate_id: raw.id.to_string(),
        name: format!("{} {}", raw.first_name, raw.last_name).trim().to_string(),
        email: raw.email.unwrap_or_default(),
        phone: raw.phone,
        resume_file_pointer: None,
    }
}

async fn fetch_attachments(
    http: &reqwest::Client,
    session: &Session,
    candidate_id: &str,
) -> AttemptOutcome<Vec<RawAttachment>> {
    let url = format!("{}/entity/Candidate/{}/fileAttachments", session.rest_url.trim_end_matches('/'), candidate_id);
    let response = http
        .get(&url)
        .query(&[("BhRestToken", session.rest_token.as_str())])
        .send()
        .await
        .map_err(|e| (JobPulseError::transient(format!("download_resume request failed: {e}")), None))?;

    #[derive(serde::Deserialize)]
    struct AttachmentList {
        data: Vec<RawAttachment>,
    }
    let list: AttachmentList = handle_response(response).await?;
    Ok(list.data)
}

async fn post_note(
    http: &reqwest::Client,
    session: &Session,
    candidate_id: &str,
    title: &str,
    body_html: &str,
) -> AttemptOutcome<()> {
    let url = format!("{}/entity/Note", session.rest_url.trim_end_matches('/'));
    let payload = serde_json::json!({
        "personReference": { "id": candidate_id.parse::<i64>().unwrap_or_default() },
        "action": title,
        "comments": body_html,
    });

    let response = http
        .put(&url)
        .query(&[("BhRestToken", session.rest_token.as_str())])
        .json(&payload)
        .send()
        .await
        .map_err(|e| (JobPulseError::transient(format!("create_candidate_note request failed: {e}")), None))?;

    handle_response::<serde_json::Value>(response).await.map(|_| ())
}

async fn search(
    http: &reqwest::Client,
    session: &Session,
    query: &str,
    created_since: DateTime<Utc>,
) -> AttemptOutcome<Vec<RawCandidate>> {
    let url = format!("{}/search/Candidate", session.rest_url.trim_end_matches('/'));
    let response = http
        .get(&url)
        .query(&[("BhRestToken", session.rest_token.as_str())])
        .query(&[("query", query), ("dateAddedFrom", &created_since.timestamp_millis().to_string())])
        .send()
        .await
        .map_err(|e| (JobPulseError::transient(format!("search_candidates request failed: {e}")), None))?;

    #[derive(serde::Deserialize)]
    struct SearchResults {
        data: Vec<RawCandidate>,
    }
    let results: SearchResults = handle_response(response).await?;
    Ok(results.data)
}

async fn handle_response<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> AttemptOutcome<T> {
    let status = response.status();
    let retry_after = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs);

    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err((JobPulseError::Auth(format!("ats returned {status}")), retry_after));
    }
    if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err((JobPulseError::transient(format!("ats returned {status}")), retry_after));
    }
    if !status.is_success() {
        return Err((JobPulseError::data(format!("ats returned {status}")), None));
    }

    response
        .json::<T>()
        .await
        .map_err(|e| (JobPulseError::data(format!("malformed ats payload: {e}")), None))
}

fn raw_job_to_job(raw: RawJob) -> Result<Job, JobPulseError> {
    let owner = resolve_owner(&raw);
    let work_type = if raw.is_remote {
        WorkType::Remote
    } else if raw.is_hybrid {
        WorkType::Hybrid
    } else {
        WorkType::OnSite
    };

    let (city, state, country) = normalize_address(&raw);

    Ok(Job {
        job_id: raw.id.to_string(),
        title: raw.title,
        description_html: raw.description_html,
        location: Location { city, state, country },
        work_type,
        owner,
        posted_at: raw
            .date_added
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .unwrap_or_else(Utc::now),
        status: if raw.is_open { "open".to_string() } else { "closed".to_string() },
        tearsheet_id: None,
        company: raw.client_corporation.as_ref().map(|c| c.name.clone()).unwrap_or_default(),
    })
}

/// Fallback chain: assignedUsers -> responseUser -> owner (spec §4.4).
fn resolve_owner(raw: &RawJob) -> Owner {
    if let Some(first) = raw.assigned_users.as_ref().and_then(|list| list.data.first()) {
        return owner_from_raw(first);
    }
    if let Some(response_user) = &raw.response_user {
        return owner_from_raw(response_user);
    }
    raw.owner.as_ref().map(owner_from_raw).unwrap_or(Owner {
        name: String::new(),
        email: String::new(),
    })
}

fn owner_from_raw(raw: &crate::models::RawOwner) -> Owner {
    Owner {
        name: format!("{} {}", raw.first_name, raw.last_name).trim().to_string(),
        email: raw.email.clone().unwrap_or_default(),
    }
}

fn normalize_address(raw: &RawJob) -> (Option<String>, Option<String>, Option<String>) {
    if raw.city.is_some() || raw.state.is_some() || raw.country.is_some() {
        return (raw.city.clone(), raw.state.clone(), raw.country.clone());
    }
    let Some(address1) = &raw.address1 else {
        return (None, None, None);
    };
    let parts: Vec<&str> = address1.split(',').map(str::trim).collect();
    match parts.as_slice() {
        [city, state, country] => (Some(city.to_string()), Some(state.to_string()), Some(country.to_string())),
        [city, state] => (Some(city.to_string()), Some(state.to_string()), None),
        [city] => (Some(city.to_string()), None, None),
        _ => (None, None, None),
    }
}

/// `score = name_bonus + format_bonus + size_tiebreaker` (spec §4.6): names
/// containing "resume"/"cv" score higher, "cover"/"letter" score lower, PDF
/// edges out DOCX, and the largest attachment wins remaining ties. Ties on
/// score are broken by most-recently-modified.
fn attachment_score(attachment: &RawAttachment) -> (i64, i64, i64) {
    let lower_name = attachment.name.to_ascii_lowercase();
    let mut name_bonus = 0i64;
    if lower_name.contains("resume") || lower_name.contains("cv") {
        name_bonus += 3;
    }
    if lower_name.contains("cover") || lower_name.contains("letter") {
        name_bonus -= 3;
    }

    let is_pdf = attachment
        .content_type
        .as_deref()
        .is_some_and(|ct| ct.contains("pdf"))
        || lower_name.ends_with(".pdf");
    let is_docx = lower_name.ends_with(".docx") || lower_name.ends_with(".doc");
    let format_bonus = if is_pdf {
        1
    } else if is_docx {
        0
    } else {
        -1
    };

    let size_tiebreaker = attachment.file_content.as_deref().map(|b64| b64.len() as i64).unwrap_or(0);

    (name_bonus, format_bonus, size_tiebreaker)
}

fn select_best_attachment(attachments: Vec<RawAttachment>) -> Option<RawAttachment> {
    attachments.into_iter().max_by_key(|a| {
        let (name_bonus, format_bonus, size_tiebreaker) = attachment_score(a);
        (name_bonus, format_bonus, size_tiebreaker, a.date_added.unwrap_or(0))
    })
}

fn extension_for(filename: &str, content_type: &str) -> &'static str {
    let lower = filename.to_ascii_lowercase();
    if lower.ends_with(".pdf") || content_type.contains("pdf") {
        "pdf"
    } else if lower.ends_with(".docx") || content_type.contains("wordprocessingml") {
        "docx"
    } else if lower.ends_with(".doc") || content_type == "application/msword" {
        "doc"
    } else {
        "txt"
    }
}

fn base64_decode(encoded: &str) -> Result<Vec<u8>, JobPulseError> {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| JobPulseError::data(format!("malformed attachment encoding: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RawOwner;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn owner_resolution_prefers_assigned_users_over_owner() {
        let raw = RawJob {
            id: 1,
            title: "Engineer".into(),
            description_html: String::new(),
            city: None,
            state: None,
            country: None,
            address1: None,
            date_added: None,
            is_open: true,
            is_remote: false,
            is_hybrid: false,
            owner: Some(RawOwner { first_name: "Owner".into(), last_name: "Person".into(), email: Some("owner@example.com".into()) }),
            assigned_users: Some(crate::models::RawUserList {
                data: vec![RawOwner { first_name: "Assigned".into(), last_name: "Recruiter".into(), email: Some("assigned@example.com".into()) }],
            }),
            response_user: None,
            client_corporation: None,
        };

        let owner = resolve_owner(&raw);
        assert_eq!(owner.name, "Assigned Recruiter");
    }

    #[test]
    fn address_splits_on_commas_when_components_are_missing() {
        let raw = RawJob {
            id: 1,
            title: "t".into(),
            description_html: String::new(),
            city: None,
            state: None,
            country: None,
            address1: Some("Austin, TX, USA".into()),
            date_added: None,
            is_open: true,
            is_remote: false,
            is_hybrid: false,
            owner: None,
            assigned_users: None,
            response_user: None,
            client_corporation: None,
        };

        let (city, state, country) = normalize_address(&raw);
        assert_eq!(city.as_deref(), Some("Austin"));
        assert_eq!(state.as_deref(), Some("TX"));
        assert_eq!(country.as_deref(), Some("USA"));
    }

    #[test]
    fn best_attachment_prefers_resume_named_file_over_other_types() {
        let attachments = vec![
            RawAttachment { id: 1, name: "notes.txt".into(), file_type: "Other".into(), content_type: None, file_content: None, date_added: Some(1) },
            RawAttachment { id: 2, name: "jane_resume.pdf".into(), file_type: "Resume".into(), content_type: None, file_content: None, date_added: Some(1) },
        ];
        let best = select_best_attachment(attachments).unwrap();
        assert_eq!(best.id, 2);
    }

    #[test]
    fn best_attachment_penalizes_cover_letters() {
        let attachments = vec![
            RawAttachment { id: 1, name: "cover_letter.pdf".into(), file_type: "Other".into(), content_type: None, file_content: None, date_added: Some(1) },
            RawAttachment { id: 2, name: "attachment.pdf".into(), file_type: "Other".into(), content_type: None, file_content: None, date_added: Some(1) },
        ];
        let best = select_best_attachment(attachments).unwrap();
        assert_eq!(best.id, 2);
    }

    #[test]
    fn best_attachment_breaks_ties_by_size_then_recency() {
        let attachments = vec![
            RawAttachment { id: 1, name: "resume.pdf".into(), file_type: "Resume".into(), content_type: None, file_content: Some("AAAA".into()), date_added: Some(1) },
            RawAttachment { id: 2, name: "resume.pdf".into(), file_type: "Resume".into(), content_type: None, file_content: Some("AAAAAAAA".into()), date_added: Some(2) },
        ];
        let best = select_best_attachment(attachments).unwrap();
        assert_eq!(best.id, 2);
    }

    async fn mocked_response(server: &MockServer, status: u16, retry_after: Option<&str>) -> reqwest::Response {
        let mut template = ResponseTemplate::new(status);
        if let Some(ra) = retry_after {
            template = template.insert_header("Retry-After", ra);
        }
        Mock::given(method("GET"))
            .and(path("/probe"))
            .respond_with(template)
            .mount(server)
            .await;
        reqwest::Client::new().get(format!("{}/probe", server.uri())).send().await.unwrap()
    }

    #[tokio::test]
    async fn handle_response_maps_401_to_auth() {
        let server = MockServer::start().await;
        let response = mocked_response(&server, 401, None).await;
        let (err, retry_after) = handle_response::<serde_json::Value>(response).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Auth);
        assert!(retry_after.is_none());
    }

    #[tokio::test]
    async fn handle_response_maps_5xx_to_transient_and_is_retryable() {
        let server = MockServer::start().await;
        let response = mocked_response(&server, 503, None).await;
        let (err, _) = handle_response::<serde_json::Value>(response).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TransientExternal);
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn handle_response_parses_retry_after_on_429() {
        let server = MockServer::start().await;
        let response = mocked_response(&server, 429, Some("7")).await;
        let (err, retry_after) = handle_response::<serde_json::Value>(response).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TransientExternal);
        assert_eq!(retry_after, Some(Duration::from_secs(7)));
    }

    #[tokio::test]
    async fn handle_response_maps_other_4xx_to_data_with_no_retry() {
        let server = MockServer::start().await;
        let response = mocked_response(&server, 400, None).await;
        let (err, retry_after) = handle_response::<serde_json::Value>(response).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Data);
        assert!(!err.is_retryable());
        assert!(retry_after.is_none());
    }

    fn test_credentials(server: &MockServer) -> Credentials {
        Credentials {
            client_id: "id".into(),
            client_secret: "secret".into(),
            username: "user".into(),
            password: "pass".into(),
            auth_base_url: server.uri(),
            login_base_url: server.uri(),
        }
    }

    async fn mount_auth(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"access_token": "tok"})))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/login"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "BhRestToken": "rest-tok",
                "restUrl": format!("{}/rest", server.uri()),
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn list_tearsheet_jobs_follows_pagination_until_total_is_reached() {
        let server = MockServer::start().await;
        mount_auth(&server).await;

        let first_page: Vec<_> = (0..PAGE_SIZE).map(|i| serde_json::json!({"id": i, "title": format!("Job {i}")})).collect();
        Mock::given(method("GET"))
            .and(path("/rest/entity/Tearsheet/ts-1/jobOrders"))
            .and(query_param("start", "0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": first_page,
                "total": PAGE_SIZE + 1,
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rest/entity/Tearsheet/ts-1/jobOrders"))
            .and(query_param("start", PAGE_SIZE.to_string()))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{"id": PAGE_SIZE, "title": "Last job"}],
                "total": PAGE_SIZE + 1,
            })))
            .mount(&server)
            .await;

        let client = AtsClient::new(test_credentials(&server));
        let jobs = client.list_tearsheet_jobs("ts-1").await.unwrap();
        assert_eq!(jobs.len(), (PAGE_SIZE + 1) as usize);
        assert_eq!(jobs.last().unwrap().title, "Last job");
    }

    #[tokio::test]
    async fn list_tearsheet_jobs_retries_a_transient_failure_then_succeeds() {
        let server = MockServer::start().await;
        mount_auth(&server).await;

        Mock::given(method("GET"))
            .and(path("/rest/entity/Tearsheet/ts-1/jobOrders"))
            .respond_with(ResponseTemplate::new(503).insert_header("Retry-After", "0"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rest/entity/Tearsheet/ts-1/jobOrders"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{"id": 1, "title": "Job 1"}],
                "total": 1,
            })))
            .mount(&server)
            .await;

        let client = AtsClient::new(test_credentials(&server));
        let jobs = client.list_tearsheet_jobs("ts-1").await.unwrap();
        assert_eq!(jobs.len(), 1);
    }
}
