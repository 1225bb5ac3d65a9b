//! The chat-completion seam shared by Layer 2 and Layer 3 (spec §4.8, §4.9).
//! One trait, two implementations: a production client against an
//! OpenAI-compatible endpoint, and a deterministic fake for tests.

use async_trait::async_trait;
use jobpulse_core::JobPulseError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[async_trait]
pub trait ChatCompletionClient: Send + Sync {
    async fn complete(&self, model: &str, system_prompt: &str, user_prompt: &str) -> Result<String, JobPulseError>;
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawYearsRequirement {
    pub required_years: f32,
    pub estimated_years: f32,
    pub meets_requirement: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawScoreResponse {
    pub match_score: i32,
    pub match_summary: String,
    pub skills_match: String,
    pub experience_match: String,
    #[serde(default)]
    pub gaps_identified: Vec<String>,
    #[serde(default)]
    pub key_requirements: Vec<String>,
    #[serde(default)]
    pub years_analysis: BTreeMap<String, RawYearsRequirement>,
}

pub struct OpenAiChatClient {
    http: reqwest::Client,
    api_base_url: String,
    api_key: String,
}

impl OpenAiChatClient {
    pub fn new(api_base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self { http: reqwest::Client::new(), api_base_url: api_base_url.into(), api_key: api_key.into() }
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

#[async_trait]
impl ChatCompletionClient for OpenAiChatClient {
    async fn complete(&self, model: &str, system_prompt: &str, user_prompt: &str) -> Result<String, JobPulseError> {
        let response = self
            .http
            .post(format!("{}/v1/chat/completions", self.api_base_url.trim_end_matches('/')))
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({
                "model": model,
                "response_format": { "type": "json_object" },
                "messages": [
                    { "role": "system", "content": system_prompt },
                    { "role": "user", "content": user_prompt },
                ],
            }))
            .send()
            .await
            .map_err(|e| JobPulseError::transient(format!("llm request failed: {e}")))?;

        let status = response.status();
        if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(JobPulseError::transient(format!("llm provider returned {status}")));
        }
        if !status.is_success() {
            return Err(JobPulseError::data(format!("llm provider rejected request: {status}")));
        }

        let mut parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| JobPulseError::data(format!("malformed llm response: {e}")))?;

        parsed
            .choices
            .pop()
            .map(|c| c.message.content)
            .ok_or_else(|| JobPulseError::data("llm response carried no choices"))
    }
}

/// Deterministic fake for tests: looks up a canned response by job id
/// (parsed out of the user prompt's `JOB_ID:` marker) and falls back to a
/// fixed default so unregistered pairs still produce valid JSON.
pub struct DeterministicFakeChatClient {
    responses: std::collections::HashMap<String, RawScoreResponse>,
    default_score: i32,
}

impl DeterministicFakeChatClient {
    pub fn new(default_score: i32) -> Self {
        Self { responses: std::collections::HashMap::new(), default_score }
    }

    pub fn with_response(mut self, job_id: impl Into<String>, response: RawScoreResponse) -> Self {
        self.responses.insert(job_id.into(), response);
        self
    }
}

#[async_trait]
impl ChatCompletionClient for DeterministicFakeChatClient {
    async fn complete(&self, _model: &str, _system_prompt: &str, user_prompt: &str) -> Result<String, JobPulseError> {
        let job_id = user_prompt
            .lines()
            .find_map(|line| line.strip_prefix("JOB_ID:"))
            .map(str::trim)
            .unwrap_or_default();

        let response = self.responses.get(job_id).cloned().unwrap_or_else(|| RawScoreResponse {
            match_score: self.default_score,
            match_summary: "default fake summary".into(),
            skills_match: "default fake skills".into(),
            experience_match: "default fake experience".into(),
            gaps_identified: Vec::new(),
            key_requirements: Vec::new(),
            years_analysis: BTreeMap::new(),
        });

        serde_json::to_string(&response).map_err(|e| JobPulseError::fatal(format!("fake client serialization failed: {e}")))
    }
}
