//! Optional LLM-based HTML formatting of normalized resume text (spec §4.6
//! step 4). Out of the hot scoring path — callers invoke it lazily and the
//! result is cached permanently against the content hash, since cosmetic
//! HTML rendering is explicitly out of scope for anything beyond storage
//! (spec §1 Out of scope: "resume HTML cosmetic formatting").

use async_trait::async_trait;
use jobpulse_core::JobPulseError;
use serde::{Deserialize, Serialize};

#[async_trait]
pub trait HtmlFormatter: Send + Sync {
    async fn format(&self, raw_text: &str) -> Result<String, JobPulseError>;
}

pub struct LlmHtmlFormatter {
    http: reqwest::Client,
    api_base_url: String,
    api_key: String,
    model: String,
}

impl LlmHtmlFormatter {
    pub fn new(api_base_url: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base_url: api_base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

#[async_trait]
impl HtmlFormatter for LlmHtmlFormatter {
    async fn format(&self, raw_text: &str) -> Result<String, JobPulseError> {
        let prompt = format!(
            "Format the following resume text as semantic HTML (headings, lists, paragraphs). \
             Preserve all content and ordering; do not summarize or add commentary. \
             Return only the HTML.\n\n{raw_text}"
        );

        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage { role: "user", content: &prompt }],
            temperature: 0.0,
        };

        let response = self
            .http
            .post(format!("{}/chat/completions", self.api_base_url.trim_end_matches('/')))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| JobPulseError::transient(format!("resume formatting request failed: {e}")))?;

        let status = response.status();
        if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(JobPulseError::transient(format!("resume formatter returned {status}")));
        }
        if !status.is_success() {
            return Err(JobPulseError::data(format!("resume formatter returned {status}")));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| JobPulseError::data(format!("malformed resume formatter response: {e}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| JobPulseError::data("resume formatter returned no choices"))
    }
}

/// Deterministic fake used in tests: wraps each non-empty line in a `<p>`.
pub struct NullFormatter;

#[async_trait]
impl HtmlFormatter for NullFormatter {
    async fn format(&self, raw_text: &str) -> Result<String, JobPulseError> {
        Ok(raw_text
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| format!("<p>{line}</p>"))
            .collect::<Vec<_>>()
            .join(""))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_formatter_wraps_nonempty_lines() {
        let formatter = NullFormatter;
        let html = formatter.format("Jane Doe\n\nEngineer").await.unwrap();
        assert_eq!(html, "<p>Jane Doe</p><p>Engineer</p>");
    }
}
