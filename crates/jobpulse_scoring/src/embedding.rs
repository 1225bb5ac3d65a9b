//! Resume/job embeddings and cosine similarity (spec §4.7, layer 1 input).

use async_trait::async_trait;
use jobpulse_core::JobPulseError;
use serde::Deserialize;

#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    async fn embed(&self, model: &str, text: &str) -> Result<Vec<f32>, JobPulseError>;
}

/// Production client against an OpenAI-compatible `/v1/embeddings` endpoint.
pub struct OpenAiEmbeddingClient {
    http: reqwest::Client,
    api_base_url: String,
    api_key: String,
}

impl OpenAiEmbeddingClient {
    pub fn new(api_base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self { http: reqwest::Client::new(), api_base_url: api_base_url.into(), api_key: api_key.into() }
    }
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingClient for OpenAiEmbeddingClient {
    async fn embed(&self, model: &str, text: &str) -> Result<Vec<f32>, JobPulseError> {
        let response = self
            .http
            .post(format!("{}/v1/embeddings", self.api_base_url.trim_end_matches('/')))
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({ "model": model, "input": text }))
            .send()
            .await
            .map_err(|e| JobPulseError::transient(format!("embedding request failed: {e}")))?;

        let status = response.status();
        if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(JobPulseError::transient(format!("embedding provider returned {status}")));
        }
        if !status.is_success() {
            return Err(JobPulseError::data(format!("embedding provider rejected request: {status}")));
        }

        let mut parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| JobPulseError::data(format!("malformed embedding response: {e}")))?;

        parsed
            .data
            .pop()
            .map(|d| d.embedding)
            .ok_or_else(|| JobPulseError::data("embedding response carried no vectors"))
    }
}

/// Deterministic embedding for tests: a bag-of-words hash projected into a
/// small fixed-dimension unit vector. Two calls with the same text always
/// produce the same vector, and unrelated texts are (with high probability)
/// dissimilar — good enough to exercise the threshold/safeguard logic
/// without a live model.
pub struct DeterministicFakeEmbeddingClient {
    pub dimensions: usize,
}

impl Default for DeterministicFakeEmbeddingClient {
    fn default() -> Self {
        Self { dimensions: 16 }
    }
}

#[async_trait]
impl EmbeddingClient for DeterministicFakeEmbeddingClient {
    async fn embed(&self, _model: &str, text: &str) -> Result<Vec<f32>, JobPulseError> {
        let mut vector = vec![0f32; self.dimensions];
        for word in text.split_whitespace() {
            let mut hasher = std::collections::hash_map::DefaultHasher::new();
            std::hash::Hash::hash(&word.to_lowercase(), &mut hasher);
            let bucket = (std::hash::Hasher::finish(&hasher) as usize) % self.dimensions;
            vector[bucket] += 1.0;
        }
        Ok(normalize(&vector))
    }
}

fn normalize(vector: &[f32]) -> Vec<f32> {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 {
        return vector.to_vec();
    }
    vector.iter().map(|v| v / norm).collect()
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|v| v * v).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Estimate token count conservatively when no precise tokenizer is
/// available (spec §4.7 step 1): `len(text) // 3`.
pub fn estimate_tokens(text: &str) -> usize {
    text.len() / 3
}

/// Truncate to `max_tokens` by token-estimate, keeping the head 75% and
/// tail 25% of the budget so contact/skills (top) and education/certs
/// (bottom) both survive.
pub fn truncate_head_tail(text: &str, max_tokens: usize) -> String {
    if estimate_tokens(text) <= max_tokens {
        return text.to_string();
    }
    let max_chars = max_tokens * 3;
    let head_chars = (max_chars * 3) / 4;
    let tail_chars = max_chars - head_chars;

    let total = text.len();
    if head_chars + tail_chars >= total {
        return text.to_string();
    }

    let head = &text[..head_chars.min(total)];
    let tail_start = total.saturating_sub(tail_chars);
    let tail = &text[tail_start..];
    format!("{head}{tail}")
}
