//! The resume extractor & cache service (spec §4.6, C6).
//!
//! Downloads the best attachment, checks the content-hash cache, extracts
//! and normalizes text on a miss, and optionally formats it to HTML lazily.
//! A cache hit never touches the format-specific extractor (P-CACHE-HIT).

use jobpulse_ats::AtsClient;
use jobpulse_core::JobPulseError;
use sqlx::SqlitePool;
use std::sync::Arc;

use crate::extract::{detect_format, extractor_for};
use crate::formatter::HtmlFormatter;
use crate::hashing::content_hash;
use crate::normalize::normalize;

#[derive(Debug, Clone)]
pub struct ResumeText {
    pub content_hash: String,
    pub raw_text: String,
    pub from_cache: bool,
}

pub struct ResumeExtractor {
    ats: Arc<AtsClient>,
    pool: SqlitePool,
    formatter: Option<Arc<dyn HtmlFormatter>>,
}

impl ResumeExtractor {
    pub fn new(ats: Arc<AtsClient>, pool: SqlitePool) -> Self {
        Self { ats, pool, formatter: None }
    }

    pub fn with_formatter(mut self, formatter: Arc<dyn HtmlFormatter>) -> Self {
        self.formatter = Some(formatter);
        self
    }

    /// Fetch and extract the candidate's resume text. A `Data` error means
    /// `ResumeUnavailable`: the caller should skip this candidate for the
    /// current cycle rather than treat it as a terminal failure.
    pub async fn fetch_and_extract(&self, candidate_id: &str) -> Result<ResumeText, JobPulseError> {
        let (bytes, filename, content_type) = self.ats.download_resume(candidate_id).await?;
        let hash = content_hash(&bytes);

        if let Some(cached) = jobpulse_db::resume_cache::get(&self.pool, &hash).await? {
            if !cached.raw_text.is_empty() {
                return Ok(ResumeText { content_hash: hash, raw_text: cached.raw_text, from_cache: true });
            }
        }

        let format = detect_format(&filename, &content_type);
        let extracted = extractor_for(format).extract(&bytes)?;
        let normalized = normalize(&extracted);

        if normalized.trim().is_empty() {
            return Err(JobPulseError::data("extraction produced empty text"));
        }

        jobpulse_db::resume_cache::put(&self.pool, &hash, &normalized, None).await?;

        if let Some(formatter) = &self.formatter {
            match formatter.format(&normalized).await {
                Ok(html) => {
                    if let Err(e) = jobpulse_db::resume_cache::set_formatted_html(&self.pool, &hash, &html).await {
                        tracing::warn!(error = %e, "failed to persist formatted resume html");
                    }
                }
                Err(e) => tracing::warn!(error = %e, "resume html formatting failed, leaving cache entry unformatted"),
            }
        }

        Ok(ResumeText { content_hash: hash, raw_text: normalized, from_cache: false })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cache_hit_skips_extraction_and_increments_hit_count() {
        let pool = jobpulse_db::open("sqlite::memory:").await.unwrap();
        let bytes = b"Jane Doe\nSoftware Engineer";
        let hash = content_hash(bytes);

        jobpulse_db::resume_cache::put(&pool, &hash, "Jane Doe Software Engineer", None).await.unwrap();

        let cached = jobpulse_db::resume_cache::get(&pool, &hash).await.unwrap().unwrap();
        assert_eq!(cached.hit_count, 0);
        let cached_again = jobpulse_db::resume_cache::get(&pool, &hash).await.unwrap().unwrap();
        assert_eq!(cached_again.hit_count, 1);
    }
}
