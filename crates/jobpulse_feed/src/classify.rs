//! Job classification into a fixed taxonomy is explicitly out of scope
//! (spec §1) — it is an external collaborator. `ClassificationProvider` is
//! the seam: the feed builder asks it for a tag tuple per job and embeds
//! whatever comes back verbatim.

use async_trait::async_trait;
use jobpulse_core::JobPulseError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassificationTags {
    pub category: String,
    pub job_function: String,
    pub job_industries: String,
    pub seniority_level: String,
}

#[async_trait]
pub trait ClassificationProvider: Send + Sync {
    async fn classify(&self, job_id: &str, title: &str, description_html: &str) -> Result<ClassificationTags, JobPulseError>;
}

/// Default provider when no external classifier is wired in: every job
/// gets empty tags rather than the build failing. The feed schema (spec
/// §6.2) still emits the elements, just empty.
pub struct NullClassifier;

#[async_trait]
impl ClassificationProvider for NullClassifier {
    async fn classify(&self, _job_id: &str, _title: &str, _description_html: &str) -> Result<ClassificationTags, JobPulseError> {
        Ok(ClassificationTags::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_classifier_returns_empty_tags() {
        let tags = NullClassifier.classify("job-1", "Engineer", "<p>desc</p>").await.unwrap();
        assert_eq!(tags, ClassificationTags::default());
    }
}
