//! Domain types (spec §3).
//!
//! Field names mirror the spec's semantic names. None of these types are
//! mutated in place by automated paths beyond what the spec's invariants
//! allow (see `JobReference` and `JobRequirements`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkType {
    OnSite,
    Hybrid,
    Remote,
}

impl WorkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkType::OnSite => "on_site",
            WorkType::Hybrid => "hybrid",
            WorkType::Remote => "remote",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Location {
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Owner {
    pub name: String,
    pub email: String,
}

/// A job as observed from the ATS. Never mutated locally — see spec §3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub job_id: String,
    pub title: String,
    pub description_html: String,
    pub location: Location,
    pub work_type: WorkType,
    pub owner: Owner,
    pub posted_at: DateTime<Utc>,
    pub status: String,
    pub tearsheet_id: Option<String>,
    /// Client corporation name, surfaced as the feed's `company` element (spec §6.2).
    pub company: String,
}

impl Job {
    /// A job with no monitored tearsheet is not a vetting target (it may
    /// still be an applied-to job; see spec §4.7 S2).
    pub fn is_vetting_target(&self, monitored_tearsheets: &[String]) -> bool {
        self.tearsheet_id
            .as_deref()
            .is_some_and(|id| monitored_tearsheets.iter().any(|t| t == id))
    }

    pub fn is_open(&self) -> bool {
        self.status.eq_ignore_ascii_case("open")
    }
}

/// `(job_id unique, reference_token, last_updated)`. Invariant RI-1: once
/// assigned, `reference_token` is never rewritten by an automated path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobReference {
    pub job_id: String,
    pub reference_token: String,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub candidate_id: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub resume_file_pointer: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Received,
    Processed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Application {
    pub message_id: String,
    pub candidate_id: String,
    pub applied_job_id: String,
    pub received_at: DateTime<Utc>,
    pub status: ApplicationStatus,
    /// Set to the start time of the cycle that fully vetted the candidate.
    pub vetted_at: Option<DateTime<Utc>>,
}

impl Application {
    pub fn needs_vetting(&self) -> bool {
        self.vetted_at.is_none() && self.status == ApplicationStatus::Processed
    }
}

/// Purely a cache, keyed by content hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResumeCacheEntry {
    pub content_hash: String,
    pub raw_text: String,
    pub formatted_html: Option<String>,
    pub hit_count: i64,
    pub last_accessed: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VettingStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VettingRun {
    pub id: String,
    pub candidate_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub highest_score: Option<i32>,
    pub qualified: bool,
    pub note_id: Option<String>,
    pub error: Option<String>,
    pub status: VettingStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringLayer {
    L2,
    L3,
}

/// Per-skill years-of-experience comparison, keyed by skill name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YearsRequirement {
    pub required_years: f32,
    pub estimated_years: f32,
    pub meets_requirement: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobMatch {
    pub vetting_run_id: String,
    pub job_id: String,
    /// Opaque within `[0, 100]`; deterministic given inputs+model, not reproducible.
    pub score: i32,
    pub summary: String,
    pub skills: String,
    pub experience: String,
    pub gaps: Vec<String>,
    pub years_analysis: BTreeMap<String, YearsRequirement>,
    pub layer_used: ScoringLayer,
    pub is_applied_job: bool,
    pub is_qualified: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRequirements {
    pub job_id: String,
    pub ai_extracted: String,
    pub custom_override: Option<String>,
    pub threshold: i32,
    pub last_extraction: Option<DateTime<Utc>>,
}

impl JobRequirements {
    /// Active requirements = `custom_override` if non-empty else `ai_extracted`.
    pub fn active(&self) -> &str {
        match &self.custom_override {
            Some(text) if !text.trim().is_empty() => text,
            _ => &self.ai_extracted,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingCacheEntry {
    pub job_id: String,
    pub description_hash: String,
    pub vector: Vec<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterLogEntry {
    pub candidate_id: String,
    pub job_id: String,
    pub similarity: f32,
    pub threshold_used: f32,
    pub filtered: bool,
    pub safeguard: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationLogEntry {
    pub candidate_id: String,
    pub job_id: String,
    pub l2_score: i32,
    pub l3_score: i32,
    pub delta: i32,
    pub crossed_threshold: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryChannel {
    Note,
    EmailQualified,
    EmailXmlUpload,
    EmailZeroJobAlert,
    EmailReferenceRefresh,
}

impl DeliveryChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryChannel::Note => "note",
            DeliveryChannel::EmailQualified => "email_qualified",
            DeliveryChannel::EmailXmlUpload => "email_xml_upload",
            DeliveryChannel::EmailZeroJobAlert => "email_zero_job_alert",
            DeliveryChannel::EmailReferenceRefresh => "email_reference_refresh",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Sent,
    DedupSkipped,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryLedgerEntry {
    pub channel: DeliveryChannel,
    pub key: String,
    pub sent_at: DateTime<Utc>,
    pub external_id: Option<String>,
    pub status: DeliveryStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerLock {
    pub cycle_name: String,
    pub owner_id: String,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub environment: String,
}
