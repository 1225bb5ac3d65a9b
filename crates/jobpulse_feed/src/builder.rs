//! Composes the XML document from `(tearsheet_jobs, reference_store,
//! classifier_output, recruiter_tag_map)` (spec §4.4).

use jobpulse_core::types::Job;
use jobpulse_core::JobPulseError;
use std::collections::HashMap;

use crate::classify::ClassificationTags;
use crate::xml::{self, FeedJob};

const DEFAULT_URL_BASE: &str = "https://jobs.example.com/apply";

/// Everything the builder needs beyond the raw job list: per-job reference
/// tokens (spec §4.3), classification tags (an external collaborator,
/// §4.4), an operator-managed recruiter display-name override keyed by the
/// owner's email, and operator-managed public application URLs per job
/// (spec §6.2). Any job absent from a map uses a sensible default.
pub struct BuildInput {
    pub jobs: Vec<Job>,
    pub reference_tokens: HashMap<String, String>,
    pub classification: HashMap<String, ClassificationTags>,
    pub recruiter_tag_map: HashMap<String, String>,
    pub brand_urls: HashMap<String, String>,
    pub feed_title: String,
    pub feed_link: String,
}

pub struct BuiltFeed {
    pub xml_bytes: Vec<u8>,
    pub job_count: usize,
}

/// Build the feed XML deterministically: jobs are sorted by `job_id`
/// ascending (P-DET) so two builds from identical inputs produce
/// byte-identical output.
pub fn build(input: BuildInput) -> Result<BuiltFeed, JobPulseError> {
    let mut feed_jobs: Vec<FeedJob> = input
        .jobs
        .iter()
        .map(|job| to_feed_job(job, &input))
        .collect::<Result<Vec<_>, _>>()?;

    feed_jobs.sort_by(|a, b| sort_key(&a.job_id).cmp(&sort_key(&b.job_id)));

    let job_count = feed_jobs.len();
    let xml_bytes = xml::render(&input.feed_title, &input.feed_link, &feed_jobs)?;

    Ok(BuiltFeed { xml_bytes, job_count })
}

fn sort_key(job_id: &str) -> (bool, i64, &str) {
    match job_id.parse::<i64>() {
        Ok(n) => (false, n, job_id),
        Err(_) => (true, i64::MAX, job_id),
    }
}

fn to_feed_job(job: &Job, input: &BuildInput) -> Result<FeedJob, JobPulseError> {
    let reference_token = input
        .reference_tokens
        .get(&job.job_id)
        .cloned()
        .ok_or_else(|| JobPulseError::fatal(format!("job {} has no minted reference token", job.job_id)))?;

    let classification = input.classification.get(&job.job_id).cloned().unwrap_or_default();

    let recruiter_tag = input
        .recruiter_tag_map
        .get(&job.owner.email)
        .cloned()
        .unwrap_or_else(|| job.owner.name.clone());

    let url = input
        .brand_urls
        .get(&job.job_id)
        .cloned()
        .unwrap_or_else(|| format!("{DEFAULT_URL_BASE}/{}", job.job_id));

    Ok(FeedJob {
        job_id: job.job_id.clone(),
        title: job.title.clone(),
        posted_at: job.posted_at,
        reference_token,
        company: job.company.clone(),
        url,
        description_html: job.description_html.clone(),
        work_type: job.work_type,
        city: job.location.city.clone().unwrap_or_default(),
        state: job.location.state.clone().unwrap_or_default(),
        country: job.location.country.clone().unwrap_or_default(),
        apply_email: job.owner.email.clone(),
        recruiter_tag,
        classification,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use jobpulse_core::types::{Location, Owner, WorkType};

    fn sample_job(id: &str) -> Job {
        Job {
            job_id: id.to_string(),
            title: format!("Engineer {id}"),
            description_html: "<p>desc</p>".to_string(),
            location: Location { city: Some("Austin".into()), state: Some("TX".into()), country: Some("USA".into()) },
            work_type: WorkType::Remote,
            owner: Owner { name: "Jane Recruiter".into(), email: "jane@example.com".into() },
            posted_at: Utc::now(),
            status: "open".to_string(),
            tearsheet_id: Some("ts-1".into()),
            company: "Acme".to_string(),
        }
    }

    fn minimal_input(jobs: Vec<Job>) -> BuildInput {
        let reference_tokens = jobs.iter().map(|j| (j.job_id.clone(), format!("tok-{}", j.job_id))).collect();
        BuildInput {
            jobs,
            reference_tokens,
            classification: HashMap::new(),
            recruiter_tag_map: HashMap::new(),
            brand_urls: HashMap::new(),
            feed_title: "JobPulse Feed".into(),
            feed_link: "https://jobs.example.com".into(),
        }
    }

    #[test]
    fn output_is_sorted_by_job_id_ascending_numerically() {
        let jobs = vec![sample_job("30"), sample_job("3"), sample_job("100")];
        let built = build(minimal_input(jobs)).unwrap();
        let xml = String::from_utf8(built.xml_bytes).unwrap();
        let first = xml.find("<bhatsid>3</bhatsid>").unwrap();
        let second = xml.find("<bhatsid>30</bhatsid>").unwrap();
        let third = xml.find("<bhatsid>100</bhatsid>").unwrap();
        assert!(first < second && second < third);
    }

    #[test]
    fn missing_reference_token_is_a_fatal_internal_error() {
        let jobs = vec![sample_job("1")];
        let mut input = minimal_input(jobs);
        input.reference_tokens.clear();
        let err = build(input).unwrap_err();
        assert_eq!(err.kind(), jobpulse_core::ErrorKind::FatalInternal);
    }

    #[test]
    fn recruiter_tag_map_overrides_raw_owner_name() {
        let jobs = vec![sample_job("1")];
        let mut input = minimal_input(jobs);
        input.recruiter_tag_map.insert("jane@example.com".into(), "Jane R.".into());
        let built = build(input).unwrap();
        let xml = String::from_utf8(built.xml_bytes).unwrap();
        assert!(xml.contains("Jane R."));
    }

    use proptest::prelude::*;

    proptest! {
        /// P-DET: building twice from identical input produces identical
        /// bytes, and arbitrary human-text fields still round-trip through
        /// `quick_xml`'s reader as well-formed XML (spec §6.2, §8).
        #[test]
        fn build_is_deterministic_and_always_well_formed(
            title in "[a-zA-Z0-9 ,.&<>'\"-]{0,40}",
            description in "[a-zA-Z0-9 ,.&<>'\"-]{0,80}",
        ) {
            let mut job = sample_job("7");
            job.title = title;
            job.description_html = description;

            let first = build(minimal_input(vec![job.clone()])).unwrap();
            let second = build(minimal_input(vec![job])).unwrap();
            prop_assert_eq!(&first.xml_bytes, &second.xml_bytes);

            let mut reader = quick_xml::Reader::from_reader(first.xml_bytes.as_slice());
            let mut buf = Vec::new();
            loop {
                match reader.read_event_into(&mut buf) {
                    Ok(quick_xml::events::Event::Eof) => break,
                    Ok(_) => {}
                    Err(e) => prop_assert!(false, "malformed feed xml: {e}"),
                }
                buf.clear();
            }
        }
    }
}
