//! Bit-exact XML surface (spec §6.2): root `<source>` with `<title>`,
//! `<link>`, then `<job>` children in the order given by the caller (the
//! builder is responsible for sorting). Built with `quick-xml`'s writer API
//! rather than string concatenation so CDATA escaping and element ordering
//! are both guaranteed, not just conventionally followed.
//!
//! Spec §6.2 wraps "human-text fields (title, description, assignedrecruiter,
//! classification triplet)" in CDATA. The classification triplet is
//! `jobfunction`/`jobindustries`/`senioritylevel` — `category` is listed
//! separately in the element order and is emitted as plain text.

use chrono::{DateTime, Utc};
use jobpulse_core::types::WorkType;
use jobpulse_core::JobPulseError;
use quick_xml::events::{BytesCData, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::io::Cursor;

use crate::classify::ClassificationTags;

pub struct FeedJob {
    pub job_id: String,
    pub title: String,
    pub posted_at: DateTime<Utc>,
    pub reference_token: String,
    pub company: String,
    pub url: String,
    pub description_html: String,
    pub work_type: WorkType,
    pub city: String,
    pub state: String,
    pub country: String,
    pub apply_email: String,
    pub recruiter_tag: String,
    pub classification: ClassificationTags,
}

/// Render the full feed document. `jobs` must already be in the desired
/// output order — this function does not sort.
pub fn render(feed_title: &str, feed_link: &str, jobs: &[FeedJob]) -> Result<Vec<u8>, JobPulseError> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));

    writer
        .write_event(Event::Decl(quick_xml::events::BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(xml_err)?;

    write_start(&mut writer, "source")?;
    write_text_element(&mut writer, "title", feed_title)?;
    write_text_element(&mut writer, "link", feed_link)?;

    for job in jobs {
        write_job(&mut writer, job)?;
    }

    write_end(&mut writer, "source")?;

    Ok(writer.into_inner().into_inner())
}

fn write_job(writer: &mut Writer<Cursor<Vec<u8>>>, job: &FeedJob) -> Result<(), JobPulseError> {
    write_start(writer, "job")?;

    write_cdata_element(writer, "title", &job.title)?;
    write_text_element(writer, "date", &job.posted_at.format("%Y-%m-%d").to_string())?;
    write_text_element(writer, "referencenumber", &job.reference_token)?;
    write_text_element(writer, "bhatsid", &job.job_id)?;
    write_text_element(writer, "company", &job.company)?;
    write_text_element(writer, "url", &job.url)?;
    write_cdata_element(writer, "description", &job.description_html)?;
    write_text_element(writer, "jobtype", "")?;
    write_text_element(writer, "city", &job.city)?;
    write_text_element(writer, "state", &job.state)?;
    write_text_element(writer, "country", &job.country)?;
    write_text_element(writer, "category", &job.classification.category)?;
    write_text_element(writer, "apply_email", &job.apply_email)?;
    write_text_element(writer, "remotetype", remote_type_label(job.work_type))?;
    write_cdata_element(writer, "assignedrecruiter", &job.recruiter_tag)?;
    write_cdata_element(writer, "jobfunction", &job.classification.job_function)?;
    write_cdata_element(writer, "jobindustries", &job.classification.job_industries)?;
    write_cdata_element(writer, "senioritylevel", &job.classification.seniority_level)?;

    write_end(writer, "job")?;
    Ok(())
}

fn remote_type_label(work_type: WorkType) -> &'static str {
    match work_type {
        WorkType::OnSite => "On-site",
        WorkType::Hybrid => "Hybrid",
        WorkType::Remote => "Remote",
    }
}

fn write_start(writer: &mut Writer<Cursor<Vec<u8>>>, name: &str) -> Result<(), JobPulseError> {
    writer.write_event(Event::Start(BytesStart::new(name))).map_err(xml_err)
}

fn write_end(writer: &mut Writer<Cursor<Vec<u8>>>, name: &str) -> Result<(), JobPulseError> {
    writer.write_event(Event::End(BytesEnd::new(name))).map_err(xml_err)
}

fn write_text_element(writer: &mut Writer<Cursor<Vec<u8>>>, name: &str, text: &str) -> Result<(), JobPulseError> {
    write_start(writer, name)?;
    writer.write_event(Event::Text(BytesText::new(text))).map_err(xml_err)?;
    write_end(writer, name)
}

fn write_cdata_element(writer: &mut Writer<Cursor<Vec<u8>>>, name: &str, text: &str) -> Result<(), JobPulseError> {
    write_start(writer, name)?;
    writer.write_event(Event::CData(BytesCData::new(text))).map_err(xml_err)?;
    write_end(writer, name)
}

fn xml_err(e: quick_xml::Error) -> JobPulseError {
    JobPulseError::fatal(format!("xml writer error: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::ClassificationTags;

    fn sample_job() -> FeedJob {
        FeedJob {
            job_id: "42".into(),
            title: "Senior Engineer & Lead".into(),
            posted_at: DateTime::parse_from_rfc3339("2026-01-05T00:00:00Z").unwrap().with_timezone(&Utc),
            reference_token: "AbCdEfGhIj".into(),
            company: "Acme Corp".into(),
            url: "https://jobs.example.com/apply/42".into(),
            description_html: "<p>Build <b>things</b></p>".into(),
            work_type: WorkType::Hybrid,
            city: "Austin".into(),
            state: "TX".into(),
            country: "USA".into(),
            apply_email: "jane@example.com".into(),
            recruiter_tag: "Jane Recruiter".into(),
            classification: ClassificationTags {
                category: "Engineering".into(),
                job_function: "Software".into(),
                job_industries: "Technology".into(),
                seniority_level: "Senior".into(),
            },
        }
    }

    #[test]
    fn element_order_matches_the_wire_contract() {
        let xml = render("Feed", "https://example.com", std::slice::from_ref(&sample_job())).unwrap();
        let xml = String::from_utf8(xml).unwrap();

        let order = [
            "title", "date", "referencenumber", "bhatsid", "company", "url", "description", "jobtype",
            "city", "state", "country", "category", "apply_email", "remotetype", "assignedrecruiter",
            "jobfunction", "jobindustries", "senioritylevel",
        ];
        let job_section = &xml[xml.find("<job>").unwrap()..];
        let mut last_pos = 0usize;
        for tag in order {
            let needle = format!("<{tag}>");
            let pos = job_section.find(&needle).unwrap_or_else(|| panic!("missing element {tag}"));
            assert!(pos >= last_pos, "element {tag} out of order");
            last_pos = pos;
        }
    }

    #[test]
    fn human_text_fields_are_wrapped_in_cdata() {
        let xml = render("Feed", "https://example.com", std::slice::from_ref(&sample_job())).unwrap();
        let xml = String::from_utf8(xml).unwrap();
        assert!(xml.contains("<title><![CDATA[Senior Engineer & Lead]]></title>"));
        assert!(xml.contains("<description><![CDATA[<p>Build <b>things</b></p>]]></description>"));
        assert!(xml.contains("<assignedrecruiter><![CDATA[Jane Recruiter]]></assignedrecruiter>"));
    }

    #[test]
    fn classification_triplet_is_cdata_but_category_is_plain() {
        let xml = render("Feed", "https://example.com", std::slice::from_ref(&sample_job())).unwrap();
        let xml = String::from_utf8(xml).unwrap();
        assert!(xml.contains("<category>Engineering</category>"));
        assert!(xml.contains("<jobfunction><![CDATA[Software]]></jobfunction>"));
        assert!(xml.contains("<jobindustries><![CDATA[Technology]]></jobindustries>"));
        assert!(xml.contains("<senioritylevel><![CDATA[Senior]]></senioritylevel>"));
    }

    #[test]
    fn date_is_formatted_as_iso_8601_date_only() {
        let xml = render("Feed", "https://example.com", std::slice::from_ref(&sample_job())).unwrap();
        let xml = String::from_utf8(xml).unwrap();
        assert!(xml.contains("<date>2026-01-05</date>"));
    }

    #[test]
    fn two_renders_of_identical_input_are_byte_identical() {
        let a = render("Feed", "https://example.com", std::slice::from_ref(&sample_job())).unwrap();
        let b = render("Feed", "https://example.com", std::slice::from_ref(&sample_job())).unwrap();
        assert_eq!(a, b);
    }
}
