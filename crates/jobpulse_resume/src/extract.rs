//! Format-specific text extraction (spec §4.6, SPEC_FULL §4.6 refinement).
//!
//! One `TextExtractor` implementation per source format, dispatched on the
//! attachment's detected content type / filename extension. Output is raw,
//! un-normalized text — `normalize::normalize` is applied uniformly by the
//! caller afterwards.

use jobpulse_core::JobPulseError;

pub trait TextExtractor: Send + Sync {
    fn extract(&self, bytes: &[u8]) -> Result<String, JobPulseError>;
}

/// Block-aware PDF extraction: `pdf-extract` already groups text by content
/// stream position, so consecutive blocks separated by more than one blank
/// line in its output are treated as paragraph breaks and preserved as-is;
/// everything else is left for the normalization pass.
pub struct PdfExtractor;

impl TextExtractor for PdfExtractor {
    fn extract(&self, bytes: &[u8]) -> Result<String, JobPulseError> {
        pdf_extract::extract_text_from_mem(bytes)
            .map_err(|e| JobPulseError::data(format!("pdf extraction failed: {e}")))
    }
}

/// Walks `word/document.xml` inside the DOCX zip, preserving paragraph and
/// run order without carrying over character styling.
pub struct DocxExtractor;

impl TextExtractor for DocxExtractor {
    fn extract(&self, bytes: &[u8]) -> Result<String, JobPulseError> {
        let cursor = std::io::Cursor::new(bytes);
        let mut archive = zip::ZipArchive::new(cursor)
            .map_err(|e| JobPulseError::data(format!("docx is not a valid zip: {e}")))?;

        let mut document_xml = String::new();
        {
            let mut entry = archive
                .by_name("word/document.xml")
                .map_err(|e| JobPulseError::data(format!("docx missing word/document.xml: {e}")))?;
            use std::io::Read;
            entry
                .read_to_string(&mut document_xml)
                .map_err(|e| JobPulseError::data(format!("docx document.xml is not utf-8: {e}")))?;
        }

        extract_paragraphs_from_document_xml(&document_xml)
    }
}

fn extract_paragraphs_from_document_xml(xml: &str) -> Result<String, JobPulseError> {
    use quick_xml::events::Event;
    use quick_xml::Reader;

    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);

    let mut paragraphs: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut in_text_run = false;
    let mut buf = Vec::new();

    loop {
        match reader
            .read_event_into(&mut buf)
            .map_err(|e| JobPulseError::data(format!("malformed docx xml: {e}")))?
        {
            Event::Start(tag) if local_name(&tag) == "t" => in_text_run = true,
            Event::End(tag) if local_name(&tag) == "t" => in_text_run = false,
            Event::Text(text) if in_text_run => {
                let decoded = text
                    .unescape()
                    .map_err(|e| JobPulseError::data(format!("malformed docx text run: {e}")))?;
                current.push_str(&decoded);
            }
            Event::End(tag) if local_name(&tag) == "p" => {
                paragraphs.push(std::mem::take(&mut current));
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(paragraphs.join("\n\n"))
}

fn local_name(tag: &quick_xml::events::BytesStart) -> String {
    let name = tag.name();
    let full = String::from_utf8_lossy(name.as_ref());
    full.rsplit(':').next().unwrap_or(&full).to_string()
}

/// Legacy `.doc` binary format has no reliable maintained Rust parser; this
/// scrapes printable ASCII runs the way classic `.doc`-to-text converters
/// do, which is lossy on formatting but recovers the prose reliably enough
/// for scoring purposes.
pub struct DocExtractor;

impl TextExtractor for DocExtractor {
    fn extract(&self, bytes: &[u8]) -> Result<String, JobPulseError> {
        let mut runs: Vec<String> = Vec::new();
        let mut current = String::new();

        for &byte in bytes {
            let printable = (0x20..=0x7e).contains(&byte) || byte == b'\n';
            if printable {
                current.push(byte as char);
            } else if !current.is_empty() {
                runs.push(std::mem::take(&mut current));
            }
        }
        if !current.is_empty() {
            runs.push(current);
        }

        let text: String = runs
            .into_iter()
            .filter(|run| run.trim().len() >= 4)
            .collect::<Vec<_>>()
            .join(" ");

        if text.trim().is_empty() {
            return Err(JobPulseError::data("legacy doc extraction produced no text"));
        }
        Ok(text)
    }
}

pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn extract(&self, bytes: &[u8]) -> Result<String, JobPulseError> {
        String::from_utf8(bytes.to_vec()).map_err(|e| JobPulseError::data(format!("resume is not valid utf-8 text: {e}")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeFormat {
    Pdf,
    Docx,
    Doc,
    Txt,
}

/// Detect format from filename extension, falling back to content type.
pub fn detect_format(filename: &str, content_type: &str) -> ResumeFormat {
    let lower_name = filename.to_ascii_lowercase();
    if lower_name.ends_with(".pdf") || content_type.contains("pdf") {
        return ResumeFormat::Pdf;
    }
    if lower_name.ends_with(".docx") || content_type.contains("officedocument.wordprocessingml") {
        return ResumeFormat::Docx;
    }
    if lower_name.ends_with(".doc") || content_type == "application/msword" {
        return ResumeFormat::Doc;
    }
    ResumeFormat::Txt
}

pub fn extractor_for(format: ResumeFormat) -> Box<dyn TextExtractor> {
    match format {
        ResumeFormat::Pdf => Box::new(PdfExtractor),
        ResumeFormat::Docx => Box::new(DocxExtractor),
        ResumeFormat::Doc => Box::new(DocExtractor),
        ResumeFormat::Txt => Box::new(PlainTextExtractor),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_pdf_from_extension() {
        assert_eq!(detect_format("resume.pdf", "application/octet-stream"), ResumeFormat::Pdf);
    }

    #[test]
    fn detects_docx_from_content_type_when_extension_is_missing() {
        let ct = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
        assert_eq!(detect_format("attachment", ct), ResumeFormat::Docx);
    }

    #[test]
    fn falls_back_to_plain_text() {
        assert_eq!(detect_format("notes.md", "text/markdown"), ResumeFormat::Txt);
    }

    #[test]
    fn plain_text_extractor_round_trips_utf8() {
        let extractor = PlainTextExtractor;
        let text = extractor.extract("hello resume".as_bytes()).unwrap();
        assert_eq!(text, "hello resume");
    }

    #[test]
    fn docx_extractor_walks_paragraphs_and_runs() {
        let xml = r#"<?xml version="1.0"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:body>
    <w:p><w:r><w:t>Jane</w:t></w:r><w:r><w:t> Doe</w:t></w:r></w:p>
    <w:p><w:r><w:t>Software Engineer</w:t></w:r></w:p>
  </w:body>
</w:document>"#;
        let text = extract_paragraphs_from_document_xml(xml).unwrap();
        assert_eq!(text, "Jane Doe\n\nSoftware Engineer");
    }

    #[test]
    fn doc_extractor_recovers_printable_runs() {
        let mut bytes = vec![0u8, 1, 2, 3];
        bytes.extend_from_slice(b"Jane Doe Resume");
        bytes.extend_from_slice(&[0, 0, 0]);
        let extractor = DocExtractor;
        let text = extractor.extract(&bytes).unwrap();
        assert_eq!(text, "Jane Doe Resume");
    }
}
