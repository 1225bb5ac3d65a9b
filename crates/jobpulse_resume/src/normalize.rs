//! Deterministic text normalization for extracted resume text (spec §4.6).
//!
//! Runs after format-specific extraction, regardless of source format, so
//! downstream consumers (the embedding filter, the LLM scorer) always see
//! the same shape of text.

/// A handful of fixed substitutions for common PDF extraction merges, where
/// a heading runs directly into the following word with no space.
const PATTERN_SUBSTITUTIONS: &[(&str, &str)] = &[
    ("PROFESSIONALSUMMARY", "PROFESSIONAL SUMMARY "),
    ("WORKEXPERIENCE", "WORK EXPERIENCE "),
    ("WORKHISTORY", "WORK HISTORY "),
    ("EDUCATIONAND", "EDUCATION AND "),
    ("SKILLSAND", "SKILLS AND "),
    ("TECHNICALSKILLS", "TECHNICAL SKILLS "),
    ("CERTIFICATIONSAND", "CERTIFICATIONS AND "),
];

pub fn normalize(raw: &str) -> String {
    let despaced = replace_zero_width_and_tabs(raw);
    let substituted = apply_pattern_substitutions(&despaced);
    let camel_split = split_camel_case(&substituted);
    collapse_whitespace(&camel_split)
}

fn replace_zero_width_and_tabs(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\t' | '\u{200b}' | '\u{200c}' | '\u{200d}' | '\u{feff}' => ' ',
            other => other,
        })
        .collect()
}

fn apply_pattern_substitutions(text: &str) -> String {
    let mut result = text.to_string();
    for (pattern, replacement) in PATTERN_SUBSTITUTIONS {
        result = result.replace(pattern, replacement);
    }
    result
}

/// Insert a space at every lowercase-to-uppercase boundary
/// (`PROFESSIONALSUMMARYAn` -> `PROFESSIONALSUMMARY An`), so that a run of
/// all-caps heading text is at least separated from the prose that follows.
fn split_camel_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 8);
    let mut prev: Option<char> = None;
    for c in text.chars() {
        if let Some(p) = prev {
            if p.is_lowercase() && c.is_uppercase() {
                out.push(' ');
            }
        }
        out.push(c);
        prev = Some(c);
    }
    out
}

fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_was_space = false;
    for c in text.chars() {
        if c.is_whitespace() {
            if !last_was_space {
                out.push(' ');
            }
            last_was_space = true;
        } else {
            out.push(c);
            last_was_space = false;
        }
    }
    out.trim().to_string()
}
