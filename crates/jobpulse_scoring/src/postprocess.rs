//! Deterministic post-processing hard gate applied after every model call
//! (spec §4.8, invariant P-YRS). Defense in depth: the model is instructed
//! to weigh years-of-experience shortfalls itself, but this gate enforces
//! the cap regardless of what the model actually returned.

use jobpulse_core::types::YearsRequirement;
use std::collections::BTreeMap;

use crate::llm::{RawScoreResponse, RawYearsRequirement};

pub struct GatedScore {
    pub score: i32,
    pub gaps: Vec<String>,
    pub years_analysis: BTreeMap<String, YearsRequirement>,
}

/// Apply the shortfall table:
/// - >= 2 years short: cap at 60, append a `CRITICAL:` gap.
/// - 1-2 years short: subtract 15 (floor 0).
/// - < 1 year short: no change.
///
/// When multiple skills are short, the worst-case cap/subtraction wins and
/// every `CRITICAL:` gap is appended (not just the first).
pub fn apply_years_gate(raw: RawScoreResponse) -> GatedScore {
    let mut score = raw.match_score.clamp(0, 100);
    let mut gaps = raw.gaps_identified;
    let mut hit_critical = false;
    let mut total_subtract = 0i32;

    let years_analysis: BTreeMap<String, YearsRequirement> = raw
        .years_analysis
        .into_iter()
        .map(|(skill, req)| {
            let shortfall = req.required_years - req.estimated_years;
            if shortfall >= 2.0 {
                hit_critical = true;
                gaps.push(format!(
                    "CRITICAL: {skill} requires {}yr, candidate has ~{}yr",
                    format_years(req.required_years),
                    format_years(req.estimated_years)
                ));
            } else if shortfall >= 1.0 {
                total_subtract += 15;
            }
            (skill, to_domain_requirement(req))
        })
        .collect();

    if hit_critical {
        score = score.min(60);
    } else if total_subtract > 0 {
        score = (score - total_subtract).max(0);
    }

    GatedScore { score, gaps, years_analysis }
}

fn to_domain_requirement(raw: RawYearsRequirement) -> YearsRequirement {
    YearsRequirement {
        required_years: raw.required_years,
        estimated_years: raw.estimated_years,
        meets_requirement: raw.meets_requirement,
    }
}

fn format_years(years: f32) -> String {
    if years.fract() == 0.0 {
        format!("{}", years as i64)
    } else {
        format!("{years:.1}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::RawYearsRequirement;

    fn response_with(required: f32, estimated: f32) -> RawScoreResponse {
        let mut years_analysis = BTreeMap::new();
        years_analysis.insert("Python".to_string(), RawYearsRequirement { required_years: required, estimated_years: estimated, meets_requirement: estimated >= required });
        RawScoreResponse {
            match_score: 88,
            match_summary: "s".into(),
            skills_match: "sk".into(),
            experience_match: "ex".into(),
            gaps_identified: vec![],
            key_requirements: vec![],
            years_analysis,
        }
    }

    #[test]
    fn two_year_shortfall_caps_score_at_sixty_and_flags_critical() {
        let gated = apply_years_gate(response_with(5.0, 2.0));
        assert_eq!(gated.score, 60);
        assert!(gated.gaps.iter().any(|g| g.contains("CRITICAL: Python requires 5yr, candidate has ~2yr")));
    }

    #[test]
    fn one_year_shortfall_subtracts_fifteen() {
        let gated = apply_years_gate(response_with(4.0, 3.0));
        assert_eq!(gated.score, 73);
        assert!(gated.gaps.is_empty());
    }

    #[test]
    fn subtraction_floors_at_zero() {
        let mut response = response_with(4.0, 3.0);
        response.match_score = 5;
        let gated = apply_years_gate(response);
        assert_eq!(gated.score, 0);
    }

    #[test]
    fn sub_one_year_shortfall_is_untouched() {
        let gated = apply_years_gate(response_with(3.0, 2.5));
        assert_eq!(gated.score, 88);
        assert!(gated.gaps.is_empty());
    }
}
