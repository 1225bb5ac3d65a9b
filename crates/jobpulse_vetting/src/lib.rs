//! Applicant detection, scoring aggregation, note/email composition and
//! the dedup ledger (spec §4.5, §4.10, §4.11 — C5, C10, C11). The
//! deduplication ledger itself lives in `jobpulse_db::ledger`; this crate
//! is the caller that decides dedup keys and windows (`aggregator`).

pub mod aggregator;
pub mod detector;
pub mod pipeline;

pub use detector::{cap_to_batch, detect, DetectedCandidate, DetectionSource};
pub use pipeline::{run_vetting_cycle, VettingCycleReport, VettingDeps};
