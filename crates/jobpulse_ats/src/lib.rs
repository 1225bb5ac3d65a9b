//! ATS client: authenticated, rate-aware access to jobs, tearsheets,
//! candidates, resumes, and notes (spec §4.2).

pub mod auth;
pub mod client;
pub mod models;
pub mod retry;

pub use auth::Credentials;
pub use client::AtsClient;
