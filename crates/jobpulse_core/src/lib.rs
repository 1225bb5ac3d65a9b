//! Shared domain types, configuration and error taxonomy for JobPulse.
//!
//! Every other crate in the workspace depends on this one instead of
//! redefining `Job`, `Config`, or the error taxonomy locally.

pub mod config;
pub mod error;
pub mod keys;
pub mod types;

pub use config::Config;
pub use error::{ErrorKind, JobPulseError};
