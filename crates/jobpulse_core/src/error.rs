//! Error taxonomy (spec §7).
//!
//! Every external-facing operation in the workspace returns a
//! `Result<T, JobPulseError>` (or a crate-local error that converts into
//! one at the boundary) instead of throwing/unwrapping. The taxonomy is a
//! closed set so callers can match on `kind()` to decide retry vs. skip
//! vs. abort policy without string matching.

use thiserror::Error;

/// The six error kinds from spec §7, in policy order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// 5xx, timeouts, rate limits from ATS/LLM/mail/file-drop. Retry with backoff.
    TransientExternal,
    /// Repeated 401 after refresh. Alert once per hour, abort the cycle.
    Auth,
    /// Malformed payload, missing required field. Skip the unit, keep going.
    Data,
    /// A safeguard tripped (SG-1, freeze switch). Do not proceed.
    PolicyBlock,
    /// The dedup ledger indicates a recent emission. Treat as success.
    Dedup,
    /// A programming invariant was violated. Log, keep running, mark unhealthy.
    FatalInternal,
}

#[derive(Debug, Error)]
pub enum JobPulseError {
    #[error("transient external error: {0}")]
    TransientExternal(String),

    #[error("authentication error: {0}")]
    Auth(String),

    #[error("data error: {0}")]
    Data(String),

    #[error("policy block: {0}")]
    PolicyBlock(String),

    #[error("dedup block: {0}")]
    Dedup(String),

    #[error("internal invariant violated: {0}")]
    FatalInternal(String),

    #[error("database error: {0}")]
    Database(String),
}

impl JobPulseError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            JobPulseError::TransientExternal(_) => ErrorKind::TransientExternal,
            JobPulseError::Auth(_) => ErrorKind::Auth,
            JobPulseError::Data(_) => ErrorKind::Data,
            JobPulseError::PolicyBlock(_) => ErrorKind::PolicyBlock,
            JobPulseError::Dedup(_) => ErrorKind::Dedup,
            JobPulseError::FatalInternal(_) | JobPulseError::Database(_) => ErrorKind::FatalInternal,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::TransientExternal)
    }

    pub fn transient(msg: impl Into<String>) -> Self {
        JobPulseError::TransientExternal(msg.into())
    }

    pub fn auth(msg: impl Into<String>) -> Self {
        JobPulseError::Auth(msg.into())
    }

    pub fn data(msg: impl Into<String>) -> Self {
        JobPulseError::Data(msg.into())
    }

    pub fn policy_block(msg: impl Into<String>) -> Self {
        JobPulseError::PolicyBlock(msg.into())
    }

    pub fn dedup(msg: impl Into<String>) -> Self {
        JobPulseError::Dedup(msg.into())
    }

    pub fn fatal(msg: impl Into<String>) -> Self {
        JobPulseError::FatalInternal(msg.into())
    }

    pub fn database(msg: impl Into<String>) -> Self {
        JobPulseError::Database(msg.into())
    }
}
