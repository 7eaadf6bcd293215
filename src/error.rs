//! Structured errors surfaced by the service facade
//!
//! `ConfigInvalid` covers everything rejected before a sandbox is acquired;
//! it never appears inside a Verdict. Internal failures inside an evaluation
//! are funnelled into INTERNAL_ERROR verdicts instead.

use thiserror::Error;

/// Facade-level error, mapped to a 4xx/5xx-equivalent by the network layer
#[derive(Debug, Error)]
pub enum JudgeError {
    /// The request is malformed and was rejected before any sandbox work
    #[error("invalid configuration: {reason}")]
    ConfigInvalid { reason: String },

    /// Anything that prevented the service from even attempting evaluation
    #[error("internal service error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl JudgeError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        JudgeError::ConfigInvalid {
            reason: reason.into(),
        }
    }

    /// Whether this error maps to a client-side (4xx-equivalent) failure
    pub fn is_client_error(&self) -> bool {
        matches!(self, JudgeError::ConfigInvalid { .. })
    }
}
