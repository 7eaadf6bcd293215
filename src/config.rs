//! Service configuration
//!
//! An explicit configuration record built once at startup and passed into
//! the sandbox manager at construction. Values come from the environment
//! (with `.env` support) but nothing here is globally mutable.

use anyhow::{Context, Result};
use tracing::warn;

/// Upper bound on the sandbox deadline margin, milliseconds
pub const MAX_DEADLINE_MARGIN_MS: u64 = 500;

/// Runtime configuration for the judge service
#[derive(Debug, Clone)]
pub struct JudgeConfig {
    /// Maximum number of concurrently held sandboxes
    pub max_concurrent_sandboxes: usize,
    /// Safety margin added to harness deadlines before the sandbox kills
    /// the container (bounded by [`MAX_DEADLINE_MARGIN_MS`])
    pub deadline_margin_ms: u64,
    /// SSH endpoint (`user@host`) for the remote runtime variant
    pub ssh_endpoint: Option<String>,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            max_concurrent_sandboxes: 4,
            deadline_margin_ms: MAX_DEADLINE_MARGIN_MS,
            ssh_endpoint: None,
        }
    }
}

impl JudgeConfig {
    /// Load configuration from the environment
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut config = Self::default();

        if let Ok(raw) = std::env::var("JUDGE_MAX_SANDBOXES") {
            config.max_concurrent_sandboxes = raw
                .parse()
                .with_context(|| format!("invalid JUDGE_MAX_SANDBOXES: {}", raw))?;
            if config.max_concurrent_sandboxes == 0 {
                anyhow::bail!("JUDGE_MAX_SANDBOXES must be at least 1");
            }
        }

        if let Ok(raw) = std::env::var("JUDGE_DEADLINE_MARGIN_MS") {
            let margin: u64 = raw
                .parse()
                .with_context(|| format!("invalid JUDGE_DEADLINE_MARGIN_MS: {}", raw))?;
            if margin > MAX_DEADLINE_MARGIN_MS {
                warn!(
                    "JUDGE_DEADLINE_MARGIN_MS {} exceeds the {}ms bound, clamping",
                    margin, MAX_DEADLINE_MARGIN_MS
                );
            }
            config.deadline_margin_ms = margin.min(MAX_DEADLINE_MARGIN_MS);
        }

        if let Ok(endpoint) = std::env::var("JUDGE_SSH_ENDPOINT") {
            if !endpoint.trim().is_empty() {
                config.ssh_endpoint = Some(endpoint);
            }
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = JudgeConfig::default();
        assert_eq!(config.max_concurrent_sandboxes, 4);
        assert_eq!(config.deadline_margin_ms, MAX_DEADLINE_MARGIN_MS);
        assert!(config.ssh_endpoint.is_none());
    }

    #[test]
    fn test_margin_is_bounded() {
        assert!(JudgeConfig::default().deadline_margin_ms <= MAX_DEADLINE_MARGIN_MS);
    }
}
