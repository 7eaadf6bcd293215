//! Execution orchestrator
//!
//! Schedules submissions onto sandboxes: single-shot evaluation, independent
//! concurrent batches, and the optimized batch that compiles once and reuses
//! the binary across configurations sharing a parameter schema. Every
//! acquired sandbox is released on all exit paths; failures that prevent a
//! result document become INTERNAL_ERROR verdicts rather than errors.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures_util::future::join_all;
use tracing::{debug, info, warn};

use crate::classifier;
use crate::codec::{self, TestConfig};
use crate::sandbox::{Sandbox, SandboxManager};
use crate::types::{Language, ResourceLimits, Submission, Verdict, VerdictStatus};

/// Allowance on top of the harness deadlines for container start, file
/// transfer, and result download before the total call deadline fires
const TOTAL_CALL_OVERHEAD: Duration = Duration::from_secs(30);

/// Name the configuration document is uploaded under
const CONFIG_FILE: &str = "config.json";
/// Name the harness writes the result document to
const RESULT_FILE: &str = "result.json";

pub struct Orchestrator {
    manager: Arc<SandboxManager>,
}

impl Orchestrator {
    pub fn new(manager: Arc<SandboxManager>) -> Self {
        Self { manager }
    }

    /// Evaluate a single submission. Always yields exactly one verdict.
    pub async fn evaluate(&self, submission: &Submission) -> Verdict {
        let limits = submission.limits();
        let total = harness_deadline(&limits) + TOTAL_CALL_OVERHEAD;

        match tokio::time::timeout(total, self.evaluate_inner(submission, &limits)).await {
            Ok(Ok(verdict)) => verdict,
            Ok(Err(e)) => {
                warn!("evaluation failed before producing a result: {:#}", e);
                Verdict::internal_error(format!("{:#}", e))
            }
            Err(_) => {
                warn!("total call deadline exceeded");
                Verdict::internal_error("total call deadline exceeded")
            }
        }
    }

    /// Evaluate independent submissions concurrently. Verdicts come back in
    /// submission order; one failing item does not affect its siblings.
    pub async fn evaluate_batch(&self, submissions: &[Submission]) -> Vec<Verdict> {
        join_all(submissions.iter().map(|s| self.evaluate(s))).await
    }

    /// Evaluate many configurations against one source with a single
    /// sandbox. The first configuration compiles the runner; later ones
    /// reuse it unless their parameter schema differs. A failure of the
    /// shared compile yields the same verdict for every configuration.
    pub async fn evaluate_optimized_batch(
        &self,
        language: Language,
        source: &str,
        configs: &[TestConfig],
        limits: ResourceLimits,
    ) -> Vec<Verdict> {
        if configs.is_empty() {
            return Vec::new();
        }

        let per_item = harness_deadline(&limits);
        let total = per_item * configs.len() as u32 + TOTAL_CALL_OVERHEAD;

        match tokio::time::timeout(
            total,
            self.optimized_inner(language, source, configs, &limits),
        )
        .await
        {
            Ok(Ok(verdicts)) => verdicts,
            Ok(Err(e)) => {
                warn!("optimized batch failed before producing results: {:#}", e);
                let verdict = Verdict::internal_error(format!("{:#}", e));
                vec![verdict; configs.len()]
            }
            Err(_) => {
                warn!("optimized batch total deadline exceeded");
                let verdict = Verdict::internal_error("total call deadline exceeded");
                vec![verdict; configs.len()]
            }
        }
    }

    async fn evaluate_inner(
        &self,
        submission: &Submission,
        limits: &ResourceLimits,
    ) -> Result<Verdict> {
        let sandbox = self.manager.acquire(submission.language, limits).await?;
        let result = self.run_single(&sandbox, submission, limits).await;
        if let Err(e) = sandbox.release().await {
            warn!("sandbox release failed: {:#}", e);
        }
        result
    }

    async fn run_single(
        &self,
        sandbox: &Sandbox,
        submission: &Submission,
        limits: &ResourceLimits,
    ) -> Result<Verdict> {
        let config = codec::encode_config(submission);
        let config_bytes = codec::config_to_bytes(&config)?;

        sandbox
            .upload(sandbox.source_file(), submission.source.as_bytes())
            .await?;
        sandbox.upload(CONFIG_FILE, &config_bytes).await?;

        let deadline = harness_deadline(limits) + self.manager.margin();
        let command = harness_command(sandbox.harness(), limits, false);

        debug!(container = %sandbox.id(), "invoking harness");
        let outcome = sandbox.exec(&command, deadline).await?;
        let doc = self.fetch_result(sandbox).await;

        let verdict = classifier::classify(&outcome, doc);
        info!(
            container = %sandbox.id(),
            status = %verdict.status,
            wall_ms = verdict.metrics.wall_ms,
            "evaluation finished"
        );
        Ok(verdict)
    }

    async fn optimized_inner(
        &self,
        language: Language,
        source: &str,
        configs: &[TestConfig],
        limits: &ResourceLimits,
    ) -> Result<Vec<Verdict>> {
        let sandbox = self.manager.acquire(language, limits).await?;
        let result = self
            .run_optimized(&sandbox, source, configs, limits)
            .await;
        if let Err(e) = sandbox.release().await {
            warn!("sandbox release failed: {:#}", e);
        }
        result
    }

    async fn run_optimized(
        &self,
        sandbox: &Sandbox,
        source: &str,
        configs: &[TestConfig],
        limits: &ResourceLimits,
    ) -> Result<Vec<Verdict>> {
        // user code goes up once; only config.json changes per item
        sandbox
            .upload(sandbox.source_file(), source.as_bytes())
            .await?;

        let deadline = harness_deadline(limits) + self.manager.margin();
        let mut verdicts = Vec::with_capacity(configs.len());

        for (index, config) in configs.iter().enumerate() {
            let verdict = match self
                .run_batch_item(sandbox, config, index == 0, limits, deadline)
                .await
            {
                Ok(verdict) => verdict,
                Err(e) => {
                    warn!(index, "batch item failed before producing a result: {:#}", e);
                    Verdict::internal_error(format!("{:#}", e))
                }
            };

            // the shared compile failed: no later item can do better
            if index == 0
                && matches!(
                    verdict.status,
                    VerdictStatus::CompileError | VerdictStatus::CompileTimeout
                )
            {
                info!(status = %verdict.status, "shared compile failed, fanning out verdict");
                return Ok(vec![verdict; configs.len()]);
            }

            verdicts.push(verdict);
        }

        Ok(verdicts)
    }

    async fn run_batch_item(
        &self,
        sandbox: &Sandbox,
        config: &TestConfig,
        first: bool,
        limits: &ResourceLimits,
        deadline: Duration,
    ) -> Result<Verdict> {
        let config_bytes = codec::config_to_bytes(config)?;
        sandbox.upload(CONFIG_FILE, &config_bytes).await?;

        let command = harness_command(sandbox.harness(), limits, !first);
        let outcome = sandbox.exec(&command, deadline).await?;
        let doc = self.fetch_result(sandbox).await;
        Ok(classifier::classify(&outcome, doc))
    }

    /// Download and parse the result document, tolerating its absence (the
    /// classifier turns that into the right status).
    async fn fetch_result(&self, sandbox: &Sandbox) -> Option<codec::ResultDoc> {
        let bytes = match sandbox.download(&format!("/app/{}", RESULT_FILE)).await {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!(container = %sandbox.id(), "no result document: {:#}", e);
                return None;
            }
        };
        match codec::parse_result(&bytes) {
            Ok(doc) => Some(doc),
            Err(e) => {
                warn!(container = %sandbox.id(), "malformed result document: {:#}", e);
                None
            }
        }
    }
}

/// Deadline handed to the sandbox for one harness invocation
fn harness_deadline(limits: &ResourceLimits) -> Duration {
    Duration::from_secs(limits.compile_timeout_s + limits.execution_timeout_s)
}

/// Harness command line: the in-container driver enforces its own compile
/// and execution deadlines; the sandbox outer deadline is the safety net
fn harness_command(harness: &str, limits: &ResourceLimits, run_only: bool) -> Vec<String> {
    let mut command = vec![harness.to_string()];
    if run_only {
        command.push("--run-only".to_string());
    }
    command.push(format!("--compile-timeout-s={}", limits.compile_timeout_s));
    command.push(format!(
        "--execution-timeout-s={}",
        limits.execution_timeout_s
    ));
    command.push(CONFIG_FILE.to_string());
    command.push(RESULT_FILE.to_string());
    command
}
