//! Sandbox manager - isolated execution contexts
//!
//! This module provides scoped acquisition of resource-capped, network-less
//! containers. It handles:
//! - Container lifecycle (create detached, stop, remove)
//! - File transfer via in-memory tar archives
//! - Command execution under an outer wall deadline
//! - Guaranteed release on every exit path, including panic and cancellation
//!
//! The sandbox module does NOT:
//! - Interpret verdicts (that's the classifier's job)
//! - Know about configuration documents or the harness protocol

pub mod docker;
pub mod remote;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::JudgeConfig;
use crate::languages::LanguageRegistry;
use crate::types::{Language, ResourceLimits};

pub use docker::DockerRuntime;
pub use remote::SshDockerRuntime;

/// Raw outcome of one command executed inside a sandbox
#[derive(Debug, Clone, Default)]
pub struct ExecOutcome {
    pub exit_code: i64,
    pub stdout: String,
    pub stderr: String,
    pub wall_ms: u64,
    /// The manager killed the container because the outer deadline passed
    pub killed_by_deadline: bool,
}

/// Backend that hosts sandboxes; local Docker daemon or a remote one
/// reached over SSH. Both present the identical contract.
#[async_trait]
pub trait SandboxRuntime: Send + Sync {
    /// Start a detached, network-less, resource-capped container
    async fn create(&self, image: &str, name: &str, limits: &ResourceLimits) -> Result<()>;

    /// Unpack a tar archive into the container workdir `/app`
    async fn upload(&self, name: &str, archive: Vec<u8>) -> Result<()>;

    /// Run a command in `/app`; kill the container when `deadline` passes
    async fn exec(&self, name: &str, command: &[String], deadline: Duration)
        -> Result<ExecOutcome>;

    /// Fetch a single file out of the container
    async fn download(&self, name: &str, path: &str) -> Result<Vec<u8>>;

    /// Stop and remove the container; idempotent
    async fn remove(&self, name: &str) -> Result<()>;
}

/// Build an in-memory tar archive holding one regular file
pub(crate) fn archive_file(name: &str, bytes: &[u8]) -> Result<Vec<u8>> {
    let mut builder = tar::Builder::new(Vec::new());
    let mut header = tar::Header::new_gnu();
    header.set_size(bytes.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder
        .append_data(&mut header, name, bytes)
        .with_context(|| format!("failed to archive {}", name))?;
    builder.into_inner().context("failed to finish tar archive")
}

/// Extract the first regular file from a tar archive
pub(crate) fn extract_single(archive: &[u8]) -> Result<Vec<u8>> {
    let mut reader = tar::Archive::new(archive);
    for entry in reader.entries().context("failed to read tar archive")? {
        let mut entry = entry?;
        if entry.header().entry_type().is_file() {
            let mut bytes = Vec::new();
            std::io::Read::read_to_end(&mut entry, &mut bytes)?;
            return Ok(bytes);
        }
    }
    anyhow::bail!("archive contains no regular file")
}

/// Owner of the sandbox pool. Acquisition is gated by a semaphore sized to
/// the configured concurrency bound; queued callers wait.
pub struct SandboxManager {
    runtime: Arc<dyn SandboxRuntime>,
    registry: LanguageRegistry,
    margin: Duration,
    permits: Arc<Semaphore>,
}

impl SandboxManager {
    pub fn new(
        runtime: Arc<dyn SandboxRuntime>,
        registry: LanguageRegistry,
        config: &JudgeConfig,
    ) -> Self {
        Self {
            runtime,
            registry,
            margin: Duration::from_millis(config.deadline_margin_ms),
            permits: Arc::new(Semaphore::new(config.max_concurrent_sandboxes)),
        }
    }

    /// Construct a manager from configuration: local Docker by default, the
    /// SSH-proxied runtime when an endpoint is configured
    pub fn from_config(registry: LanguageRegistry, config: &JudgeConfig) -> Result<Self> {
        let runtime: Arc<dyn SandboxRuntime> = match &config.ssh_endpoint {
            Some(endpoint) => Arc::new(SshDockerRuntime::new(endpoint.clone())),
            None => Arc::new(DockerRuntime::connect()?),
        };
        Ok(Self::new(runtime, registry, config))
    }

    /// Safety margin added to harness deadlines
    pub fn margin(&self) -> Duration {
        self.margin
    }

    /// Acquire a sandbox for a language under the given limits. Blocks while
    /// the pool is at capacity.
    pub async fn acquire(&self, language: Language, limits: &ResourceLimits) -> Result<Sandbox> {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .context("sandbox pool closed")?;

        let spec = self.registry.get(language)?;
        let id = format!("judge-{}", Uuid::new_v4());

        debug!(container = %id, image = %spec.image, "creating sandbox");
        self.runtime
            .create(&spec.image, &id, limits)
            .await
            .with_context(|| format!("failed to create sandbox for {}", language))?;
        info!(container = %id, %language, "sandbox acquired");

        Ok(Sandbox {
            id,
            harness: spec.harness.clone(),
            source_file: spec.source_file.clone(),
            runtime: Arc::clone(&self.runtime),
            permit: Some(permit),
            released: false,
        })
    }
}

/// Scoped handle to one isolated execution context. Dropping an unreleased
/// handle spawns the teardown so containers never leak, but the orchestrator
/// calls [`Sandbox::release`] explicitly so errors are observable.
pub struct Sandbox {
    id: String,
    harness: String,
    source_file: String,
    runtime: Arc<dyn SandboxRuntime>,
    permit: Option<OwnedSemaphorePermit>,
    released: bool,
}

impl Sandbox {
    /// Container identity, used for logging
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Harness executable shipped in this sandbox's image
    pub fn harness(&self) -> &str {
        &self.harness
    }

    /// File name the user source is uploaded under
    pub fn source_file(&self) -> &str {
        &self.source_file
    }

    /// Upload one file into the sandbox workdir
    pub async fn upload(&self, name: &str, bytes: &[u8]) -> Result<()> {
        let archive = archive_file(name, bytes)?;
        self.runtime
            .upload(&self.id, archive)
            .await
            .with_context(|| format!("failed to upload {} into {}", name, self.id))
    }

    /// Execute a command in the sandbox under an outer wall deadline
    pub async fn exec(&self, command: &[String], deadline: Duration) -> Result<ExecOutcome> {
        self.runtime.exec(&self.id, command, deadline).await
    }

    /// Download a file from the sandbox
    pub async fn download(&self, path: &str) -> Result<Vec<u8>> {
        self.runtime.download(&self.id, path).await
    }

    /// Stop and remove the container, returning teardown errors
    pub async fn release(mut self) -> Result<()> {
        self.released = true;
        let result = self.runtime.remove(&self.id).await;
        self.permit.take();
        info!(container = %self.id, "sandbox released");
        result
    }
}

impl Drop for Sandbox {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let runtime = Arc::clone(&self.runtime);
        let id = self.id.clone();
        let permit = self.permit.take();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!(container = %id, "sandbox dropped without release, cleaning up");
                handle.spawn(async move {
                    if let Err(e) = runtime.remove(&id).await {
                        warn!(container = %id, "background sandbox cleanup failed: {:#}", e);
                    }
                    drop(permit);
                });
            }
            Err(_) => {
                warn!(container = %id, "sandbox dropped outside a runtime, container may leak");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_archive_round_trip() {
        let archive = archive_file("config.json", b"{\"a\": 1}").unwrap();
        let bytes = extract_single(&archive).unwrap();
        assert_eq!(bytes, b"{\"a\": 1}");
    }

    #[test]
    fn test_extract_single_rejects_empty_archive() {
        let builder = tar::Builder::new(Vec::new());
        let empty = builder.into_inner().unwrap();
        assert!(extract_single(&empty).is_err());
    }
}
