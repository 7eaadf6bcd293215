//! Local Docker runtime
//!
//! bollard-backed implementation of the sandbox contract. Containers are
//! created detached with networking disabled, a CPU quota, and a memory cap,
//! then kept alive with `sleep infinity` so files can be uploaded and the
//! harness executed with `docker exec`. No volume mounts; all file transfer
//! is tar-over-API.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, DownloadFromContainerOptions, KillContainerOptions, LogOutput,
    RemoveContainerOptions, StartContainerOptions, StopContainerOptions, UploadToContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::models::HostConfig;
use bollard::Docker;
use futures_util::StreamExt;
use tracing::{debug, warn};

use crate::types::ResourceLimits;

use super::{ExecOutcome, SandboxRuntime};

/// Working directory inside every sandbox
pub const WORKDIR: &str = "/app";

/// Sandbox runtime backed by the local Docker daemon
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connect to the local Docker daemon
    pub fn connect() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()
            .context("failed to connect to the Docker daemon")?;
        Ok(Self { docker })
    }
}

#[async_trait]
impl SandboxRuntime for DockerRuntime {
    async fn create(&self, image: &str, name: &str, limits: &ResourceLimits) -> Result<()> {
        let config = Config {
            image: Some(image.to_string()),
            cmd: Some(vec!["sleep".to_string(), "infinity".to_string()]),
            working_dir: Some(WORKDIR.to_string()),
            network_disabled: Some(true),
            host_config: Some(HostConfig {
                memory: Some(limits.memory_bytes as i64),
                nano_cpus: Some((limits.cpu_cores * 1_000_000_000.0) as i64),
                privileged: Some(false),
                ..Default::default()
            }),
            ..Default::default()
        };

        self.docker
            .create_container(
                Some(CreateContainerOptions {
                    name,
                    platform: None,
                }),
                config,
            )
            .await
            .with_context(|| format!("failed to create container from {}", image))?;

        self.docker
            .start_container(name, None::<StartContainerOptions<String>>)
            .await
            .with_context(|| format!("failed to start container {}", name))?;

        Ok(())
    }

    async fn upload(&self, name: &str, archive: Vec<u8>) -> Result<()> {
        self.docker
            .upload_to_container(
                name,
                Some(UploadToContainerOptions {
                    path: WORKDIR.to_string(),
                    ..Default::default()
                }),
                archive.into(),
            )
            .await
            .with_context(|| format!("failed to upload archive into {}", name))
    }

    async fn exec(
        &self,
        name: &str,
        command: &[String],
        deadline: Duration,
    ) -> Result<ExecOutcome> {
        let started_at = Instant::now();

        let exec = self
            .docker
            .create_exec(
                name,
                CreateExecOptions {
                    cmd: Some(command.to_vec()),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    working_dir: Some(WORKDIR.to_string()),
                    ..Default::default()
                },
            )
            .await
            .with_context(|| format!("failed to create exec in {}", name))?;

        let mut stdout = String::new();
        let mut stderr = String::new();
        let mut killed_by_deadline = false;

        let started = self
            .docker
            .start_exec(&exec.id, None)
            .await
            .with_context(|| format!("failed to start exec in {}", name))?;

        if let StartExecResults::Attached { mut output, .. } = started {
            let drain = async {
                while let Some(chunk) = output.next().await {
                    match chunk {
                        Ok(LogOutput::StdOut { message }) => {
                            stdout.push_str(&String::from_utf8_lossy(&message));
                        }
                        Ok(LogOutput::StdErr { message }) => {
                            stderr.push_str(&String::from_utf8_lossy(&message));
                        }
                        Ok(_) => {}
                        Err(e) => {
                            warn!(container = %name, "exec stream error: {}", e);
                            break;
                        }
                    }
                }
            };

            if tokio::time::timeout(deadline, drain).await.is_err() {
                killed_by_deadline = true;
                debug!(container = %name, "outer deadline passed, killing container");
                if let Err(e) = self
                    .docker
                    .kill_container(name, None::<KillContainerOptions<String>>)
                    .await
                {
                    warn!(container = %name, "failed to kill container on deadline: {}", e);
                }
            }
        }

        let exit_code = if killed_by_deadline {
            -1
        } else {
            let inspect = self
                .docker
                .inspect_exec(&exec.id)
                .await
                .with_context(|| format!("failed to inspect exec in {}", name))?;
            inspect.exit_code.unwrap_or(-1)
        };

        Ok(ExecOutcome {
            exit_code,
            stdout,
            stderr,
            wall_ms: started_at.elapsed().as_millis() as u64,
            killed_by_deadline,
        })
    }

    async fn download(&self, name: &str, path: &str) -> Result<Vec<u8>> {
        let mut stream = self.docker.download_from_container(
            name,
            Some(DownloadFromContainerOptions {
                path: path.to_string(),
            }),
        );

        let mut archive = Vec::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.with_context(|| format!("failed to download {} from {}", path, name))?;
            archive.extend_from_slice(&chunk);
        }

        super::extract_single(&archive)
            .with_context(|| format!("no file in archive for {} from {}", path, name))
    }

    async fn remove(&self, name: &str) -> Result<()> {
        if let Err(e) = self
            .docker
            .stop_container(name, Some(StopContainerOptions { t: 1 }))
            .await
        {
            debug!(container = %name, "stop before remove failed: {}", e);
        }
        self.docker
            .remove_container(
                name,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await
            .with_context(|| format!("failed to remove container {}", name))
    }
}
