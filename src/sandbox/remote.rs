//! Remote Docker runtime over SSH
//!
//! Proxies the sandbox contract to a Docker daemon on another host by
//! shelling out to `ssh <endpoint> docker ...`. The public contract is
//! identical to the local runtime; file transfer rides `docker cp` tar
//! streams over the SSH channel.

use std::process::Stdio;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::types::ResourceLimits;

use super::{ExecOutcome, SandboxRuntime};

/// Sandbox runtime on a remote host reached over SSH
pub struct SshDockerRuntime {
    /// `user@host` target passed to ssh
    endpoint: String,
}

impl SshDockerRuntime {
    pub fn new(endpoint: String) -> Self {
        Self { endpoint }
    }

    fn ssh(&self) -> Command {
        let mut cmd = Command::new("ssh");
        cmd.arg("-o")
            .arg("BatchMode=yes")
            .arg(&self.endpoint)
            .arg("docker");
        cmd
    }

    async fn run(&self, mut cmd: Command, what: &str) -> Result<std::process::Output> {
        let output = cmd
            .stdin(Stdio::null())
            .output()
            .await
            .with_context(|| format!("failed to run ssh for {}", what))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("remote {} failed: {}", what, stderr.trim());
        }
        Ok(output)
    }
}

/// Quote an argument for the remote shell that ssh interposes
fn shell_quote(arg: &str) -> String {
    if !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:".contains(c))
    {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

#[async_trait]
impl SandboxRuntime for SshDockerRuntime {
    async fn create(&self, image: &str, name: &str, limits: &ResourceLimits) -> Result<()> {
        let mut cmd = self.ssh();
        cmd.args([
            "run",
            "-d",
            "--network",
            "none",
            "--memory",
            &limits.memory_bytes.to_string(),
            "--cpus",
            &limits.cpu_cores.to_string(),
            "--workdir",
            super::docker::WORKDIR,
            "--name",
        ]);
        cmd.arg(shell_quote(name));
        cmd.arg(shell_quote(image));
        cmd.args(["sleep", "infinity"]);
        self.run(cmd, "container create").await?;
        Ok(())
    }

    async fn upload(&self, name: &str, archive: Vec<u8>) -> Result<()> {
        let mut cmd = self.ssh();
        cmd.args(["cp", "-"]);
        cmd.arg(format!("{}:{}", shell_quote(name), super::docker::WORKDIR));

        let mut child = cmd
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .context("failed to spawn ssh for upload")?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(&archive)
                .await
                .context("failed to stream archive over ssh")?;
        }

        let output = child
            .wait_with_output()
            .await
            .context("failed to wait for remote upload")?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("remote upload failed: {}", stderr.trim());
        }
        Ok(())
    }

    async fn exec(
        &self,
        name: &str,
        command: &[String],
        deadline: Duration,
    ) -> Result<ExecOutcome> {
        let started_at = Instant::now();

        let mut cmd = self.ssh();
        cmd.args(["exec", "-w", super::docker::WORKDIR]);
        cmd.arg(shell_quote(name));
        for arg in command {
            cmd.arg(shell_quote(arg));
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd.spawn().context("failed to spawn ssh for exec")?;

        match tokio::time::timeout(deadline, child.wait_with_output()).await {
            Ok(output) => {
                let output = output.context("failed to wait for remote exec")?;
                Ok(ExecOutcome {
                    exit_code: output.status.code().unwrap_or(-1) as i64,
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                    wall_ms: started_at.elapsed().as_millis() as u64,
                    killed_by_deadline: false,
                })
            }
            Err(_) => {
                debug!(container = %name, "outer deadline passed, killing remote container");
                let mut kill = self.ssh();
                kill.arg("kill").arg(shell_quote(name));
                if let Err(e) = self.run(kill, "container kill").await {
                    warn!(container = %name, "remote kill failed: {:#}", e);
                }
                Ok(ExecOutcome {
                    exit_code: -1,
                    stdout: String::new(),
                    stderr: String::new(),
                    wall_ms: started_at.elapsed().as_millis() as u64,
                    killed_by_deadline: true,
                })
            }
        }
    }

    async fn download(&self, name: &str, path: &str) -> Result<Vec<u8>> {
        let mut cmd = self.ssh();
        cmd.arg("cp");
        cmd.arg(format!("{}:{}", shell_quote(name), shell_quote(path)));
        cmd.arg("-");
        let output = self.run(cmd, "file download").await?;
        super::extract_single(&output.stdout)
            .with_context(|| format!("no file in remote archive for {}", path))
    }

    async fn remove(&self, name: &str) -> Result<()> {
        let mut cmd = self.ssh();
        cmd.args(["rm", "-f"]);
        cmd.arg(shell_quote(name));
        self.run(cmd, "container remove").await?;
        Ok(())
    }
}
