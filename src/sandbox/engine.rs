use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;

use anyhow::anyhow;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::time::timeout;

use crate::config::SandboxConfig;

use super::BuildTree;

// Container resource limits
const CONTAINER_MEMORY: &str = "512m";
const CONTAINER_PIDS_LIMIT: &str = "256";

// Defaults when the config leaves image names and timeouts unset
const DEFAULT_FAST_IMAGE: &str = "soljudge-foundry:latest";
const DEFAULT_SLOW_IMAGE: &str = "ubuntu:24.04";
const DEFAULT_FAST_TIMEOUT_SECS: u64 = 45;
const DEFAULT_SLOW_TIMEOUT_SECS: u64 = 120;

/// Upper bound on building the fast image when it is missing
const IMAGE_BUILD_TIMEOUT: Duration = Duration::from_secs(600);

/// Grace period for draining output pipes after a forced kill
const PIPE_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Dockerfile for the fast-path image, built on demand when the
/// configured tag is absent
const FAST_IMAGE_DOCKERFILE: &str = "FROM ghcr.io/foundry-rs/foundry:latest\n\
USER root\n\
WORKDIR /build\n";

const FAST_PATH_SCRIPT: &str = "forge test -vv";

/// Slow path installs the toolchain inline on a generic base image, which
/// is why it gets the long timeout and keeps network access
const SLOW_PATH_SCRIPT: &str = "apt-get update -q >/dev/null && \
apt-get install -y -q curl git ca-certificates >/dev/null && \
curl -sSfL https://foundry.paradigm.xyz | bash >/dev/null 2>&1 && \
~/.foundry/bin/foundryup >/dev/null 2>&1 && \
~/.foundry/bin/forge test -vv";

/// Which image flavor an execution attempt runs under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageTier {
    Fast,
    Slow,
}

/// Output captured from one containerized run
#[derive(Debug)]
pub struct RawExecutionResult {
    /// Combined stdout and stderr, in capture order per stream
    pub output: String,
    pub exit_code: i32,
}

#[derive(Debug, Error)]
pub enum ExecError {
    /// Wall-clock limit hit; the client process and the container were
    /// force-killed
    #[error("execution timed out after {limit_secs}s")]
    Timeout {
        limit_secs: u64,
        partial_output: String,
    },
    /// The isolation runtime itself failed: daemon unreachable, image
    /// unavailable, container launch failure
    #[error("sandbox infrastructure failure: {0}")]
    Infrastructure(anyhow::Error),
}

/// Runs the reference suite against a provisioned build tree inside
/// Docker
///
/// One engine is shared by every worker. Image readiness is probed once
/// per tier and cached; a nonzero exit from the suite is a normal result,
/// never an error.
pub struct DockerEngine {
    fast_image: String,
    slow_image: String,
    fast_timeout: Duration,
    slow_timeout: Duration,
    image_ready: Mutex<HashMap<ImageTier, bool>>,
}

impl DockerEngine {
    /// Probes for the `docker` binary once at startup. `None` means this
    /// host cannot run isolated verification at all.
    pub fn detect(config: &SandboxConfig) -> Option<Self> {
        let found = std::process::Command::new("which")
            .arg("docker")
            .output()
            .map(|output| output.status.success())
            .unwrap_or(false);

        if !found {
            log::warn!("docker binary not found; sandboxed verification disabled");
            return None;
        }

        log::info!("docker runtime detected, sandboxed verification enabled");
        Some(Self {
            fast_image: config
                .fast_image
                .clone()
                .unwrap_or_else(|| DEFAULT_FAST_IMAGE.to_string()),
            slow_image: config
                .slow_image
                .clone()
                .unwrap_or_else(|| DEFAULT_SLOW_IMAGE.to_string()),
            fast_timeout: Duration::from_secs(
                config.fast_timeout_secs.unwrap_or(DEFAULT_FAST_TIMEOUT_SECS),
            ),
            slow_timeout: Duration::from_secs(
                config.slow_timeout_secs.unwrap_or(DEFAULT_SLOW_TIMEOUT_SECS),
            ),
            image_ready: Mutex::new(HashMap::new()),
        })
    }

    pub fn timeout_for(&self, tier: ImageTier) -> Duration {
        match tier {
            ImageTier::Fast => self.fast_timeout,
            ImageTier::Slow => self.slow_timeout,
        }
    }

    /// Runs the suite for `tree` under the given tier
    pub async fn execute(
        &self,
        tree: &BuildTree,
        tier: ImageTier,
    ) -> Result<RawExecutionResult, ExecError> {
        self.ensure_image(tier).await?;

        let container = tree.container_name();
        let mount = format!("{}:/build", tree.root().display());

        let mut cmd = Command::new("docker");
        cmd.args([
            "run",
            "--rm",
            "--name",
            &container,
            "--memory",
            CONTAINER_MEMORY,
            "--memory-swap",
            CONTAINER_MEMORY,
            "--pids-limit",
            CONTAINER_PIDS_LIMIT,
            "--security-opt",
            "no-new-privileges",
            "-v",
            &mount,
            "-w",
            "/build",
            "-e",
            "NO_COLOR=1",
            "-e",
            "FOUNDRY_DISABLE_NIGHTLY_WARNING=1",
        ]);

        match tier {
            ImageTier::Fast => {
                // The toolchain is baked in, so the run needs no network
                cmd.args(["--net", "none", "--entrypoint", "/bin/sh"]);
                cmd.args([self.fast_image.as_str(), "-c", FAST_PATH_SCRIPT]);
            }
            ImageTier::Slow => {
                // Inline toolchain install needs the network
                cmd.args(["--entrypoint", "/bin/sh"]);
                cmd.args([self.slow_image.as_str(), "-c", SLOW_PATH_SCRIPT]);
            }
        }

        let raw = run_captured(cmd, self.timeout_for(tier), &container).await?;

        // 125/126/127 come from the docker client itself, not from the
        // test suite; a daemon outage reports through stderr
        if matches!(raw.exit_code, 125 | 126 | 127)
            || raw.output.contains("Cannot connect to the Docker daemon")
        {
            return Err(ExecError::Infrastructure(anyhow!(
                "container launch failed (exit {}): {}",
                raw.exit_code,
                truncate(&raw.output, 2000)
            )));
        }

        Ok(raw)
    }

    /// Ensures the tier's image can be used; the fast image is built from
    /// the embedded Dockerfile on first use if the tag is absent. The
    /// outcome is cached so later submissions skip the probe.
    async fn ensure_image(&self, tier: ImageTier) -> Result<(), ExecError> {
        if let Some(&ready) = self.image_ready.lock().get(&tier) {
            return if ready {
                Ok(())
            } else {
                Err(ExecError::Infrastructure(anyhow!(
                    "image for {tier:?} tier was previously found unusable"
                )))
            };
        }

        let outcome = match tier {
            ImageTier::Fast => self.ensure_fast_image().await,
            // The generic image is pulled by `docker run` itself; launch
            // failures surface as infrastructure errors there
            ImageTier::Slow => Ok(()),
        };

        self.image_ready.lock().insert(tier, outcome.is_ok());
        outcome
    }

    async fn ensure_fast_image(&self) -> Result<(), ExecError> {
        if self.image_exists(&self.fast_image).await? {
            log::debug!("fast image {} already present", self.fast_image);
            return Ok(());
        }

        log::info!(
            "fast image {} missing, building from embedded Dockerfile",
            self.fast_image
        );
        self.build_fast_image().await
    }

    async fn image_exists(&self, image: &str) -> Result<bool, ExecError> {
        let status = Command::new("docker")
            .args(["image", "inspect", image])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| {
                ExecError::Infrastructure(anyhow!("failed to run docker image inspect: {e}"))
            })?;
        Ok(status.success())
    }

    async fn build_fast_image(&self) -> Result<(), ExecError> {
        let mut cmd = Command::new("docker");
        cmd.args(["build", "-t", &self.fast_image, "-"])
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| ExecError::Infrastructure(anyhow!("failed to spawn docker build: {e}")))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(FAST_IMAGE_DOCKERFILE.as_bytes())
                .await
                .map_err(|e| {
                    ExecError::Infrastructure(anyhow!("failed to feed Dockerfile: {e}"))
                })?;
            // Dropping stdin closes the pipe so docker sees EOF
        }

        match timeout(IMAGE_BUILD_TIMEOUT, child.wait_with_output()).await {
            Ok(Ok(output)) if output.status.success() => {
                log::info!("built fast image {}", self.fast_image);
                Ok(())
            }
            Ok(Ok(output)) => Err(ExecError::Infrastructure(anyhow!(
                "docker build failed: {}",
                truncate(&String::from_utf8_lossy(&output.stderr), 2000)
            ))),
            Ok(Err(e)) => Err(ExecError::Infrastructure(anyhow!(
                "failed waiting for docker build: {e}"
            ))),
            Err(_) => Err(ExecError::Infrastructure(anyhow!(
                "docker build timed out after {}s",
                IMAGE_BUILD_TIMEOUT.as_secs()
            ))),
        }
    }
}

/// Spawns the command with piped output, enforcing the wall-clock limit.
///
/// On timeout the client process is killed, the container is killed by
/// name, and whatever output was captured so far is returned with the
/// error.
async fn run_captured(
    mut cmd: Command,
    limit: Duration,
    container: &str,
) -> Result<RawExecutionResult, ExecError> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    cmd.kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .map_err(|e| ExecError::Infrastructure(anyhow!("failed to launch container: {e}")))?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| ExecError::Infrastructure(anyhow!("child stdout not captured")))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| ExecError::Infrastructure(anyhow!("child stderr not captured")))?;

    let out_task = tokio::spawn(read_to_string_lossy(stdout));
    let err_task = tokio::spawn(read_to_string_lossy(stderr));

    match timeout(limit, child.wait()).await {
        Ok(Ok(status)) => {
            let mut output = out_task.await.unwrap_or_default();
            output.push_str(&err_task.await.unwrap_or_default());
            Ok(RawExecutionResult {
                output,
                exit_code: status.code().unwrap_or(-1),
            })
        }
        Ok(Err(e)) => Err(ExecError::Infrastructure(anyhow!(
            "failed waiting for container: {e}"
        ))),
        Err(_) => {
            let _ = child.kill().await;
            force_kill_container(container).await;

            let mut partial = String::new();
            if let Ok(Ok(out)) = timeout(PIPE_DRAIN_TIMEOUT, out_task).await {
                partial.push_str(&out);
            }
            if let Ok(Ok(err)) = timeout(PIPE_DRAIN_TIMEOUT, err_task).await {
                partial.push_str(&err);
            }

            Err(ExecError::Timeout {
                limit_secs: limit.as_secs(),
                partial_output: partial,
            })
        }
    }
}

async fn read_to_string_lossy(mut reader: impl AsyncRead + Unpin) -> String {
    let mut buf = Vec::new();
    let _ = reader.read_to_end(&mut buf).await;
    String::from_utf8_lossy(&buf).into_owned()
}

/// Killing the docker client alone can leave the container running; kill
/// it by name so a timed-out run cannot linger.
async fn force_kill_container(name: &str) {
    match Command::new("docker").args(["kill", name]).output().await {
        Ok(output) if output.status.success() => log::debug!("killed container {name}"),
        Ok(_) => log::debug!("container {name} already gone"),
        Err(e) => log::warn!("failed to run docker kill for {name}: {e}"),
    }
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("hello", 3), "hel");
        assert_eq!(truncate("héllo", 2), "hé");
    }

    #[test]
    fn timeout_error_reports_limit() {
        let err = ExecError::Timeout {
            limit_secs: 45,
            partial_output: String::new(),
        };
        assert!(err.to_string().contains("45s"));
    }
}
