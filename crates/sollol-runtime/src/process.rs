//! Coordinator Process Management
//!
//! Launches `llama-server` as the sharding coordinator and manages its
//! lifecycle: readiness polling against `/health`, graceful SIGTERM stop
//! with a SIGKILL fallback, and kill-on-drop so a crashed gateway never
//! leaks a coordinator.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tokio::time::Instant;

use sollol_core::{GatewayError, LaunchSpec, ManagedProcess, ProcessLauncher, Result};

/// Poll cadence while waiting for readiness or graceful exit
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Per-poll bound on the readiness probe
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Launches the llama.cpp coordinator binary
#[derive(Clone, Debug)]
pub struct LlamaServerLauncher {
    binary: PathBuf,
    http: reqwest::Client,
}

impl Default for LlamaServerLauncher {
    fn default() -> Self {
        Self::new()
    }
}

impl LlamaServerLauncher {
    pub fn new() -> Self {
        Self { binary: PathBuf::from("llama-server"), http: reqwest::Client::new() }
    }

    /// Use an explicit binary path instead of resolving from PATH
    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self { binary: binary.into(), http: reqwest::Client::new() }
    }
}

#[async_trait]
impl ProcessLauncher for LlamaServerLauncher {
    async fn launch(&self, spec: &LaunchSpec) -> Result<Box<dyn ManagedProcess>> {
        tracing::info!(
            "Launching {} --model {} --host {} --port {} --rpc {} --gpu-layers {} --ctx-size {}",
            self.binary.display(),
            spec.model_path.display(),
            spec.host,
            spec.port,
            spec.rpc_csv(),
            spec.gpu_layers,
            spec.ctx_size
        );

        let child = Command::new(&self.binary)
            .arg("--model")
            .arg(&spec.model_path)
            .arg("--host")
            .arg(&spec.host)
            .arg("--port")
            .arg(spec.port.to_string())
            .arg("--rpc")
            .arg(spec.rpc_csv())
            .arg("--gpu-layers")
            .arg(spec.gpu_layers.to_string())
            .arg("--ctx-size")
            .arg(spec.ctx_size.to_string())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        Ok(Box::new(LlamaServerProcess {
            child,
            health_url: format!("http://{}/health", spec.endpoint()),
            http: self.http.clone(),
        }))
    }
}

/// A running coordinator process
pub struct LlamaServerProcess {
    child: Child,
    health_url: String,
    http: reqwest::Client,
}

impl LlamaServerProcess {
    /// Check whether the process exited; `Some` carries the exit status text
    fn exited(&mut self) -> Option<String> {
        match self.child.try_wait() {
            Ok(Some(status)) => Some(status.to_string()),
            Ok(None) => None,
            Err(e) => Some(format!("unpollable: {e}")),
        }
    }
}

#[async_trait]
impl ManagedProcess for LlamaServerProcess {
    async fn wait_ready(&mut self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;

        loop {
            if let Ok(response) = self
                .http
                .get(&self.health_url)
                .timeout(PROBE_TIMEOUT)
                .send()
                .await
            {
                if response.status().is_success() {
                    return Ok(());
                }
            }

            if let Some(status) = self.exited() {
                return Err(GatewayError::CoordinatorUnavailable(format!(
                    "coordinator exited during startup ({status})"
                )));
            }

            if Instant::now() >= deadline {
                return Err(GatewayError::UpstreamTimeout(format!(
                    "no healthy response from {} within {timeout:?}",
                    self.health_url
                )));
            }

            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn terminate(&mut self, timeout: Duration) -> Result<()> {
        #[cfg(unix)]
        {
            use nix::sys::signal::{Signal, kill};
            use nix::unistd::Pid;

            if let Some(pid) = self.child.id() {
                let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);

                let deadline = Instant::now() + timeout;
                while Instant::now() < deadline {
                    if self.exited().is_some() {
                        tracing::info!("Coordinator exited gracefully");
                        return Ok(());
                    }
                    tokio::time::sleep(Duration::from_millis(250)).await;
                }
                tracing::warn!("Coordinator ignored SIGTERM for {timeout:?}, killing");
            }
        }
        #[cfg(not(unix))]
        let _ = timeout;

        self.kill().await
    }

    async fn kill(&mut self) -> Result<()> {
        self.child.kill().await?;
        Ok(())
    }
}
