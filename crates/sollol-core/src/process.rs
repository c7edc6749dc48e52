//! Process Management Seams
//!
//! The coordinator manager is the only caller of these traits: launching the
//! llama.cpp coordinator binary, gating on its readiness probe, and stopping
//! it on model switch or shutdown. GGUF resolution from the local Ollama
//! blob store sits behind its own trait for the same reason.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, Result};

/// One RPC worker backend hosting a slice of a sharded model
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcBackend {
    pub host: String,
    pub port: u16,
}

impl RpcBackend {
    pub const DEFAULT_PORT: u16 = 50052;

    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self { host: host.into(), port }
    }
}

impl std::fmt::Display for RpcBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl std::str::FromStr for RpcBackend {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(GatewayError::Config("empty RPC backend address".into()));
        }
        match s.rsplit_once(':') {
            Some((host, port)) => {
                let port = port.parse::<u16>().map_err(|_| {
                    GatewayError::Config(format!("invalid port in RPC backend '{s}'"))
                })?;
                Ok(Self::new(host, port))
            }
            None => Ok(Self::new(s, Self::DEFAULT_PORT)),
        }
    }
}

/// Parameters for one coordinator launch
#[derive(Clone, Debug)]
pub struct LaunchSpec {
    /// Path to the resolved .gguf file
    pub model_path: PathBuf,

    /// Bind host for the coordinator's HTTP API
    pub host: String,

    /// Bind port for the coordinator's HTTP API
    pub port: u16,

    /// RPC worker backends the model is sharded across
    pub rpc_backends: Vec<RpcBackend>,

    /// GPU-layer offload hint
    pub gpu_layers: u32,

    /// Context window size
    pub ctx_size: u32,
}

impl LaunchSpec {
    /// Comma-joined `host:port` list for the coordinator's `--rpc` flag
    pub fn rpc_csv(&self) -> String {
        self.rpc_backends
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Handle to a launched coordinator process
#[async_trait]
pub trait ManagedProcess: Send {
    /// Poll the readiness endpoint until healthy or the timeout elapses
    async fn wait_ready(&mut self, timeout: Duration) -> Result<()>;

    /// Signal stop and wait for graceful exit; kill after the timeout
    async fn terminate(&mut self, timeout: Duration) -> Result<()>;

    /// Force-kill immediately
    async fn kill(&mut self) -> Result<()>;
}

/// Launches coordinator processes
#[async_trait]
pub trait ProcessLauncher: Send + Sync {
    async fn launch(&self, spec: &LaunchSpec) -> Result<Box<dyn ManagedProcess>>;
}

/// Resolves Ollama model names to on-disk GGUF paths
#[async_trait]
pub trait GgufResolver: Send + Sync {
    /// `Ok(None)` means the model is not present in the local store
    async fn resolve(&self, model: &str) -> Result<Option<PathBuf>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_rpc_backend_parse() {
        let backend = RpcBackend::from_str("10.0.0.1:50052").unwrap();
        assert_eq!(backend.host, "10.0.0.1");
        assert_eq!(backend.port, 50052);

        // Bare host gets the default RPC port
        let backend = RpcBackend::from_str("worker-2").unwrap();
        assert_eq!(backend.port, RpcBackend::DEFAULT_PORT);

        assert!(RpcBackend::from_str("").is_err());
    }

    #[test]
    fn test_rpc_csv() {
        let spec = LaunchSpec {
            model_path: PathBuf::from("/blobs/sha256-abc"),
            host: "127.0.0.1".into(),
            port: 8080,
            rpc_backends: vec![
                RpcBackend::new("10.0.0.1", 50052),
                RpcBackend::new("10.0.0.2", 50052),
            ],
            gpu_layers: 99,
            ctx_size: 8192,
        };
        assert_eq!(spec.rpc_csv(), "10.0.0.1:50052,10.0.0.2:50052");
        assert_eq!(spec.endpoint(), "127.0.0.1:8080");
    }
}
