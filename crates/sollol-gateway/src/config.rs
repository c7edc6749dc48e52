//! Gateway Configuration
//!
//! Typed view over the environment. Invalid values are configuration
//! errors (exit code 2), never silently defaulted.

use std::time::Duration;

use sollol_core::{GatewayError, NodeId, Result, RpcBackend};

/// Standard Ollama port; SOLLOL is a drop-in replacement
const DEFAULT_PORT: u16 = 11434;

const DEFAULT_ADAPTIVE_INTERVAL_SECS: u64 = 30;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

/// Gateway configuration, read once at startup
#[derive(Clone, Debug)]
pub struct GatewayConfig {
    /// Bind port (`PORT`)
    pub port: u16,

    /// Seed nodes for task distribution (`OLLAMA_NODES`)
    pub ollama_nodes: Vec<NodeId>,

    /// RPC backends enabling model sharding (`RPC_BACKENDS`)
    pub rpc_backends: Vec<RpcBackend>,

    /// AdaptiveLoop cadence (`SOLLOL_ADAPTIVE_INTERVAL_SECONDS`)
    pub adaptive_interval: Duration,

    /// Inbound request budget
    pub request_timeout: Duration,

    /// Compute-side integrations, orthogonal to routing
    pub enable_ray: bool,
    pub enable_dask: bool,
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Parse from an arbitrary variable lookup (tests inject a map)
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let port = match lookup("PORT") {
            Some(raw) => raw
                .parse::<u16>()
                .map_err(|_| GatewayError::Config(format!("invalid PORT '{raw}'")))?,
            None => DEFAULT_PORT,
        };

        let ollama_nodes = parse_list::<NodeId>(lookup("OLLAMA_NODES").as_deref())?;
        let rpc_backends = parse_list::<RpcBackend>(lookup("RPC_BACKENDS").as_deref())?;

        let adaptive_interval = match lookup("SOLLOL_ADAPTIVE_INTERVAL_SECONDS") {
            Some(raw) => {
                let secs = raw.parse::<u64>().map_err(|_| {
                    GatewayError::Config(format!(
                        "invalid SOLLOL_ADAPTIVE_INTERVAL_SECONDS '{raw}'"
                    ))
                })?;
                if secs == 0 {
                    return Err(GatewayError::Config(
                        "SOLLOL_ADAPTIVE_INTERVAL_SECONDS must be positive".into(),
                    ));
                }
                Duration::from_secs(secs)
            }
            None => Duration::from_secs(DEFAULT_ADAPTIVE_INTERVAL_SECS),
        };

        Ok(Self {
            port,
            ollama_nodes,
            rpc_backends,
            adaptive_interval,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            enable_ray: parse_flag(lookup("SOLLOL_ENABLE_RAY").as_deref()),
            enable_dask: parse_flag(lookup("SOLLOL_ENABLE_DASK").as_deref()),
        })
    }

    /// Whether model sharding is configured
    pub fn sharding_enabled(&self) -> bool {
        !self.rpc_backends.is_empty()
    }
}

fn parse_list<T: std::str::FromStr<Err = GatewayError>>(raw: Option<&str>) -> Result<Vec<T>> {
    raw.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::parse)
        .collect()
}

fn parse_flag(raw: Option<&str>) -> bool {
    matches!(
        raw.map(|v| v.trim().to_lowercase()).as_deref(),
        Some("1" | "true" | "yes" | "on")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<GatewayConfig> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        GatewayConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.port, DEFAULT_PORT);
        assert!(cfg.ollama_nodes.is_empty());
        assert!(!cfg.sharding_enabled());
        assert_eq!(cfg.adaptive_interval, Duration::from_secs(30));
        assert!(!cfg.enable_ray);
    }

    #[test]
    fn test_node_and_rpc_lists() {
        let cfg = config(&[
            ("OLLAMA_NODES", "10.0.0.1:11434, 10.0.0.2"),
            ("RPC_BACKENDS", "10.0.0.1:50052,10.0.0.2:50052"),
        ])
        .unwrap();

        assert_eq!(cfg.ollama_nodes.len(), 2);
        // Bare host picked up the default Ollama port
        assert_eq!(cfg.ollama_nodes[1].port, 11434);
        assert_eq!(cfg.rpc_backends.len(), 2);
        assert!(cfg.sharding_enabled());
    }

    #[test]
    fn test_invalid_values_are_config_errors() {
        assert_eq!(config(&[("PORT", "eleven")]).unwrap_err().kind(), "config");
        assert_eq!(
            config(&[("SOLLOL_ADAPTIVE_INTERVAL_SECONDS", "0")]).unwrap_err().kind(),
            "config"
        );
        assert_eq!(
            config(&[("OLLAMA_NODES", "host:badport")]).unwrap_err().kind(),
            "config"
        );
    }

    #[test]
    fn test_flags() {
        let cfg = config(&[("SOLLOL_ENABLE_RAY", "true"), ("SOLLOL_ENABLE_DASK", "0")]).unwrap();
        assert!(cfg.enable_ray);
        assert!(!cfg.enable_dask);
    }
}
