//! # sollol-core
//!
//! Routing and resource-management core for the SOLLOL inference gateway:
//! an Ollama-compatible front that decides, per request, where and how each
//! inference runs.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                        HybridRouter                            │
//! │  ┌──────────┐  ┌────────┐  ┌──────────────┐  ┌─────────────┐  │
//! │  │ Analyzer │──│ Scorer │──│ NodeRegistry │  │ Coordinator │  │
//! │  └──────────┘  └────────┘  └──────────────┘  │   Manager   │  │
//! │       │      ┌────────────┐ ┌─────────────┐  └─────────────┘  │
//! │       └──────│ ModelCatalog│ │HealthMonitor│  LearningStore   │
//! │              └────────────┘ └─────────────┘                   │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Two distribution modes coexist: independent requests fan out across a
//! pool of Ollama nodes (task distribution), while models too large for one
//! node go through a llama.cpp coordinator that shards them across RPC
//! backends (model sharding). All I/O sits behind the `NodeClient`,
//! `CoordinatorClient`, `ProcessLauncher` and `GgufResolver` traits so the
//! core can be exercised without a network or a process table.

pub mod adaptive;
pub mod analyzer;
pub mod catalog;
pub mod client;
pub mod coordinator;
pub mod error;
pub mod health;
pub mod learning;
pub mod node;
pub mod payload;
pub mod process;
pub mod registry;
pub mod router;
pub mod scorer;

pub use adaptive::{AdaptiveConfig, AdaptiveLoop};
pub use analyzer::{Complexity, RequestAnalyzer, TaskContext, TaskType};
pub use catalog::{ModelCatalog, ModelProfile, normalize_model_name};
pub use client::{CoordinatorClient, NodeClient, NodeProbe};
pub use coordinator::{
    CoordinatorConfig, CoordinatorManager, CoordinatorSnapshot, CoordinatorStatus,
};
pub use error::{GatewayError, Result};
pub use health::{HealthMonitor, HealthStats};
pub use learning::{LearningStats, LearningStore};
pub use node::{Node, NodeId, NodePatch};
pub use payload::{ChatMessage, EmbedInput, InferencePayload};
pub use process::{GgufResolver, LaunchSpec, ManagedProcess, ProcessLauncher, RpcBackend};
pub use registry::NodeRegistry;
pub use router::{CoordinatorHandle, HybridRouter, RouterConfig};
pub use scorer::{RouteTarget, RoutingDecision, Scorer};
