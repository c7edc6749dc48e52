//! Application State

use std::sync::Arc;

use sollol_core::{
    CoordinatorManager, HealthMonitor, HybridRouter, LearningStore, NodeRegistry,
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Top-level routing policy
    pub router: Arc<HybridRouter>,

    /// Backend node pool
    pub registry: Arc<NodeRegistry>,

    /// VRAM-exhaustion monitor
    pub health: Arc<HealthMonitor>,

    /// Observed-duration store
    pub learning: Arc<LearningStore>,

    /// Sharding coordinator, when RPC backends are configured
    pub coordinator: Option<Arc<CoordinatorManager>>,
}
