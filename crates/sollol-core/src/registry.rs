//! Node Registry
//!
//! Single source of truth for the set of Ollama backends and their live
//! state. All mutations are serialized behind a reader-writer lock; readers
//! always observe consistent per-node snapshots.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::node::{Node, NodeId, NodePatch};

/// Thread-safe registry of backend nodes
#[derive(Debug, Default)]
pub struct NodeRegistry {
    nodes: RwLock<HashMap<NodeId, Node>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the registry from a list of node identities
    pub fn seeded(ids: impl IntoIterator<Item = NodeId>) -> Self {
        let registry = Self::new();
        for id in ids {
            registry.insert(Node::new(id));
        }
        registry
    }

    /// Snapshot of every node
    pub fn all(&self) -> Vec<Node> {
        let nodes = self.nodes.read().expect("registry lock poisoned");
        nodes.values().cloned().collect()
    }

    /// Snapshot of nodes eligible for selection
    pub fn available(&self) -> Vec<Node> {
        let nodes = self.nodes.read().expect("registry lock poisoned");
        nodes.values().filter(|n| n.available).cloned().collect()
    }

    /// Look up a single node
    pub fn get(&self, id: &NodeId) -> Option<Node> {
        let nodes = self.nodes.read().expect("registry lock poisoned");
        nodes.get(id).cloned()
    }

    /// Add or replace a node
    pub fn insert(&self, node: Node) {
        let mut nodes = self.nodes.write().expect("registry lock poisoned");
        nodes.insert(node.id.clone(), node);
    }

    /// Remove a node entirely
    pub fn remove(&self, id: &NodeId) -> Option<Node> {
        let mut nodes = self.nodes.write().expect("registry lock poisoned");
        nodes.remove(id)
    }

    /// Merge new telemetry atomically
    pub fn update(&self, id: &NodeId, patch: NodePatch) {
        let mut nodes = self.nodes.write().expect("registry lock poisoned");
        if let Some(node) = nodes.get_mut(id) {
            node.apply(patch);
        }
    }

    /// Take a node out of rotation. It returns to eligible after one
    /// successful probe (see `mark_available`).
    pub fn mark_unavailable(&self, id: &NodeId, reason: &str) {
        let mut nodes = self.nodes.write().expect("registry lock poisoned");
        if let Some(node) = nodes.get_mut(id) {
            if node.available {
                tracing::warn!("Node {} marked unavailable: {}", id, reason);
            }
            node.apply(NodePatch { available: Some(false), ..Default::default() });
        }
    }

    /// Restore a node to rotation
    pub fn mark_available(&self, id: &NodeId) {
        let mut nodes = self.nodes.write().expect("registry lock poisoned");
        if let Some(node) = nodes.get_mut(id) {
            if !node.available {
                tracing::info!("Node {} back in rotation", id);
            }
            node.apply(NodePatch { available: Some(true), ..Default::default() });
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.read().expect("registry lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
