//! # sollol-runtime
//!
//! Concrete runtime for the SOLLOL routing core: the pieces that touch the
//! network and the process table.
//!
//! ## Implementations
//!
//! - **HttpNodeClient**: Ollama wire-protocol client for pool nodes
//! - **HttpCoordinatorClient**: llama.cpp dialect client for the coordinator
//! - **LlamaServerLauncher**: spawns and manages the coordinator process
//! - **OllamaGgufResolver**: maps model names to local GGUF blobs
//!
//! ## Usage
//!
//! ```rust,ignore
//! use sollol_runtime::{HttpNodeClient, OllamaGgufResolver};
//!
//! let client = Arc::new(HttpNodeClient::new());
//! let resolver = Arc::new(OllamaGgufResolver::new());
//! ```

pub mod coordinator_client;
pub mod gguf;
pub mod node_client;
pub mod process;

pub use coordinator_client::HttpCoordinatorClient;
pub use gguf::OllamaGgufResolver;
pub use node_client::HttpNodeClient;
pub use process::{LlamaServerLauncher, LlamaServerProcess};

// Re-export core types for convenience
pub use sollol_core::{
    GatewayError, HybridRouter, NodeClient, NodeId, NodeRegistry, Result,
};
