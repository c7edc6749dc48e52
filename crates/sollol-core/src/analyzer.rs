//! Request Analyzer
//!
//! Turns an inbound payload into a task context: task type, estimated
//! complexity, model profile, priority and GPU requirement.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::catalog::{ModelCatalog, ModelProfile};
use crate::payload::InferencePayload;

/// Kind of work a request represents
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Generation,
    Chat,
    Embedding,
    Classification,
    Summarization,
    Unknown,
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TaskType::Generation => "generation",
            TaskType::Chat => "chat",
            TaskType::Embedding => "embedding",
            TaskType::Classification => "classification",
            TaskType::Summarization => "summarization",
            TaskType::Unknown => "unknown",
        };
        write!(f, "{name}")
    }
}

/// Estimated request weight
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Light,
    Medium,
    Heavy,
}

/// Derived per-request routing context
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskContext {
    pub task_type: TaskType,
    pub complexity: Complexity,
    pub model: String,

    /// 1..=10, higher is more important
    pub priority: u8,

    pub requires_gpu: bool,

    /// Resolved model profile (catalog entry or heuristic)
    pub profile: ModelProfile,
}

/// Default request priority
pub const DEFAULT_PRIORITY: u8 = 5;

/// Character thresholds for complexity estimation
const LIGHT_MAX_CHARS: usize = 500;
const MEDIUM_MAX_CHARS: usize = 4000;

/// Memory footprint above which generation work wants a GPU
const GPU_MEMORY_THRESHOLD_GIB: f64 = 4.0;

const CLASSIFICATION_CUES: &[&str] = &["classify", "categorize", "label", "which category"];
const SUMMARIZATION_CUES: &[&str] = &["summarize", "summary", "tl;dr", "tldr"];

/// Classifies inbound payloads into task contexts
#[derive(Clone, Debug)]
pub struct RequestAnalyzer {
    catalog: Arc<ModelCatalog>,
}

impl RequestAnalyzer {
    pub fn new(catalog: Arc<ModelCatalog>) -> Self {
        Self { catalog }
    }

    pub fn analyze(&self, payload: &InferencePayload) -> TaskContext {
        let task_type = Self::task_type(payload);
        let complexity = Self::complexity(payload.input_chars());
        let profile = self.catalog.profile(payload.model());

        let requires_gpu = matches!(task_type, TaskType::Generation | TaskType::Chat)
            && profile.estimated_memory_gib > GPU_MEMORY_THRESHOLD_GIB;

        let priority = payload
            .priority()
            .unwrap_or(i64::from(DEFAULT_PRIORITY))
            .clamp(1, 10) as u8;

        TaskContext {
            task_type,
            complexity,
            model: payload.model().to_string(),
            priority,
            requires_gpu,
            profile,
        }
    }

    fn task_type(payload: &InferencePayload) -> TaskType {
        let structural = match payload {
            InferencePayload::Chat { .. } => TaskType::Chat,
            InferencePayload::Generate { .. } => TaskType::Generation,
            InferencePayload::Embed { .. } => return TaskType::Embedding,
        };

        // Keyword cues in the last user content refine chat/generate
        if let Some(content) = payload.last_user_content() {
            let lower = content.to_lowercase();
            if CLASSIFICATION_CUES.iter().any(|cue| lower.contains(cue)) {
                return TaskType::Classification;
            }
            if SUMMARIZATION_CUES.iter().any(|cue| lower.contains(cue)) {
                return TaskType::Summarization;
            }
        }

        structural
    }

    fn complexity(input_chars: usize) -> Complexity {
        if input_chars < LIGHT_MAX_CHARS {
            Complexity::Light
        } else if input_chars < MEDIUM_MAX_CHARS {
            Complexity::Medium
        } else {
            Complexity::Heavy
        }
    }
}
