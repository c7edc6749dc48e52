//! Model Catalog
//!
//! Maps model names to resource profiles and decides whether a model must be
//! tensor-sharded across RPC backends. Unknown models are profiled
//! heuristically from size tokens in the name.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Resource profile for a model
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModelProfile {
    /// Model name as requested
    pub name: String,

    /// Parameter count in billions
    pub parameter_count_b: f64,

    /// Estimated memory footprint in GiB
    pub estimated_memory_gib: f64,

    /// Whether the model is too large for a single node
    pub requires_distributed: bool,

    /// Approximate transformer layer count
    pub num_layers: u32,
}

impl ModelProfile {
    fn known(
        name: &str,
        parameter_count_b: f64,
        estimated_memory_gib: f64,
        requires_distributed: bool,
        num_layers: u32,
    ) -> Self {
        Self {
            name: name.to_string(),
            parameter_count_b,
            estimated_memory_gib,
            requires_distributed,
            num_layers,
        }
    }
}

/// Size tokens checked longest-first so "405b" wins over "5b"
const SIZE_TOKENS: &[(&str, f64)] = &[
    ("405b", 405.0),
    ("141b", 141.0),
    ("72b", 72.0),
    ("70b", 70.0),
    ("34b", 34.0),
    ("13b", 13.0),
    ("8b", 8.0),
    ("7b", 7.0),
    ("3b", 3.0),
    ("1b", 1.0),
];

/// Parameter count above which a model is assumed too large for one node
const DISTRIBUTED_PARAM_THRESHOLD_B: f64 = 70.0;

/// Strip the `:latest` tag; sizes like `:8b` are significant and kept
pub fn normalize_model_name(model: &str) -> String {
    let model = model.trim();
    model.strip_suffix(":latest").unwrap_or(model).to_string()
}

/// Static table of well-known models plus heuristic fallback
#[derive(Debug)]
pub struct ModelCatalog {
    profiles: HashMap<String, ModelProfile>,
    sharding_enabled: bool,
}

impl ModelCatalog {
    pub fn new(sharding_enabled: bool) -> Self {
        let entries = [
            // Small models (fit on a single GPU)
            ModelProfile::known("llama3.2", 3.0, 2.5, false, 32),
            ModelProfile::known("llama3.2:3b", 3.0, 2.5, false, 32),
            ModelProfile::known("phi", 3.0, 1.5, false, 32),
            ModelProfile::known("phi3", 4.0, 2.0, false, 32),
            ModelProfile::known("gemma:7b", 7.0, 5.0, false, 28),
            ModelProfile::known("llama3:8b", 8.0, 6.0, false, 32),
            ModelProfile::known("llama3.1:8b", 8.0, 6.0, false, 32),
            ModelProfile::known("mistral:7b", 7.0, 5.0, false, 32),
            ModelProfile::known("llama2:7b", 7.0, 5.0, false, 32),
            ModelProfile::known("llama2:13b", 13.0, 9.0, false, 40),
            // Medium models (might fit on a large single GPU)
            ModelProfile::known("llama2:70b", 70.0, 40.0, true, 80),
            ModelProfile::known("llama3:70b", 70.0, 40.0, true, 80),
            ModelProfile::known("llama3.1:70b", 70.0, 40.0, true, 80),
            ModelProfile::known("mixtral:8x7b", 47.0, 26.0, true, 32),
            ModelProfile::known("qwen2.5:72b", 72.0, 42.0, true, 80),
            // Large models (require distribution)
            ModelProfile::known("llama3.1:405b", 405.0, 230.0, true, 126),
            ModelProfile::known("mixtral:8x22b", 141.0, 80.0, true, 56),
        ];

        let profiles = entries.into_iter().map(|p| (p.name.clone(), p)).collect();
        Self { profiles, sharding_enabled }
    }

    pub fn sharding_enabled(&self) -> bool {
        self.sharding_enabled
    }

    /// Catalog entry for the model, or a heuristic estimate
    pub fn profile(&self, model: &str) -> ModelProfile {
        let key = normalize_model_name(model).to_lowercase();

        if let Some(profile) = self.profiles.get(&key) {
            return profile.clone();
        }

        // Try the base name without tag
        if let Some(base) = key.split(':').next() {
            if let Some(profile) = self.profiles.get(base) {
                return profile.clone();
            }
        }

        Self::estimate(model, &key)
    }

    /// Decide whether this model must run on the sharded path
    pub fn requires_sharding(&self, model: &str) -> bool {
        if !self.sharding_enabled {
            return false;
        }

        let profile = self.profile(model);
        if profile.parameter_count_b <= 13.0 {
            false
        } else if profile.parameter_count_b <= DISTRIBUTED_PARAM_THRESHOLD_B {
            profile.requires_distributed
        } else {
            true
        }
    }

    /// Estimate a profile from size tokens in the name
    fn estimate(original: &str, key: &str) -> ModelProfile {
        let parameter_count_b = SIZE_TOKENS
            .iter()
            .find(|(token, _)| key.contains(token))
            .map_or(8.0, |(_, params)| *params);

        // Rough: ~600 MiB per billion parameters
        let estimated_memory_gib = parameter_count_b * 0.6;
        let requires_distributed = parameter_count_b > DISTRIBUTED_PARAM_THRESHOLD_B;

        tracing::debug!(
            "Estimated profile for '{}': {}B params, ~{:.1}GiB, distributed={}",
            original,
            parameter_count_b,
            estimated_memory_gib,
            requires_distributed
        );

        ModelProfile {
            name: original.to_string(),
            parameter_count_b,
            estimated_memory_gib,
            requires_distributed,
            num_layers: 32.max(parameter_count_b as u32),
        }
    }
}
