//! Learning Store
//!
//! Rolling observed durations per (task type, model), fed back into the
//! scorer as task-affinity hints and surfaced through the stats endpoint.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::analyzer::TaskType;

/// Samples kept per key
const MAX_SAMPLES: usize = 100;

#[derive(Clone, Debug)]
struct Sample {
    recorded_at: DateTime<Utc>,
    duration_ms: f64,
}

/// Derived statistics for one (task type, model) key
#[derive(Clone, Copy, Debug, Serialize)]
pub struct LearningStats {
    pub count: usize,
    pub mean_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
}

/// Bounded per-key FIFO of observed durations
#[derive(Debug, Default)]
pub struct LearningStore {
    records: Mutex<HashMap<(TaskType, String), VecDeque<Sample>>>,
}

impl LearningStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an observed duration for the key
    pub fn record(&self, task: TaskType, model: &str, duration_ms: f64) {
        let mut records = self.records.lock().expect("learning lock poisoned");
        let samples = records.entry((task, model.to_string())).or_default();
        samples.push_back(Sample { recorded_at: Utc::now(), duration_ms });
        if samples.len() > MAX_SAMPLES {
            samples.pop_front();
        }
    }

    /// Rolling stats for the key, if any samples exist
    pub fn stats(&self, task: TaskType, model: &str) -> Option<LearningStats> {
        let records = self.records.lock().expect("learning lock poisoned");
        let samples = records.get(&(task, model.to_string()))?;
        Self::summarize(samples)
    }

    /// Drop samples older than the horizon; empty keys are removed
    pub fn prune_older_than(&self, horizon: Duration) {
        let cutoff = Utc::now() - horizon;
        let mut records = self.records.lock().expect("learning lock poisoned");
        for samples in records.values_mut() {
            while samples.front().is_some_and(|s| s.recorded_at < cutoff) {
                samples.pop_front();
            }
        }
        records.retain(|_, samples| !samples.is_empty());
    }

    /// Per-key stats for the stats endpoint, keyed as "task/model"
    pub fn snapshot(&self) -> HashMap<String, LearningStats> {
        let records = self.records.lock().expect("learning lock poisoned");
        records
            .iter()
            .filter_map(|((task, model), samples)| {
                Self::summarize(samples).map(|stats| (format!("{task}/{model}"), stats))
            })
            .collect()
    }

    fn summarize(samples: &VecDeque<Sample>) -> Option<LearningStats> {
        if samples.is_empty() {
            return None;
        }
        let mut min_ms = f64::INFINITY;
        let mut max_ms = f64::NEG_INFINITY;
        let mut sum = 0.0;
        for sample in samples {
            min_ms = min_ms.min(sample.duration_ms);
            max_ms = max_ms.max(sample.duration_ms);
            sum += sample.duration_ms;
        }
        Some(LearningStats {
            count: samples.len(),
            mean_ms: sum / samples.len() as f64,
            min_ms,
            max_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_stats() {
        let store = LearningStore::new();
        store.record(TaskType::Chat, "llama3.2", 100.0);
        store.record(TaskType::Chat, "llama3.2", 300.0);

        let stats = store.stats(TaskType::Chat, "llama3.2").unwrap();
        assert_eq!(stats.count, 2);
        assert_eq!(stats.mean_ms, 200.0);
        assert_eq!(stats.min_ms, 100.0);
        assert_eq!(stats.max_ms, 300.0);

        // Different task type is a different key
        assert!(store.stats(TaskType::Generation, "llama3.2").is_none());
    }

    #[test]
    fn test_fifo_bounded_at_hundred() {
        let store = LearningStore::new();
        for i in 0..150 {
            store.record(TaskType::Chat, "m", f64::from(i));
        }

        let stats = store.stats(TaskType::Chat, "m").unwrap();
        assert_eq!(stats.count, 100);
        // Oldest 50 were evicted
        assert_eq!(stats.min_ms, 50.0);
        assert_eq!(stats.max_ms, 149.0);
    }

    #[test]
    fn test_prune_removes_stale_samples() {
        let store = LearningStore::new();
        store.record(TaskType::Chat, "m", 100.0);

        // Horizon in the future relative to the sample: everything is stale
        store.prune_older_than(Duration::seconds(-1));
        assert!(store.stats(TaskType::Chat, "m").is_none());
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn test_snapshot_keys() {
        let store = LearningStore::new();
        store.record(TaskType::Embedding, "nomic-embed-text", 12.0);

        let snapshot = store.snapshot();
        assert!(snapshot.contains_key("embedding/nomic-embed-text"));
    }
}
