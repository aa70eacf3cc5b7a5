use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

use crate::models::analysis::FinalResult;
use crate::models::job::{now_secs, JobRecord, JobStatus};

/// Registry of analysis jobs.
///
/// Kept behind a trait so the in-memory implementation can be swapped for an
/// external keyed store without touching the orchestrator.
pub trait JobStore: Send + Sync {
    /// Create a new job record with a fresh id, status `in_progress`.
    fn create(&self) -> JobRecord;

    /// Snapshot of a job record, if it exists.
    fn get(&self, job_id: &str) -> Option<JobRecord>;

    /// Merge partial-result keys into the job's progress map.
    fn update_progress(&self, job_id: &str, patch: Map<String, Value>);

    /// Transition to `done` with the final result.
    fn complete(&self, job_id: &str, result: FinalResult);

    /// Transition to `failed` with a human-readable error.
    fn fail(&self, job_id: &str, error: &str);
}

/// In-memory job store for a single-process deployment.
///
/// Each job id is single-writer (only its own background task mutates it), so
/// the lock exists only because the map itself is shared with the polling
/// endpoints.
#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<String, JobRecord>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl JobStore for InMemoryJobStore {
    fn create(&self) -> JobRecord {
        let rec = JobRecord::new(Uuid::new_v4().to_string());
        let mut jobs = self.jobs.write().unwrap();
        jobs.insert(rec.id.clone(), rec.clone());
        tracing::info!(job_id = %rec.id, "job created");
        rec
    }

    fn get(&self, job_id: &str) -> Option<JobRecord> {
        self.jobs.read().unwrap().get(job_id).cloned()
    }

    fn update_progress(&self, job_id: &str, patch: Map<String, Value>) {
        let mut jobs = self.jobs.write().unwrap();
        let Some(rec) = jobs.get_mut(job_id) else {
            return;
        };
        if rec.is_terminal() {
            return;
        }
        let keys: Vec<String> = patch.keys().cloned().collect();
        tracing::info!(job_id, ?keys, "job progress updated");
        for (k, v) in patch {
            rec.progress.insert(k, v);
        }
        rec.updated_at = now_secs();
    }

    fn complete(&self, job_id: &str, result: FinalResult) {
        let mut jobs = self.jobs.write().unwrap();
        let Some(rec) = jobs.get_mut(job_id) else {
            return;
        };
        if rec.is_terminal() {
            return;
        }
        rec.status = JobStatus::Done;
        rec.result = Some(result);
        rec.updated_at = now_secs();
        tracing::info!(job_id, "job completed");
    }

    fn fail(&self, job_id: &str, error: &str) {
        let mut jobs = self.jobs.write().unwrap();
        let Some(rec) = jobs.get_mut(job_id) else {
            return;
        };
        if rec.is_terminal() {
            return;
        }
        rec.status = JobStatus::Failed;
        rec.error = Some(error.to_string());
        rec.updated_at = now_secs();
        tracing::warn!(job_id, error, "job failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn result_stub() -> FinalResult {
        FinalResult {
            diagnosis: "d".into(),
            skin_type: "oily".into(),
            explanation: "e".into(),
            routine_steps: vec![],
            products: vec![],
            additional_recommendations: String::new(),
            medgemma_summary: "s".into(),
            timings: BTreeMap::new(),
        }
    }

    fn patch(entries: &[(&str, Value)]) -> Map<String, Value> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn progress_keys_merge_monotonically() {
        let store = InMemoryJobStore::new();
        let job = store.create();

        store.update_progress(&job.id, patch(&[("medgemma_summary", json!("oily skin"))]));
        store.update_progress(&job.id, patch(&[("planning", json!({"skin_type": "oily"}))]));

        let rec = store.get(&job.id).unwrap();
        assert_eq!(rec.progress.len(), 2);
        assert_eq!(rec.progress["medgemma_summary"], json!("oily skin"));
        assert!(rec.updated_at >= rec.created_at);
    }

    #[test]
    fn complete_sets_terminal_state() {
        let store = InMemoryJobStore::new();
        let job = store.create();

        store.complete(&job.id, result_stub());

        let rec = store.get(&job.id).unwrap();
        assert_eq!(rec.status, JobStatus::Done);
        assert!(rec.result.is_some());
        assert!(rec.error.is_none());
    }

    #[test]
    fn fail_sets_error() {
        let store = InMemoryJobStore::new();
        let job = store.create();

        store.fail(&job.id, "upstream exploded");

        let rec = store.get(&job.id).unwrap();
        assert_eq!(rec.status, JobStatus::Failed);
        assert_eq!(rec.error.as_deref(), Some("upstream exploded"));
        assert!(rec.result.is_none());
    }

    #[test]
    fn terminal_records_are_immutable() {
        let store = InMemoryJobStore::new();
        let job = store.create();

        store.complete(&job.id, result_stub());
        store.fail(&job.id, "too late");
        store.update_progress(&job.id, patch(&[("late", json!(true))]));

        let rec = store.get(&job.id).unwrap();
        assert_eq!(rec.status, JobStatus::Done);
        assert!(rec.error.is_none());
        assert!(!rec.progress.contains_key("late"));
    }

    #[test]
    fn unknown_job_ids_are_ignored() {
        let store = InMemoryJobStore::new();
        store.update_progress("nope", patch(&[("x", json!(1))]));
        store.fail("nope", "whatever");
        assert!(store.get("nope").is_none());
    }
}
