use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::models::analysis::FinalResult;

/// Status of a skin-analysis job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    InProgress,
    Done,
    Failed,
}

/// One in-flight or completed analysis request.
///
/// `progress` accumulates partial results (visual summary, intermediate plan,
/// running timings) as pipeline stages complete; keys are merged, never
/// replaced wholesale. Once `status` is terminal the record is immutable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: String,
    pub status: JobStatus,
    /// Seconds since epoch.
    pub created_at: f64,
    /// Seconds since epoch, refreshed on every mutation.
    pub updated_at: f64,
    pub progress: Map<String, Value>,
    pub result: Option<FinalResult>,
    pub error: Option<String>,
}

impl JobRecord {
    pub fn new(id: String) -> Self {
        let now = now_secs();
        Self {
            id,
            status: JobStatus::InProgress,
            created_at: now,
            updated_at: now,
            progress: Map::new(),
            result: None,
            error: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status != JobStatus::InProgress
    }
}

/// Current wall-clock time as fractional seconds since epoch.
pub fn now_secs() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_record_starts_in_progress() {
        let rec = JobRecord::new("abc".to_string());
        assert_eq!(rec.status, JobStatus::InProgress);
        assert!(rec.progress.is_empty());
        assert!(rec.result.is_none());
        assert!(rec.error.is_none());
        assert!(!rec.is_terminal());
        assert!((rec.created_at - rec.updated_at).abs() < f64::EPSILON);
    }

    #[test]
    fn status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_value(JobStatus::InProgress).unwrap(),
            serde_json::json!("in_progress")
        );
        assert_eq!(
            serde_json::to_value(JobStatus::Done).unwrap(),
            serde_json::json!("done")
        );
        assert_eq!(
            serde_json::to_value(JobStatus::Failed).unwrap(),
            serde_json::json!("failed")
        );
    }
}
