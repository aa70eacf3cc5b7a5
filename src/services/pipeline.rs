use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::time::Instant;

use crate::app_state::AppState;
use crate::models::analysis::{AnalysisMode, FinalResult};
use crate::services::llm::LlmError;
use crate::services::vision::VisionError;

/// Run one analysis job to completion.
///
/// This is the single catch-point for pipeline errors: anything escaping a
/// stage marks the job failed with the error's display form. There is no
/// cancellation; once spawned, a job runs until it reaches a terminal state.
pub async fn run(
    state: AppState,
    job_id: String,
    image: Vec<u8>,
    user_text: Option<String>,
    mode: AnalysisMode,
) {
    // Admission control: bound concurrent pipelines against the shared
    // inference backend. Waiting jobs remain visible as in_progress.
    let _permit = state.limiter.clone().acquire_owned().await.ok();

    metrics::counter!("analysis_jobs_total").increment(1);
    metrics::gauge!("analysis_jobs_in_flight").increment(1.0);
    let started = Instant::now();

    match execute(&state, &job_id, &image, user_text.as_deref(), mode).await {
        Ok(result) => {
            metrics::histogram!("analysis_pipeline_seconds")
                .record(started.elapsed().as_secs_f64());
            metrics::counter!("analysis_jobs_completed").increment(1);
            state.jobs.complete(&job_id, result);
        }
        Err(e) => {
            metrics::counter!("analysis_jobs_failed").increment(1);
            tracing::error!(job_id = %job_id, error = %e, "pipeline failed");
            state.jobs.fail(&job_id, &e.to_string());
        }
    }

    metrics::gauge!("analysis_jobs_in_flight").decrement(1.0);
}

/// The three-stage pipeline: visual analysis, tool-assisted planning,
/// finalization. Partial progress is written after each of the first two
/// stages; timings accumulate across stages under stage-specific keys.
async fn execute(
    state: &AppState,
    job_id: &str,
    image: &[u8],
    user_text: Option<&str>,
    mode: AnalysisMode,
) -> Result<FinalResult, PipelineError> {
    let mut timings: BTreeMap<String, f64> = BTreeMap::new();

    let stage = Instant::now();
    let visual_summary = state.vision.analyze(image, mode).await?;
    record_timing(&mut timings, "medgemma_seconds", stage);
    tracing::info!(job_id, seconds = timings["medgemma_seconds"], "visual analysis complete");
    state.jobs.update_progress(
        job_id,
        progress(&[
            ("medgemma_summary", json!(visual_summary)),
            ("timings", json!(timings)),
        ]),
    );

    let stage = Instant::now();
    let (plan, products) = state
        .planner
        .plan(&visual_summary, user_text)
        .await
        .map_err(PipelineError::Planning)?;
    record_timing(&mut timings, "planning_seconds", stage);
    tracing::info!(
        job_id,
        seconds = timings["planning_seconds"],
        products = products.len(),
        "planning complete"
    );
    state.jobs.update_progress(
        job_id,
        progress(&[("planning", json!(plan)), ("timings", json!(timings))]),
    );

    let stage = Instant::now();
    let mut result = state
        .finalizer
        .finalize(&plan, &products)
        .await
        .map_err(PipelineError::Finalize)?;
    record_timing(&mut timings, "finalize_seconds", stage);

    // Normalize the terminal payload: cap products, re-attach the visual
    // summary and the accumulated timings.
    result.products.truncate(5);
    result.medgemma_summary = visual_summary;
    result.timings = timings;

    let total: f64 = result.timings.values().sum();
    tracing::info!(job_id, total_seconds = total, "pipeline complete");
    Ok(result)
}

fn record_timing(timings: &mut BTreeMap<String, f64>, key: &str, stage: Instant) {
    timings.insert(key.to_string(), round2(stage.elapsed().as_secs_f64()));
}

fn progress(entries: &[(&str, Value)]) -> Map<String, Value> {
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

/// Round elapsed seconds to 2 decimals for the timings map.
fn round2(secs: f64) -> f64 {
    (secs * 100.0).round() / 100.0
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("visual analysis failed: {0}")]
    Vision(#[from] VisionError),

    #[error("planning failed: {0}")]
    Planning(LlmError),

    #[error("finalization failed: {0}")]
    Finalize(LlmError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round2_rounds_to_two_decimals() {
        assert_eq!(round2(1.23456), 1.23);
        assert_eq!(round2(1.235), 1.24);
        assert_eq!(round2(0.0), 0.0);
        assert_eq!(round2(12.999), 13.0);
    }

    #[test]
    fn progress_builds_ordered_map() {
        let map = progress(&[("a", json!(1)), ("b", json!("x"))]);
        assert_eq!(map.len(), 2);
        assert_eq!(map["a"], json!(1));
    }
}
