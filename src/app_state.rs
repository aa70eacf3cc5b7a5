use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::services::finalizer::Finalizer;
use crate::services::jobs::JobStore;
use crate::services::planner::Planner;
use crate::services::vision::VisionAnalyzer;

/// Shared application state passed to all route handlers.
///
/// Gateways are held as trait objects so the pipeline can be exercised with
/// mock implementations in tests.
#[derive(Clone)]
pub struct AppState {
    /// Client used to fetch submitted image URLs.
    pub http: reqwest::Client,
    pub jobs: Arc<dyn JobStore>,
    pub vision: Arc<dyn VisionAnalyzer>,
    pub planner: Arc<dyn Planner>,
    pub finalizer: Arc<dyn Finalizer>,
    /// Bounds concurrently executing pipelines; queued jobs stay
    /// `in_progress` while waiting for a permit.
    pub limiter: Arc<Semaphore>,
}

impl AppState {
    pub fn new(
        http: reqwest::Client,
        jobs: Arc<dyn JobStore>,
        vision: Arc<dyn VisionAnalyzer>,
        planner: Arc<dyn Planner>,
        finalizer: Arc<dyn Finalizer>,
        max_concurrent_jobs: usize,
    ) -> Self {
        Self {
            http,
            jobs,
            vision,
            planner,
            finalizer,
            limiter: Arc::new(Semaphore::new(max_concurrent_jobs.max(1))),
        }
    }
}
