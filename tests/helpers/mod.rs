#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use skin_analysis_api::app_state::AppState;
use skin_analysis_api::models::analysis::{AnalysisMode, FinalResult};
use skin_analysis_api::models::plan::Plan;
use skin_analysis_api::models::product::Product;
use skin_analysis_api::services::finalizer::{Finalizer, FALLBACK_EXPLANATION};
use skin_analysis_api::services::jobs::InMemoryJobStore;
use skin_analysis_api::services::llm::LlmError;
use skin_analysis_api::services::planner::{build_plan, Planner};
use skin_analysis_api::services::vision::{VisionAnalyzer, VisionError};

/// Vision double returning a fixed summary, optionally after a delay so
/// tests can observe the job mid-flight.
pub struct StubVision {
    pub summary: String,
    pub delay: Duration,
}

impl StubVision {
    pub fn new(summary: &str) -> Self {
        Self {
            summary: summary.to_string(),
            delay: Duration::ZERO,
        }
    }

    pub fn slow(summary: &str, delay: Duration) -> Self {
        Self {
            summary: summary.to_string(),
            delay,
        }
    }
}

#[async_trait]
impl VisionAnalyzer for StubVision {
    async fn analyze(&self, _image: &[u8], _mode: AnalysisMode) -> Result<String, VisionError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(self.summary.clone())
    }
}

pub struct FailingVision;

#[async_trait]
impl VisionAnalyzer for FailingVision {
    async fn analyze(&self, _image: &[u8], _mode: AnalysisMode) -> Result<String, VisionError> {
        Err(VisionError::Unavailable("inference backend down".into()))
    }
}

/// Planner double: deterministic plan from the summary plus canned products.
pub struct StubPlanner {
    pub products: Vec<Product>,
}

#[async_trait]
impl Planner for StubPlanner {
    async fn plan(
        &self,
        visual_summary: &str,
        _user_note: Option<&str>,
    ) -> Result<(Plan, Vec<Product>), LlmError> {
        Ok((build_plan(visual_summary, ""), self.products.clone()))
    }
}

/// Finalizer double returning a well-formed model selection, passing
/// products through untouched (the pipeline owns truncation).
pub struct EchoFinalizer;

#[async_trait]
impl Finalizer for EchoFinalizer {
    async fn finalize(
        &self,
        plan: &Plan,
        products: &[Product],
    ) -> Result<FinalResult, LlmError> {
        Ok(FinalResult {
            diagnosis: plan.diagnosis.clone(),
            skin_type: plan.skin_type.clone(),
            explanation: "Targets the identified concerns.".to_string(),
            routine_steps: vec!["cleanse".into(), "treat".into(), "moisturize".into()],
            products: products.to_vec(),
            additional_recommendations: String::new(),
            medgemma_summary: String::new(),
            timings: BTreeMap::new(),
        })
    }
}

/// Finalizer double emulating a degraded gateway: every model response was
/// structurally unusable, so the canned fallback shape comes back.
pub struct FallbackFinalizer;

#[async_trait]
impl Finalizer for FallbackFinalizer {
    async fn finalize(
        &self,
        plan: &Plan,
        products: &[Product],
    ) -> Result<FinalResult, LlmError> {
        Ok(FinalResult {
            diagnosis: plan.diagnosis.chars().take(200).collect(),
            skin_type: plan.skin_type.clone(),
            explanation: FALLBACK_EXPLANATION.to_string(),
            routine_steps: Vec::new(),
            products: products.iter().take(5).cloned().collect(),
            additional_recommendations: String::new(),
            medgemma_summary: plan.visual_summary.clone(),
            timings: BTreeMap::new(),
        })
    }
}

/// Finalizer double whose transport never recovers.
pub struct FailingFinalizer;

#[async_trait]
impl Finalizer for FailingFinalizer {
    async fn finalize(
        &self,
        _plan: &Plan,
        _products: &[Product],
    ) -> Result<FinalResult, LlmError> {
        Err(LlmError::Api("LLM unavailable".into()))
    }
}

pub fn products(n: usize) -> Vec<Product> {
    (0..n)
        .map(|i| Product {
            name: format!("Product {i}"),
            url: format!("https://shop.example/p{i}"),
            price: None,
            snippet: None,
            image_url: None,
            brand: None,
            category: None,
            rating: None,
        })
        .collect()
}

pub fn final_result(products: Vec<Product>) -> FinalResult {
    FinalResult {
        diagnosis: "mild comedonal acne".to_string(),
        skin_type: "oily".to_string(),
        explanation: "Targets sebum and clogged pores.".to_string(),
        routine_steps: Vec::new(),
        products,
        additional_recommendations: String::new(),
        medgemma_summary: "Summary: oily skin.".to_string(),
        timings: BTreeMap::new(),
    }
}

pub fn state_with(
    vision: Arc<dyn VisionAnalyzer>,
    planner: Arc<dyn Planner>,
    finalizer: Arc<dyn Finalizer>,
    max_concurrent_jobs: usize,
) -> AppState {
    AppState::new(
        reqwest::Client::new(),
        Arc::new(InMemoryJobStore::new()),
        vision,
        planner,
        finalizer,
        max_concurrent_jobs,
    )
}

/// State wired with the happy-path doubles.
pub fn default_state() -> AppState {
    state_with(
        Arc::new(StubVision::new("Summary: oily skin with comedones and redness.")),
        Arc::new(StubPlanner {
            products: products(3),
        }),
        Arc::new(EchoFinalizer),
        4,
    )
}
