mod app_state;
mod config;
mod models;
mod routes;
mod services;

use axum::{routing::get, routing::post, Router};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use std::time::Duration;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use app_state::AppState;
use config::AppConfig;
use services::{
    finalizer::LlmFinalizer,
    jobs::InMemoryJobStore,
    llm::LlmClient,
    planner::LlmPlanner,
    search::GoogleCseClient,
    vision::MedGemmaClient,
};

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing skin-analysis-api server");

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);

    // Register application metrics
    metrics::describe_histogram!(
        "analysis_pipeline_seconds",
        "End-to-end time for a completed analysis pipeline"
    );
    metrics::describe_counter!("analysis_jobs_total", "Total analysis jobs started");
    metrics::describe_counter!(
        "analysis_jobs_completed",
        "Total analysis jobs that completed"
    );
    metrics::describe_counter!("analysis_jobs_failed", "Total analysis jobs that failed");
    metrics::describe_gauge!(
        "analysis_jobs_in_flight",
        "Analysis pipelines currently executing"
    );

    // Initialize the vision gateway (single instance, injected everywhere)
    tracing::info!(
        model = %config.medgemma_model,
        dtype = %config.medgemma_dtype,
        device = %config.medgemma_device,
        "Initializing MedGemma vision client"
    );
    let vision = MedGemmaClient::new(
        &config.medgemma_base_url,
        &config.medgemma_api_key,
        &config.medgemma_model,
        config.medgemma_max_new_tokens,
    )
    .expect("Failed to initialize MedGemma client");

    // Initialize the product-search gateway
    tracing::info!("Initializing product search client");
    let search = GoogleCseClient::new(
        config.google_cse_api_key.clone(),
        config.google_cse_cx.clone(),
        config.scrape_prices,
    )
    .expect("Failed to initialize product search client");
    let search = Arc::new(search);

    // Initialize planning and finalization gateways (shared LLM API)
    tracing::info!(model = %config.llm_model, "Initializing LLM planning/finalization clients");
    let planner_llm = LlmClient::new(&config.llm_base_url, &config.llm_api_key, &config.llm_model)
        .expect("Failed to initialize LLM client");
    let finalizer_llm = LlmClient::new(&config.llm_base_url, &config.llm_api_key, &config.llm_model)
        .expect("Failed to initialize LLM client");

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(20))
        .build()
        .expect("Failed to initialize HTTP client");

    // Create shared application state
    let state = AppState::new(
        http,
        Arc::new(InMemoryJobStore::new()),
        Arc::new(vision),
        Arc::new(LlmPlanner::new(planner_llm, search)),
        Arc::new(LlmFinalizer::new(finalizer_llm)),
        config.max_concurrent_jobs,
    );

    // Build API routes
    let app = Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/v1/skin-analysis", post(routes::analysis::submit_analysis))
        .route(
            "/v1/skin-analysis/status/{job_id}",
            get(routes::analysis::get_status),
        )
        .route(
            "/v1/skin-analysis/result/{job_id}",
            get(routes::analysis::get_result),
        )
        .with_state(state)
        // Prometheus metrics scrape endpoint
        .route(
            "/metrics",
            get(move || {
                let handle = Arc::clone(&prometheus_handle);
                async move { handle.render() }
            }),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(1024 * 1024)); // 1 MB limit, requests are JSON

    tracing::info!("Starting skin-analysis-api on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await.expect("Server error");
}
