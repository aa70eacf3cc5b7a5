use serde::Deserialize;

/// Environment-derived configuration.
///
/// The vision model runs behind an OpenAI-compatible serving endpoint; its
/// precision and device placement are forwarded knobs for that deployment,
/// logged at startup for traceability.
#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:8000").
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Base URL of the MedGemma serving endpoint.
    #[serde(default = "default_medgemma_base_url")]
    pub medgemma_base_url: String,

    /// API key for the MedGemma endpoint.
    #[serde(default = "default_api_key")]
    pub medgemma_api_key: String,

    /// Vision model identifier.
    #[serde(default = "default_medgemma_model")]
    pub medgemma_model: String,

    /// Max generated tokens for the vision stage.
    #[serde(default = "default_max_new_tokens")]
    pub medgemma_max_new_tokens: u32,

    /// Vision-model precision (deployment knob, e.g. "bf16").
    #[serde(default = "default_dtype")]
    pub medgemma_dtype: String,

    /// Vision-model device placement (deployment knob, e.g. "auto").
    #[serde(default = "default_device")]
    pub medgemma_device: String,

    /// Base URL of the planning/finalization LLM API.
    #[serde(default = "default_llm_base_url")]
    pub llm_base_url: String,

    /// API key for the LLM API.
    #[serde(default = "default_api_key")]
    pub llm_api_key: String,

    /// Chat model used for planning and finalization.
    #[serde(default = "default_llm_model")]
    pub llm_model: String,

    /// Google Custom Search API key. Missing credentials degrade product
    /// search to empty results instead of failing startup.
    #[serde(default)]
    pub google_cse_api_key: Option<String>,

    /// Google Custom Search engine id.
    #[serde(default)]
    pub google_cse_cx: Option<String>,

    /// Best-effort price scraping on product pages.
    #[serde(default = "default_true")]
    pub scrape_prices: bool,

    /// Bound on concurrently executing pipelines.
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,
}

fn default_bind_addr() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_medgemma_base_url() -> String {
    "http://localhost:8001/v1".to_string()
}

fn default_medgemma_model() -> String {
    "google/medgemma-4b-it".to_string()
}

fn default_llm_base_url() -> String {
    "http://localhost:8002/v1".to_string()
}

fn default_llm_model() -> String {
    "Qwen/Qwen3-4B-Instruct-2507".to_string()
}

fn default_api_key() -> String {
    "dev".to_string()
}

fn default_max_new_tokens() -> u32 {
    512
}

fn default_dtype() -> String {
    "bf16".to_string()
}

fn default_device() -> String {
    "auto".to_string()
}

fn default_true() -> bool {
    true
}

fn default_max_concurrent_jobs() -> usize {
    4
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }
}
