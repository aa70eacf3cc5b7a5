use garde::Validate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use strum::{Display, EnumString};

use crate::models::job::JobStatus;
use crate::models::product::Product;

/// Depth of the visual analysis stage.
///
/// Unrecognized or missing values normalize to `Extended` — the default the
/// vision service settled on.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, EnumString, Display,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisMode {
    Basic,
    #[default]
    Extended,
}

impl AnalysisMode {
    /// Normalize a raw client-supplied mode string.
    pub fn normalize(raw: Option<&str>) -> Self {
        raw.map(str::trim)
            .filter(|s| !s.is_empty())
            .and_then(|s| s.parse().ok())
            .unwrap_or_default()
    }
}

/// Body of `POST /v1/skin-analysis`.
#[derive(Debug, Deserialize)]
pub struct AnalysisRequest {
    pub image_url: String,
    #[serde(default)]
    pub text: Option<String>,
    /// Kept as a free string so unrecognized values normalize instead of
    /// failing deserialization.
    #[serde(default)]
    pub mode: Option<String>,
}

/// Response of `POST /v1/skin-analysis`.
#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub job_id: String,
    pub status: JobStatus,
    pub mode: AnalysisMode,
}

/// Response of `GET /v1/skin-analysis/status/{job_id}`.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub job_id: String,
    pub status: JobStatus,
    pub progress: Map<String, Value>,
    pub error: Option<String>,
    pub updated_at: f64,
    pub created_at: f64,
}

/// Terminal payload of a completed analysis job.
///
/// Validated with garde before being served; a stored result that fails
/// validation is reported as an internal schema error (this should be
/// unreachable given the finalization gateway's fallback contract).
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct FinalResult {
    #[garde(length(max = 4000))]
    pub diagnosis: String,

    #[garde(length(max = 200))]
    pub skin_type: String,

    #[garde(length(max = 8000))]
    #[serde(default)]
    pub explanation: String,

    #[garde(skip)]
    #[serde(default)]
    pub routine_steps: Vec<String>,

    /// Capped at 5, in the order chosen by the finalization gateway.
    #[garde(length(max = 5))]
    #[serde(default)]
    pub products: Vec<Product>,

    #[garde(skip)]
    #[serde(default)]
    pub additional_recommendations: String,

    /// Echo of the visual-analysis text.
    #[garde(skip)]
    #[serde(default)]
    pub medgemma_summary: String,

    /// Stage name -> elapsed seconds, rounded to 2 decimals.
    #[garde(skip)]
    #[serde(default)]
    pub timings: BTreeMap<String, f64>,
}
