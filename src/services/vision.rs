use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use crate::models::analysis::AnalysisMode;

const PROMPT_SYSTEM_BASIC: &str = "You are a professional dermatologist. Provide a concise, user-friendly assessment.\n\
Return exactly two labeled sections in English:\n\
Summary: a brief 1-2 sentence overview of the skin condition.\n\
Description (basic): a short paragraph (3-6 sentences) focusing on key observations and main concerns.";

const PROMPT_USER_BASIC: &str = "Please analyze this skin image. Keep it concise and approachable.\n\
Respond using the two sections: 'Summary:' and 'Description (basic):'.";

const PROMPT_SYSTEM_EXTENDED: &str = "You are an expert dermatologist.\n\
Provide a detailed analysis of the skin condition using professional terminology.\n\
Focus on:\n\
- Skin type and texture\n\
- Hydration levels and barrier function\n\
- Sebum production and pore condition\n\
- Presence of any lesions, inflammation, or acne\n\
- Pigmentation and color uniformity\n\
- Signs of aging or photodamage\n\
- Visible blood vessels or redness\n\
- Any abnormal formations or concerning features";

const PROMPT_USER_EXTENDED: &str = "Please analyze this skin image in detail.\n\
Describe all visible characteristics and potential concerns.\n\
Include both surface-level observations and potential underlying conditions.\n\
Use medical terminology where appropriate, but ensure the description remains understandable.\n\
Be specific about locations and severity of any issues observed.\n\
Respond using the two sections: 'Summary:' and 'Description (extended):'.";

/// Visual-analysis gateway: one inference call per invocation.
#[async_trait]
pub trait VisionAnalyzer: Send + Sync {
    async fn analyze(&self, image: &[u8], mode: AnalysisMode) -> Result<String, VisionError>;
}

/// Client for a MedGemma image-text-to-text model behind an OpenAI-compatible
/// serving endpoint (vLLM).
///
/// Constructed once at startup and shared across jobs; model warm-up happens
/// server-side, so repeated construction would only waste connections.
/// Deliberately retry-free: a single inference failure propagates to the
/// orchestrator.
pub struct MedGemmaClient {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
    max_new_tokens: u32,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

impl MedGemmaClient {
    pub fn new(
        base_url: &str,
        api_key: &str,
        model: &str,
        max_new_tokens: u32,
    ) -> Result<Self, VisionError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(VisionError::Http)?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            max_new_tokens,
        })
    }

    fn prompts(mode: AnalysisMode) -> (&'static str, &'static str) {
        match mode {
            AnalysisMode::Basic => (PROMPT_SYSTEM_BASIC, PROMPT_USER_BASIC),
            AnalysisMode::Extended => (PROMPT_SYSTEM_EXTENDED, PROMPT_USER_EXTENDED),
        }
    }
}

#[async_trait]
impl VisionAnalyzer for MedGemmaClient {
    async fn analyze(&self, image: &[u8], mode: AnalysisMode) -> Result<String, VisionError> {
        let (system, user) = Self::prompts(mode);
        let data_url = format!(
            "data:image/jpeg;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(image)
        );

        tracing::info!(%mode, image_bytes = image.len(), "running visual analysis");

        let request_body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system },
                {
                    "role": "user",
                    "content": [
                        { "type": "text", "text": user },
                        { "type": "image_url", "image_url": { "url": data_url } }
                    ]
                }
            ],
            "temperature": 0.0,
            "max_tokens": self.max_new_tokens,
        });

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request_body)
            .send()
            .await
            .map_err(VisionError::Http)?
            .error_for_status()
            .map_err(VisionError::Http)?;

        let completion: ChatCompletionResponse =
            response.json().await.map_err(VisionError::Http)?;

        let text = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .unwrap_or_default();

        if text.is_empty() {
            return Err(VisionError::EmptyResponse);
        }

        tracing::info!(%mode, output = %text, "visual analysis output");
        Ok(text)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum VisionError {
    #[error("vision inference request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("vision model returned no text")]
    EmptyResponse,

    #[error("vision service unavailable: {0}")]
    Unavailable(String),
}
