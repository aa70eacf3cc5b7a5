use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

/// Chat-completions transport shared by the planning and finalization
/// gateways (OpenAI-compatible API surface).
pub struct LlmClient {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
}

/// One chat call. Call sites own retry policy; the transport issues exactly
/// one request per invocation.
pub struct ChatParams<'a> {
    pub system: &'a str,
    pub user: String,
    pub temperature: f64,
    pub max_tokens: u32,
    /// OpenAI tool declarations, if the call should expose tools.
    pub tools: Option<Value>,
    /// Forced tool choice, e.g. a specific function.
    pub tool_choice: Option<Value>,
    /// Constrain the response to a JSON object.
    pub json_response: bool,
}

#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
pub struct ChatChoice {
    pub message: AssistantMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AssistantMessage {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
}

#[derive(Debug, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub function: FunctionCall,
}

#[derive(Debug, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// JSON-encoded argument object, as the API delivers it.
    pub arguments: String,
}

impl LlmClient {
    pub fn new(base_url: &str, api_key: &str, model: &str) -> Result<Self, LlmError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(45))
            .build()
            .map_err(LlmError::Http)?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        })
    }

    pub async fn chat(&self, params: &ChatParams<'_>) -> Result<ChatResponse, LlmError> {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": params.system },
                { "role": "user", "content": params.user },
            ],
            "temperature": params.temperature,
            "max_tokens": params.max_tokens,
        });

        if let Some(tools) = &params.tools {
            body["tools"] = tools.clone();
        }
        if let Some(choice) = &params.tool_choice {
            body["tool_choice"] = choice.clone();
        }
        if params.json_response {
            body["response_format"] = serde_json::json!({ "type": "json_object" });
        }

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(LlmError::Http)?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(LlmError::Api(format!("HTTP {status}: {detail}")));
        }

        response.json().await.map_err(LlmError::Http)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("LLM request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("LLM API error: {0}")]
    Api(String),
}
