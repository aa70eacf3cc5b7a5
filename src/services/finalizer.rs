use async_trait::async_trait;

use crate::models::analysis::FinalResult;
use crate::models::plan::Plan;
use crate::models::product::Product;
use crate::services::llm::{ChatParams, ChatResponse, LlmClient, LlmError};
use crate::services::retry::with_backoff;

const SYSTEM_PROMPT_FINAL: &str = "You are an expert dermatologist selecting personalized skin-care products. \
Based on the detailed skin analysis and search results, create a comprehensive care plan.\n\
Return a JSON with:\n\
- diagnosis: detailed skin condition summary\n\
- skin_type: specific skin type with characteristics\n\
- explanation: thorough explanation of why each product is recommended\n\
- routine_steps: recommended skincare routine steps\n\
- products: list of up to 5 items {name,url,price?,snippet?,image_url?} with specific purpose for each\n\
- additional_recommendations: lifestyle and care tips\n\
- medgemma_summary: include the full visual analysis text for reference\n\
STRICT OUTPUT REQUIREMENTS: Respond with a single valid JSON object ONLY, no markdown, no explanations, no code fences. \
DO NOT wrap the JSON in ```json or any other format. DO NOT add any prefix or suffix. JUST THE JSON.";

/// Explanation attached when the model's output had to be substituted.
pub const FALLBACK_EXPLANATION: &str =
    "Heuristic product selection due to model response failure.";

/// Finalization gateway: one structured-JSON model call.
///
/// Structural failures (no response, content filtering, unparsable text) are
/// contained here as a deterministic fallback result, never surfaced as
/// errors; only transport exhaustion propagates.
#[async_trait]
pub trait Finalizer: Send + Sync {
    async fn finalize(
        &self,
        plan: &Plan,
        products: &[Product],
    ) -> Result<FinalResult, LlmError>;
}

pub struct LlmFinalizer {
    llm: LlmClient,
}

impl LlmFinalizer {
    pub fn new(llm: LlmClient) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl Finalizer for LlmFinalizer {
    async fn finalize(
        &self,
        plan: &Plan,
        products: &[Product],
    ) -> Result<FinalResult, LlmError> {
        let planning_json = serde_json::to_string(plan)
            .map_err(|e| LlmError::Api(format!("plan serialization failed: {e}")))?;
        let products_json = serde_json::to_string(products)
            .map_err(|e| LlmError::Api(format!("product serialization failed: {e}")))?;

        let params = ChatParams {
            system: SYSTEM_PROMPT_FINAL,
            user: format!("Plan: {planning_json}\nProducts: {products_json}"),
            temperature: 0.2,
            max_tokens: 1024,
            tools: None,
            tool_choice: None,
            json_response: true,
        };

        let response = with_backoff("finalize", || self.llm.chat(&params)).await?;
        Ok(interpret_response(response, plan, products))
    }
}

/// Map a finalization chat response to a result, substituting the fallback
/// for every structural failure mode. A schema-valid JSON response is
/// returned exactly as parsed.
fn interpret_response(response: ChatResponse, plan: &Plan, products: &[Product]) -> FinalResult {
    let Some(choice) = response.choices.into_iter().next() else {
        return fallback_result("no candidates returned", plan, products);
    };

    if let Some(reason) = choice.finish_reason.as_deref() {
        if reason != "stop" {
            return fallback_result(&format!("response terminated by {reason}"), plan, products);
        }
    }

    let text = choice.message.content.unwrap_or_default();
    if text.trim().is_empty() {
        return fallback_result("empty response text", plan, products);
    }

    match serde_json::from_str::<FinalResult>(&text) {
        Ok(result) => result,
        Err(e) => {
            tracing::warn!(error = %e, raw = %truncate(&text, 500), "finalize JSON parse failed");
            fallback_result(&format!("JSON decode error: {e}"), plan, products)
        }
    }
}

/// Canned result satisfying the client-visible schema even when every model
/// call degrades.
fn fallback_result(reason: &str, plan: &Plan, products: &[Product]) -> FinalResult {
    tracing::error!(reason, "using fallback finalization result");

    let diagnosis = if plan.diagnosis.is_empty() {
        truncate(&plan.visual_summary, 200)
    } else {
        truncate(&plan.diagnosis, 200)
    };

    let skin_type = if plan.skin_type.is_empty() {
        "unknown".to_string()
    } else {
        plan.skin_type.clone()
    };

    FinalResult {
        diagnosis,
        skin_type,
        explanation: FALLBACK_EXPLANATION.to_string(),
        routine_steps: Vec::new(),
        products: products.iter().take(5).cloned().collect(),
        additional_recommendations: String::new(),
        medgemma_summary: plan.visual_summary.clone(),
        timings: Default::default(),
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan_stub() -> Plan {
        Plan {
            skin_type: "oily".into(),
            diagnosis: "Oily skin with comedones.".into(),
            concerns: vec!["acne".into()],
            deficiencies: vec![],
            excesses: vec!["sebum production".into()],
            query: "oil control products".into(),
            need_search: true,
            visual_summary: "Summary: oily skin with comedones.".into(),
        }
    }

    fn product(name: &str) -> Product {
        Product {
            name: name.to_string(),
            url: format!("https://shop.example/{name}"),
            price: None,
            snippet: None,
            image_url: None,
            brand: None,
            category: None,
            rating: None,
        }
    }

    fn response_with_text(text: &str) -> ChatResponse {
        serde_json::from_value(serde_json::json!({
            "choices": [{
                "message": { "content": text },
                "finish_reason": "stop"
            }]
        }))
        .unwrap()
    }

    #[test]
    fn valid_json_round_trips_without_mutation() {
        let text = serde_json::json!({
            "diagnosis": "mild comedonal acne",
            "skin_type": "oily",
            "explanation": "targets sebum and clogged pores",
            "routine_steps": ["cleanse", "treat", "moisturize"],
            "products": [{"name": "BHA Liquid", "url": "https://shop.example/bha"}],
            "additional_recommendations": "drink water",
            "medgemma_summary": "Summary: oily skin."
        })
        .to_string();

        let result = interpret_response(response_with_text(&text), &plan_stub(), &[]);
        let expected: FinalResult = serde_json::from_str(&text).unwrap();
        assert_eq!(result, expected);
    }

    #[test]
    fn missing_products_key_yields_empty_list() {
        let text = r#"{"diagnosis":"d","skin_type":"oily","explanation":"e"}"#;
        let result = interpret_response(response_with_text(text), &plan_stub(), &[product("p")]);
        assert!(result.products.is_empty());
        assert_ne!(result.explanation, FALLBACK_EXPLANATION);
    }

    #[test]
    fn unparsable_text_falls_back() {
        let products: Vec<Product> = (0..7).map(|i| product(&format!("p{i}"))).collect();
        let result = interpret_response(
            response_with_text("Here is your plan: **great skin** ```json"),
            &plan_stub(),
            &products,
        );
        assert_eq!(result.explanation, FALLBACK_EXPLANATION);
        assert_eq!(result.skin_type, "oily");
        assert_eq!(result.diagnosis, "Oily skin with comedones.");
        assert_eq!(result.products.len(), 5);
        assert_eq!(result.medgemma_summary, plan_stub().visual_summary);
    }

    #[test]
    fn no_choices_falls_back() {
        let response: ChatResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        let result = interpret_response(response, &plan_stub(), &[]);
        assert_eq!(result.explanation, FALLBACK_EXPLANATION);
        assert!(result.products.is_empty());
    }

    #[test]
    fn content_filter_falls_back() {
        let response: ChatResponse = serde_json::from_value(serde_json::json!({
            "choices": [{
                "message": { "content": "{\"diagnosis\":\"d\"}" },
                "finish_reason": "content_filter"
            }]
        }))
        .unwrap();
        let result = interpret_response(response, &plan_stub(), &[]);
        assert_eq!(result.explanation, FALLBACK_EXPLANATION);
    }

    #[test]
    fn fallback_uses_summary_when_plan_diagnosis_empty() {
        let mut plan = plan_stub();
        plan.diagnosis = String::new();
        let result = fallback_result("test", &plan, &[]);
        assert_eq!(result.diagnosis, "Summary: oily skin with comedones.");
    }

    #[test]
    fn fallback_truncates_diagnosis_to_200_chars() {
        let mut plan = plan_stub();
        plan.diagnosis = "x".repeat(300);
        let result = fallback_result("test", &plan, &[]);
        assert_eq!(result.diagnosis.chars().count(), 200);
    }
}
