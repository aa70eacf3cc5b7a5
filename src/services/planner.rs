use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

use crate::models::plan::Plan;
use crate::models::product::Product;
use crate::services::llm::{ChatParams, LlmClient, LlmError};
use crate::services::retry::with_backoff;
use crate::services::search::ProductSearch;

const SYSTEM_PROMPT_PLAN: &str = "You are an expert dermatology assistant. Your task is to:\n\
1. Analyze the provided skin analysis\n\
2. IMMEDIATELY call the search_products tool with a relevant query based on the skin concerns identified\n\
3. The search query should target specific skin issues mentioned in the analysis\n\n\
IMPORTANT: You MUST call the search_products function in your first response.";

const SEARCH_TOOL_NAME: &str = "search_products";
const SEARCH_RESULT_COUNT: u32 = 5;

/// Planning gateway: tool-assisted product discovery plus a deterministic
/// plan derived from the visual summary.
#[async_trait]
pub trait Planner: Send + Sync {
    async fn plan(
        &self,
        visual_summary: &str,
        user_note: Option<&str>,
    ) -> Result<(Plan, Vec<Product>), LlmError>;
}

/// Planner backed by an LLM with a single declared tool.
///
/// If the model skips the tool call, or tool execution fails, planning never
/// returns empty-handed: a keyword-derived query runs the search directly.
pub struct LlmPlanner {
    llm: LlmClient,
    search: Arc<dyn ProductSearch>,
}

#[derive(Deserialize)]
struct SearchArgs {
    #[serde(default)]
    query: String,
}

impl LlmPlanner {
    pub fn new(llm: LlmClient, search: Arc<dyn ProductSearch>) -> Self {
        Self { llm, search }
    }

    fn tool_declaration() -> serde_json::Value {
        serde_json::json!([{
            "type": "function",
            "function": {
                "name": SEARCH_TOOL_NAME,
                "description": "Search for skincare products based on skin conditions",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "query": {
                            "type": "string",
                            "description": "Search query for skincare products"
                        }
                    },
                    "required": ["query"]
                }
            }
        }])
    }
}

#[async_trait]
impl Planner for LlmPlanner {
    async fn plan(
        &self,
        visual_summary: &str,
        user_note: Option<&str>,
    ) -> Result<(Plan, Vec<Product>), LlmError> {
        let params = ChatParams {
            system: SYSTEM_PROMPT_PLAN,
            user: format!(
                "Based on this skin analysis, search for appropriate skincare products.\n\n\
                 Skin analysis:\n{visual_summary}\n\n\
                 User note: {}\n\n\
                 Now call the search_products function with an appropriate query based on the skin issues identified.",
                user_note.unwrap_or("No additional notes")
            ),
            temperature: 0.1,
            max_tokens: 256,
            tools: Some(Self::tool_declaration()),
            tool_choice: Some(serde_json::json!({
                "type": "function",
                "function": { "name": SEARCH_TOOL_NAME }
            })),
            json_response: false,
        };

        let response = with_backoff("planning", || self.llm.chat(&params)).await?;

        let tool_query = extract_tool_query(&response);
        let (query_used, products) =
            resolve_products(self.search.as_ref(), tool_query.as_deref(), visual_summary).await;

        let plan = build_plan(visual_summary, &query_used);
        tracing::info!(
            skin_type = %plan.skin_type,
            products = products.len(),
            "plan created"
        );
        Ok((plan, products))
    }
}

/// Pull the query out of the first usable `search_products` tool call.
fn extract_tool_query(response: &crate::services::llm::ChatResponse) -> Option<String> {
    let choice = response.choices.first()?;
    for call in &choice.message.tool_calls {
        if call.function.name != SEARCH_TOOL_NAME {
            continue;
        }
        let args: SearchArgs = serde_json::from_str(&call.function.arguments)
            .unwrap_or(SearchArgs { query: String::new() });
        if !args.query.is_empty() {
            tracing::info!(tool_call_id = %call.id, query = %args.query, "tool call detected");
            return Some(args.query);
        }
    }
    None
}

/// Execute the product search, falling back to the keyword synthesizer when
/// the model skipped the tool or its query failed. Returns the fallback query
/// when one drove the search (empty string means the model's own call did).
/// Search failures degrade to an empty product list, never an error.
async fn resolve_products(
    search: &dyn ProductSearch,
    tool_query: Option<&str>,
    visual_summary: &str,
) -> (String, Vec<Product>) {
    if let Some(query) = tool_query {
        match search.search(query, SEARCH_RESULT_COUNT).await {
            Ok(found) => return (String::new(), found),
            Err(e) => {
                tracing::warn!(error = %e, "tool search failed");
            }
        }
    }

    let fallback = fallback_query(visual_summary);
    tracing::info!(query = %fallback, "no usable tool call, using fallback query");
    match search.search(&fallback, SEARCH_RESULT_COUNT).await {
        Ok(found) => (fallback, found),
        Err(e) => {
            tracing::warn!(error = %e, "fallback search failed");
            (fallback, Vec::new())
        }
    }
}

/// Synthesize a search query from skin-concern keywords in the summary.
/// Joins up to two matched fragments; generic default when nothing matches.
pub fn fallback_query(visual_summary: &str) -> String {
    let low = visual_summary.to_lowercase();
    let mut queries = Vec::new();

    if low.contains("blackhead") || low.contains("comedone") {
        queries.push("blackheads comedones treatment");
    }
    if low.contains("dehydrat") || low.contains("dry") {
        queries.push("dehydrated skin moisturizer");
    }
    if low.contains("acne") || low.contains("pimple") || low.contains("pustule") {
        queries.push("acne treatment products");
    }
    if low.contains("aging") || low.contains("fine line") || low.contains("wrinkle") {
        queries.push("anti-aging skincare");
    }
    if low.contains("hyperpigmentation") || low.contains("dark spot") {
        queries.push("hyperpigmentation treatment");
    }
    if low.contains("inflam") || low.contains("redness") {
        queries.push("anti-inflammatory skincare");
    }
    if low.contains("oily") {
        queries.push("oil control products");
    }

    if queries.is_empty() {
        "skincare products routine".to_string()
    } else {
        queries[..queries.len().min(2)].join(" ")
    }
}

/// Deterministic skin-type classification, first match wins:
/// oily (and not dry), dry (and not oily), normal, sensitive, then
/// combination as the default.
pub fn classify_skin_type(visual_summary: &str) -> &'static str {
    let low = visual_summary.to_lowercase();
    if low.contains("oily") && !low.contains("dry") {
        "oily"
    } else if low.contains("dry") && !low.contains("oily") {
        "dry"
    } else if low.contains("normal") {
        "normal"
    } else if low.contains("sensitive") {
        "sensitive"
    } else {
        "combination"
    }
}

/// Assemble a plan from the visual summary via keyword scans.
/// `query` records the fallback query when one was used; empty means the
/// model's own tool call drove the search.
pub fn build_plan(visual_summary: &str, query: &str) -> Plan {
    let low = visual_summary.to_lowercase();

    let mut concerns = Vec::new();
    if low.contains("blackhead") || low.contains("comedone") {
        concerns.push("blackheads and comedones".to_string());
    }
    if low.contains("dehydrat") {
        concerns.push("dehydration".to_string());
    }
    if low.contains("acne") {
        concerns.push("acne".to_string());
    }
    if low.contains("hyperpigmentation") {
        concerns.push("hyperpigmentation".to_string());
    }
    if low.contains("aging") || low.contains("fine line") {
        concerns.push("signs of aging".to_string());
    }
    if low.contains("inflam") || low.contains("redness") {
        concerns.push("inflammation and redness".to_string());
    }

    let mut deficiencies = Vec::new();
    if low.contains("dehydrat") || low.contains("dry") {
        deficiencies.push("moisture".to_string());
    }
    if low.contains("dull") {
        deficiencies.push("radiance".to_string());
    }
    if low.contains("barrier") && low.contains("compromised") {
        deficiencies.push("barrier function".to_string());
    }

    let mut excesses = Vec::new();
    if low.contains("oily") || low.contains("sebum") {
        excesses.push("sebum production".to_string());
    }
    if low.contains("comedone") {
        excesses.push("clogged pores".to_string());
    }

    let mut diagnosis = visual_summary
        .lines()
        .next()
        .unwrap_or("Skin analysis completed")
        .replace("**Summary:**", "")
        .replace("**", "")
        .trim()
        .to_string();
    if diagnosis.is_empty() {
        diagnosis = "Skin analysis completed".to_string();
    }
    if diagnosis.chars().count() > 500 {
        diagnosis = diagnosis.chars().take(500).collect();
    }

    let query = if !query.is_empty() {
        query.to_string()
    } else if !concerns.is_empty() {
        concerns[..concerns.len().min(2)].join(" ")
    } else {
        "skincare products".to_string()
    };

    Plan {
        skin_type: classify_skin_type(visual_summary).to_string(),
        diagnosis,
        concerns,
        deficiencies,
        excesses,
        query,
        need_search: true,
        visual_summary: visual_summary.to_string(),
    }
}
