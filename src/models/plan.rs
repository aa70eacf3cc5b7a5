use serde::{Deserialize, Serialize};

/// Intermediate structured output of the planning stage.
///
/// Built deterministically from the visual summary (keyword heuristics) and
/// the executed product search; embedded in job progress, never persisted on
/// its own.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Plan {
    pub skin_type: String,
    pub diagnosis: String,
    pub concerns: Vec<String>,
    pub deficiencies: Vec<String>,
    pub excesses: Vec<String>,
    /// Search query that produced the candidate products.
    pub query: String,
    pub need_search: bool,
    /// Raw visual-analysis text carried along for traceability.
    pub visual_summary: String,
}
