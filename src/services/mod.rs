pub mod finalizer;
pub mod jobs;
pub mod llm;
pub mod pipeline;
pub mod planner;
pub mod retry;
pub mod search;
pub mod vision;
