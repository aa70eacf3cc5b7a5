//! Skin Analysis Recommendation Service
//!
//! Pipelines an image through a vision-language model (skin analysis), an
//! LLM tool-calling planning step (product search), and an LLM structured
//! JSON finalization step, orchestrated as detached background jobs tracked
//! in an in-memory job store.

pub mod app_state;
pub mod config;
pub mod models;
pub mod routes;
pub mod services;
