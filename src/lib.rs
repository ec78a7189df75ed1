//! Dreampath — guided discovery and action pipeline core.

pub mod cache;
pub mod config;
pub mod error;
pub mod interview;
pub mod llm;
pub mod pipeline;
pub mod profile;
pub mod progress;
pub mod retry;
pub mod steps;
pub mod store;
