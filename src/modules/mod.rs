//! Modules layer - Infrastructure components for external integrations
//!
//! Contains clients and adapters for external services like the model API.

pub mod llm;
