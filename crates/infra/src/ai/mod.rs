//! HTTP adapters for the procurement assistant.
//!
//! The assistant only sees the `ChatModel` / `ToolServer` seams; these are the
//! production implementations.

pub mod mcp;
pub mod openai;

use std::sync::Arc;

use calculaud_ai::{AiError, Assistant};

use crate::config::AiConfig;

pub use mcp::McpToolServer;
pub use openai::OpenAiChatModel;

/// Build the assistant when an API key is configured; `Ok(None)` otherwise.
pub fn build_assistant(config: &AiConfig) -> Result<Option<Assistant>, AiError> {
    if !config.is_configured() {
        return Ok(None);
    }
    let model = Arc::new(OpenAiChatModel::new(config)?);
    let tools = Arc::new(McpToolServer::new(config)?);
    Ok(Some(Assistant::new(model, tools)))
}
