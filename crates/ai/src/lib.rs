//! `calculaud-ai`
//!
//! **Responsibility:** the procurement assistant boundary.
//!
//! This crate is intentionally **not** part of the domain model:
//! - It must not depend on procurement crates.
//! - It never writes procurement data; tools are executed by a remote tool
//!   server on behalf of the caller.
//! - Transport lives in infra behind the [`ChatModel`] and [`ToolServer`] seams.

pub mod assistant;
pub mod error;
pub mod message;
pub mod tools;

pub use assistant::{
    Assistant, ChatModel, FALLBACK_ANSWER, QUESTION_MAX_LEN, ToolServer, requires_tools, validate_question,
};
pub use error::AiError;
pub use message::{ChatMessage, ChatRole, FunctionCall, FunctionDefinition, ToolCall, ToolChoice, ToolDefinition};
pub use tools::{McpTool, to_openai_tools};
