//! Conversion of tool-server tool descriptions into chat function tools.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue, json};

use crate::message::ToolDefinition;

/// A tool as advertised by the tool server's `tools/list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpTool {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "inputSchema", default)]
    pub input_schema: JsonValue,
}

/// Canonical definitions for the pagination and search parameters every
/// listing tool shares. Models follow these far better than generated schemas.
fn canonical_property(name: &str) -> Option<JsonValue> {
    match name {
        "search" => Some(json!({
            "type": "string",
            "description": "Search term to filter results by name (optional)",
        })),
        "page" => Some(json!({
            "type": "integer",
            "description": "Page number for pagination (default: 1)",
            "default": 1,
        })),
        "limit" => Some(json!({
            "type": "integer",
            "description": "Number of items per page (default: 100)",
            "default": 100,
        })),
        _ => None,
    }
}

pub fn to_openai_tools(tools: &[McpTool]) -> Vec<ToolDefinition> {
    tools
        .iter()
        .map(|tool| {
            let mut properties = Map::new();
            if let Some(source) = tool.input_schema.get("properties").and_then(JsonValue::as_object) {
                for (name, definition) in source {
                    let property = canonical_property(name).unwrap_or_else(|| definition.clone());
                    properties.insert(name.clone(), property);
                }
            }
            let required = tool
                .input_schema
                .get("required")
                .cloned()
                .unwrap_or_else(|| json!([]));

            tracing::debug!(tool = %tool.name, params = properties.len(), "converted tool schema");

            ToolDefinition::function(
                tool.name.clone(),
                tool.description.clone(),
                json!({ "type": "object", "properties": properties, "required": required }),
            )
        })
        .collect()
}
