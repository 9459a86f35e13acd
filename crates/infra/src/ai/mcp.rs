//! MCP tool server client (streamable HTTP transport).
//!
//! Each operation opens a short session: `initialize`, the
//! `notifications/initialized` notification, then the actual request. The
//! caller's bearer token is forwarded on every call so the tool server acts
//! with the caller's permissions. Responses may come back as plain JSON or as
//! a single-event SSE stream.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value as JsonValue, json};
use tracing::{debug, warn};

use calculaud_ai::{AiError, McpTool, ToolServer};

use crate::config::AiConfig;

const PROTOCOL_VERSION: &str = "2025-03-26";
const SESSION_HEADER: &str = "mcp-session-id";

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<JsonValue>,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct ToolList {
    #[serde(default)]
    tools: Vec<McpTool>,
}

#[derive(Debug)]
pub struct McpToolServer {
    client: reqwest::Client,
    url: String,
    next_id: AtomicU64,
}

impl McpToolServer {
    pub fn new(config: &AiConfig) -> Result<Self, AiError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AiError::NotConfigured(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            url: config.mcp_server_url.clone(),
            next_id: AtomicU64::new(1),
        })
    }

    async fn post(
        &self,
        token: &str,
        session: Option<&str>,
        body: &JsonValue,
    ) -> Result<reqwest::Response, AiError> {
        let mut request = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {token}"))
            .header("Accept", "application/json, text/event-stream")
            .json(body);
        if let Some(session) = session {
            request = request.header(SESSION_HEADER, session);
        }
        let response = request
            .send()
            .await
            .map_err(|e| AiError::Upstream(format!("tool server unreachable: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AiError::Upstream(format!("tool server returned {status}: {error_text}")));
        }
        Ok(response)
    }

    /// Sends one JSON-RPC request and returns its `result`.
    async fn request(
        &self,
        token: &str,
        session: Option<&str>,
        method: &str,
        params: JsonValue,
    ) -> Result<(JsonValue, Option<String>), AiError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params});
        debug!(method, id, "mcp request");

        let response = self.post(token, session, &body).await?;
        let session_id = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let text = response
            .text()
            .await
            .map_err(|e| AiError::Upstream(format!("failed to read tool server response: {e}")))?;

        let rpc = parse_rpc_body(&text)?;
        if let Some(err) = rpc.error {
            return Err(AiError::Upstream(format!("{method} failed ({}): {}", err.code, err.message)));
        }
        let result = rpc
            .result
            .ok_or_else(|| AiError::Upstream(format!("{method} returned no result")))?;
        Ok((result, session_id))
    }

    async fn open_session(&self, token: &str) -> Result<Option<String>, AiError> {
        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {"name": "calculaud", "version": env!("CARGO_PKG_VERSION")},
        });
        let (_, session) = self.request(token, None, "initialize", params).await?;

        let notification = json!({"jsonrpc": "2.0", "method": "notifications/initialized"});
        if let Err(e) = self.post(token, session.as_deref(), &notification).await {
            warn!(error = %e, "initialized notification rejected");
        }
        Ok(session)
    }
}

/// Accepts either a JSON body or an SSE stream and returns the first
/// JSON-RPC response in it.
fn parse_rpc_body(text: &str) -> Result<RpcResponse, AiError> {
    let trimmed = text.trim_start();
    if trimmed.starts_with('{') {
        return serde_json::from_str(trimmed)
            .map_err(|e| AiError::Upstream(format!("invalid tool server response: {e}")));
    }
    trimmed
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(str::trim)
        .filter(|data| !data.is_empty())
        .find_map(|data| serde_json::from_str::<RpcResponse>(data).ok())
        .ok_or_else(|| AiError::Upstream("tool server sent no JSON-RPC response".into()))
}

/// Concatenated text of a `tools/call` result.
fn tool_result_text(result: &JsonValue) -> String {
    let texts: Vec<&str> = result
        .get("content")
        .and_then(JsonValue::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get("text").and_then(JsonValue::as_str))
                .collect()
        })
        .unwrap_or_default();
    if texts.is_empty() {
        result.to_string()
    } else {
        texts.join("\n")
    }
}

#[async_trait]
impl ToolServer for McpToolServer {
    async fn list_tools(&self, token: &str) -> Result<Vec<McpTool>, AiError> {
        let session = self.open_session(token).await?;
        let (result, _) = self
            .request(token, session.as_deref(), "tools/list", json!({}))
            .await?;
        let list: ToolList = serde_json::from_value(result)
            .map_err(|e| AiError::Upstream(format!("invalid tools/list result: {e}")))?;
        debug!(count = list.tools.len(), "mcp tools listed");
        Ok(list.tools)
    }

    async fn call_tool(&self, token: &str, name: &str, arguments: JsonValue) -> Result<String, AiError> {
        let session = self.open_session(token).await?;
        let params = json!({"name": name, "arguments": arguments});
        let (result, _) = self
            .request(token, session.as_deref(), "tools/call", params)
            .await?;

        let text = tool_result_text(&result);
        if result.get("isError").and_then(JsonValue::as_bool).unwrap_or(false) {
            return Err(AiError::Upstream(text));
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_json_body() {
        let rpc = parse_rpc_body(r#"{"jsonrpc":"2.0","id":1,"result":{"tools":[]}}"#).unwrap();
        assert_eq!(rpc.result, Some(json!({"tools": []})));
    }

    #[test]
    fn parses_event_stream_body() {
        let body = "event: message\ndata: {\"jsonrpc\":\"2.0\",\"id\":2,\"result\":{\"content\":[{\"type\":\"text\",\"text\":\"3 suppliers\"}]}}\n\n";
        let rpc = parse_rpc_body(body).unwrap();
        assert_eq!(tool_result_text(&rpc.result.unwrap()), "3 suppliers");
    }

    #[test]
    fn rpc_errors_are_parsed() {
        let rpc = parse_rpc_body(r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32601,"message":"no such method"}}"#)
            .unwrap();
        let err = rpc.error.unwrap();
        assert_eq!(err.code, -32601);
        assert_eq!(err.message, "no such method");
    }

    #[test]
    fn empty_stream_is_an_upstream_error() {
        assert!(matches!(parse_rpc_body(": keep-alive\n\n"), Err(AiError::Upstream(_))));
    }

    #[test]
    fn result_without_text_content_is_serialized() {
        assert_eq!(tool_result_text(&json!({"value": 1})), r#"{"value":1}"#);
    }
}
