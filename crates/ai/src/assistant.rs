//! Question answering over procurement data via tool calls.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::error::AiError;
use crate::message::{ChatMessage, ToolChoice, ToolDefinition};
use crate::tools::{McpTool, to_openai_tools};

pub const QUESTION_MAX_LEN: usize = 5000;
pub const FALLBACK_ANSWER: &str = "I couldn't generate a response.";

const SYSTEM_PROMPT: &str = "You are a procurement system assistant. You MUST use the available tools \
to answer questions about procurement data. \
NEVER provide generic answers - ALWAYS call tools first to get real data.\n\n\
Examples:\n\
- User asks 'show me suppliers' -> CALL get_suppliers tool immediately\n\
- User asks 'find Google suppliers' -> CALL get_suppliers tool with search='Google'\n\
- User asks 'list all suppliers' -> CALL get_suppliers tool with no search parameter\n\n\
Instructions:\n\
1. Identify if the question is about procurement data (suppliers, purposes, purchases, costs)\n\
2. If yes, immediately call the appropriate tool\n\
3. Use the tool results to provide a helpful answer\n\
4. If no relevant tool exists, say so clearly";

const PROCUREMENT_KEYWORDS: [&str; 12] = [
    "supplier",
    "suppliers",
    "vendor",
    "vendors",
    "purpose",
    "purposes",
    "purchase",
    "purchases",
    "cost",
    "costs",
    "hierarchy",
    "hierarchies",
];

/// A chat-completions endpoint.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Returns the first choice's message. `tools` empty means no tools are
    /// offered and `tool_choice` is ignored.
    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
        tool_choice: ToolChoice,
    ) -> Result<ChatMessage, AiError>;
}

/// A remote tool server that acts with the caller's bearer token.
#[async_trait]
pub trait ToolServer: Send + Sync {
    async fn list_tools(&self, token: &str) -> Result<Vec<McpTool>, AiError>;

    /// Runs one tool and returns its textual result.
    async fn call_tool(&self, token: &str, name: &str, arguments: JsonValue) -> Result<String, AiError>;
}

/// True when the question mentions procurement data and tools must be used.
pub fn requires_tools(question: &str) -> bool {
    let lowered = question.to_lowercase();
    PROCUREMENT_KEYWORDS.iter().any(|k| lowered.contains(k))
}

pub fn validate_question(question: &str) -> Result<(), AiError> {
    if question.trim().is_empty() {
        return Err(AiError::InvalidRequest("question must not be empty".into()));
    }
    if question.chars().count() > QUESTION_MAX_LEN {
        return Err(AiError::InvalidRequest(format!(
            "question must be at most {QUESTION_MAX_LEN} characters"
        )));
    }
    Ok(())
}

#[derive(Clone)]
pub struct Assistant {
    model: Arc<dyn ChatModel>,
    tools: Arc<dyn ToolServer>,
}

impl Assistant {
    pub fn new(model: Arc<dyn ChatModel>, tools: Arc<dyn ToolServer>) -> Self {
        Self { model, tools }
    }

    /// Answers `question`, letting the model call tools at most one round.
    pub async fn ask(&self, question: &str, token: &str) -> Result<String, AiError> {
        validate_question(question)?;
        if token.trim().is_empty() {
            return Err(AiError::NotConfigured(
                "Authorization token required for MCP server access".into(),
            ));
        }

        let available = self.tools.list_tools(token).await?;
        let definitions = to_openai_tools(&available);
        tracing::info!(tools = definitions.len(), "loaded assistant tools");

        let tool_choice = if requires_tools(question) && !definitions.is_empty() {
            ToolChoice::Required
        } else {
            ToolChoice::Auto
        };

        let mut messages = vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(question)];
        let reply = self.model.complete(&messages, &definitions, tool_choice).await?;

        if reply.tool_calls.is_empty() {
            tracing::warn!(?tool_choice, "model answered without calling tools");
            return Ok(answer_or_fallback(reply));
        }

        let calls = reply.tool_calls.clone();
        messages.push(reply);

        for call in &calls {
            let outcome = match serde_json::from_str::<JsonValue>(&call.function.arguments) {
                Ok(arguments) => self.tools.call_tool(token, &call.function.name, arguments).await,
                Err(e) => Err(AiError::InvalidRequest(format!("malformed tool arguments: {e}"))),
            };
            let content = match outcome {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!(tool = %call.function.name, error = %e, "tool call failed");
                    format!("Error: {e}")
                }
            };
            messages.push(ChatMessage::tool_result(call, content));
        }

        let last = self.model.complete(&messages, &[], ToolChoice::Auto).await?;
        Ok(answer_or_fallback(last))
    }
}

fn answer_or_fallback(message: ChatMessage) -> String {
    message
        .content
        .filter(|c| !c.trim().is_empty())
        .unwrap_or_else(|| FALLBACK_ANSWER.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{ChatRole, FunctionCall, ToolCall};
    use serde_json::json;
    use std::sync::Mutex;

    struct ScriptedModel {
        replies: Mutex<Vec<ChatMessage>>,
        seen: Mutex<Vec<(Vec<ChatMessage>, usize, ToolChoice)>>,
    }

    impl ScriptedModel {
        fn new(mut replies: Vec<ChatMessage>) -> Arc<Self> {
            replies.reverse();
            Arc::new(Self { replies: Mutex::new(replies), seen: Mutex::new(Vec::new()) })
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        async fn complete(
            &self,
            messages: &[ChatMessage],
            tools: &[ToolDefinition],
            tool_choice: ToolChoice,
        ) -> Result<ChatMessage, AiError> {
            self.seen.lock().unwrap().push((messages.to_vec(), tools.len(), tool_choice));
            self.replies
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| AiError::Upstream("no scripted reply".into()))
        }
    }

    struct FakeTools {
        tools: Vec<McpTool>,
        calls: Mutex<Vec<(String, String, JsonValue)>>,
    }

    impl FakeTools {
        fn new(names: &[&str]) -> Arc<Self> {
            let tools = names
                .iter()
                .map(|n| McpTool { name: n.to_string(), description: None, input_schema: json!({}) })
                .collect();
            Arc::new(Self { tools, calls: Mutex::new(Vec::new()) })
        }
    }

    #[async_trait]
    impl ToolServer for FakeTools {
        async fn list_tools(&self, _token: &str) -> Result<Vec<McpTool>, AiError> {
            Ok(self.tools.clone())
        }

        async fn call_tool(&self, token: &str, name: &str, arguments: JsonValue) -> Result<String, AiError> {
            self.calls.lock().unwrap().push((token.into(), name.into(), arguments));
            match name {
                "get_suppliers" => Ok(r#"[{"id":1,"name":"Acme"}]"#.into()),
                _ => Err(AiError::Upstream("unknown tool".into())),
            }
        }
    }

    fn tool_call(id: &str, name: &str, arguments: &str) -> ToolCall {
        ToolCall {
            id: id.into(),
            kind: "function".into(),
            function: FunctionCall { name: name.into(), arguments: arguments.into() },
        }
    }

    fn calling(calls: Vec<ToolCall>) -> ChatMessage {
        ChatMessage { content: None, tool_calls: calls, ..ChatMessage::assistant("") }
    }

    #[test]
    fn keywords_force_tools() {
        assert!(requires_tools("Which VENDORS do we use?"));
        assert!(requires_tools("show the hierarchy"));
        assert!(!requires_tools("hello there"));
    }

    #[test]
    fn question_validation() {
        assert!(validate_question("   ").is_err());
        assert!(validate_question(&"x".repeat(QUESTION_MAX_LEN + 1)).is_err());
        assert!(validate_question("ok").is_ok());
    }

    #[tokio::test]
    async fn executes_tool_calls_then_asks_again() {
        let model = ScriptedModel::new(vec![
            calling(vec![
                tool_call("c1", "get_suppliers", r#"{"search":"Acme"}"#),
                tool_call("c2", "broken", "{}"),
            ]),
            ChatMessage::assistant("Acme is your supplier."),
        ]);
        let tools = FakeTools::new(&["get_suppliers", "broken"]);
        let assistant = Assistant::new(model.clone(), tools.clone());

        let answer = assistant.ask("list suppliers", "tok").await.unwrap();
        assert_eq!(answer, "Acme is your supplier.");

        let seen = model.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].1, 2);
        assert_eq!(seen[0].2, ToolChoice::Required);
        assert_eq!(seen[1].1, 0);

        let second = &seen[1].0;
        assert_eq!(second.len(), 5);
        assert_eq!(second[2].role, ChatRole::Assistant);
        assert_eq!(second[3].tool_call_id.as_deref(), Some("c1"));
        assert!(second[4].content.as_deref().unwrap().starts_with("Error: "));

        let calls = tools.calls.lock().unwrap();
        assert_eq!(calls[0], ("tok".into(), "get_suppliers".into(), json!({ "search": "Acme" })));
    }

    #[tokio::test]
    async fn general_question_uses_auto_and_falls_back_when_empty() {
        let model = ScriptedModel::new(vec![ChatMessage::assistant("  ")]);
        let assistant = Assistant::new(model.clone(), FakeTools::new(&["get_suppliers"]));

        let answer = assistant.ask("hello", "tok").await.unwrap();
        assert_eq!(answer, FALLBACK_ANSWER);
        assert_eq!(model.seen.lock().unwrap()[0].2, ToolChoice::Auto);
    }

    #[tokio::test]
    async fn no_tools_means_auto_even_for_procurement_questions() {
        let model = ScriptedModel::new(vec![ChatMessage::assistant("none")]);
        let assistant = Assistant::new(model.clone(), FakeTools::new(&[]));

        assistant.ask("costs?", "tok").await.unwrap();
        assert_eq!(model.seen.lock().unwrap()[0].2, ToolChoice::Auto);
    }

    #[tokio::test]
    async fn missing_token_is_not_configured() {
        let assistant = Assistant::new(ScriptedModel::new(vec![]), FakeTools::new(&[]));
        let err = assistant.ask("hi", " ").await.unwrap_err();
        assert!(matches!(err, AiError::NotConfigured(_)));
    }

    #[tokio::test]
    async fn upstream_failure_propagates() {
        let assistant = Assistant::new(ScriptedModel::new(vec![]), FakeTools::new(&[]));
        let err = assistant.ask("hi", "tok").await.unwrap_err();
        assert_eq!(err, AiError::Upstream("no scripted reply".into()));
    }
}
