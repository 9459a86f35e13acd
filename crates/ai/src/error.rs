use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AiError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The assistant cannot run (no API key, no caller token).
    #[error("AI assistant unavailable: {0}")]
    NotConfigured(String),

    /// LLM or tool server failed at the transport or protocol level.
    #[error("LLM API error: {0}")]
    Upstream(String),
}
