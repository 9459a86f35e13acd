//! Process configuration read from the environment.
//!
//! Every setting has a default so the service boots with an empty
//! environment (in-memory store, assistant disabled).

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: '{value}' ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

pub const DEFAULT_JWT_SECRET: &str = "dev-secret";

#[derive(Debug, Clone, PartialEq)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub issuer: Option<String>,
    pub audience: Option<String>,
    pub admin_role: String,
    pub user_role: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AiConfig {
    pub llm_base_url: String,
    pub llm_api_key: String,
    pub model_name: String,
    pub mcp_server_url: String,
    pub timeout: Duration,
}

impl AiConfig {
    /// The assistant needs an API key; everything else has a usable default.
    pub fn is_configured(&self) -> bool {
        !self.llm_api_key.trim().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub auth: AuthConfig,
    pub app_name: String,
    pub app_version: String,
    pub environment: String,
    pub default_page_size: u32,
    pub max_page_size: u32,
    pub usd_to_ils_rate: f64,
    pub ai: AiConfig,
    pub stuck_threshold_days: i64,
    /// `None` disables the in-process runner.
    pub stuck_scan_interval: Option<Duration>,
}

impl AppConfig {
    /// Load `.env` (if present) and read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &str, default: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };
        let optional = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let jwt_secret = optional("JWT_SECRET").unwrap_or_else(|| {
            tracing::warn!("JWT_SECRET not set, using development default");
            DEFAULT_JWT_SECRET.to_string()
        });

        let scan_secs: u64 = parse(&lookup, "STUCK_SCAN_INTERVAL_SECS", 0)?;

        Ok(Self {
            bind_addr: parse(&lookup, "BIND_ADDR", SocketAddr::from(([0, 0, 0, 0], 8080)))?,
            database_url: optional("DATABASE_URL"),
            database_max_connections: parse(&lookup, "DATABASE_MAX_CONNECTIONS", 10)?,
            auth: AuthConfig {
                jwt_secret,
                issuer: optional("AUTH_ISSUER"),
                audience: optional("AUTH_AUDIENCE"),
                admin_role: text("ADMIN_ROLE", "admin"),
                user_role: text("USER_ROLE", "user"),
            },
            app_name: text("APP_NAME", "Procurement Management System"),
            app_version: text("APP_VERSION", env!("CARGO_PKG_VERSION")),
            environment: text("ENVIRONMENT", "development"),
            default_page_size: parse(&lookup, "DEFAULT_PAGE_SIZE", 100)?,
            max_page_size: parse(&lookup, "MAX_PAGE_SIZE", 200)?,
            usd_to_ils_rate: parse(&lookup, "USD_TO_ILS_RATE", 3.7)?,
            ai: AiConfig {
                llm_base_url: text("LLM_BASE_URL", "https://api.openai.com/v1"),
                llm_api_key: text("LLM_API_KEY", ""),
                model_name: text("MODEL_NAME", "gpt-4o"),
                mcp_server_url: text("MCP_SERVER_URL", "http://localhost:8000/mcp"),
                timeout: Duration::from_secs(parse(&lookup, "AI_TIMEOUT_SECS", 60)?),
            },
            stuck_threshold_days: parse(&lookup, "STUCK_THRESHOLD_DAYS", 10)?,
            stuck_scan_interval: (scan_secs > 0).then(|| Duration::from_secs(scan_secs)),
        })
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        // An empty environment always parses.
        match Self::from_lookup(|_| None) {
            Ok(config) => config,
            Err(_) => unreachable!("defaults are valid"),
        }
    }
}

fn parse<T, F>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: core::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key).filter(|v| !v.trim().is_empty()) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn empty_environment_uses_defaults() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.bind_addr.port(), 8080);
        assert!(cfg.database_url.is_none());
        assert_eq!(cfg.auth.jwt_secret, DEFAULT_JWT_SECRET);
        assert_eq!(cfg.default_page_size, 100);
        assert_eq!(cfg.max_page_size, 200);
        assert_eq!(cfg.usd_to_ils_rate, 3.7);
        assert_eq!(cfg.stuck_threshold_days, 10);
        assert!(cfg.stuck_scan_interval.is_none());
        assert!(!cfg.ai.is_configured());
    }

    #[test]
    fn overrides_are_applied() {
        let cfg = config(&[
            ("DATABASE_URL", "postgres://localhost/calculaud"),
            ("USD_TO_ILS_RATE", "3.5"),
            ("STUCK_SCAN_INTERVAL_SECS", "3600"),
            ("LLM_API_KEY", "sk-test"),
            ("AUTH_AUDIENCE", "calculaud"),
        ])
        .unwrap();
        assert_eq!(cfg.database_url.as_deref(), Some("postgres://localhost/calculaud"));
        assert_eq!(cfg.usd_to_ils_rate, 3.5);
        assert_eq!(cfg.stuck_scan_interval, Some(Duration::from_secs(3600)));
        assert!(cfg.ai.is_configured());
        assert_eq!(cfg.auth.audience.as_deref(), Some("calculaud"));
    }

    #[test]
    fn malformed_numbers_are_rejected() {
        let err = config(&[("MAX_PAGE_SIZE", "lots")]).unwrap_err();
        let ConfigError::Invalid { key, value, .. } = err;
        assert_eq!(key, "MAX_PAGE_SIZE");
        assert_eq!(value, "lots");
    }
}
