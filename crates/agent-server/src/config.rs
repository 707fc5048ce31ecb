//! Server Configuration
//!
//! Read once at startup from the environment (after `.env` is loaded).
//! Unset variables take defaults; set-but-invalid values are errors.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use agent_core::{AgentConfig, GenerationOptions};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name}={value:?} is invalid: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub max_iterations: usize,
    pub model_timeout: Duration,
    pub tool_timeout: Duration,
    /// Prior turns loaded from the session store when a request names a session
    pub history_limit: usize,
    /// Sessions the in-memory history store keeps before evicting
    pub max_sessions: usize,
    pub knowledge_path: Option<PathBuf>,
    pub secret_key: Option<String>,
    pub turnstile_secret: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let agent = AgentConfig::default();
        Self {
            bind_addr: "0.0.0.0:3000".into(),
            model: agent.generation.model,
            temperature: agent.generation.temperature,
            max_tokens: agent.generation.max_tokens,
            max_iterations: agent.max_iterations,
            model_timeout: Duration::from_secs(120),
            tool_timeout: Duration::from_secs(30),
            history_limit: 20,
            max_sessions: agent_core::session::DEFAULT_MAX_SESSIONS,
            knowledge_path: None,
            secret_key: None,
            turnstile_secret: None,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let temperature = parse(&get, "ASSISTANT_TEMPERATURE", defaults.temperature)?;
        if !temperature.is_finite() || temperature < 0.0 {
            return Err(invalid("ASSISTANT_TEMPERATURE", temperature.to_string(), "must be >= 0"));
        }

        Ok(Self {
            bind_addr: get("BIND_ADDR").unwrap_or(defaults.bind_addr),
            model: get("ASSISTANT_MODEL").unwrap_or(defaults.model),
            temperature,
            max_tokens: positive(&get, "ASSISTANT_MAX_TOKENS", defaults.max_tokens)?,
            max_iterations: positive(&get, "ASSISTANT_MAX_ITERATIONS", defaults.max_iterations)?,
            model_timeout: Duration::from_secs(positive(
                &get,
                "ASSISTANT_MODEL_TIMEOUT_SECS",
                defaults.model_timeout.as_secs(),
            )?),
            tool_timeout: Duration::from_secs(positive(
                &get,
                "ASSISTANT_TOOL_TIMEOUT_SECS",
                defaults.tool_timeout.as_secs(),
            )?),
            history_limit: parse(&get, "ASSISTANT_HISTORY_LIMIT", defaults.history_limit)?,
            max_sessions: positive(&get, "ASSISTANT_MAX_SESSIONS", defaults.max_sessions)?,
            knowledge_path: get("STORE_KNOWLEDGE_PATH").map(PathBuf::from),
            secret_key: get("SECRET_KEY"),
            turnstile_secret: get("TURNSTILE_SECRET_KEY"),
        })
    }

    /// Agent configuration for one request
    pub fn agent_config(&self, system_prompt: String) -> AgentConfig {
        AgentConfig {
            system_prompt,
            max_iterations: self.max_iterations,
            generation: GenerationOptions {
                model: self.model.clone(),
                temperature: self.temperature,
                max_tokens: self.max_tokens,
                ..Default::default()
            },
            model_timeout: Some(self.model_timeout),
            tool_timeout: Some(self.tool_timeout),
            ..Default::default()
        }
    }
}

fn invalid(name: &'static str, value: String, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        name,
        value,
        reason: reason.into(),
    }
}

fn parse<T>(get: &impl Fn(&str) -> Option<String>, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(name) {
        Some(raw) => raw.parse().map_err(|e: T::Err| invalid(name, raw, e.to_string())),
        None => Ok(default),
    }
}

fn positive<T>(get: &impl Fn(&str) -> Option<String>, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd + Default + ToString,
    T::Err: std::fmt::Display,
{
    let value = parse(get, name, default)?;
    if value <= T::default() {
        return Err(invalid(name, value.to_string(), "must be > 0"));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<ServerConfig, ConfigError> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| ((*k).into(), (*v).into())).collect();
        ServerConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:3000");
        assert_eq!(config.model, "llama3.2");
        assert_eq!(config.max_iterations, 5);
        assert_eq!(config.max_tokens, 2048);
        assert_eq!(config.model_timeout, Duration::from_secs(120));
        assert_eq!(config.max_sessions, 10_000);
        assert!(config.secret_key.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("ASSISTANT_MODEL", "qwen2.5"),
            ("ASSISTANT_TEMPERATURE", "0.2"),
            ("ASSISTANT_MAX_ITERATIONS", "3"),
            ("ASSISTANT_TOOL_TIMEOUT_SECS", "5"),
            ("STORE_KNOWLEDGE_PATH", "store.json"),
            ("TURNSTILE_SECRET_KEY", "  "),
        ])
        .unwrap();

        assert_eq!(config.model, "qwen2.5");
        assert_eq!(config.max_iterations, 3);
        assert_eq!(config.tool_timeout, Duration::from_secs(5));
        assert_eq!(config.knowledge_path, Some(PathBuf::from("store.json")));
        assert!(config.turnstile_secret.is_none());

        let agent = config.agent_config("prompt".into());
        assert!(agent.validate().is_ok());
        assert_eq!(agent.generation.model, "qwen2.5");
    }

    #[test]
    fn test_invalid_values() {
        for (name, value) in [
            ("ASSISTANT_MAX_ITERATIONS", "0"),
            ("ASSISTANT_MAX_TOKENS", "lots"),
            ("ASSISTANT_TEMPERATURE", "-1"),
            ("ASSISTANT_MODEL_TIMEOUT_SECS", "0"),
            ("ASSISTANT_MAX_SESSIONS", "0"),
        ] {
            let err = config(&[(name, value)]).unwrap_err();
            assert!(err.to_string().starts_with(name), "{err}");
        }
    }
}
