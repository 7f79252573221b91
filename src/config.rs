/// Agent configuration.
///
/// Configuration is a JSON document with three sections:
///
/// ```json
/// {
///   "general": {
///     "agent_name": "tsla-agent",
///     "trading_symbol": "TSLA",
///     "character_string": "A risk-aware growth investor ...",
///     "top_k": 5,
///     "look_back_window_size": 7
///   },
///   "chat": { "endpoint": "openai", "model": "gpt-4", "temperature": 0.7 },
///   "memory": { "short": { ... } }
/// }
/// ```
///
/// `memory` is optional; every tier falls back to its defaults.
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;

use crate::error::{ReflectError, ReflectResult};
use crate::memory::MemoryConfig;

fn default_top_k() -> usize {
    5
}

fn default_look_back_window_size() -> usize {
    7
}

fn default_model() -> String {
    "gpt-4".to_string()
}

fn default_temperature() -> f64 {
    0.7
}

fn default_timeout_secs() -> u64 {
    60
}

/// Identity and retrieval parameters of one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneralConfig {
    pub agent_name: String,
    pub trading_symbol: String,
    /// Persona text, used verbatim as the retrieval query
    pub character_string: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_look_back_window_size")]
    pub look_back_window_size: usize,
}

/// Reasoning endpoint configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Endpoint family name (e.g. "openai")
    pub endpoint: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// JSON reasoning endpoint; without it reflections never converge
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            endpoint: "openai".to_string(),
            model: default_model(),
            temperature: default_temperature(),
            url: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Complete configuration of one decision loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub general: GeneralConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
}

impl AgentConfig {
    pub fn new(
        agent_name: impl Into<String>,
        trading_symbol: impl Into<String>,
        character_string: impl Into<String>,
    ) -> Self {
        Self {
            general: GeneralConfig {
                agent_name: agent_name.into(),
                trading_symbol: trading_symbol.into(),
                character_string: character_string.into(),
                top_k: default_top_k(),
                look_back_window_size: default_look_back_window_size(),
            },
            chat: ChatConfig::default(),
            memory: MemoryConfig::default(),
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.general.top_k = top_k;
        self
    }

    pub fn with_look_back_window(mut self, size: usize) -> Self {
        self.general.look_back_window_size = size;
        self
    }

    pub fn with_chat(mut self, chat: ChatConfig) -> Self {
        self.chat = chat;
        self
    }

    pub fn agent_name(&self) -> &str {
        &self.general.agent_name
    }

    pub fn symbol(&self) -> &str {
        &self.general.trading_symbol
    }

    pub fn character_string(&self) -> &str {
        &self.general.character_string
    }

    pub fn top_k(&self) -> usize {
        self.general.top_k
    }

    pub fn look_back_window_size(&self) -> usize {
        self.general.look_back_window_size
    }

    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> ReflectResult<Self> {
        let config: AgentConfig = serde_json::from_str(json)
            .map_err(|e| ReflectError::config(format!("Invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON configuration file.
    pub async fn load(path: &Path) -> ReflectResult<Self> {
        let json = fs::read_to_string(path).await.map_err(|e| {
            ReflectError::config(format!("Cannot read config '{}': {}", path.display(), e))
        })?;
        Self::from_json_str(&json)
    }

    /// Reject configurations the decision loop cannot run with.
    pub fn validate(&self) -> ReflectResult<()> {
        let general = &self.general;
        let required = [
            ("general.agent_name", &general.agent_name),
            ("general.trading_symbol", &general.trading_symbol),
            ("general.character_string", &general.character_string),
            ("chat.endpoint", &self.chat.endpoint),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(ReflectError::config(format!("{} must not be empty", field)));
            }
        }
        if general.top_k == 0 {
            return Err(ReflectError::config("general.top_k must be at least 1"));
        }
        if general.look_back_window_size == 0 {
            return Err(ReflectError::config(
                "general.look_back_window_size must be at least 1",
            ));
        }
        Ok(())
    }
}
