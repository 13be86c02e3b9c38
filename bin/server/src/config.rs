//! Centralized server configuration.
//!
//! Loaded via the `config` crate from environment variables, with `__`
//! separating nested keys (`LLM__API_KEY`, `ASSISTANT__MAX_TOOL_ROUNDS`).

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use switchboard_conversation::OrchestratorConfig;

/// Server configuration composed from library configs.
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address the HTTP listener binds to.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Path of the tool catalog JSON document.
    #[serde(default = "default_tool_config_path")]
    pub tool_config_path: PathBuf,

    /// Completion backend settings.
    pub llm: LlmSettings,

    /// Action platform settings.
    pub connector: ConnectorSettings,

    /// Conversation engine settings.
    #[serde(default)]
    pub assistant: AssistantSettings,
}

/// Completion backend settings.
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSettings {
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

/// Action platform settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectorSettings {
    #[serde(default = "default_connector_base_url")]
    pub base_url: String,
    pub secret_key: String,
}

/// Conversation engine settings.
#[derive(Debug, Clone, Deserialize)]
pub struct AssistantSettings {
    /// Context budget in estimated tokens.
    #[serde(default = "default_context_limit")]
    pub context_limit: usize,

    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: usize,

    /// Deadline for backend requests and summarization, in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Deadline for each connector action, in seconds.
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,

    /// Provider used when a request names none.
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Replaces the generated system prompt.
    #[serde(default)]
    pub system_prompt: Option<String>,
}

fn default_bind_addr() -> String {
    "127.0.0.1:3000".to_string()
}

fn default_tool_config_path() -> PathBuf {
    PathBuf::from("config/tools.json")
}

fn default_llm_base_url() -> String {
    "https://api.groq.com/openai/v1".to_string()
}

fn default_model() -> String {
    "llama-3.1-70b-versatile".to_string()
}

fn default_temperature() -> f32 {
    switchboard_ai::DEFAULT_TEMPERATURE
}

fn default_max_tokens() -> u32 {
    switchboard_ai::DEFAULT_MAX_TOKENS
}

fn default_connector_base_url() -> String {
    switchboard_integration::http::DEFAULT_BASE_URL.to_string()
}

fn default_context_limit() -> usize {
    switchboard_conversation::DEFAULT_CONTEXT_LIMIT
}

fn default_max_tool_rounds() -> usize {
    10
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_tool_timeout_secs() -> u64 {
    30
}

fn default_provider() -> String {
    "google-mail".to_string()
}

impl Default for AssistantSettings {
    fn default() -> Self {
        Self {
            context_limit: default_context_limit(),
            max_tool_rounds: default_max_tool_rounds(),
            request_timeout_secs: default_request_timeout_secs(),
            tool_timeout_secs: default_tool_timeout_secs(),
            default_provider: default_provider(),
            system_prompt: None,
        }
    }
}

impl ServerConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required configuration is missing or invalid.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(
                config::Environment::default()
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Builds the orchestrator settings.
    #[must_use]
    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        let assistant = &self.assistant;
        let mut config = OrchestratorConfig::default()
            .with_context_limit(assistant.context_limit)
            .with_max_tool_rounds(assistant.max_tool_rounds)
            .with_request_timeout(Duration::from_secs(assistant.request_timeout_secs))
            .with_tool_timeout(Duration::from_secs(assistant.tool_timeout_secs))
            .with_default_provider(&assistant.default_provider);
        config.temperature = self.llm.temperature;
        config.max_tokens = self.llm.max_tokens;
        if let Some(prompt) = &assistant.system_prompt {
            config = config.with_system_prompt(prompt);
        }
        config
    }
}
