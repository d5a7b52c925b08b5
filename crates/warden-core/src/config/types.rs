use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use warden_llm::RateLimitConfig;
use warden_tools::ToolsConfig;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
}

/// Model endpoint settings. The API key normally comes from `XAI_API_KEY`.
#[derive(Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Seconds before an in-flight model request is abandoned.
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("request_timeout", &self.request_timeout)
            .field("rate_limit", &self.rate_limit)
            .finish()
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            model: default_model(),
            temperature: default_temperature(),
            request_timeout: default_request_timeout(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

impl LlmConfig {
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }
}

fn default_base_url() -> String {
    "https://api.x.ai/v1".into()
}

fn default_model() -> String {
    "grok-code-fast-1".into()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_request_timeout() -> u64 {
    120
}

#[derive(Debug, Deserialize)]
pub struct AgentConfig {
    /// Directory that relative tool paths resolve against. Defaults to the process cwd.
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    #[serde(default = "default_max_tool_iterations")]
    pub max_tool_iterations: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            working_dir: None,
            max_tool_iterations: default_max_tool_iterations(),
        }
    }
}

pub(crate) fn default_max_tool_iterations() -> usize {
    20
}
