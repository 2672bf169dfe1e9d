// src/config/ai.rs
use serde::{Deserialize, Serialize};

use super::{resolve_secret, FatalConfigError};

pub const ENV_OPENAI_API_KEY: &str = "OPENAI_API_KEY";
pub const ENV_CLAUDE_API_KEY: &str = "CLAUDE_API_KEY";
/// `AI_TEST_MODE=mock` forces the disabled classifier, so every batch takes the fallback path.
pub const ENV_AI_TEST_MODE: &str = "AI_TEST_MODE";

fn default_temperature() -> f32 {
    0.2
}
fn default_max_tokens() -> u32 {
    4096
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    OpenAi,
    Claude,
}

impl ProviderKind {
    pub fn default_model(self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "gpt-4o-mini",
            ProviderKind::Claude => "claude-3-5-haiku-latest",
        }
    }

    pub fn default_base_url(self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "https://api.openai.com/v1",
            ProviderKind::Claude => "https://api.anthropic.com/v1",
        }
    }

    fn key_env(self) -> &'static str {
        match self {
            ProviderKind::OpenAi => ENV_OPENAI_API_KEY,
            ProviderKind::Claude => ENV_CLAUDE_API_KEY,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    pub enabled: bool,
    /// "openai" | "claude" (case-insensitive)
    pub provider: String,
    pub model: Option<String>,
    /// "ENV" means: read from OPENAI_API_KEY / CLAUDE_API_KEY (by provider)
    pub api_key: String,
    pub base_url: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            provider: "claude".to_string(),
            model: None,
            api_key: "ENV".to_string(),
            base_url: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

impl AiConfig {
    pub fn provider_kind(&self) -> Result<ProviderKind, FatalConfigError> {
        match self.provider.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(ProviderKind::OpenAi),
            "claude" | "anthropic" => Ok(ProviderKind::Claude),
            other => Err(FatalConfigError::UnsupportedProvider(other.to_string())),
        }
    }

    pub fn resolve_api_key(&self) -> Result<String, FatalConfigError> {
        let kind = self.provider_kind()?;
        resolve_secret(&self.api_key, kind.key_env())
    }

    pub fn model_for(&self, kind: ProviderKind) -> String {
        self.model
            .clone()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| kind.default_model().to_string())
    }

    pub fn base_url_for(&self, kind: ProviderKind) -> String {
        self.base_url
            .clone()
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| kind.default_base_url().to_string())
            .trim_end_matches('/')
            .to_string()
    }

    /// True when scans should skip the remote classifier entirely.
    pub fn remote_disabled(&self) -> bool {
        let mock = std::env::var(ENV_AI_TEST_MODE)
            .map(|v| v == "mock")
            .unwrap_or(false);
        mock || !self.enabled
    }
}
