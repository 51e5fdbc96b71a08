use std::collections::HashSet;
use std::env;
use std::path::PathBuf;

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File};
use serde::Deserialize;
use thiserror::Error;

use crate::agent::{AgentConfig, DEFAULT_MAX_STEPS, DEFAULT_MEMORY_WINDOW};
use crate::providers::configs::{
    OpenAiProviderConfig, DEFAULT_TIMEOUT_SECS, OPEN_AI_DEFAULT_HOST, OPEN_AI_DEFAULT_MODEL,
};
use crate::retriever::embedding::DEFAULT_EMBEDDING_MODEL;
use crate::retriever::{RetrieverConfig, DEFAULT_BM25_WEIGHT, DEFAULT_TOP_K, DEFAULT_VECTOR_WEIGHT};
use crate::telemetry::langfuse::{LangfuseConfig, LANGFUSE_DEFAULT_HOST};
use crate::tools::BuiltinTool;

pub const ENV_PREFIX: &str = "ALFRED";
pub const CONFIG_PATH_VAR: &str = "ALFRED_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "alfred.toml";

/// Unprefixed variables honoured below the `ALFRED_` ones
const FALLBACK_VARS: [(&str, &str); 5] = [
    ("provider.api_key", "OPENAI_API_KEY"),
    ("provider.model", "OPENAI_MODEL"),
    ("telemetry.langfuse_public_key", "LANGFUSE_PUBLIC_KEY"),
    ("telemetry.langfuse_secret_key", "LANGFUSE_SECRET_KEY"),
    ("telemetry.langfuse_host", "LANGFUSE_HOST"),
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required configuration: set the {env_var} environment variable")]
    MissingEnvVar { env_var: String },
    #[error("Invalid configuration value for {key} ({env_var}): {reason}")]
    Invalid {
        key: String,
        env_var: String,
        reason: String,
    },
    #[error("Configuration error: {0}")]
    Other(#[from] config::ConfigError),
}

impl ConfigError {
    fn invalid(key: &str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            key: key.to_string(),
            env_var: to_env_var(key),
            reason: reason.into(),
        }
    }
}

/// `agent.max_steps` -> `ALFRED_AGENT__MAX_STEPS`
pub fn to_env_var(key: &str) -> String {
    format!("{}_{}", ENV_PREFIX, key.replace('.', "__").to_uppercase())
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderSettings {
    pub host: String,
    #[serde(default)]
    pub api_key: Option<String>,
    pub model: String,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<i32>,
    pub timeout_secs: u64,
    /// Probe the model endpoint before the first turn
    pub verify_on_start: bool,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            host: OPEN_AI_DEFAULT_HOST.to_string(),
            api_key: None,
            model: OPEN_AI_DEFAULT_MODEL.to_string(),
            temperature: None,
            max_tokens: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            verify_on_start: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentSettings {
    pub max_steps: usize,
    pub memory_window: usize,
    /// Custom tera template for the system prompt
    #[serde(default)]
    pub system_prompt: Option<PathBuf>,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_steps: DEFAULT_MAX_STEPS,
            memory_window: DEFAULT_MEMORY_WINDOW,
            system_prompt: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbedderKind {
    #[default]
    Hashing,
    OpenAi,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetrieverSettings {
    pub top_k: usize,
    pub vector_weight: f32,
    pub bm25_weight: f32,
    pub embedder: EmbedderKind,
    pub embedding_model: String,
}

impl Default for RetrieverSettings {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            vector_weight: DEFAULT_VECTOR_WEIGHT,
            bm25_weight: DEFAULT_BM25_WEIGHT,
            embedder: EmbedderKind::Hashing,
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GuestSettings {
    /// JSON or JSONL guest list; the bundled list is used when unset
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ToolSettings {
    pub enabled: Vec<BuiltinTool>,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            enabled: vec![
                BuiltinTool::GuestInfoRetriever,
                BuiltinTool::WebSearch,
                BuiltinTool::GetHubStats,
            ],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelemetrySettings {
    #[serde(default)]
    pub langfuse_public_key: Option<String>,
    #[serde(default)]
    pub langfuse_secret_key: Option<String>,
    pub langfuse_host: String,
    /// Also write trace events to the log
    pub log_events: bool,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            langfuse_public_key: None,
            langfuse_secret_key: None,
            langfuse_host: LANGFUSE_DEFAULT_HOST.to_string(),
            log_events: true,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub provider: ProviderSettings,
    #[serde(default)]
    pub agent: AgentSettings,
    #[serde(default)]
    pub retriever: RetrieverSettings,
    #[serde(default)]
    pub guests: GuestSettings,
    #[serde(default)]
    pub tools: ToolSettings,
    #[serde(default)]
    pub telemetry: TelemetrySettings,
}

impl Settings {
    /// Defaults, then `alfred.toml`, then the environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_config(Self::builder()?.build()?)
    }

    /// The layered sources, for callers that add their own keys before building
    pub fn builder() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        let defaults = Settings::default();
        let mut builder = Config::builder()
            .set_default("provider.host", defaults.provider.host)?
            .set_default("provider.model", defaults.provider.model)?
            .set_default("provider.timeout_secs", defaults.provider.timeout_secs)?
            .set_default("provider.verify_on_start", defaults.provider.verify_on_start)?
            .set_default("agent.max_steps", defaults.agent.max_steps as u64)?
            .set_default("agent.memory_window", defaults.agent.memory_window as u64)?
            .set_default("retriever.top_k", defaults.retriever.top_k as u64)?
            .set_default("retriever.vector_weight", defaults.retriever.vector_weight as f64)?
            .set_default("retriever.bm25_weight", defaults.retriever.bm25_weight as f64)?
            .set_default("retriever.embedder", "hashing")?
            .set_default("retriever.embedding_model", defaults.retriever.embedding_model)?
            .set_default(
                "tools.enabled",
                defaults
                    .tools
                    .enabled
                    .iter()
                    .map(|tool| tool.to_string())
                    .collect::<Vec<_>>(),
            )?
            .set_default("telemetry.langfuse_host", defaults.telemetry.langfuse_host)?
            .set_default("telemetry.log_events", defaults.telemetry.log_events)?;

        for (key, var) in FALLBACK_VARS {
            if let Ok(value) = env::var(var) {
                builder = builder.set_default(key, value)?;
            }
        }

        let file = match env::var(CONFIG_PATH_VAR) {
            Ok(path) => File::from(PathBuf::from(path)).required(true),
            Err(_) => File::from(PathBuf::from(DEFAULT_CONFIG_FILE)).required(false),
        };

        Ok(builder.add_source(file).add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("tools.enabled"),
        ))
    }

    pub fn from_config(config: Config) -> Result<Self, ConfigError> {
        let settings: Settings = config.try_deserialize().map_err(|err| {
            tracing::debug!("Configuration error: {:?}", &err);
            match &err {
                config::ConfigError::NotFound(key) => ConfigError::MissingEnvVar {
                    env_var: to_env_var(key),
                },
                _ => ConfigError::Other(err),
            }
        })?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.agent.max_steps == 0 {
            return Err(ConfigError::invalid("agent.max_steps", "must be at least 1"));
        }
        if self.agent.memory_window == 0 {
            return Err(ConfigError::invalid(
                "agent.memory_window",
                "must be at least 1",
            ));
        }
        if self.retriever.top_k == 0 {
            return Err(ConfigError::invalid("retriever.top_k", "must be at least 1"));
        }
        for (key, weight) in [
            ("retriever.vector_weight", self.retriever.vector_weight),
            ("retriever.bm25_weight", self.retriever.bm25_weight),
        ] {
            if !weight.is_finite() || weight < 0.0 {
                return Err(ConfigError::invalid(key, "must be a non-negative number"));
            }
        }
        if self.retriever.vector_weight == 0.0 && self.retriever.bm25_weight == 0.0 {
            return Err(ConfigError::invalid(
                "retriever.vector_weight",
                "vector and bm25 weights cannot both be zero",
            ));
        }
        let mut seen = HashSet::new();
        if let Some(duplicate) = self.tools.enabled.iter().find(|tool| !seen.insert(**tool)) {
            return Err(ConfigError::invalid(
                "tools.enabled",
                format!("{} is listed twice", duplicate),
            ));
        }
        Ok(())
    }

    /// Provider settings with the credential checked
    pub fn openai_config(&self) -> Result<OpenAiProviderConfig, ConfigError> {
        let api_key = self
            .provider
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar {
                env_var: "OPENAI_API_KEY".to_string(),
            })?;
        Ok(OpenAiProviderConfig {
            host: self.provider.host.clone(),
            api_key,
            model: self.provider.model.clone(),
            temperature: self.provider.temperature,
            max_tokens: self.provider.max_tokens,
            timeout_secs: self.provider.timeout_secs,
        })
    }

    pub fn agent_config(&self) -> Result<AgentConfig, ConfigError> {
        AgentConfig::new(self.agent.max_steps, self.agent.memory_window)
            .map_err(|e| ConfigError::invalid("agent", e.to_string()))
    }

    pub fn retriever_config(&self) -> RetrieverConfig {
        RetrieverConfig {
            top_k: self.retriever.top_k,
            vector_weight: self.retriever.vector_weight,
            bm25_weight: self.retriever.bm25_weight,
        }
    }

    /// Langfuse is enabled only when both keys are present
    pub fn langfuse_config(&self) -> Option<LangfuseConfig> {
        match (
            &self.telemetry.langfuse_public_key,
            &self.telemetry.langfuse_secret_key,
        ) {
            (Some(public_key), Some(secret_key))
                if !public_key.is_empty() && !secret_key.is_empty() =>
            {
                Some(LangfuseConfig {
                    host: self.telemetry.langfuse_host.clone(),
                    public_key: public_key.clone(),
                    secret_key: secret_key.clone(),
                })
            }
            _ => None,
        }
    }
}
