//! Configuration models for arbitrium.
//!
//! All I^R (resolvable ignorance) is parameterized here.
//! The user resolves these unknowns at runtime via config file.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration for arbitrium.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// OpenAI-compatible API endpoint
    #[serde(default)]
    pub openai: OpenAiConfig,

    /// Arbiter model and prompt settings
    pub arbiter: ArbiterConfig,

    /// Active-selection settings
    pub selection: SelectionConfig,

    /// Judging-loop throttle settings
    #[serde(default)]
    pub throttle: ThrottleConfig,

    /// Input and state file paths
    pub paths: PathsConfig,
}

/// OpenAI-compatible endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    /// API key (can also be set via the env var named by `api_key_env`)
    #[serde(default)]
    pub api_key: Option<String>,

    /// Environment variable name for the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Base URL for the API
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries on 429/network failure
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_timeout() -> u64 {
    180
}

fn default_max_retries() -> u32 {
    3
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_key_env: default_api_key_env(),
            base_url: default_base_url(),
            timeout_secs: default_timeout(),
            max_retries: default_max_retries(),
        }
    }
}

/// Arbiter model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArbiterConfig {
    /// Model ID (e.g., "gpt-5-nano")
    #[serde(default = "default_model")]
    pub model: String,

    /// Max tokens for a judge call. One is enough for a Yes/No token;
    /// larger values help debugging by letting the model talk.
    #[serde(default = "default_judge_max_tokens")]
    pub judge_max_tokens: u32,

    /// Follow-up question posed when interrogating a verdict
    #[serde(default = "default_interrogate_question")]
    pub interrogate_question: String,

    /// Max tokens for an interrogation answer
    #[serde(default = "default_interrogate_max_tokens")]
    pub interrogate_max_tokens: u32,
}

fn default_model() -> String {
    "gpt-5-nano".to_string()
}

fn default_judge_max_tokens() -> u32 {
    1
}

fn default_interrogate_question() -> String {
    "Explain briefly (1 - 3 sentences, usually 1 short sentence) \
     why you made that decision."
        .to_string()
}

fn default_interrogate_max_tokens() -> u32 {
    60
}

impl Default for ArbiterConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            judge_max_tokens: default_judge_max_tokens(),
            interrogate_question: default_interrogate_question(),
            interrogate_max_tokens: default_interrogate_max_tokens(),
        }
    }
}

/// Active-selection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionConfig {
    /// Data diversity hyperparameter. Its inverse, 1/Lambda, equals the
    /// probability that two independently drawn items are significantly
    /// related. Must be > 1.
    pub lambda: f64,
}

/// Judging-loop throttle settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThrottleConfig {
    /// Whether the throttle is engaged at startup
    #[serde(default = "default_true")]
    pub active: bool,

    /// Initial queries per second
    #[serde(default = "default_qps")]
    pub qps: f64,
}

fn default_true() -> bool {
    true
}

fn default_qps() -> f64 {
    10.0
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            active: default_true(),
            qps: default_qps(),
        }
    }
}

/// Input and state file paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// JSONL file of items to classify ({"id": ..., "text": ...} per line)
    pub items: PathBuf,

    /// JSON file of per-item annotations (created if missing)
    pub annotations: PathBuf,

    /// JSON file holding the prompt and few-shot example pool
    pub pool: PathBuf,
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// B_i(file exists) → Result
    /// B_i(file is valid TOML) → Result
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_owned(),
            source: e,
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_owned(),
            source: e,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate numeric parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.selection.lambda <= 1.0 {
            return Err(ConfigError::InvalidValue {
                field: "selection.lambda",
                message: format!("must be > 1, got {}", self.selection.lambda),
            });
        }
        if self.throttle.qps <= 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "throttle.qps",
                message: format!("must be positive, got {}", self.throttle.qps),
            });
        }
        Ok(())
    }

    /// Resolve API key from config or environment.
    ///
    /// B_i(api key available) → Result
    pub fn resolve_api_key(&self) -> Result<String, ConfigError> {
        if let Some(key) = &self.openai.api_key {
            return Ok(key.clone());
        }

        std::env::var(&self.openai.api_key_env).map_err(|_| ConfigError::MissingApiKey {
            env_var: self.openai.api_key_env.clone(),
        })
    }
}

/// Configuration errors.
///
/// Epistemic origin:
/// - B_i falsified: File not found, parse error
/// - I^B materialized: Missing required values
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid config value for {field}: {message}")]
    InvalidValue {
        field: &'static str,
        message: String,
    },

    #[error("Missing API key: set {env_var} env var or api_key in config")]
    MissingApiKey { env_var: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_toml() -> &'static str {
        r#"
[arbiter]
model = "gpt-5-nano"

[selection]
lambda = 20.0

[paths]
items = "items.jsonl"
annotations = "annotations.json"
pool = "pool.json"
"#
    }

    #[test]
    fn parses_minimal_config_with_defaults() {
        let config: Config = toml::from_str(minimal_toml()).unwrap();
        assert_eq!(config.openai.timeout_secs, 180);
        assert_eq!(config.arbiter.judge_max_tokens, 1);
        assert!(config.throttle.active);
        assert_eq!(config.throttle.qps, 10.0);
        config.validate().unwrap();
    }

    #[test]
    fn rejects_lambda_at_or_below_one() {
        let mut config: Config = toml::from_str(minimal_toml()).unwrap();
        config.selection.lambda = 1.0;
        assert!(config.validate().is_err());
    }
}
