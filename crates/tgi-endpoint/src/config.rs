//! Configuration: serving container settings, deployment shape and the YAML file
//! that ties everything together.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::benchmark::BenchmarkConfig;
use crate::chat::GenerationParams;
use crate::errors::{EndpointError, EndpointResult};
use crate::image::ImageConfig;
use crate::session::DEFAULT_ROLE_NAME;

/// Value the access token holds until the user replaces it.
pub const TOKEN_PLACEHOLDER: &str = "<REPLACE WITH YOUR TOKEN>";

/// Default model served by the container.
pub const DEFAULT_MODEL_ID: &str = "meta-llama/Meta-Llama-3-70B-Instruct";

/// Default directory for deployment state.
pub const DEFAULT_STATE_DIR: &str = ".tgi-endpoint";

/// Container environment keys.
pub mod env_keys {
    pub const MODEL_ID: &str = "HF_MODEL_ID";
    pub const NUM_GPUS: &str = "SM_NUM_GPUS";
    pub const MAX_INPUT_LENGTH: &str = "MAX_INPUT_LENGTH";
    pub const MAX_TOTAL_TOKENS: &str = "MAX_TOTAL_TOKENS";
    pub const MAX_BATCH_TOTAL_TOKENS: &str = "MAX_BATCH_TOTAL_TOKENS";
    pub const MAX_BATCH_PREFILL_TOKENS: &str = "MAX_BATCH_PREFILL_TOKENS";
    pub const MESSAGES_API_ENABLED: &str = "MESSAGES_API_ENABLED";
    pub const QUANTIZE: &str = "HF_MODEL_QUANTIZE";
    pub const HF_TOKEN: &str = "HUGGING_FACE_HUB_TOKEN";
}

/// Settings passed to the TGI container as its environment.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServingConfig {
    /// Hugging Face model ID.
    pub model_id: String,
    /// Number of GPUs to shard the model across.
    pub num_gpus: u32,
    /// Maximum input length in tokens.
    pub max_input_length: u32,
    /// Maximum input plus generated tokens per request.
    pub max_total_tokens: u32,
    /// Token budget for a whole batch.
    pub max_batch_total_tokens: u32,
    /// Token budget for the prefill step.
    pub max_batch_prefill_tokens: Option<u32>,
    /// Enable the OpenAI-style Messages API.
    pub messages_api_enabled: bool,
    /// Quantization scheme (e.g., "awq", "gptq", "bitsandbytes").
    pub quantize: Option<String>,
    /// Hugging Face Hub access token.
    pub hf_token: String,
}

impl Default for ServingConfig {
    fn default() -> Self {
        Self {
            model_id: DEFAULT_MODEL_ID.to_string(),
            num_gpus: 8,
            max_input_length: 2048,
            max_total_tokens: 4096,
            max_batch_total_tokens: 8192,
            max_batch_prefill_tokens: None,
            messages_api_enabled: true,
            quantize: None,
            hf_token: TOKEN_PLACEHOLDER.to_string(),
        }
    }
}

impl fmt::Debug for ServingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServingConfig")
            .field("model_id", &self.model_id)
            .field("num_gpus", &self.num_gpus)
            .field("max_input_length", &self.max_input_length)
            .field("max_total_tokens", &self.max_total_tokens)
            .field("max_batch_total_tokens", &self.max_batch_total_tokens)
            .field("max_batch_prefill_tokens", &self.max_batch_prefill_tokens)
            .field("messages_api_enabled", &self.messages_api_enabled)
            .field("quantize", &self.quantize)
            .field("hf_token", &mask(&self.hf_token))
            .finish()
    }
}

impl ServingConfig {
    /// Replace the access token.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.hf_token = token.into();
        self
    }

    /// Validate the configuration.
    ///
    /// # Errors
    /// Returns [`EndpointError::PlaceholderToken`] when the token was never
    /// replaced, and [`EndpointError::Config`] for other invalid values.
    pub fn validate(&self) -> EndpointResult<()> {
        let token = self.hf_token.trim();
        if token == TOKEN_PLACEHOLDER {
            return Err(EndpointError::PlaceholderToken);
        }
        if token.is_empty() {
            return Err(EndpointError::Config(
                "Hugging Face Hub token is empty".to_string(),
            ));
        }
        if self.model_id.trim().is_empty() {
            return Err(EndpointError::Config("model_id is empty".to_string()));
        }
        if self.num_gpus == 0 {
            return Err(EndpointError::Config("num_gpus must be at least 1".to_string()));
        }
        if self.max_input_length >= self.max_total_tokens {
            return Err(EndpointError::Config(format!(
                "max_input_length ({}) must be lower than max_total_tokens ({})",
                self.max_input_length, self.max_total_tokens
            )));
        }
        Ok(())
    }

    /// Validate and render the container environment.
    ///
    /// # Errors
    /// See [`ServingConfig::validate`].
    pub fn to_environment(&self) -> EndpointResult<BTreeMap<String, String>> {
        self.validate()?;
        Ok(self.render(self.hf_token.trim()))
    }

    /// Render the environment with the token masked, without validating.
    pub fn masked_environment(&self) -> BTreeMap<String, String> {
        self.render(&mask(&self.hf_token))
    }

    fn render(&self, token: &str) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        env.insert(env_keys::MODEL_ID.to_string(), self.model_id.clone());
        env.insert(env_keys::NUM_GPUS.to_string(), self.num_gpus.to_string());
        env.insert(
            env_keys::MAX_INPUT_LENGTH.to_string(),
            self.max_input_length.to_string(),
        );
        env.insert(
            env_keys::MAX_TOTAL_TOKENS.to_string(),
            self.max_total_tokens.to_string(),
        );
        env.insert(
            env_keys::MAX_BATCH_TOTAL_TOKENS.to_string(),
            self.max_batch_total_tokens.to_string(),
        );
        env.insert(
            env_keys::MESSAGES_API_ENABLED.to_string(),
            self.messages_api_enabled.to_string(),
        );
        env.insert(env_keys::HF_TOKEN.to_string(), token.to_string());

        if let Some(prefill) = self.max_batch_prefill_tokens {
            env.insert(
                env_keys::MAX_BATCH_PREFILL_TOKENS.to_string(),
                prefill.to_string(),
            );
        }
        if let Some(quantize) = self.quantize.as_deref().filter(|q| !q.is_empty()) {
            env.insert(env_keys::QUANTIZE.to_string(), quantize.to_string());
        }
        env
    }
}

/// Tokens this short are hidden entirely.
const MASK_MIN_LEN: usize = 8;

fn mask(token: &str) -> String {
    let token = token.trim();
    if token.is_empty() || token == TOKEN_PLACEHOLDER {
        return token.to_string();
    }
    if token.chars().count() <= MASK_MIN_LEN {
        return "***".to_string();
    }
    let prefix: String = token.chars().take(3).collect();
    format!("{prefix}***")
}

/// Shape of the deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeploymentConfig {
    /// Instance type (e.g., "ml.p4d.24xlarge").
    pub instance_type: String,
    /// Number of instances.
    pub instance_count: u32,
    /// Container startup health-check timeout in seconds.
    pub health_check_timeout_secs: u64,
    /// How long to wait for the endpoint to reach `InService`.
    pub wait_timeout_secs: u64,
    /// Status polling interval in seconds.
    pub poll_interval_secs: u64,
    /// Prefix for generated resource names; the image repository when unset.
    pub name_prefix: Option<String>,
}

impl Default for DeploymentConfig {
    fn default() -> Self {
        Self {
            instance_type: "ml.p4d.24xlarge".to_string(),
            instance_count: 1,
            health_check_timeout_secs: 900,
            wait_timeout_secs: 3600,
            poll_interval_secs: 30,
            name_prefix: None,
        }
    }
}

/// Complete configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// AWS region.
    pub region: Option<String>,
    /// Explicit execution role ARN.
    pub role_arn: Option<String>,
    /// Role name for the IAM fallback lookup.
    pub role_name: String,
    /// Serving image.
    pub image: ImageConfig,
    /// Container environment.
    pub serving: ServingConfig,
    /// Deployment shape.
    pub deployment: DeploymentConfig,
    /// Generation parameters for test requests.
    pub generation: GenerationParams,
    /// Benchmark settings.
    pub benchmark: BenchmarkConfig,
    /// Directory holding deployment state.
    pub state_dir: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            region: None,
            role_arn: None,
            role_name: DEFAULT_ROLE_NAME.to_string(),
            image: ImageConfig::default(),
            serving: ServingConfig::default(),
            deployment: DeploymentConfig::default(),
            generation: GenerationParams::default(),
            benchmark: BenchmarkConfig::default(),
            state_dir: PathBuf::from(DEFAULT_STATE_DIR),
        }
    }
}

impl AppConfig {
    /// Load configuration from a YAML file, or defaults when no path is given.
    ///
    /// # Errors
    /// Returns [`EndpointError::Config`] if the file cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> EndpointResult<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let contents = std::fs::read_to_string(path).map_err(|e| {
            EndpointError::Config(format!("Failed to read {}: {e}", path.display()))
        })?;
        let config = Self::from_yaml(&contents).map_err(|e| match e {
            EndpointError::Config(msg) => {
                EndpointError::Config(format!("{}: {msg}", path.display()))
            }
            other => other,
        })?;

        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Parse configuration from YAML text.
    ///
    /// # Errors
    /// Returns [`EndpointError::Config`] if the YAML is invalid.
    pub fn from_yaml(contents: &str) -> EndpointResult<Self> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(contents)
            .map_err(|e| EndpointError::Config(format!("Failed to parse config: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOCUMENTED_KEYS: [&str; 7] = [
        "HF_MODEL_ID",
        "HUGGING_FACE_HUB_TOKEN",
        "MAX_BATCH_TOTAL_TOKENS",
        "MAX_INPUT_LENGTH",
        "MAX_TOTAL_TOKENS",
        "MESSAGES_API_ENABLED",
        "SM_NUM_GPUS",
    ];

    #[test]
    fn test_placeholder_token_rejected() {
        let err = ServingConfig::default().to_environment().unwrap_err();
        assert!(matches!(err, EndpointError::PlaceholderToken));

        let padded = ServingConfig::default().with_token(format!("  {TOKEN_PLACEHOLDER} "));
        assert!(matches!(
            padded.to_environment().unwrap_err(),
            EndpointError::PlaceholderToken
        ));
    }

    #[test]
    fn test_empty_token_rejected() {
        let err = ServingConfig::default()
            .with_token("  ")
            .to_environment()
            .unwrap_err();
        assert!(matches!(err, EndpointError::Config(_)));
    }

    #[test]
    fn test_valid_config_has_documented_keys() {
        let env = ServingConfig::default()
            .with_token("hf_abc123")
            .to_environment()
            .unwrap();

        let keys: Vec<&str> = env.keys().map(String::as_str).collect();
        assert_eq!(keys, DOCUMENTED_KEYS);
        assert_eq!(env["HF_MODEL_ID"], DEFAULT_MODEL_ID);
        assert_eq!(env["SM_NUM_GPUS"], "8");
        assert_eq!(env["MAX_INPUT_LENGTH"], "2048");
        assert_eq!(env["MAX_TOTAL_TOKENS"], "4096");
        assert_eq!(env["MAX_BATCH_TOTAL_TOKENS"], "8192");
        assert_eq!(env["MESSAGES_API_ENABLED"], "true");
        assert_eq!(env["HUGGING_FACE_HUB_TOKEN"], "hf_abc123");
    }

    #[test]
    fn test_optional_keys_only_when_set() {
        let config = ServingConfig {
            max_batch_prefill_tokens: Some(4096),
            quantize: Some("awq".to_string()),
            ..ServingConfig::default()
        }
        .with_token("hf_abc123");

        let env = config.to_environment().unwrap();
        assert_eq!(env.len(), DOCUMENTED_KEYS.len() + 2);
        assert_eq!(env["MAX_BATCH_PREFILL_TOKENS"], "4096");
        assert_eq!(env["HF_MODEL_QUANTIZE"], "awq");
    }

    #[test]
    fn test_sequence_limits_validated() {
        let config = ServingConfig {
            max_input_length: 4096,
            max_total_tokens: 4096,
            ..ServingConfig::default()
        }
        .with_token("hf_abc123");
        assert!(matches!(config.validate(), Err(EndpointError::Config(_))));
    }

    #[test]
    fn test_token_masked_in_debug_and_display_env() {
        let config = ServingConfig::default().with_token("hf_secretvalue");
        assert!(!format!("{config:?}").contains("secretvalue"));
        assert_eq!(config.masked_environment()["HUGGING_FACE_HUB_TOKEN"], "hf_***");
    }

    #[test]
    fn test_short_token_fully_masked() {
        for token in ["abc", "hf_abc12"] {
            let config = ServingConfig::default().with_token(token);
            assert_eq!(config.masked_environment()["HUGGING_FACE_HUB_TOKEN"], "***");
            assert!(!format!("{config:?}").contains(token));
        }
    }

    #[test]
    fn test_yaml_overrides_merge_with_defaults() {
        let yaml = r"
region: eu-west-1
serving:
  model_id: mistralai/Mistral-7B-Instruct-v0.2
  num_gpus: 1
deployment:
  instance_type: ml.g5.2xlarge
benchmark:
  concurrency: 10
";
        let config = AppConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.region.as_deref(), Some("eu-west-1"));
        assert_eq!(config.serving.model_id, "mistralai/Mistral-7B-Instruct-v0.2");
        assert_eq!(config.serving.num_gpus, 1);
        assert_eq!(config.serving.max_total_tokens, 4096);
        assert_eq!(config.deployment.instance_type, "ml.g5.2xlarge");
        assert_eq!(config.deployment.health_check_timeout_secs, 900);
        assert_eq!(config.benchmark.concurrency, 10);
        assert_eq!(config.role_name, DEFAULT_ROLE_NAME);
        assert_eq!(config.state_dir, PathBuf::from(DEFAULT_STATE_DIR));
    }

    #[test]
    fn test_invalid_yaml_is_config_error() {
        let err = AppConfig::from_yaml("serving: [not, a, map]").unwrap_err();
        assert!(matches!(err, EndpointError::Config(_)));
    }

    #[test]
    fn test_load_without_path_is_default() {
        let config = AppConfig::load(None).unwrap();
        assert_eq!(config.deployment, DeploymentConfig::default());
    }
}
