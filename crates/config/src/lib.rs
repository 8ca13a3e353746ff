//! Configuration loading and validation for the Deva chat plugin.
//!
//! Loads configuration from a TOML file with environment variable
//! overrides (`DEVA_PROVIDER`, `DEVA_API_KEY`, `DEVA_MODEL`). Validates
//! all settings at load time.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// The root configuration structure.
#[derive(Clone, Serialize, Deserialize)]
pub struct DevaConfig {
    /// The active provider, keyed into `[providers]`
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Request timeout for remote calls, in seconds
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Provider endpoint configurations
    #[serde(default = "default_providers")]
    pub providers: HashMap<String, ProviderConfig>,

    /// Chat tuning parameters
    #[serde(default)]
    pub chat: ChatTuning,

    /// Error handling policies
    #[serde(default)]
    pub policy: PolicyConfig,

    /// Response text normalization
    #[serde(default)]
    pub normalize: NormalizeConfig,

    /// Generated media asset storage
    #[serde(default)]
    pub assets: AssetConfig,

    /// Image generation parameters
    #[serde(default)]
    pub image: ImageConfig,

    /// Speech synthesis parameters
    #[serde(default)]
    pub speech: SpeechConfig,

    /// Fixed user-facing sentinel strings
    #[serde(default)]
    pub messages: MessagesConfig,
}

fn default_provider() -> String {
    "openai".into()
}
fn default_timeout_secs() -> u64 {
    120
}
fn default_providers() -> HashMap<String, ProviderConfig> {
    let mut map = HashMap::new();
    map.insert("openai".to_string(), ProviderConfig::default());
    map
}

/// A single provider endpoint.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Base URL of the OpenAI-compatible API
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// API key; falls back to `DEVA_API_KEY`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Default model when a chat call supplies none
    #[serde(default = "default_model")]
    pub default_model: String,
}

fn default_api_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o".into()
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            api_key: None,
            default_model: default_model(),
        }
    }
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_url", &self.api_url)
            .field("api_key", &redact(&self.api_key))
            .field("default_model", &self.default_model)
            .finish()
    }
}

impl std::fmt::Debug for DevaConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DevaConfig")
            .field("provider", &self.provider)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("providers", &self.providers)
            .field("chat", &self.chat)
            .field("policy", &self.policy)
            .field("normalize", &self.normalize)
            .field("assets", &self.assets)
            .field("image", &self.image)
            .field("speech", &self.speech)
            .field("messages", &self.messages)
            .finish()
    }
}

/// Generation and history-window tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTuning {
    /// How many recent history entries are submitted per request
    #[serde(default = "default_history_window")]
    pub history_window: usize,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_top_p")]
    pub top_p: f32,

    #[serde(default)]
    pub frequency_penalty: f32,

    #[serde(default)]
    pub presence_penalty: f32,

    /// Number of choices to request
    #[serde(default = "default_n")]
    pub n: u32,

    /// Default max tokens when the chat call supplies none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

fn default_history_window() -> usize {
    10
}
fn default_temperature() -> f32 {
    1.0
}
fn default_top_p() -> f32 {
    1.0
}
fn default_n() -> u32 {
    1
}

impl Default for ChatTuning {
    fn default() -> Self {
        Self {
            history_window: default_history_window(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
            n: default_n(),
            max_tokens: None,
        }
    }
}

/// What a transient remote error (429, 5xx, timeout) resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransientErrorPolicy {
    /// Resolve to a soft `{error}` payload instead of failing the call
    SoftFail,
    /// Propagate all remote errors uniformly (default)
    #[default]
    Propagate,
}

/// What happens when the model requests a tool that isn't registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownToolPolicy {
    /// Abort the chat call (default)
    #[default]
    FailFast,
    /// Feed the error text back to the model as the tool result
    Report,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PolicyConfig {
    #[serde(default)]
    pub transient_errors: TransientErrorPolicy,

    #[serde(default)]
    pub unknown_tool: UnknownToolPolicy,
}

/// Response post-processing patterns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizeConfig {
    /// Regex patterns removed from reply text before it is returned
    #[serde(default = "default_strip_patterns")]
    pub patterns: Vec<String>,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            patterns: default_strip_patterns(),
        }
    }
}

/// Boilerplate trailer phrases the model tends to append.
fn default_strip_patterns() -> Vec<String> {
    [
        r"If there .+ share them!",
        r"Let me know .+ you with!",
        r"If you'd like .+ let me know!",
        r"If you have .+ share them!",
        r"If you have .+ do so!",
        r"If you have .+ let me know!",
        r"If you have .+ free to ask!",
        r"If you have .+ your thoughts!",
        r"If you have .+ for further discussion.",
        r"If you have .+ analysis or discussion.",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Where generated media and manifests are written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetConfig {
    #[serde(default = "default_asset_dir")]
    pub dir: PathBuf,
}

fn default_asset_dir() -> PathBuf {
    PathBuf::from("assets/devas")
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            dir: default_asset_dir(),
        }
    }
}

/// Image generation parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageConfig {
    #[serde(default = "default_image_model")]
    pub model: String,

    #[serde(default = "default_n")]
    pub n: u32,

    /// Default pixel size
    #[serde(default = "default_image_size")]
    pub size: String,

    /// Named size table (small/medium/large) selectable per call
    #[serde(default = "default_image_sizes")]
    pub sizes: HashMap<String, String>,
}

fn default_image_model() -> String {
    "dall-e-3".into()
}
fn default_image_size() -> String {
    "1024x1024".into()
}
fn default_image_sizes() -> HashMap<String, String> {
    [
        ("small", "256x256"),
        ("medium", "512x512"),
        ("large", "1024x1024"),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            model: default_image_model(),
            n: default_n(),
            size: default_image_size(),
            sizes: default_image_sizes(),
        }
    }
}

/// Speech synthesis parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechConfig {
    #[serde(default = "default_speech_model")]
    pub model: String,

    #[serde(default = "default_voice")]
    pub voice: String,
}

fn default_speech_model() -> String {
    "tts-1".into()
}
fn default_voice() -> String {
    "alloy".into()
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            model: default_speech_model(),
            voice: default_voice(),
        }
    }
}

/// Fixed sentinel strings surfaced to callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagesConfig {
    #[serde(default = "default_notext")]
    pub notext: String,
}

fn default_notext() -> String {
    "no text provided".into()
}

impl Default for MessagesConfig {
    fn default() -> Self {
        Self {
            notext: default_notext(),
        }
    }
}

impl Default for DevaConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            request_timeout_secs: default_timeout_secs(),
            providers: default_providers(),
            chat: ChatTuning::default(),
            policy: PolicyConfig::default(),
            normalize: NormalizeConfig::default(),
            assets: AssetConfig::default(),
            image: ImageConfig::default(),
            speech: SpeechConfig::default(),
            messages: MessagesConfig::default(),
        }
    }
}

impl DevaConfig {
    /// Load from a TOML file, apply env overrides, and validate.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {e}", path.display())))?;
        let mut config: Self = toml::from_str(&raw)?;
        config.apply_env_overrides();
        config.validate()?;
        debug!(provider = %config.provider, "Configuration loaded");
        Ok(config)
    }

    /// Built-in defaults with env overrides applied — used when no config
    /// file exists.
    pub fn load_default() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(provider) = std::env::var("DEVA_PROVIDER") {
            if !provider.is_empty() {
                self.provider = provider;
            }
        }
        // Key and model overrides target the active provider entry,
        // creating it if the TOML didn't declare it.
        let entry = self
            .providers
            .entry(self.provider.clone())
            .or_insert_with(ProviderConfig::default);
        if let Ok(key) = std::env::var("DEVA_API_KEY") {
            if !key.is_empty() {
                entry.api_key = Some(key);
            }
        }
        if let Ok(model) = std::env::var("DEVA_MODEL") {
            if !model.is_empty() {
                entry.default_model = model;
            }
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !self.providers.contains_key(&self.provider) {
            return Err(ConfigError::Invalid(format!(
                "active provider '{}' has no [providers.{}] entry",
                self.provider, self.provider
            )));
        }
        if self.chat.history_window == 0 {
            return Err(ConfigError::Invalid(
                "chat.history_window must be at least 1".into(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "request_timeout_secs must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// The configuration of the active provider.
    pub fn active_provider(&self) -> &ProviderConfig {
        // validate() guarantees the entry exists
        &self.providers[&self.provider]
    }

    /// The default model of the active provider.
    pub fn default_model(&self) -> &str {
        &self.active_provider().default_model
    }

    /// A commented starter config, written by hosts on first run.
    pub fn default_toml() -> String {
        r#"# Deva chat plugin configuration

# Active provider (keyed into [providers] below)
provider = "openai"

# Timeout for each remote call, in seconds
request_timeout_secs = 120

[providers.openai]
api_url = "https://api.openai.com/v1"
# api_key = "sk-..."          # or set DEVA_API_KEY
default_model = "gpt-4o"

[chat]
history_window = 10
temperature = 1.0
top_p = 1.0
frequency_penalty = 0.0
presence_penalty = 0.0
n = 1
# max_tokens = 2048

[policy]
# "soft_fail" resolves rate limits / server errors / timeouts to an
# {error} payload; "propagate" fails the call
transient_errors = "propagate"
# "fail_fast" aborts on an unknown tool name; "report" feeds the error
# back to the model
unknown_tool = "fail_fast"

[assets]
dir = "assets/devas"

[image]
model = "dall-e-3"
n = 1
size = "1024x1024"

[speech]
model = "tts-1"
voice = "alloy"
"#
        .to_string()
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(String),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
