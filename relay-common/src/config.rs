//! Configuration management for Relay services.
//!
//! The relay reads a single JSON file, `~/.relay/config.json` by default.
//!
//! # Configuration Priority
//!
//! 1. Environment variables
//! 2. Explicit config file values
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! - `TELEGRAM_TOKEN` → telegram.bot_token
//! - `OPENROUTER_API_KEY` → provider.analysis.api_key
//! - `OPENROUTER_API_KEY2` → provider.conversation.api_key
//! - `MODEL` → provider.analysis.model
//! - `MODEL2` → provider.conversation.model
//! - `RELAY_LOG_LEVEL` → observability.log_level
//! - `RELAY_LOG_FORMAT` → observability.log_format

use crate::error::{Error, Result, ResultExt};
use crate::logging::LogFormat;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".relay"),
        |dirs| dirs.home_dir().join(".relay"),
    )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration for the relay.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Telegram transport configuration
    #[serde(default)]
    pub telegram: TelegramConfig,

    /// Completion provider configuration
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Session dispatcher tuning
    #[serde(default)]
    pub dispatcher: DispatcherConfig,

    /// Logging configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load() -> Result<Self> {
        let path = config_path();
        if !path.exists() {
            tracing::info!("Config file not found, using defaults");
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load configuration from a specific path. `~` is expanded.
    pub fn load_from(path: &Path) -> Result<Self> {
        let expanded = shellexpand::tilde(&path.to_string_lossy()).into_owned();
        let path = PathBuf::from(expanded);

        let content = fs::read_to_string(&path)
            .context(format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .context(format!("Failed to parse config from {}", path.display()))
    }

    /// Load configuration (default path or `path`) and apply environment overrides.
    pub fn load_with_env(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::load_from(p)?,
            None => Self::load()?,
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply process environment overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(token) = non_empty("TELEGRAM_TOKEN") {
            self.telegram.bot_token = Some(token);
        }
        if let Some(key) = non_empty("OPENROUTER_API_KEY") {
            self.provider.analysis.api_key = Some(key);
        }
        if let Some(key) = non_empty("OPENROUTER_API_KEY2") {
            self.provider.conversation.api_key = Some(key);
        }
        if let Some(model) = non_empty("MODEL") {
            self.provider.analysis.model = Some(model);
        }
        if let Some(model) = non_empty("MODEL2") {
            self.provider.conversation.model = Some(model);
        }
        if let Some(level) = non_empty("RELAY_LOG_LEVEL") {
            self.observability.log_level = level;
        }
        if let Some(format) = non_empty("RELAY_LOG_FORMAT") {
            self.observability.log_format = format;
        }
    }

    /// Check that everything the relay needs at startup is present.
    ///
    /// The Telegram token is only required when serving Telegram.
    pub fn validate(&self, require_telegram: bool) -> Result<()> {
        let mut missing = Vec::new();

        if require_telegram && self.telegram.bot_token.is_none() {
            missing.push("telegram.bot_token (TELEGRAM_TOKEN)");
        }
        if self.provider.analysis.api_key.is_none() {
            missing.push("provider.analysis.api_key (OPENROUTER_API_KEY)");
        }
        if self.provider.analysis.model.is_none() {
            missing.push("provider.analysis.model (MODEL)");
        }
        if self.provider.conversation.api_key.is_none() {
            missing.push("provider.conversation.api_key (OPENROUTER_API_KEY2)");
        }
        if self.provider.conversation.model.is_none() {
            missing.push("provider.conversation.model (MODEL2)");
        }

        if !missing.is_empty() {
            return Err(Error::Config(format!("missing {}", missing.join(", "))));
        }

        if self.provider.max_attempts == 0 {
            return Err(Error::Config(
                "provider.max_attempts must be at least 1".into(),
            ));
        }

        if self.dispatcher.max_history_messages == 1 {
            return Err(Error::Config(
                "dispatcher.max_history_messages must be 0 (unbounded) or at least 2".into(),
            ));
        }

        if self.dispatcher.worker_idle_secs == 0 {
            return Err(Error::Config(
                "dispatcher.worker_idle_secs must be at least 1".into(),
            ));
        }

        self.observability
            .log_format
            .parse::<LogFormat>()
            .map_err(|e| Error::Config(format!("observability.log_format: {e}")))?;

        Ok(())
    }
}

// ============================================================================
// Telegram Configuration
// ============================================================================

/// Telegram Bot API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: Option<String>,

    /// Usernames or numeric user ids allowed to talk to the bot ("*" = everyone)
    #[serde(default = "default_allowed_users")]
    pub allowed_users: Vec<String>,

    /// Long-poll timeout passed to getUpdates
    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u64,

    #[serde(default = "default_telegram_api_base")]
    pub api_base: String,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            allowed_users: default_allowed_users(),
            poll_timeout_secs: default_poll_timeout_secs(),
            api_base: default_telegram_api_base(),
        }
    }
}

fn default_allowed_users() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_poll_timeout_secs() -> u64 {
    30
}

fn default_telegram_api_base() -> String {
    "https://api.telegram.org".to_string()
}

// ============================================================================
// Provider Configuration
// ============================================================================

/// Completion provider configuration.
///
/// Two independent bindings exist: one for sentiment analysis and one shared
/// by the conversational modes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// OpenAI-compatible API base URL
    #[serde(default = "default_provider_base_url")]
    pub base_url: String,

    #[serde(default = "default_provider_timeout_secs")]
    pub timeout_secs: u64,

    /// Attempts per completion before giving up
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base delay between attempts (doubles each retry, 0 = no delay)
    #[serde(default)]
    pub retry_backoff_ms: u64,

    /// Substrings marking a stub response that must be retried
    #[serde(default = "default_placeholder_markers")]
    pub placeholder_markers: Vec<String>,

    #[serde(default)]
    pub analysis: ModelBinding,

    #[serde(default)]
    pub conversation: ModelBinding,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_provider_base_url(),
            timeout_secs: default_provider_timeout_secs(),
            max_attempts: default_max_attempts(),
            retry_backoff_ms: 0,
            placeholder_markers: default_placeholder_markers(),
            analysis: ModelBinding::default(),
            conversation: ModelBinding::default(),
        }
    }
}

/// Credentials and model identifier for one provider binding.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelBinding {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

fn default_provider_base_url() -> String {
    "https://openrouter.ai/api/v1".to_string()
}

fn default_provider_timeout_secs() -> u64 {
    120
}

fn default_max_attempts() -> u32 {
    3
}

fn default_placeholder_markers() -> Vec<String> {
    vec!["<tool_response>".to_string()]
}

// ============================================================================
// Dispatcher Configuration
// ============================================================================

/// Session dispatcher tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Minimum seconds between two accepted messages of one conversation
    #[serde(default = "default_min_interval_secs")]
    pub min_interval_secs: u64,

    /// Non-system messages kept per conversation context (0 = unbounded, otherwise at least 2)
    #[serde(default = "default_max_history_messages")]
    pub max_history_messages: usize,

    /// Seconds a conversation worker may sit idle before it exits
    #[serde(default = "default_worker_idle_secs")]
    pub worker_idle_secs: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            min_interval_secs: default_min_interval_secs(),
            max_history_messages: default_max_history_messages(),
            worker_idle_secs: default_worker_idle_secs(),
        }
    }
}

fn default_min_interval_secs() -> u64 {
    5
}

fn default_max_history_messages() -> usize {
    40
}

fn default_worker_idle_secs() -> u64 {
    600
}

// ============================================================================
// Observability Configuration
// ============================================================================

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level", alias = "level")]
    pub log_level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format", alias = "format")]
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}
