//! Configuration loading, validation, and management for Diarist.
//!
//! Loads configuration from `~/.diarist/config.toml` (or an explicit path)
//! with environment variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.diarist/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the default provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Default LLM provider ("gemini" or an OpenAI-compatible name)
    #[serde(default = "default_provider")]
    pub default_provider: String,

    #[serde(default = "default_model")]
    pub default_model: String,

    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Default max tokens per completion
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub media: MediaConfig,

    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub personas: PersonasConfig,

    #[serde(default)]
    pub companion: CompanionConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

fn default_provider() -> String {
    "gemini".into()
}
fn default_model() -> String {
    "gemini-2.5-flash".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    2048
}
fn default_true() -> bool {
    true
}

fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("default_provider", &self.default_provider)
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("providers", &self.providers)
            .field("store", &self.store)
            .field("media", &self.media)
            .field("gateway", &self.gateway)
            .field("personas", &self.personas)
            .field("companion", &self.companion)
            .field("auth", &self.auth)
            .field("scheduler", &self.scheduler)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .finish()
    }
}

/// Document store backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// "sqlite" or "memory"
    #[serde(default = "default_store_backend")]
    pub backend: String,

    /// Database file; defaults to `~/.diarist/diarist.db`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

fn default_store_backend() -> String {
    "sqlite".into()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            path: None,
        }
    }
}

impl StoreConfig {
    pub fn resolved_path(&self) -> PathBuf {
        self.path
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| AppConfig::config_dir().join("diarist.db"))
    }
}

/// Where uploaded media ends up.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    /// "local" or "disabled"
    #[serde(default = "default_media_backend")]
    pub backend: String,

    /// Root directory for local uploads; defaults to `~/.diarist/media`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,

    /// URL prefix under which uploads are served
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,

    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

fn default_media_backend() -> String {
    "local".into()
}
fn default_public_base_url() -> String {
    "http://127.0.0.1:8080/media".into()
}
fn default_max_upload_bytes() -> usize {
    25 * 1024 * 1024
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            backend: default_media_backend(),
            dir: None,
            public_base_url: default_public_base_url(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

impl MediaConfig {
    pub fn resolved_dir(&self) -> PathBuf {
        self.dir
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| AppConfig::config_dir().join("media"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    /// Request body limit (multipart entries carry media)
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Allowed CORS origins. Empty = any origin.
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_port() -> u16 {
    8080
}
fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_max_body_bytes() -> usize {
    100 * 1024 * 1024
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            max_body_bytes: default_max_body_bytes(),
            cors_origins: vec![],
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersonasConfig {
    /// Directory holding `fumiko.txt`, `krishna.txt`; built-ins when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,
}

/// Companion pipeline knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanionConfig {
    /// Trailing window of entries fed into the prompt
    #[serde(default = "default_entry_window_days")]
    pub entry_window_days: u32,

    /// Prior exchanges fed into the prompt
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Default page size of `GET /history/{persona}`
    #[serde(default = "default_history_page")]
    pub history_page_size: usize,

    /// Messages up to this many characters get the short-message delay
    #[serde(default = "default_short_message_chars")]
    pub short_message_chars: usize,

    #[serde(default = "default_short_delay_ms")]
    pub short_delay_ms: u64,

    #[serde(default = "default_long_delay_ms")]
    pub long_delay_ms: u64,
}

fn default_entry_window_days() -> u32 {
    7
}
fn default_history_limit() -> usize {
    5
}
fn default_history_page() -> usize {
    50
}
fn default_short_message_chars() -> usize {
    10
}
fn default_short_delay_ms() -> u64 {
    2000
}
fn default_long_delay_ms() -> u64 {
    1000
}

impl Default for CompanionConfig {
    fn default() -> Self {
        Self {
            entry_window_days: default_entry_window_days(),
            history_limit: default_history_limit(),
            history_page_size: default_history_page(),
            short_message_chars: default_short_message_chars(),
            short_delay_ms: default_short_delay_ms(),
            long_delay_ms: default_long_delay_ms(),
        }
    }
}

/// Static bearer credentials, `credential = "user id"`.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub tokens: HashMap<String, String>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut users: Vec<&String> = self.tokens.values().collect();
        users.sort();
        f.debug_struct("AuthConfig")
            .field("tokens", &format!("[{} REDACTED]", self.tokens.len()))
            .field("users", &users)
            .finish()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default)]
    pub profile_sweep: JobConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Cron expression (5-field: minute hour dom month dow), UTC
    #[serde(default = "default_sweep_schedule")]
    pub schedule: String,
}

fn default_sweep_schedule() -> String {
    "0 0 * * *".into()
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            schedule: default_sweep_schedule(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (`~/.diarist/config.toml`).
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_env(&Self::config_dir().join("config.toml"))
    }

    /// Load from `path`, then apply environment overrides:
    /// - `DIARIST_API_KEY` (highest priority), then `GEMINI_API_KEY`
    /// - `DIARIST_PROVIDER`
    /// - `DIARIST_MODEL`
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_env(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup("DIARIST_API_KEY") {
            self.api_key = Some(key);
        } else if self.api_key.is_none() {
            self.api_key = lookup("GEMINI_API_KEY");
        }
        if let Some(provider) = lookup("DIARIST_PROVIDER") {
            self.default_provider = provider;
        }
        if let Some(model) = lookup("DIARIST_MODEL") {
            self.default_model = model;
        }
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    pub fn config_dir() -> PathBuf {
        dirs_home().join(".diarist")
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.default_temperature) {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }
        if !matches!(self.store.backend.as_str(), "sqlite" | "memory") {
            return Err(ConfigError::ValidationError(format!(
                "store.backend must be \"sqlite\" or \"memory\", got {:?}",
                self.store.backend
            )));
        }
        if !matches!(self.media.backend.as_str(), "local" | "disabled") {
            return Err(ConfigError::ValidationError(format!(
                "media.backend must be \"local\" or \"disabled\", got {:?}",
                self.media.backend
            )));
        }
        if self.companion.entry_window_days == 0 || self.companion.history_limit == 0 {
            return Err(ConfigError::ValidationError(
                "companion.entry_window_days and companion.history_limit must be > 0".into(),
            ));
        }
        if self.companion.history_page_size == 0 {
            return Err(ConfigError::ValidationError(
                "companion.history_page_size must be > 0".into(),
            ));
        }
        let fields = self.scheduler.profile_sweep.schedule.split_whitespace().count();
        if fields != 5 {
            return Err(ConfigError::ValidationError(format!(
                "scheduler.profile_sweep.schedule must have 5 fields, got {fields}"
            )));
        }
        Ok(())
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Default config TOML string (for `init-config`).
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: default_provider(),
            default_model: default_model(),
            default_temperature: default_temperature(),
            default_max_tokens: default_max_tokens(),
            providers: HashMap::new(),
            store: StoreConfig::default(),
            media: MediaConfig::default(),
            gateway: GatewayConfig::default(),
            personas: PersonasConfig::default(),
            companion: CompanionConfig::default(),
            auth: AuthConfig::default(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert_eq!(config.default_provider, "gemini");
        assert_eq!(config.default_model, "gemini-2.5-flash");
        assert_eq!(config.companion.history_limit, 5);
        assert_eq!(config.companion.entry_window_days, 7);
        assert_eq!(config.scheduler.profile_sweep.schedule, "0 0 * * *");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.default_provider, config.default_provider);
        assert_eq!(parsed.gateway.port, config.gateway.port);
    }

    #[test]
    fn invalid_values_rejected() {
        let hot = AppConfig {
            default_temperature: 5.0,
            ..AppConfig::default()
        };
        assert!(hot.validate().is_err());

        let mut bad_cron = AppConfig::default();
        bad_cron.scheduler.profile_sweep.schedule = "0 0 *".into();
        assert!(bad_cron.validate().is_err());

        let mut bad_store = AppConfig::default();
        bad_store.store.backend = "firestore".into();
        assert!(bad_store.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.default_provider, "gemini");
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
default_model = "gemini-2.0-flash"

[store]
backend = "memory"

[auth.tokens]
"secret-1" = "alice"

[scheduler.profile_sweep]
schedule = "30 2 * * *"
"#,
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.default_model, "gemini-2.0-flash");
        assert_eq!(config.store.backend, "memory");
        assert_eq!(config.auth.tokens.get("secret-1").map(String::as_str), Some("alice"));
        assert!(config.scheduler.profile_sweep.enabled);
        assert_eq!(config.gateway.port, 8080);
    }

    #[test]
    fn env_overrides_take_priority() {
        let mut config = AppConfig {
            api_key: Some("from-file".into()),
            ..AppConfig::default()
        };
        config.apply_env(|name| match name {
            "GEMINI_API_KEY" => Some("gemini".into()),
            "DIARIST_MODEL" => Some("gemini-exp".into()),
            _ => None,
        });
        // File key wins over GEMINI_API_KEY, DIARIST_API_KEY would win over both.
        assert_eq!(config.api_key.as_deref(), Some("from-file"));
        assert_eq!(config.default_model, "gemini-exp");

        config.apply_env(|name| (name == "DIARIST_API_KEY").then(|| "explicit".to_string()));
        assert_eq!(config.api_key.as_deref(), Some("explicit"));
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let mut config = AppConfig {
            api_key: Some("sk-live".into()),
            ..AppConfig::default()
        };
        config.auth.tokens.insert("token-abc".into(), "alice".into());
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-live"));
        assert!(!debug.contains("token-abc"));
        assert!(debug.contains("alice"));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("gemini"));
        assert!(toml_str.contains("0 0 * * *"));
    }
}
