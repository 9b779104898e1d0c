//! Configuration loading, validation, and management for Switchyard.
//!
//! Loads configuration from `~/.switchyard/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use switchyard_core::{ModelCatalog, ModelCatalogEntry, ProviderKey};

/// The root configuration structure.
///
/// Maps directly to `~/.switchyard/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Answer every model call with the offline responder
    #[serde(default = "default_true")]
    pub demo_mode: bool,

    /// Upper bound on a single live provider call
    #[serde(default = "default_provider_timeout_secs")]
    pub provider_timeout_secs: u64,

    /// Provider-specific configurations, keyed by provider name
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    /// Model catalog overrides
    #[serde(default)]
    pub catalog: CatalogConfig,

    /// Run store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Logging configuration
    #[serde(default)]
    pub log: LogConfig,
}

fn default_true() -> bool {
    true
}
fn default_provider_timeout_secs() -> u64 {
    120
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("demo_mode", &self.demo_mode)
            .field("provider_timeout_secs", &self.provider_timeout_secs)
            .field("providers", &self.providers)
            .field("catalog", &self.catalog)
            .field("store", &self.store)
            .field("log", &self.log)
            .finish()
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Override the vendor's base URL (proxies, gateways)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .finish()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Model used when AUTO routing has nothing better
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_auto_model: Option<String>,

    /// Default fan-out for COMPARE runs (needs two known ids, max four)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub compare_models: Vec<String>,

    /// Additional catalog entries
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_models: Vec<ModelCatalogEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// "sqlite" or "memory"
    #[serde(default = "default_store_backend")]
    pub backend: String,

    /// Database file; defaults to `~/.switchyard/switchyard.db`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
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

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// "text" or "json"
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Default filter when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_format() -> String {
    "text".into()
}
fn default_log_level() -> String {
    "info".into()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: default_log_format(),
            level: default_log_level(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.switchyard/config.toml).
    ///
    /// Environment overrides (highest priority):
    /// - `OPENAI_API_KEY`, `ANTHROPIC_API_KEY`, `GEMINI_API_KEY` / `GOOGLE_API_KEY`,
    ///   `MISTRAL_API_KEY` when the file sets no key
    /// - `SWITCHYARD_DEMO_MODE` (`"false"` turns demo mode off)
    /// - `SWITCHYARD_DEFAULT_MODEL`, `SWITCHYARD_COMPARE_MODELS`
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_env(&Self::config_dir().join("config.toml"))
    }

    /// Load from `path`, then apply process environment overrides.
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_env(|name| std::env::var(name).ok().filter(|v| !v.is_empty()));
        config.validate()?;
        Ok(config)
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

    /// Apply overrides from an environment lookup.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let key_vars: [(&str, &[&str]); 4] = [
            ("openai", &["OPENAI_API_KEY"]),
            ("anthropic", &["ANTHROPIC_API_KEY"]),
            ("google", &["GEMINI_API_KEY", "GOOGLE_API_KEY"]),
            ("mistral", &["MISTRAL_API_KEY"]),
        ];
        for (provider, vars) in key_vars {
            let entry = self.providers.entry(provider.to_string()).or_default();
            if entry.api_key.is_none() {
                entry.api_key = vars.iter().find_map(|var| lookup(var));
            }
        }

        if let Some(demo) = lookup("SWITCHYARD_DEMO_MODE") {
            self.demo_mode = demo.trim() != "false";
        }

        if let Some(model) = lookup("SWITCHYARD_DEFAULT_MODEL") {
            self.catalog.default_auto_model = Some(model.trim().to_string());
        }

        if let Some(models) = lookup("SWITCHYARD_COMPARE_MODELS") {
            self.catalog.compare_models = models
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".switchyard")
    }

    /// Where the SQLite store lives.
    pub fn store_path(&self) -> PathBuf {
        self.store
            .path
            .clone()
            .unwrap_or_else(|| Self::config_dir().join("switchyard.db"))
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !matches!(self.store.backend.as_str(), "sqlite" | "memory") {
            return Err(ConfigError::ValidationError(format!(
                "store.backend must be \"sqlite\" or \"memory\", got \"{}\"",
                self.store.backend
            )));
        }

        if !matches!(self.log.format.as_str(), "text" | "json") {
            return Err(ConfigError::ValidationError(format!(
                "log.format must be \"text\" or \"json\", got \"{}\"",
                self.log.format
            )));
        }

        if self.provider_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "provider_timeout_secs must be > 0".into(),
            ));
        }

        for name in self.providers.keys() {
            if name.parse::<ProviderKey>().is_err() {
                return Err(ConfigError::ValidationError(format!(
                    "unknown provider section [providers.{name}]"
                )));
            }
        }

        for entry in &self.catalog.extra_models {
            entry
                .validate()
                .map_err(|e| ConfigError::ValidationError(e.to_string()))?;
        }

        Ok(())
    }

    pub fn provider(&self, key: ProviderKey) -> Option<&ProviderConfig> {
        self.providers.get(key.as_str())
    }

    /// Check if an API key is configured for a provider.
    pub fn has_api_key(&self, key: ProviderKey) -> bool {
        self.provider(key).is_some_and(|p| p.api_key.is_some())
    }

    /// Build the model catalog: built-in table, extra entries, then default
    /// overrides.
    pub fn build_catalog(&self) -> Result<ModelCatalog, ConfigError> {
        let mut catalog = ModelCatalog::builtin()
            .with_extra_entries(self.catalog.extra_models.clone())
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;

        if let Some(model) = &self.catalog.default_auto_model {
            if catalog.get(model).is_none() {
                tracing::warn!(model = %model, "Unknown default_auto_model, keeping built-in default");
            }
            catalog = catalog.with_default_auto_model(model);
        }
        if !self.catalog.compare_models.is_empty() {
            catalog = catalog.with_compare_models(&self.catalog.compare_models);
        }
        Ok(catalog)
    }

    /// Generate a default config TOML string (for the `init` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            demo_mode: true,
            provider_timeout_secs: default_provider_timeout_secs(),
            providers: HashMap::new(),
            catalog: CatalogConfig::default(),
            store: StoreConfig::default(),
            log: LogConfig::default(),
        }
    }
}

/// Get the user's home directory.
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

impl From<ConfigError> for switchyard_core::Error {
    fn from(err: ConfigError) -> Self {
        switchyard_core::Error::Config {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.demo_mode);
        assert_eq!(config.provider_timeout_secs, 120);
        assert_eq!(config.store.backend, "sqlite");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.demo_mode, config.demo_mode);
        assert_eq!(parsed.store.backend, config.store.backend);
    }

    #[test]
    fn unknown_store_backend_rejected() {
        let config = AppConfig {
            store: StoreConfig {
                backend: "postgres".into(),
                path: None,
            },
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_timeout_rejected() {
        let config = AppConfig {
            provider_timeout_secs: 0,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let result = AppConfig::load_from(Path::new("/nonexistent/config.toml"));
        assert!(result.is_ok());
        assert!(result.unwrap().demo_mode);
    }

    #[test]
    fn parses_file_with_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
demo_mode = false
provider_timeout_secs = 30

[providers.anthropic]
api_key = "sk-ant-test"

[catalog]
default_auto_model = "gpt-4.1"
compare_models = ["gpt-4.1", "mistral-large"]

[[catalog.extra_models]]
provider = "openai"
model_id = "gpt-5-preview"
quality_tier = 5
cost_tier = 5
speed_tier = 2
supports_json = true
input_usd_per_1k = 0.01
output_usd_per_1k = 0.03

[store]
backend = "memory"

[log]
format = "json"
"#,
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert!(!config.demo_mode);
        assert!(config.has_api_key(ProviderKey::Anthropic));
        assert_eq!(config.log.format, "json");

        let catalog = config.build_catalog().unwrap();
        assert_eq!(catalog.entries().len(), 10);
        assert_eq!(catalog.default_auto_model().model_id, "gpt-4.1");
        assert_eq!(catalog.default_compare_models().len(), 2);
    }

    #[test]
    fn extra_model_with_bad_tier_rejected() {
        let mut config = AppConfig::default();
        let mut entry = ModelCatalogEntry::placeholder();
        entry.model_id = "broken".into();
        entry.speed_tier = 0;
        config.catalog.extra_models.push(entry);
        assert!(config.validate().is_err());
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = AppConfig::default();
        config.apply_env(env(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("GOOGLE_API_KEY", "g-key"),
            ("SWITCHYARD_DEMO_MODE", "false"),
            ("SWITCHYARD_COMPARE_MODELS", "gpt-4.1, mock-analyst ,"),
        ]));
        assert!(!config.demo_mode);
        assert!(config.has_api_key(ProviderKey::OpenAi));
        assert!(config.has_api_key(ProviderKey::Google));
        assert!(!config.has_api_key(ProviderKey::Mistral));
        assert_eq!(config.catalog.compare_models, ["gpt-4.1", "mock-analyst"]);
    }

    #[test]
    fn file_key_wins_over_env_key() {
        let mut config = AppConfig::default();
        config.providers.insert(
            "openai".into(),
            ProviderConfig {
                api_key: Some("from-file".into()),
                api_url: None,
            },
        );
        config.apply_env(env(&[("OPENAI_API_KEY", "from-env")]));
        assert_eq!(
            config.provider(ProviderKey::OpenAi).unwrap().api_key.as_deref(),
            Some("from-file")
        );
    }

    #[test]
    fn demo_mode_stays_on_for_other_values() {
        let mut config = AppConfig::default();
        config.apply_env(env(&[("SWITCHYARD_DEMO_MODE", "0")]));
        assert!(config.demo_mode);
    }

    #[test]
    fn debug_redacts_keys() {
        let mut config = AppConfig::default();
        config.apply_env(env(&[("OPENAI_API_KEY", "sk-secret")]));
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("demo_mode = true"));
        assert!(toml_str.contains("[store]"));
    }
}
