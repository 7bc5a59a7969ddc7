//! Configuration Management Module
//!
//! TOML configuration with environment variable overrides and validation.
//! Default location is `<config_dir>/zenedit/config.toml`; a missing file is
//! created with defaults on first use.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use zenedit_core::RetryPolicy;

use crate::agent::api::Provider;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZenEditConfig {
    pub server: ServerConfig,
    pub agent: AgentConfig,
    pub retry: RetryConfig,
    pub logging: LoggingConfig,
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Service root, including any path prefix (e.g. `/api`)
    pub base_url: String,
    /// Timeout for non-streaming calls
    pub request_timeout_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/api".to_string(),
            request_timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub provider: Provider,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub multiplier: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_retries: policy.max_retries,
            base_delay_ms: policy.base_delay.as_millis() as u64,
            multiplier: policy.multiplier,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_retries,
            Duration::from_millis(self.base_delay_ms),
            self.multiplier,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive; `RUST_LOG` wins when set
    pub level: String,
    /// One JSON object per line instead of human-readable output
    pub json: bool,
    /// Also write logs to this file
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            json: false,
            file: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Credential cache; defaults to `<config_dir>/zenedit/token`
    pub token_file: Option<PathBuf>,
    /// Token supplied by the environment; never written to disk
    #[serde(skip)]
    pub token: Option<String>,
}

/// Configuration manager
#[derive(Debug)]
pub struct ConfigManager {
    config_path: PathBuf,
    config: ZenEditConfig,
}

impl ConfigManager {
    /// Load from the default location
    pub fn new() -> Result<Self> {
        let config_path = Self::get_config_dir()?.join("zenedit").join("config.toml");
        Self::with_path(config_path)
    }

    /// Load from a custom path
    pub fn with_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut manager = Self {
            config_path: path.as_ref().to_path_buf(),
            config: ZenEditConfig::default(),
        };

        if manager.config_exists() {
            manager.load_config()?;
        } else {
            manager.save_config()?;
        }

        manager.apply_env_overrides()?;
        manager.validate_config()?;

        Ok(manager)
    }

    fn get_config_dir() -> Result<PathBuf> {
        dirs::config_dir().ok_or_else(|| anyhow!("Could not determine config directory"))
    }

    pub fn config_exists(&self) -> bool {
        self.config_path.exists()
    }

    pub fn load_config(&mut self) -> Result<()> {
        let content = fs::read_to_string(&self.config_path)
            .with_context(|| format!("Failed to read config file {:?}", self.config_path))?;
        self.config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config {:?}", self.config_path))?;
        info!("Loaded configuration from {:?}", self.config_path);
        Ok(())
    }

    pub fn save_config(&self) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory {:?}", parent))?;
        }
        let content = toml::to_string_pretty(&self.config)
            .map_err(|e| anyhow!("Failed to serialize TOML config: {}", e))?;
        fs::write(&self.config_path, content)
            .with_context(|| format!("Failed to write config file {:?}", self.config_path))?;
        info!("Saved configuration to {:?}", self.config_path);
        Ok(())
    }

    /// Apply `ZENEDIT_*` environment variable overrides
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(base_url) = lookup("ZENEDIT_BASE_URL") {
            debug!("Overriding base URL from environment");
            self.config.server.base_url = base_url;
        }
        if let Some(provider) = lookup("ZENEDIT_PROVIDER") {
            self.config.agent.provider = provider
                .parse()
                .map_err(|e: String| anyhow!("Invalid ZENEDIT_PROVIDER: {}", e))?;
        }
        if let Some(level) = lookup("ZENEDIT_LOG_LEVEL") {
            self.config.logging.level = level;
        }
        if let Some(token) = lookup("ZENEDIT_TOKEN").filter(|t| !t.is_empty()) {
            self.config.auth.token = Some(token);
        }
        Ok(())
    }

    pub fn validate_config(&self) -> Result<()> {
        let config = &self.config;

        if config.server.base_url.trim().is_empty() {
            return Err(anyhow!("Server base_url must not be empty"));
        }
        if !config.server.base_url.starts_with("http://") && !config.server.base_url.starts_with("https://") {
            return Err(anyhow!(
                "Server base_url must start with http:// or https://, got: {}",
                config.server.base_url
            ));
        }
        if config.server.request_timeout_seconds == 0 {
            return Err(anyhow!("Request timeout must be greater than 0"));
        }
        if config.retry.multiplier < 1 {
            return Err(anyhow!(
                "Retry multiplier must be at least 1, got: {}",
                config.retry.multiplier
            ));
        }
        if config.retry.base_delay_ms == 0 {
            return Err(anyhow!("Retry base_delay_ms must be greater than 0"));
        }

        Ok(())
    }

    pub fn get_config(&self) -> &ZenEditConfig {
        &self.config
    }

    pub fn get_config_mut(&mut self) -> &mut ZenEditConfig {
        &mut self.config
    }

    pub fn get_config_path(&self) -> &Path {
        &self.config_path
    }

    /// Credential cache location
    pub fn token_file(&self) -> Result<PathBuf> {
        match &self.config.auth.token_file {
            Some(path) => Ok(path.clone()),
            None => {
                let dir = match self.config_path.parent() {
                    Some(parent) => parent.to_path_buf(),
                    None => Self::get_config_dir()?,
                };
                Ok(dir.join("token"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_config_defaults() {
        let config = ZenEditConfig::default();
        assert_eq!(config.agent.provider, Provider::Anthropic);
        assert_eq!(config.retry.policy(), RetryPolicy::default());
        assert_eq!(config.logging.level, "warn");
    }

    #[test]
    fn test_config_created_on_first_use() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("zenedit").join("config.toml");

        let manager = ConfigManager::with_path(&path).unwrap();
        assert!(path.exists());
        assert_eq!(manager.get_config().server.request_timeout_seconds, 30);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(
            &path,
            "[server]\nbase_url = \"https://edit.example.com/api\"\n\n[agent]\nprovider = \"openai\"\n",
        )
        .unwrap();

        let mut manager = ConfigManager {
            config_path: path,
            config: ZenEditConfig::default(),
        };
        manager.load_config().unwrap();

        let config = manager.get_config();
        assert_eq!(config.server.base_url, "https://edit.example.com/api");
        assert_eq!(config.server.request_timeout_seconds, 30);
        assert_eq!(config.agent.provider, Provider::OpenAi);
        assert_eq!(config.retry.max_retries, 3);
    }

    #[test]
    fn test_env_overrides() {
        let temp_dir = tempdir().unwrap();
        let mut manager = ConfigManager {
            config_path: temp_dir.path().join("config.toml"),
            config: ZenEditConfig::default(),
        };
        manager
            .apply_overrides_from(lookup(&[
                ("ZENEDIT_BASE_URL", "https://other/api"),
                ("ZENEDIT_PROVIDER", "openai"),
                ("ZENEDIT_LOG_LEVEL", "zenedit=debug"),
                ("ZENEDIT_TOKEN", "secret"),
            ]))
            .unwrap();

        let config = manager.get_config();
        assert_eq!(config.server.base_url, "https://other/api");
        assert_eq!(config.agent.provider, Provider::OpenAi);
        assert_eq!(config.logging.level, "zenedit=debug");
        assert_eq!(config.auth.token.as_deref(), Some("secret"));
    }

    #[test]
    fn test_invalid_provider_override() {
        let mut manager = ConfigManager {
            config_path: PathBuf::from("unused.toml"),
            config: ZenEditConfig::default(),
        };
        assert!(manager
            .apply_overrides_from(lookup(&[("ZENEDIT_PROVIDER", "gemini")]))
            .is_err());
    }

    #[test]
    fn test_config_validation() {
        let mut manager = ConfigManager {
            config_path: PathBuf::from("unused.toml"),
            config: ZenEditConfig::default(),
        };
        assert!(manager.validate_config().is_ok());

        manager.get_config_mut().retry.multiplier = 0;
        assert!(manager.validate_config().is_err());

        manager.get_config_mut().retry.multiplier = 2;
        manager.get_config_mut().retry.base_delay_ms = 0;
        assert!(manager.validate_config().is_err());

        manager.get_config_mut().retry.base_delay_ms = 1000;
        manager.get_config_mut().server.base_url = "   ".to_string();
        assert!(manager.validate_config().is_err());
    }

    #[test]
    fn test_token_file_next_to_config() {
        let manager = ConfigManager {
            config_path: PathBuf::from("/etc/zenedit/config.toml"),
            config: ZenEditConfig::default(),
        };
        assert_eq!(manager.token_file().unwrap(), PathBuf::from("/etc/zenedit/token"));
    }
}
