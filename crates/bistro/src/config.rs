//! Configuration management for bistro.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::auth::IdentityPolicy;
use crate::error::{Error, Result};
use crate::subscription::DEFAULT_CHANNEL_CAPACITY;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "bistro";

/// Default document database file name.
const DATABASE_FILE_NAME: &str = "bistro.db";

/// Default identity database file name.
const IDENTITY_FILE_NAME: &str = "identity.db";

/// Default settings file name.
const SETTINGS_FILE_NAME: &str = "settings.json";

/// Prefix of configuration environment variables.
const ENV_PREFIX: &str = "BISTRO_";

/// Separator between nesting levels in environment variable names.
const ENV_SEPARATOR: &str = "__";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `BISTRO_`, sections separated by
///    `__`, e.g. `BISTRO_AUTH__MIN_PASSWORD_LENGTH`)
/// 2. TOML config file at `~/.config/bistro/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Document store configuration.
    pub storage: StorageConfig,
    /// Identity provider configuration.
    pub auth: AuthConfig,
    /// Local settings file configuration.
    pub settings: SettingsConfig,
    /// Live subscription configuration.
    pub subscriptions: SubscriptionConfig,
}

/// Storage-related configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the document database.
    /// Defaults to `~/.local/share/bistro/bistro.db`
    pub database_path: Option<PathBuf>,
}

/// Identity provider configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Path to the identity database.
    /// Defaults to `~/.local/share/bistro/identity.db`
    pub identity_path: Option<PathBuf>,
    /// Shortest password accepted at registration.
    pub min_password_length: usize,
    /// Password reset requests accepted per address per hour.
    pub max_reset_requests_per_hour: u32,
}

/// Settings file configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsConfig {
    /// Path to the settings file.
    /// Defaults to `~/.local/share/bistro/settings.json`
    pub path: Option<PathBuf>,
}

/// Subscription configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscriptionConfig {
    /// Snapshots buffered per subscription before the producer waits.
    pub channel_capacity: usize,
}

impl Default for AuthConfig {
    fn default() -> Self {
        let policy = IdentityPolicy::default();
        Self {
            identity_path: None, // Will be resolved to default at runtime
            min_password_length: policy.min_password_length,
            max_reset_requests_per_hour: policy.max_reset_requests_per_hour,
        }
    }
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading, parsing or validation fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let config: Config = Self::figment(&config_file).extract()?;

        // Values from the file and environment can still be out of range
        config.validate()?;
        Ok(config)
    }

    /// The layered configuration sources for a config file.
    #[must_use]
    pub fn figment(config_file: &Path) -> Figment {
        Figment::new()
            // Start with defaults
            .merge(Serialized::defaults(Config::default()))
            // Top-level tables map onto config sections, not profiles
            .merge(Toml::file(config_file))
            // BISTRO_AUTH__MIN_PASSWORD_LENGTH sets auth.min_password_length
            .merge(Env::prefixed(ENV_PREFIX).split(ENV_SEPARATOR))
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.auth.min_password_length == 0 {
            return Err(Error::ConfigValidation {
                message: "min_password_length must be greater than 0".to_string(),
            });
        }

        if self.auth.max_reset_requests_per_hour == 0 {
            return Err(Error::ConfigValidation {
                message: "max_reset_requests_per_hour must be greater than 0".to_string(),
            });
        }

        if self.subscriptions.channel_capacity == 0 {
            return Err(Error::ConfigValidation {
                message: "channel_capacity must be greater than 0".to_string(),
            });
        }

        Ok(())
    }

    /// Get the document database path, resolving defaults if not set.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.storage
            .database_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(DATABASE_FILE_NAME))
    }

    /// Get the identity database path, resolving defaults if not set.
    #[must_use]
    pub fn identity_path(&self) -> PathBuf {
        self.auth
            .identity_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(IDENTITY_FILE_NAME))
    }

    /// Get the settings file path, resolving defaults if not set.
    #[must_use]
    pub fn settings_path(&self) -> PathBuf {
        self.settings
            .path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(SETTINGS_FILE_NAME))
    }

    /// Get the rules for the embedded identity provider.
    #[must_use]
    pub fn identity_policy(&self) -> IdentityPolicy {
        IdentityPolicy {
            min_password_length: self.auth.min_password_length,
            max_reset_requests_per_hour: self.auth.max_reset_requests_per_hour,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert!(config.storage.database_path.is_none());
        assert!(config.auth.identity_path.is_none());
        assert!(config.settings.path.is_none());
        assert_eq!(config.auth.min_password_length, 6);
        assert_eq!(config.auth.max_reset_requests_per_hour, 5);
        assert_eq!(config.subscriptions.channel_capacity, 32);
    }

    #[test]
    fn test_validate_valid_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_zero_password_length() {
        let mut config = Config::default();
        config.auth.min_password_length = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("min_password_length"));
    }

    #[test]
    fn test_validate_zero_reset_limit() {
        let mut config = Config::default();
        config.auth.max_reset_requests_per_hour = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("max_reset_requests_per_hour"));
    }

    #[test]
    fn test_validate_zero_channel_capacity() {
        let mut config = Config::default();
        config.subscriptions.channel_capacity = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("channel_capacity"));
    }

    #[test]
    fn test_default_paths() {
        let config = Config::default();

        assert!(config.database_path().ends_with("bistro/bistro.db"));
        assert!(config.identity_path().ends_with("bistro/identity.db"));
        assert!(config.settings_path().ends_with("bistro/settings.json"));
    }

    #[test]
    fn test_custom_paths() {
        let mut config = Config::default();
        config.storage.database_path = Some(PathBuf::from("/custom/docs.db"));
        config.auth.identity_path = Some(PathBuf::from("/custom/ids.db"));
        config.settings.path = Some(PathBuf::from("/custom/prefs.json"));

        assert_eq!(config.database_path(), PathBuf::from("/custom/docs.db"));
        assert_eq!(config.identity_path(), PathBuf::from("/custom/ids.db"));
        assert_eq!(config.settings_path(), PathBuf::from("/custom/prefs.json"));
    }

    #[test]
    fn test_identity_policy_from_config() {
        let mut config = Config::default();
        config.auth.min_password_length = 10;
        config.auth.max_reset_requests_per_hour = 1;

        let policy = config.identity_policy();
        assert_eq!(policy.min_password_length, 10);
        assert_eq!(policy.max_reset_requests_per_hour, 1);
    }

    #[test]
    fn test_default_config_path() {
        let path = Config::default_config_path();
        assert!(path.to_string_lossy().contains("bistro"));
        assert!(path.to_string_lossy().contains("config.toml"));
    }

    #[test]
    fn test_load_nonexistent_config() {
        Jail::expect_with(|_jail| {
            let config = Config::load_from(Some(PathBuf::from("/nonexistent/config.toml")))
                .expect("defaults should load");
            assert_eq!(config, Config::default());
            Ok(())
        });
    }

    #[test]
    fn test_toml_overrides_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.toml",
                r#"
                [auth]
                min_password_length = 8

                [subscriptions]
                channel_capacity = 4
                "#,
            )?;

            let config = Config::load_from(Some(PathBuf::from("config.toml")))
                .expect("config should load");
            assert_eq!(config.auth.min_password_length, 8);
            assert_eq!(config.auth.max_reset_requests_per_hour, 5);
            assert_eq!(config.subscriptions.channel_capacity, 4);
            Ok(())
        });
    }

    #[test]
    fn test_toml_sets_every_section() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "custom.toml",
                r#"
                [storage]
                database_path = "/srv/bistro/docs.db"

                [auth]
                identity_path = "/srv/bistro/ids.db"
                max_reset_requests_per_hour = 2

                [settings]
                path = "/srv/bistro/settings.json"
                "#,
            )?;

            let config = Config::load_from(Some(PathBuf::from("custom.toml")))
                .expect("config should load");
            assert_eq!(config.database_path(), PathBuf::from("/srv/bistro/docs.db"));
            assert_eq!(config.identity_path(), PathBuf::from("/srv/bistro/ids.db"));
            assert_eq!(config.settings_path(), PathBuf::from("/srv/bistro/settings.json"));
            assert_eq!(config.identity_policy().max_reset_requests_per_hour, 2);
            assert_eq!(config.auth.min_password_length, 6);
            Ok(())
        });
    }

    #[test]
    fn test_env_overrides_toml() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.toml",
                r#"
                [auth]
                min_password_length = 8
                "#,
            )?;
            jail.set_env("BISTRO_AUTH__MIN_PASSWORD_LENGTH", "12");
            jail.set_env("BISTRO_STORAGE__DATABASE_PATH", "/tmp/env.db");

            let config = Config::load_from(Some(PathBuf::from("config.toml")))
                .expect("config should load");
            assert_eq!(config.auth.min_password_length, 12);
            assert_eq!(config.database_path(), PathBuf::from("/tmp/env.db"));
            Ok(())
        });
    }

    #[test]
    fn test_invalid_file_values_are_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.toml",
                r#"
                [subscriptions]
                channel_capacity = 0
                "#,
            )?;

            let err = Config::load_from(Some(PathBuf::from("config.toml"))).unwrap_err();
            assert!(err.to_string().contains("channel_capacity"));
            Ok(())
        });
    }

    #[test]
    fn test_config_serialize() {
        let json = serde_json::to_string(&Config::default()).unwrap();
        assert!(json.contains("min_password_length"));
        assert!(json.contains("channel_capacity"));
    }

    #[test]
    fn test_config_deserialize_partial() {
        let json = r#"{"auth": {"max_reset_requests_per_hour": 2}}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.auth.max_reset_requests_per_hour, 2);
        assert_eq!(config.auth.min_password_length, 6);
    }
}
