//! Application configuration.
//!
//! Loaded from a YAML file with environment overrides; later sources win:
//!
//! 1. built-in defaults
//! 2. the YAML file (default `quill.yaml`, missing file is fine)
//! 3. variables prefixed with `QUILL_`, `__` separating nested keys
//!
//! ```bash
//! QUILL_DATABASE_URL="sqlite:///var/lib/quill/quill.db"
//! QUILL_LOCKOUT__MAX_ATTEMPTS=10
//! ```

use std::path::{Path, PathBuf};

use chrono::Duration;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Yaml},
};
use quill_core::{LockoutConfig, lockout, services::password_reset::DEFAULT_RESET_TOKEN_HOURS};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_FILE: &str = "quill.yaml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuillConfig {
    /// SQLite URL of the datastore.
    pub database_url: String,
    /// Directory that holds the `uploads/` tree.
    pub upload_dir: PathBuf,
    /// Public base URL, used to build password reset links.
    pub site_url: String,
    pub lockout: LockoutSettings,
    pub password_reset: PasswordResetSettings,
}

impl Default for QuillConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://quill.db".to_string(),
            upload_dir: PathBuf::from("public"),
            site_url: "http://localhost:8000".to_string(),
            lockout: LockoutSettings::default(),
            password_reset: PasswordResetSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockoutSettings {
    pub max_attempts: u32,
    pub window_minutes: i64,
}

impl Default for LockoutSettings {
    fn default() -> Self {
        Self {
            max_attempts: lockout::DEFAULT_MAX_ATTEMPTS,
            window_minutes: lockout::DEFAULT_LOCKOUT_MINUTES,
        }
    }
}

impl From<LockoutSettings> for LockoutConfig {
    fn from(settings: LockoutSettings) -> Self {
        LockoutConfig::new(settings.max_attempts, settings.window_minutes)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PasswordResetSettings {
    pub token_ttl_hours: i64,
}

impl Default for PasswordResetSettings {
    fn default() -> Self {
        Self {
            token_ttl_hours: DEFAULT_RESET_TOKEN_HOURS,
        }
    }
}

impl PasswordResetSettings {
    pub fn token_ttl(&self) -> Duration {
        Duration::hours(self.token_ttl_hours)
    }
}

impl QuillConfig {
    #[allow(clippy::result_large_err)]
    pub fn load(path: impl AsRef<Path>) -> Result<Self, figment::Error> {
        let config: Self = Self::figment(path.as_ref()).extract()?;
        config
            .validate()
            .map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    pub fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(QuillConfig::default()))
            .merge(Yaml::file(path))
            .merge(Env::prefixed("QUILL_").split("__"))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database_url.trim().is_empty() {
            return Err(ConfigError("database_url must not be empty".to_string()));
        }
        if self.lockout.max_attempts == 0 {
            return Err(ConfigError("lockout.max_attempts must be at least 1".to_string()));
        }
        if self.lockout.window_minutes <= 0 {
            return Err(ConfigError(format!(
                "lockout.window_minutes must be positive, got {}",
                self.lockout.window_minutes
            )));
        }
        if self.password_reset.token_ttl_hours <= 0 {
            return Err(ConfigError(format!(
                "password_reset.token_ttl_hours must be positive, got {}",
                self.password_reset.token_ttl_hours
            )));
        }
        if !self.site_url.starts_with("http://") && !self.site_url.starts_with("https://") {
            return Err(ConfigError(format!(
                "site_url must be an http(s) URL, got '{}'",
                self.site_url
            )));
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Invalid configuration: {0}")]
pub struct ConfigError(pub String);
