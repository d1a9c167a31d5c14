//! Bridge configuration.
//!
//! Configuration is layered with the `config` crate:
//!
//! 1. built-in defaults,
//! 2. an optional TOML file,
//! 3. `TTLOCK__<SECTION>__<KEY>` environment variables.
//!
//! ```toml
//! [api]
//! client_id = "..."
//! access_token = "..."
//!
//! [locks]
//! timezone = "Europe/Amsterdam"
//! poll_interval_secs = 900
//! ```

use std::path::{Path, PathBuf};

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Environment variable that points at the configuration file.
pub const CONFIG_PATH_ENV: &str = "TTLOCK_CONFIG";

/// Prefix for environment overrides (`TTLOCK__API__ACCESS_TOKEN`, ...).
pub const ENV_PREFIX: &str = "TTLOCK";

/// Default TTLock EU API endpoint.
pub const DEFAULT_BASE_URL: &str = "https://euapi.ttlock.com/v3/";

/// Smallest accepted poll interval.
pub const MIN_POLL_INTERVAL_SECS: u64 = 10;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An explicitly requested configuration file does not exist.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The layered sources could not be merged or deserialized.
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    /// A single field holds an invalid value.
    #[error("Invalid value for '{field}': {message}")]
    ValidationError {
        /// Dotted field path.
        field: String,
        /// What is wrong with it.
        message: String,
    },

    /// Several fields hold invalid values.
    #[error("{} configuration fields are invalid", .0.len())]
    MultipleValidationErrors(Vec<ConfigError>),
}

/// Result alias for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Top-level bridge configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// TTLock cloud API access.
    pub api: ApiConfig,

    /// Per-lock behaviour.
    pub locks: LocksConfig,

    /// HTTP server for webhooks and lock endpoints.
    pub server: ServerConfig,
}

/// TTLock cloud API access.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the v3 API, including the trailing slash.
    pub base_url: String,

    /// OAuth client id issued by the TTLock open platform.
    pub client_id: String,

    /// Access token for the account owning the locks.
    #[serde(skip_serializing)]
    pub access_token: String,

    /// Per-request timeout.
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            client_id: String::new(),
            access_token: String::new(),
            timeout_secs: 30,
        }
    }
}

/// Per-lock behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocksConfig {
    /// Timezone the locks live in; passage-mode windows are evaluated here.
    #[serde(with = "timezone_serde")]
    pub timezone: Tz,

    /// Seconds between poll cycles.
    pub poll_interval_secs: u64,

    /// Relock delay applied when auto-lock is switched on.
    pub auto_lock_seconds: u32,
}

impl Default for LocksConfig {
    fn default() -> Self {
        Self {
            timezone: chrono_tz::UTC,
            poll_interval_secs: 15 * 60,
            auto_lock_seconds: 10,
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind.
    pub bind_address: String,

    /// Port to bind.
    pub port: u16,

    /// Production logging (JSON files + compact stdout).
    pub production: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 3000,
            production: false,
        }
    }
}

impl BridgeConfig {
    /// Load configuration from `path`, or from [`CONFIG_PATH_ENV`], or from the
    /// platform config directory, then apply environment overrides.
    ///
    /// An explicitly given path must exist; the fallback locations are optional.
    ///
    /// # Errors
    ///
    /// Returns an error if an explicit file is missing or the sources cannot
    /// be deserialized.
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        let explicit = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from));

        let mut builder = config::Config::builder();

        match explicit {
            Some(file) => {
                if !file.exists() {
                    return Err(ConfigError::NotFound(file));
                }
                builder = builder.add_source(config::File::from(file));
            }
            None => {
                if let Some(file) = default_config_path() {
                    builder = builder.add_source(config::File::from(file).required(false));
                }
            }
        }

        let loaded = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(loaded)
    }

    /// Check every field, reporting all problems at once.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] for a single problem and
    /// [`ConfigError::MultipleValidationErrors`] for several.
    pub fn validate(&self) -> ConfigResult<()> {
        let mut errors = Vec::new();

        if Url::parse(&self.api.base_url).is_err() {
            errors.push(invalid("api.base_url", "must be an absolute URL"));
        }
        if self.api.client_id.trim().is_empty() {
            errors.push(invalid("api.client_id", "must not be empty"));
        }
        if self.api.access_token.trim().is_empty() {
            errors.push(invalid("api.access_token", "must not be empty"));
        }
        if self.api.timeout_secs == 0 {
            errors.push(invalid("api.timeout_secs", "must be greater than zero"));
        }
        if self.locks.poll_interval_secs < MIN_POLL_INTERVAL_SECS {
            errors.push(invalid(
                "locks.poll_interval_secs",
                &format!("must be at least {MIN_POLL_INTERVAL_SECS}"),
            ));
        }
        if self.locks.auto_lock_seconds == 0 {
            errors.push(invalid("locks.auto_lock_seconds", "must be greater than zero"));
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ConfigError::MultipleValidationErrors(errors)),
        }
    }
}

fn invalid(field: &str, message: &str) -> ConfigError {
    ConfigError::ValidationError {
        field: field.to_string(),
        message: message.to_string(),
    }
}

/// Platform configuration file location (`~/.config/ttlock-bridge/config.toml` on Linux).
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "ttlock-bridge")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

mod timezone_serde {
    use chrono_tz::Tz;
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(tz: &Tz, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(tz.name())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Tz, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn valid_config() -> BridgeConfig {
        let mut config = BridgeConfig::default();
        config.api.client_id = "client".to_string();
        config.api.access_token = "token".to_string();
        config
    }

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::default();
        assert_eq!(config.api.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.locks.poll_interval_secs, 900);
        assert_eq!(config.locks.auto_lock_seconds, 10);
        assert_eq!(config.locks.timezone, chrono_tz::UTC);
        assert_eq!(config.server.port, 3000);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[api]
client_id = "abc"
access_token = "secret"

[locks]
timezone = "Pacific/Auckland"
poll_interval_secs = 60
"#
        )
        .unwrap();

        let config = BridgeConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.api.client_id, "abc");
        assert_eq!(config.api.access_token, "secret");
        assert_eq!(config.locks.timezone, chrono_tz::Pacific::Auckland);
        assert_eq!(config.locks.poll_interval_secs, 60);
        // untouched sections keep their defaults
        assert_eq!(config.locks.auto_lock_seconds, 10);
        assert_eq!(config.server.port, 3000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_rejects_unknown_timezone() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[locks]\ntimezone = \"Mars/Olympus_Mons\"").unwrap();

        let result = BridgeConfig::load(Some(file.path()));
        assert!(matches!(result, Err(ConfigError::Load(_))));
    }

    #[test]
    fn test_load_missing_explicit_file() {
        let result = BridgeConfig::load(Some(Path::new("/definitely/not/here.toml")));
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_validate_accepts_complete_config() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_validate_single_error() {
        let mut config = valid_config();
        config.api.access_token = "  ".to_string();

        match config.validate() {
            Err(ConfigError::ValidationError { field, .. }) => {
                assert_eq!(field, "api.access_token");
            }
            other => panic!("expected single validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_collects_all_errors() {
        let mut config = BridgeConfig::default();
        config.api.base_url = "not a url".to_string();
        config.locks.poll_interval_secs = 1;

        match config.validate() {
            Err(ConfigError::MultipleValidationErrors(errors)) => {
                // base_url, client_id, access_token, poll_interval_secs
                assert_eq!(errors.len(), 4);
            }
            other => panic!("expected multiple validation errors, got {other:?}"),
        }
    }

    #[test]
    fn test_access_token_is_not_serialized() {
        let config = valid_config();
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("access_token"));
        assert!(json.contains("\"timezone\":\"UTC\""));
    }
}
