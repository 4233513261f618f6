//! Configuration for the licensing tools.
//!
//! Configuration is loaded from multiple sources with the following precedence:
//! 1. Environment variables (highest priority)
//! 2. `hwlicense.toml` file
//! 3. Default values (lowest priority)
//!
//! # Environment Variables
//!
//! - `HWLICENSE_LICENSE_PATH` - Sealed license file location
//! - `HWLICENSE_DEFAULT_VALIDITY_DAYS` - Validity used when the issuer is not told
//! - `HWLICENSE_SECRET_PATH` - Shared secret file location
//! - `HWLICENSE_PROBE_TIMEOUT_MS` - Upper bound for each hardware probe command
//! - `HWLICENSE_LOG_LEVEL` - Log level (trace, debug, info, warn, error)

use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

use config::Config;
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

use crate::errors::{LicenseError, LicenseResult};
use crate::license::DEFAULT_FEATURES;

/// Global configuration, loaded once per process.
static CONFIG: OnceLock<LicensingConfig> = OnceLock::new();

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LicensingConfig {
    /// License file and issuance defaults
    pub license: LicenseConfig,
    /// Shared secret location
    pub secret: SecretConfig,
    /// Hardware probing
    pub hardware: HardwareConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LicenseConfig {
    /// Where the sealed license is written and read
    pub path: PathBuf,
    /// Validity in calendar days when none is given
    pub default_validity_days: u32,
    /// Entitlements granted when none are given
    pub default_features: Vec<String>,
}

impl Default for LicenseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("license.dat"),
            default_validity_days: 365,
            default_features: DEFAULT_FEATURES.iter().map(|f| f.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SecretConfig {
    /// Plain-text shared secret file
    pub path: PathBuf,
}

impl Default for SecretConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("license_secret.key"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HardwareConfig {
    /// Per-command timeout in milliseconds
    pub probe_timeout_ms: u64,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            probe_timeout_ms: 5_000,
        }
    }
}

impl HardwareConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl LoggingConfig {
    /// Install a compact stderr subscriber for a command-line tool.
    ///
    /// `RUST_LOG` takes precedence over `level` when set. Library code
    /// never calls this.
    pub fn init_subscriber(&self) {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.level.to_lowercase()));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .compact()
            .try_init();
    }
}

fn config_err(e: config::ConfigError) -> LicenseError {
    LicenseError::ConfigError(e.to_string())
}

impl LicensingConfig {
    /// Load configuration from `hwlicense.toml` (optional) and environment.
    pub fn load() -> LicenseResult<Self> {
        Self::load_from("hwlicense")
    }

    /// Load configuration using `file_stem` as the optional config file
    /// (any extension the `config` crate understands).
    pub fn load_from(file_stem: &str) -> LicenseResult<Self> {
        let defaults = Self::default();

        let builder = Config::builder()
            .set_default("license.path", defaults.license.path.to_string_lossy().as_ref())
            .map_err(config_err)?
            .set_default(
                "license.default_validity_days",
                i64::from(defaults.license.default_validity_days),
            )
            .map_err(config_err)?
            .set_default("license.default_features", defaults.license.default_features)
            .map_err(config_err)?
            .set_default("secret.path", defaults.secret.path.to_string_lossy().as_ref())
            .map_err(config_err)?
            .set_default(
                "hardware.probe_timeout_ms",
                defaults.hardware.probe_timeout_ms as i64,
            )
            .map_err(config_err)?
            .set_default("logging.level", defaults.logging.level)
            .map_err(config_err)?
            .add_source(config::File::with_name(file_stem).required(false))
            .set_override_option("license.path", env::var("HWLICENSE_LICENSE_PATH").ok())
            .map_err(config_err)?
            .set_override_option(
                "license.default_validity_days",
                env::var("HWLICENSE_DEFAULT_VALIDITY_DAYS")
                    .ok()
                    .and_then(|v| v.parse::<i64>().ok()),
            )
            .map_err(config_err)?
            .set_override_option("secret.path", env::var("HWLICENSE_SECRET_PATH").ok())
            .map_err(config_err)?
            .set_override_option(
                "hardware.probe_timeout_ms",
                env::var("HWLICENSE_PROBE_TIMEOUT_MS")
                    .ok()
                    .and_then(|v| v.parse::<i64>().ok()),
            )
            .map_err(config_err)?
            .set_override_option("logging.level", env::var("HWLICENSE_LOG_LEVEL").ok())
            .map_err(config_err)?;

        let settings = builder
            .build()
            .map_err(|e| LicenseError::ConfigError(format!("failed to build config: {e}")))?;

        settings
            .try_deserialize()
            .map_err(|e| LicenseError::ConfigError(format!("failed to deserialize config: {e}")))
    }

    /// Validate the configuration.
    pub fn validate(&self) -> LicenseResult<()> {
        if self.license.path.as_os_str().is_empty() {
            return Err(LicenseError::ConfigError(
                "license.path cannot be empty".to_string(),
            ));
        }
        if self.license.default_validity_days == 0 {
            return Err(LicenseError::ConfigError(
                "license.default_validity_days must be greater than 0".to_string(),
            ));
        }
        if self.license.default_features.is_empty() {
            return Err(LicenseError::ConfigError(
                "license.default_features cannot be empty".to_string(),
            ));
        }
        if self.secret.path.as_os_str().is_empty() {
            return Err(LicenseError::ConfigError(
                "secret.path cannot be empty".to_string(),
            ));
        }
        if self.hardware.probe_timeout_ms == 0 {
            return Err(LicenseError::ConfigError(
                "hardware.probe_timeout_ms must be greater than 0".to_string(),
            ));
        }

        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(LicenseError::ConfigError(format!(
                    "logging.level must be one of: trace, debug, info, warn, error. Got '{other}'"
                )));
            }
        }

        Ok(())
    }
}

/// Get the global configuration.
///
/// This loads the configuration on first access and caches it.
/// Returns an error if configuration loading or validation fails.
pub fn get_config() -> LicenseResult<&'static LicensingConfig> {
    if let Some(config) = CONFIG.get() {
        return Ok(config);
    }

    let config = LicensingConfig::load()?;
    config.validate()?;

    // Another thread may have won the race; either value is equivalent.
    Ok(CONFIG.get_or_init(|| config))
}
