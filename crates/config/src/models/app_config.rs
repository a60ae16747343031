use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{logging::LoggingConfig, uptime_check::UptimeCheckConfig};
use crate::validation::ConfigValidator;
use crate::{ConfigError, ConfigResult};

/// System configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AppConfig {
    pub uptime_check: UptimeCheckConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from config file and environment variables
    ///
    /// Load order:
    /// 1. Default configuration
    /// 2. Config file (TOML format)
    /// 3. Environment variable overrides (prefix: UPTIME_, nested keys joined by `__`)
    pub fn load(config_path: Option<&str>) -> ConfigResult<Self> {
        let defaults = AppConfig::default();
        let mut builder = ConfigBuilder::builder()
            .set_default(
                "uptime_check.task_min_period",
                i64::from(defaults.uptime_check.task_min_period),
            )?
            .set_default(
                "uptime_check.multi_tenant_mode",
                defaults.uptime_check.multi_tenant_mode,
            )?
            .set_default(
                "uptime_check.enable_public_location_auth",
                defaults.uptime_check.enable_public_location_auth,
            )?
            .set_default(
                "uptime_check.default_output_fields",
                defaults.uptime_check.default_output_fields.clone(),
            )?
            .set_default(
                "uptime_check.heartbeat_window_seconds",
                defaults.uptime_check.heartbeat_window_seconds,
            )?
            .set_default(
                "uptime_check.heartbeat_timeout_ms",
                defaults.uptime_check.heartbeat_timeout_ms,
            )?
            .set_default(
                "uptime_check.host_resolution_timeout_ms",
                defaults.uptime_check.host_resolution_timeout_ms,
            )?
            .set_default("logging.level", defaults.logging.level.to_string())?
            .set_default("logging.format", defaults.logging.format.to_string())?;

        if let Some(path) = config_path {
            if !Path::new(path).exists() {
                return Err(ConfigError::File(format!("配置文件不存在: {path}")));
            }
            builder = builder.add_source(File::new(path, FileFormat::Toml));
        } else {
            let default_paths = [
                "config/uptime_check.toml",
                "uptime_check.toml",
                "/etc/uptime_check/config.toml",
            ];
            if let Some(path) = default_paths.iter().find(|p| Path::new(p).exists()) {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("UPTIME")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("uptime_check.default_output_fields"),
        );

        let config: AppConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> ConfigResult<Self> {
        let config: AppConfig = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to TOML string
    pub fn to_toml(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        self.uptime_check.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}
