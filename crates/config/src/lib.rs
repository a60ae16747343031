pub mod models;
pub mod validation;

pub use models::{AppConfig, LoggingConfig, LogLevel, OutputFormat, UptimeCheckConfig};
pub use validation::{ConfigValidator, ValidationUtils};


pub type ConfigResult<T> = Result<T, ConfigError>;

/// 配置加载与校验错误
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("配置校验失败: {0}")]
    Validation(String),

    #[error("{0}")]
    File(String),

    /// 分层加载（文件 + 环境变量）失败
    #[error("配置加载失败: {0}")]
    Load(#[from] config::ConfigError),

    #[error("TOML 解析失败: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML 序列化失败: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

impl From<ConfigError> for uptime_errors::UptimeCheckError {
    fn from(err: ConfigError) -> Self {
        uptime_errors::UptimeCheckError::Configuration(err.to_string())
    }
}
