use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::validation::{ConfigValidator, ValidationUtils};

/// 拨测任务允许的最小采集周期（秒）
pub const DEFAULT_TASK_MIN_PERIOD: u32 = 10;

/// 拨测管理相关的业务开关和外部依赖超时
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct UptimeCheckConfig {
    /// config.period 的下限
    pub task_min_period: u32,
    /// 多租户模式：跳过节点心跳校验，新任务强制使用独立数据源
    pub multi_tenant_mode: bool,
    /// 使用公共拨测节点时是否需要额外鉴权
    pub enable_public_location_auth: bool,
    /// 解析 node_list 时默认的主机输出字段
    pub default_output_fields: Vec<String>,
    /// 节点心跳查询的时间窗口
    pub heartbeat_window_seconds: u64,
    pub heartbeat_timeout_ms: u64,
    pub host_resolution_timeout_ms: u64,
}

impl Default for UptimeCheckConfig {
    fn default() -> Self {
        Self {
            task_min_period: DEFAULT_TASK_MIN_PERIOD,
            multi_tenant_mode: false,
            enable_public_location_auth: false,
            default_output_fields: vec![
                "bk_host_innerip".to_string(),
                "bk_host_innerip_v6".to_string(),
            ],
            heartbeat_window_seconds: 180,
            heartbeat_timeout_ms: 5_000,
            host_resolution_timeout_ms: 5_000,
        }
    }
}

impl UptimeCheckConfig {
    pub fn heartbeat_window(&self) -> Duration {
        Duration::from_secs(self.heartbeat_window_seconds)
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }

    pub fn host_resolution_timeout(&self) -> Duration {
        Duration::from_millis(self.host_resolution_timeout_ms)
    }
}

impl ConfigValidator for UptimeCheckConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        ValidationUtils::validate_positive(
            u64::from(self.task_min_period),
            86_400,
            "uptime_check.task_min_period",
        )?;
        ValidationUtils::validate_positive(
            self.heartbeat_window_seconds,
            3_600,
            "uptime_check.heartbeat_window_seconds",
        )?;
        ValidationUtils::validate_positive(
            self.heartbeat_timeout_ms,
            60_000,
            "uptime_check.heartbeat_timeout_ms",
        )?;
        ValidationUtils::validate_positive(
            self.host_resolution_timeout_ms,
            60_000,
            "uptime_check.host_resolution_timeout_ms",
        )?;
        ValidationUtils::validate_non_empty_list(
            &self.default_output_fields,
            "uptime_check.default_output_fields",
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = UptimeCheckConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.heartbeat_window(), Duration::from_secs(180));
    }

    #[test]
    fn test_zero_min_period_rejected() {
        let config = UptimeCheckConfig {
            task_min_period: 0,
            ..UptimeCheckConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_output_fields_rejected() {
        let config = UptimeCheckConfig {
            default_output_fields: vec![],
            ..UptimeCheckConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
