//! 拨测配置校验
//!
//! 校验顺序：采集周期下限 → 协议规则 → ip_list 归一化。
//! 每个协议一个 [`ProtocolValidator`]，[`TaskConfigValidator`] 按协议分派。
//! 校验是幂等的，对已归一化的配置再次校验得到相同结果。

use std::net::{IpAddr, Ipv6Addr};

use url::Url;
use uptime_errors::{UptimeCheckError, UptimeCheckResult};

use crate::entities::{Protocol, TaskConfig};

const URL_SCHEMES: [&str; 4] = ["http", "https", "ftp", "ftps"];

pub trait ProtocolValidator: Send + Sync {
    fn protocol(&self) -> Protocol;
    fn validate(&self, config: &TaskConfig) -> UptimeCheckResult<()>;
}

pub struct HttpValidator;
pub struct TcpValidator;
pub struct UdpValidator;
pub struct IcmpValidator;

impl ProtocolValidator for HttpValidator {
    fn protocol(&self) -> Protocol {
        Protocol::Http
    }

    fn validate(&self, config: &TaskConfig) -> UptimeCheckResult<()> {
        let method = config
            .method
            .ok_or_else(|| UptimeCheckError::validation("method", "HTTP 拨测必须指定请求方法"))?;

        if config.url_list.is_empty() && config.legacy_url().is_none() {
            return Err(UptimeCheckError::validation(
                "url_list",
                "HTTP 拨测必须指定 url_list 或 urls",
            ));
        }

        if method.requires_body() && !config.has_body() {
            return Err(UptimeCheckError::validation(
                "body",
                "POST/PUT/PATCH 请求必须指定 body",
            ));
        }

        if let Some(raw) = config.legacy_url() {
            if !is_valid_url(raw) {
                return Err(UptimeCheckError::validation(
                    "urls",
                    format!("{raw} is not a valid URL"),
                ));
            }
        }

        for raw in &config.url_list {
            if !is_valid_url(raw) {
                return Err(UptimeCheckError::validation(
                    "url_list",
                    format!("{raw} is not a valid URL"),
                ));
            }
        }
        Ok(())
    }
}

impl ProtocolValidator for TcpValidator {
    fn protocol(&self) -> Protocol {
        Protocol::Tcp
    }

    fn validate(&self, config: &TaskConfig) -> UptimeCheckResult<()> {
        require_port_and_targets(config, self.protocol())
    }
}

impl ProtocolValidator for UdpValidator {
    fn protocol(&self) -> Protocol {
        Protocol::Udp
    }

    fn validate(&self, config: &TaskConfig) -> UptimeCheckResult<()> {
        require_port_and_targets(config, self.protocol())?;
        if config.request.is_none() {
            return Err(UptimeCheckError::validation(
                "request",
                "UDP 拨测必须包含 request 字段",
            ));
        }
        Ok(())
    }
}

impl ProtocolValidator for IcmpValidator {
    fn protocol(&self) -> Protocol {
        Protocol::Icmp
    }

    fn validate(&self, config: &TaskConfig) -> UptimeCheckResult<()> {
        if !config.has_legacy_hosts() && !config.has_targets() {
            return Err(UptimeCheckError::validation(
                "hosts",
                "ICMP 拨测必须指定 hosts 或 node_list/ip_list/url_list",
            ));
        }
        Ok(())
    }
}

fn require_port_and_targets(config: &TaskConfig, protocol: Protocol) -> UptimeCheckResult<()> {
    if config.port_value().is_none() {
        return Err(UptimeCheckError::validation(
            "port",
            format!("{protocol} 拨测必须指定 port"),
        ));
    }
    if !config.has_legacy_hosts() && !config.has_targets() {
        return Err(UptimeCheckError::validation(
            "hosts",
            format!("{protocol} 拨测必须指定 hosts 或 node_list/ip_list/url_list"),
        ));
    }
    Ok(())
}

fn is_valid_url(raw: &str) -> bool {
    match Url::parse(raw.trim()) {
        Ok(url) => URL_SCHEMES.contains(&url.scheme()) && url.host().is_some(),
        Err(_) => false,
    }
}

static HTTP_VALIDATOR: HttpValidator = HttpValidator;
static TCP_VALIDATOR: TcpValidator = TcpValidator;
static UDP_VALIDATOR: UdpValidator = UdpValidator;
static ICMP_VALIDATOR: IcmpValidator = IcmpValidator;

pub fn validator_for(protocol: Protocol) -> &'static dyn ProtocolValidator {
    match protocol {
        Protocol::Http => &HTTP_VALIDATOR,
        Protocol::Tcp => &TCP_VALIDATOR,
        Protocol::Udp => &UDP_VALIDATOR,
        Protocol::Icmp => &ICMP_VALIDATOR,
    }
}

/// IPv6 展开为 8 段 4 位十六进制
pub fn explode_ipv6(addr: &Ipv6Addr) -> String {
    addr.segments()
        .iter()
        .map(|segment| format!("{segment:04x}"))
        .collect::<Vec<_>>()
        .join(":")
}

/// IPv4 原样保留，IPv6 展开；无法解析的条目报错
pub fn normalize_ip(raw: &str) -> UptimeCheckResult<String> {
    let trimmed = raw.trim();
    match trimmed.parse::<IpAddr>() {
        Ok(IpAddr::V4(v4)) => Ok(v4.to_string()),
        Ok(IpAddr::V6(v6)) => Ok(explode_ipv6(&v6)),
        Err(_) => Err(UptimeCheckError::validation(
            "ip_list",
            format!("{raw} 不是合法的 IPv4/IPv6 地址"),
        )),
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TaskConfigValidator {
    min_period: u32,
}

impl TaskConfigValidator {
    pub fn new(min_period: u32) -> Self {
        Self { min_period }
    }

    pub fn min_period(&self) -> u32 {
        self.min_period
    }

    /// 返回归一化后的配置，入参不被修改
    pub fn validate(&self, protocol: Protocol, config: &TaskConfig) -> UptimeCheckResult<TaskConfig> {
        if config.period < self.min_period {
            return Err(UptimeCheckError::validation(
                "period",
                format!("采集周期不能小于 {} 秒", self.min_period),
            ));
        }

        validator_for(protocol).validate(config)?;

        let mut normalized = config.clone();
        normalized.ip_list = config
            .ip_list
            .iter()
            .map(|ip| normalize_ip(ip))
            .collect::<UptimeCheckResult<Vec<_>>>()?;
        Ok(normalized)
    }
}
