//! 拨测目标解析：把任务配置和关联节点展开成采集器实际拨测的地址列表

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;
use uptime_errors::{UptimeCheckError, UptimeCheckResult};

use crate::entities::{HostSpec, Protocol, TaskConfig};
use crate::ports::HostResolver;

/// 历史 hosts 字段只取内网 IP
pub const LEGACY_OUTPUT_FIELD: &str = "bk_host_innerip";

/// 采集器按 `[host]:port` 解析地址
pub fn format_address(host: &str, port: &str) -> String {
    format!("[{host}]:{port}")
}

pub struct TargetResolver {
    resolver: Arc<dyn HostResolver>,
    output_fields: Vec<String>,
    timeout: Duration,
}

impl TargetResolver {
    pub fn new(resolver: Arc<dyn HostResolver>, output_fields: Vec<String>, timeout: Duration) -> Self {
        Self {
            resolver,
            output_fields,
            timeout,
        }
    }

    pub async fn resolve(
        &self,
        protocol: Protocol,
        config: &TaskConfig,
        biz_id: i64,
    ) -> UptimeCheckResult<Vec<String>> {
        if protocol == Protocol::Http {
            return Ok(match config.legacy_url() {
                Some(url) => vec![url.to_string()],
                None => config.url_list.clone(),
            });
        }

        let hosts = if config.has_legacy_hosts() {
            self.resolve_legacy_hosts(&config.hosts, biz_id).await?
        } else {
            let mut hosts = if config.node_list.is_empty() {
                Vec::new()
            } else {
                let fields = if config.output_fields.is_empty() {
                    &self.output_fields
                } else {
                    &config.output_fields
                };
                self.expand(&config.node_list, fields, biz_id).await?
            };
            hosts.extend(config.url_list.iter().cloned());
            hosts.extend(config.ip_list.iter().cloned());
            hosts
        };

        debug!(protocol = %protocol, biz_id, count = hosts.len(), "拨测目标解析完成");

        if protocol == Protocol::Icmp {
            return Ok(hosts);
        }
        let port = config.port_value().unwrap_or_default();
        Ok(hosts.iter().map(|host| format_address(host, port)).collect())
    }

    async fn resolve_legacy_hosts(
        &self,
        hosts: &[HostSpec],
        biz_id: i64,
    ) -> UptimeCheckResult<Vec<String>> {
        match hosts.first() {
            Some(first) if first.is_dynamic() => {
                self.expand(hosts, &[LEGACY_OUTPUT_FIELD.to_string()], biz_id)
                    .await
            }
            _ => Ok(hosts
                .iter()
                .filter_map(|h| h.ip.clone().filter(|ip| !ip.is_empty()))
                .collect()),
        }
    }

    async fn expand(
        &self,
        hosts: &[HostSpec],
        output_fields: &[String],
        biz_id: i64,
    ) -> UptimeCheckResult<Vec<String>> {
        let call = self.resolver.resolve_hosts(hosts, output_fields, biz_id);
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| {
                UptimeCheckError::Timeout(format!(
                    "主机解析超过 {} 毫秒未返回",
                    self.timeout.as_millis()
                ))
            })?
    }
}
