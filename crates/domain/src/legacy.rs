//! 历史配置兼容
//!
//! 旧任务使用 `urls` 单字段和 `hosts` 列表描述目标。详情展示前统一转换为
//! `url_list` / `node_list` / `ip_list`，其余组件不再区分新旧字段。

use crate::entities::{HostSpec, Protocol, TaskConfig};
use crate::ports::HostRecord;

/// 历史 hosts 为静态 IP 时需要到主机目录反查的 IP 列表
pub fn legacy_lookup_ips(config: &TaskConfig) -> Vec<String> {
    match config.hosts.first() {
        Some(first) if !first.is_dynamic() && first.ip.is_some() => config
            .hosts
            .iter()
            .filter_map(|h| h.ip.clone())
            .filter(|ip| !ip.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}

/// `known_hosts` 为 [`legacy_lookup_ips`] 在主机目录中查到的主机
pub fn upgrade_config(protocol: Protocol, config: &TaskConfig, known_hosts: &[HostRecord]) -> TaskConfig {
    let mut upgraded = config.clone();

    if protocol == Protocol::Http {
        if let Some(url) = config.legacy_url() {
            upgraded.url_list = vec![url.to_string()];
            upgraded.urls = None;
        }
    }

    let hosts = std::mem::take(&mut upgraded.hosts);
    let Some(first) = hosts.first() else {
        return upgraded;
    };
    upgraded.url_list.clear();

    if first.is_dynamic() {
        upgraded.node_list = hosts;
        upgraded.ip_list.clear();
    } else if first.ip.is_some() {
        upgraded.node_list = known_hosts
            .iter()
            .map(|h| HostSpec::with_host_id(h.bk_host_id))
            .collect();
        upgraded.ip_list = hosts
            .iter()
            .filter_map(|h| h.ip.clone())
            .filter(|ip| !known_hosts.iter().any(|known| &known.inner_ip == ip))
            .collect();
    }
    upgraded
}
