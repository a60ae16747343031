use async_trait::async_trait;
use std::path::Path;
use tracing::{debug, warn};

use uptime_domain::entities::HostSpec;
use uptime_domain::ports::{HostDirectory, HostRecord, HostResolver};
use uptime_errors::{UptimeCheckError, UptimeCheckResult};

/// 基于静态主机清单的主机目录
///
/// 离线场景下代替 CMDB：清单以 JSON 数组给出，每项为一条 [`HostRecord`]。
/// 动态拓扑节点无法离线展开，解析时跳过并记录告警。
#[derive(Debug, Clone, Default)]
pub struct StaticHostInventory {
    hosts: Vec<HostRecord>,
}

impl StaticHostInventory {
    pub fn new(hosts: Vec<HostRecord>) -> Self {
        Self { hosts }
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> UptimeCheckResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            UptimeCheckError::Configuration(format!("读取主机清单 {} 失败: {e}", path.display()))
        })?;
        let hosts: Vec<HostRecord> = serde_json::from_str(&content)?;
        debug!(path = %path.display(), count = hosts.len(), "主机清单加载完成");
        Ok(Self::new(hosts))
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    fn in_biz(&self, biz_id: i64) -> impl Iterator<Item = &HostRecord> {
        self.hosts.iter().filter(move |h| h.bk_biz_id == biz_id)
    }

    fn lookup(&self, spec: &HostSpec, biz_id: i64) -> Option<&HostRecord> {
        let mut hosts = self.in_biz(biz_id);
        match (spec.bk_host_id, spec.ip.as_deref()) {
            (Some(host_id), _) => hosts.find(|h| h.bk_host_id == host_id),
            (None, Some(ip)) => hosts.find(|h| {
                (h.inner_ip == ip || h.inner_ipv6 == ip)
                    && cloud_id(spec).map_or(true, |cloud| cloud == h.bk_cloud_id)
            }),
            (None, None) => None,
        }
    }
}

/// 按输出字段顺序取第一个非空地址
fn pick_address(host: &HostRecord, output_fields: &[String]) -> Option<String> {
    output_fields
        .iter()
        .filter_map(|field| match field.as_str() {
            "bk_host_innerip" => Some(host.inner_ip.as_str()),
            "bk_host_innerip_v6" => Some(host.inner_ipv6.as_str()),
            _ => None,
        })
        .find(|address| !address.is_empty())
        .map(str::to_string)
}

/// 历史 hosts 条目把云区域放在 `bk_cloud_id` 或 `plat_id` 中
fn cloud_id(spec: &HostSpec) -> Option<i64> {
    spec.extra
        .get("bk_cloud_id")
        .or_else(|| spec.extra.get("plat_id"))
        .and_then(|v| v.as_i64())
}

#[async_trait]
impl HostResolver for StaticHostInventory {
    async fn resolve_hosts(
        &self,
        hosts: &[HostSpec],
        output_fields: &[String],
        biz_id: i64,
    ) -> UptimeCheckResult<Vec<String>> {
        let mut addresses = Vec::new();
        for spec in hosts {
            if spec.is_dynamic() {
                warn!(?spec, "静态主机清单无法展开动态拓扑节点，已跳过");
                continue;
            }
            match self.lookup(spec, biz_id) {
                Some(host) => addresses.extend(pick_address(host, output_fields)),
                // 清单里没有的 IP 直接作为拨测地址
                None => match spec.ip.as_deref().filter(|ip| !ip.is_empty()) {
                    Some(ip) => addresses.push(ip.to_string()),
                    None => warn!(?spec, biz_id, "主机不在清单中，已跳过"),
                },
            }
        }
        Ok(addresses)
    }
}

#[async_trait]
impl HostDirectory for StaticHostInventory {
    async fn get_hosts_by_ids(
        &self,
        biz_id: i64,
        host_ids: &[i64],
    ) -> UptimeCheckResult<Vec<HostRecord>> {
        Ok(self
            .in_biz(biz_id)
            .filter(|h| host_ids.contains(&h.bk_host_id))
            .cloned()
            .collect())
    }

    async fn get_hosts_by_ips(
        &self,
        biz_id: i64,
        ips: &[String],
    ) -> UptimeCheckResult<Vec<HostRecord>> {
        Ok(self
            .in_biz(biz_id)
            .filter(|h| ips.iter().any(|ip| *ip == h.inner_ip || *ip == h.inner_ipv6))
            .cloned()
            .collect())
    }
}
