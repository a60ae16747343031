//! 节点心跳校验
//!
//! 节点创建或更新前，要求时序后端在最近窗口内存在该节点的心跳记录。
//! 多租户模式下由调用方跳过。

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};
use uptime_errors::{UptimeCheckError, UptimeCheckResult};

use crate::entities::Node;
use crate::ports::{BusinessDirectory, HeartbeatSource, HostDirectory};

const HEARTBEAT_METRIC: &str = "bkmonitor:beat_monitor:heartbeat_total:uptime";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeartbeatSelector {
    /// IPv4 业务按 IP + 云区域查询
    IpCloud { ip: String, bk_cloud_id: i64 },
    /// IPv6 / 双栈业务按主机 ID 查询
    HostId { bk_host_id: Option<i64> },
}

impl HeartbeatSelector {
    pub fn to_promql(&self, window: Duration) -> String {
        let minutes = (window.as_secs() / 60).max(1);
        match self {
            HeartbeatSelector::IpCloud { ip, bk_cloud_id } => format!(
                "{HEARTBEAT_METRIC}{{ip='{ip}',bk_cloud_id='{bk_cloud_id}'}}[{minutes}m]"
            ),
            HeartbeatSelector::HostId { bk_host_id } => {
                let host_id = bk_host_id.map(|id| id.to_string()).unwrap_or_default();
                format!("{HEARTBEAT_METRIC}{{bk_host_id='{host_id}'}}[{minutes}m]")
            }
        }
    }
}

impl fmt::Display for HeartbeatSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeartbeatSelector::IpCloud { ip, bk_cloud_id } => {
                write!(f, "ip={ip}, bk_cloud_id={bk_cloud_id}")
            }
            HeartbeatSelector::HostId { bk_host_id: Some(id) } => write!(f, "bk_host_id={id}"),
            HeartbeatSelector::HostId { bk_host_id: None } => write!(f, "bk_host_id=<none>"),
        }
    }
}

pub struct NodeHealthGate {
    hosts: Arc<dyn HostDirectory>,
    heartbeat: Arc<dyn HeartbeatSource>,
    business: Arc<dyn BusinessDirectory>,
    window: Duration,
    timeout: Duration,
}

impl NodeHealthGate {
    pub fn new(
        hosts: Arc<dyn HostDirectory>,
        heartbeat: Arc<dyn HeartbeatSource>,
        business: Arc<dyn BusinessDirectory>,
        window: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            hosts,
            heartbeat,
            business,
            window,
            timeout,
        }
    }

    /// 构造心跳查询条件；主机 ID 能在 CMDB 查到时以 CMDB 的 IP/云区域为准
    pub async fn selector_for(&self, node: &Node) -> UptimeCheckResult<HeartbeatSelector> {
        let is_ipv6 = self
            .bounded("业务IP类型查询", self.business.is_ipv6_biz(node.biz_id))
            .await?;
        if is_ipv6 {
            return Ok(HeartbeatSelector::HostId {
                bk_host_id: node.bk_host_id,
            });
        }

        let mut ip = node.ip.clone().unwrap_or_default();
        let mut bk_cloud_id = node.plat_id;
        if let Some(host_id) = node.bk_host_id {
            let hosts = self
                .bounded("CMDB主机查询", self.hosts.get_hosts_by_ids(node.biz_id, &[host_id]))
                .await?;
            if let Some(host) = hosts.first() {
                ip = host.inner_ip.clone();
                bk_cloud_id = host.bk_cloud_id;
            }
        }
        Ok(HeartbeatSelector::IpCloud { ip, bk_cloud_id })
    }

    async fn bounded<T, F>(&self, what: &str, call: F) -> UptimeCheckResult<T>
    where
        F: Future<Output = UptimeCheckResult<T>>,
    {
        tokio::time::timeout(self.timeout, call).await.map_err(|_| {
            warn!(timeout_ms = self.timeout.as_millis() as u64, "{what}超时");
            UptimeCheckError::Timeout(format!(
                "{what}超过 {} 毫秒未返回",
                self.timeout.as_millis()
            ))
        })?
    }

    /// 不做重试；后端失败或超时同样视为节点不可达
    pub async fn check(&self, node: &Node) -> UptimeCheckResult<()> {
        let selector = self.selector_for(node).await?;
        debug!(
            node = %node.name,
            promql = %selector.to_promql(self.window),
            "查询拨测节点心跳"
        );

        let query = self
            .heartbeat
            .query_heartbeat(node.biz_id, &selector, self.window);
        let count = match tokio::time::timeout(self.timeout, query).await {
            Ok(Ok(count)) => count,
            Ok(Err(e)) => {
                warn!(selector = %selector, error = %e, "心跳查询失败");
                0
            }
            Err(_) => {
                warn!(selector = %selector, timeout_ms = self.timeout.as_millis() as u64, "心跳查询超时");
                0
            }
        };

        if count == 0 {
            return Err(UptimeCheckError::node_unreachable(selector.to_string()));
        }
        Ok(())
    }
}
