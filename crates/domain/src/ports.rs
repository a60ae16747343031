//! 外部协作方接口：采集下发、主机解析、主机目录、心跳查询、鉴权与业务目录

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uptime_errors::UptimeCheckResult;

use crate::entities::{HostSpec, RequestContext, Task, TaskStatus};
use crate::health::HeartbeatSelector;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ControlAction {
    Deploy,
    Start,
    Stop,
}

impl ControlAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControlAction::Deploy => "deploy",
            ControlAction::Start => "start",
            ControlAction::Stop => "stop",
        }
    }
}

impl fmt::Display for ControlAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 采集下发完成后由节点管理侧回报的权威状态
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlOutcome {
    pub status: TaskStatus,
    pub message: Option<String>,
}

#[async_trait]
pub trait AgentController: Send + Sync {
    async fn control_task(
        &self,
        ctx: &RequestContext,
        task: &Task,
        action: ControlAction,
    ) -> UptimeCheckResult<ControlOutcome>;

    /// 下发失败时节点管理记录的采集器错误日志
    async fn collector_logs(&self, ctx: &RequestContext, task_id: i64)
        -> UptimeCheckResult<Vec<String>>;
}

/// 动态拓扑 / 静态主机列表展开为具体地址
#[async_trait]
pub trait HostResolver: Send + Sync {
    async fn resolve_hosts(
        &self,
        hosts: &[HostSpec],
        output_fields: &[String],
        biz_id: i64,
    ) -> UptimeCheckResult<Vec<String>>;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HostRecord {
    pub bk_host_id: i64,
    pub bk_biz_id: i64,
    pub inner_ip: String,
    #[serde(default)]
    pub inner_ipv6: String,
    pub bk_cloud_id: i64,
    #[serde(default)]
    pub display_name: String,
}

/// CMDB 主机目录
#[async_trait]
pub trait HostDirectory: Send + Sync {
    async fn get_hosts_by_ids(
        &self,
        biz_id: i64,
        host_ids: &[i64],
    ) -> UptimeCheckResult<Vec<HostRecord>>;

    async fn get_hosts_by_ips(
        &self,
        biz_id: i64,
        ips: &[String],
    ) -> UptimeCheckResult<Vec<HostRecord>>;
}

/// 时序后端的心跳查询，返回窗口内的记录数
#[async_trait]
pub trait HeartbeatSource: Send + Sync {
    async fn query_heartbeat(
        &self,
        biz_id: i64,
        selector: &HeartbeatSelector,
        window: Duration,
    ) -> UptimeCheckResult<usize>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PermissionAction {
    ManageSynthetic,
    UsePublicSyntheticLocation,
    ManagePublicSyntheticLocation,
}

impl PermissionAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionAction::ManageSynthetic => "manage_synthetic",
            PermissionAction::UsePublicSyntheticLocation => "use_public_synthetic_location",
            PermissionAction::ManagePublicSyntheticLocation => "manage_public_synthetic_location",
        }
    }
}

impl fmt::Display for PermissionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[async_trait]
pub trait Authorizer: Send + Sync {
    /// `raise_on_deny` 为 true 时无权限返回 `Authorization` 错误，否则返回 `Ok(false)`
    async fn is_allowed(
        &self,
        ctx: &RequestContext,
        action: PermissionAction,
        raise_on_deny: bool,
    ) -> UptimeCheckResult<bool>;
}

#[async_trait]
pub trait BusinessDirectory: Send + Sync {
    /// IPv6 / 双栈业务按主机 ID 查询心跳
    async fn is_ipv6_biz(&self, biz_id: i64) -> UptimeCheckResult<bool>;
    /// 当前仍然存在的业务 ID
    async fn business_ids(&self, ctx: &RequestContext) -> UptimeCheckResult<Vec<i64>>;
}
