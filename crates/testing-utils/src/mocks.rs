//! Mock implementations for all external collaborator ports
//!
//! 每个 mock 都记录收到的调用，测试据此断言交互次数与参数。

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use uptime_domain::entities::{HostSpec, RequestContext, Task, TaskStatus};
use uptime_domain::ports::{
    AgentController, Authorizer, BusinessDirectory, ControlAction, ControlOutcome, HeartbeatSource,
    HostDirectory, HostRecord, HostResolver, PermissionAction,
};
use uptime_domain::HeartbeatSelector;
use uptime_errors::{UptimeCheckError, UptimeCheckResult};

/// Mock implementation of AgentController
///
/// 默认 deploy/start 回报 running，stop 回报 stoped；可按动作覆盖回报状态。
#[derive(Debug, Clone, Default)]
pub struct MockAgentController {
    calls: Arc<Mutex<Vec<(i64, ControlAction)>>>,
    outcomes: Arc<Mutex<HashMap<ControlAction, TaskStatus>>>,
    logs: Arc<Mutex<Vec<String>>>,
}

impl MockAgentController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_outcome(self, action: ControlAction, status: TaskStatus) -> Self {
        self.outcomes.lock().unwrap().insert(action, status);
        self
    }

    pub fn with_logs(self, logs: Vec<&str>) -> Self {
        *self.logs.lock().unwrap() = logs.into_iter().map(str::to_string).collect();
        self
    }

    pub fn calls(&self) -> Vec<(i64, ControlAction)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl AgentController for MockAgentController {
    async fn control_task(
        &self,
        _ctx: &RequestContext,
        task: &Task,
        action: ControlAction,
    ) -> UptimeCheckResult<ControlOutcome> {
        self.calls.lock().unwrap().push((task.id, action));
        let status = match self.outcomes.lock().unwrap().get(&action) {
            Some(status) => *status,
            None => match action {
                ControlAction::Deploy | ControlAction::Start => TaskStatus::Running,
                ControlAction::Stop => TaskStatus::Stopped,
            },
        };
        Ok(ControlOutcome {
            status,
            message: None,
        })
    }

    async fn collector_logs(
        &self,
        _ctx: &RequestContext,
        _task_id: i64,
    ) -> UptimeCheckResult<Vec<String>> {
        Ok(self.logs.lock().unwrap().clone())
    }
}

/// Mock implementation of HostResolver，返回固定的地址列表
#[derive(Debug, Clone, Default)]
pub struct MockHostResolver {
    addresses: Vec<String>,
    delay: Option<Duration>,
    calls: Arc<Mutex<Vec<(Vec<HostSpec>, Vec<String>)>>>,
}

impl MockHostResolver {
    pub fn new(addresses: Vec<&str>) -> Self {
        Self {
            addresses: addresses.into_iter().map(str::to_string).collect(),
            ..Self::default()
        }
    }

    /// 模拟慢速的拓扑展开
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<(Vec<HostSpec>, Vec<String>)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl HostResolver for MockHostResolver {
    async fn resolve_hosts(
        &self,
        hosts: &[HostSpec],
        output_fields: &[String],
        _biz_id: i64,
    ) -> UptimeCheckResult<Vec<String>> {
        self.calls
            .lock()
            .unwrap()
            .push((hosts.to_vec(), output_fields.to_vec()));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.addresses.clone())
    }
}

/// Mock implementation of HostDirectory
#[derive(Debug, Clone, Default)]
pub struct MockHostDirectory {
    hosts: Arc<Mutex<Vec<HostRecord>>>,
    ip_queries: Arc<Mutex<Vec<Vec<String>>>>,
}

impl MockHostDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hosts(hosts: Vec<HostRecord>) -> Self {
        Self {
            hosts: Arc::new(Mutex::new(hosts)),
            ..Self::default()
        }
    }

    pub fn ip_queries(&self) -> Vec<Vec<String>> {
        self.ip_queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl HostDirectory for MockHostDirectory {
    async fn get_hosts_by_ids(
        &self,
        biz_id: i64,
        host_ids: &[i64],
    ) -> UptimeCheckResult<Vec<HostRecord>> {
        Ok(self
            .hosts
            .lock()
            .unwrap()
            .iter()
            .filter(|h| h.bk_biz_id == biz_id && host_ids.contains(&h.bk_host_id))
            .cloned()
            .collect())
    }

    async fn get_hosts_by_ips(
        &self,
        biz_id: i64,
        ips: &[String],
    ) -> UptimeCheckResult<Vec<HostRecord>> {
        self.ip_queries.lock().unwrap().push(ips.to_vec());
        Ok(self
            .hosts
            .lock()
            .unwrap()
            .iter()
            .filter(|h| h.bk_biz_id == biz_id && ips.contains(&h.inner_ip))
            .cloned()
            .collect())
    }
}

/// Mock implementation of HeartbeatSource
///
/// 未登记的查询条件返回 `default_count`；`failing()` 时所有查询返回存储错误。
#[derive(Debug, Clone, Default)]
pub struct MockHeartbeatSource {
    counts: Arc<Mutex<HashMap<String, usize>>>,
    default_count: usize,
    failing: bool,
    queries: Arc<Mutex<Vec<HeartbeatSelector>>>,
}

impl MockHeartbeatSource {
    /// 所有节点都在线
    pub fn alive() -> Self {
        Self {
            default_count: 3,
            ..Self::default()
        }
    }

    /// 所有节点都没有心跳
    pub fn silent() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn with_count(self, selector: &HeartbeatSelector, count: usize) -> Self {
        self.counts
            .lock()
            .unwrap()
            .insert(selector.to_string(), count);
        self
    }

    pub fn queries(&self) -> Vec<HeartbeatSelector> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl HeartbeatSource for MockHeartbeatSource {
    async fn query_heartbeat(
        &self,
        _biz_id: i64,
        selector: &HeartbeatSelector,
        _window: Duration,
    ) -> UptimeCheckResult<usize> {
        self.queries.lock().unwrap().push(selector.clone());
        if self.failing {
            return Err(UptimeCheckError::storage("时序后端不可用"));
        }
        Ok(self
            .counts
            .lock()
            .unwrap()
            .get(&selector.to_string())
            .copied()
            .unwrap_or(self.default_count))
    }
}

/// Mock implementation of Authorizer
#[derive(Debug, Clone)]
pub struct MockAuthorizer {
    denied: Arc<Mutex<HashSet<PermissionAction>>>,
    checks: Arc<Mutex<Vec<PermissionAction>>>,
}

impl MockAuthorizer {
    pub fn allow_all() -> Self {
        Self {
            denied: Arc::new(Mutex::new(HashSet::new())),
            checks: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn deny(self, action: PermissionAction) -> Self {
        self.denied.lock().unwrap().insert(action);
        self
    }

    pub fn checks(&self) -> Vec<PermissionAction> {
        self.checks.lock().unwrap().clone()
    }
}

impl Default for MockAuthorizer {
    fn default() -> Self {
        Self::allow_all()
    }
}

#[async_trait]
impl Authorizer for MockAuthorizer {
    async fn is_allowed(
        &self,
        ctx: &RequestContext,
        action: PermissionAction,
        raise_on_deny: bool,
    ) -> UptimeCheckResult<bool> {
        self.checks.lock().unwrap().push(action);
        let allowed = !self.denied.lock().unwrap().contains(&action);
        if !allowed && raise_on_deny {
            return Err(UptimeCheckError::Authorization(format!(
                "用户 {} 没有 {} 权限",
                ctx.operator, action
            )));
        }
        Ok(allowed)
    }
}

/// Mock implementation of BusinessDirectory
#[derive(Debug, Clone, Default)]
pub struct MockBusinessDirectory {
    business_ids: Vec<i64>,
    ipv6_biz_ids: Vec<i64>,
}

impl MockBusinessDirectory {
    pub fn new(business_ids: Vec<i64>) -> Self {
        Self {
            business_ids,
            ipv6_biz_ids: Vec::new(),
        }
    }

    pub fn with_ipv6_biz(mut self, biz_id: i64) -> Self {
        self.ipv6_biz_ids.push(biz_id);
        self
    }
}

#[async_trait]
impl BusinessDirectory for MockBusinessDirectory {
    async fn is_ipv6_biz(&self, biz_id: i64) -> UptimeCheckResult<bool> {
        Ok(self.ipv6_biz_ids.contains(&biz_id))
    }

    async fn business_ids(&self, _ctx: &RequestContext) -> UptimeCheckResult<Vec<i64>> {
        Ok(self.business_ids.clone())
    }
}
