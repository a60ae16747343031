pub mod group_service;
pub mod node_service;
pub mod task_service;

pub use group_service::*;
pub use node_service::*;
pub use task_service::*;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use uptime_domain::ports::{
    AgentController, Authorizer, BusinessDirectory, HeartbeatSource, HostDirectory, HostResolver,
};
use uptime_domain::repositories::{GroupRepository, NodeRepository, TaskRepository};
use uptime_errors::{UptimeCheckError, UptimeCheckResult};

/// 应用服务依赖的仓储与外部协作方
#[derive(Clone)]
pub struct ServiceDependencies {
    pub tasks: Arc<dyn TaskRepository>,
    pub nodes: Arc<dyn NodeRepository>,
    pub groups: Arc<dyn GroupRepository>,
    pub agent: Arc<dyn AgentController>,
    pub host_resolver: Arc<dyn HostResolver>,
    pub host_directory: Arc<dyn HostDirectory>,
    pub heartbeat: Arc<dyn HeartbeatSource>,
    pub authorizer: Arc<dyn Authorizer>,
    pub business: Arc<dyn BusinessDirectory>,
}

pub(crate) async fn with_timeout<T, F>(timeout: Duration, what: &str, call: F) -> UptimeCheckResult<T>
where
    F: Future<Output = UptimeCheckResult<T>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(UptimeCheckError::Timeout(format!(
            "{what} 超过 {} 毫秒未返回",
            timeout.as_millis()
        ))),
    }
}
