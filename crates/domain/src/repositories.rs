//! 领域仓储抽象
//!
//! 拨测任务、节点、分组的持久化接口。存储层负责审计字段的写入，
//! 并以 (tenant, biz, name) 唯一约束作为名称冲突的最终保障。

use async_trait::async_trait;
use uptime_errors::UptimeCheckResult;

use crate::entities::{Group, GroupFilter, Node, NodeFilter, Task, TaskFilter, TaskStatus};

/// 拨测任务仓储抽象
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// 已软删除的任务不会出现在结果中
    async fn list(&self, filter: &TaskFilter) -> UptimeCheckResult<Vec<Task>>;
    async fn get(&self, tenant_id: &str, id: i64) -> UptimeCheckResult<Option<Task>>;
    /// id 为 0 时新建，否则覆盖保存；返回存储后的任务
    async fn save(&self, task: &Task, operator: &str) -> UptimeCheckResult<Task>;
    /// 软删除
    async fn delete(&self, tenant_id: &str, id: i64, operator: &str) -> UptimeCheckResult<bool>;
    async fn update_status(
        &self,
        tenant_id: &str,
        id: i64,
        status: TaskStatus,
        operator: &str,
    ) -> UptimeCheckResult<Task>;
}

/// 拨测节点仓储抽象
#[async_trait]
pub trait NodeRepository: Send + Sync {
    async fn list(&self, filter: &NodeFilter) -> UptimeCheckResult<Vec<Node>>;
    async fn get(&self, tenant_id: &str, id: i64) -> UptimeCheckResult<Option<Node>>;
    async fn save(&self, node: &Node, operator: &str) -> UptimeCheckResult<Node>;
    async fn delete(&self, tenant_id: &str, id: i64) -> UptimeCheckResult<bool>;
}

/// 拨测分组仓储抽象
#[async_trait]
pub trait GroupRepository: Send + Sync {
    async fn list(&self, filter: &GroupFilter) -> UptimeCheckResult<Vec<Group>>;
    async fn get(&self, tenant_id: &str, id: i64) -> UptimeCheckResult<Option<Group>>;
    async fn save(&self, group: &Group, operator: &str) -> UptimeCheckResult<Group>;
    async fn delete(&self, tenant_id: &str, id: i64) -> UptimeCheckResult<bool>;
}
