use std::collections::HashSet;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{info, info_span, warn, Instrument};

use uptime_config::UptimeCheckConfig;
use uptime_domain::entities::{
    Group, GroupFilter, Node, NodeFilter, Protocol, RequestContext, Task, TaskConfig, TaskFilter,
    TaskOrdering, TaskStatus,
};
use uptime_domain::legacy::{legacy_lookup_ips, upgrade_config};
use uptime_domain::lifecycle::{
    action_for_requested_status, display_status, ensure_deletable, ensure_deployable,
};
use uptime_domain::ports::ControlAction;
use uptime_domain::relations::{check_public_node_admission, ensure_unique_name, next_copy_name};
use uptime_domain::{TargetResolver, TaskConfigValidator};
use uptime_errors::{UptimeCheckError, UptimeCheckResult};

use super::{with_timeout, ServiceDependencies};
use crate::payload::{validate_name, TaskPayload, TASK_NAME_MAX_LEN};

const TASK_KIND: &str = "拨测任务";

/// 任务详情：关联节点、分组与解析后的拨测目标
#[derive(Debug, Clone, Serialize)]
pub struct TaskDetail {
    #[serde(flatten)]
    pub task: Task,
    pub nodes: Vec<Node>,
    pub groups: Vec<Group>,
    pub url: Vec<String>,
}

/// 列表项，`task.status` 为展示态
#[derive(Debug, Clone, Serialize)]
pub struct TaskSummary {
    #[serde(flatten)]
    pub task: Task,
    pub nodes: Vec<Node>,
    pub url: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct TaskQuery {
    pub group_id: Option<i64>,
    pub task_id: Option<i64>,
    pub ordering: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum PlainTask {
    Brief {
        id: i64,
        name: String,
        bk_biz_id: i64,
    },
    Compact {
        id: i64,
        name: String,
        bk_biz_id: i64,
        protocol: Protocol,
        config: TaskConfig,
        node_ids: Vec<i64>,
        group_ids: Vec<i64>,
        status: TaskStatus,
    },
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StatusChange {
    pub id: i64,
    pub status: TaskStatus,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RunningStatus {
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_log: Option<Vec<String>>,
}

/// 拨测任务应用服务
pub struct TaskService {
    deps: ServiceDependencies,
    config: UptimeCheckConfig,
    validator: TaskConfigValidator,
    targets: TargetResolver,
}

impl TaskService {
    pub fn new(deps: ServiceDependencies, config: UptimeCheckConfig) -> Self {
        let validator = TaskConfigValidator::new(config.task_min_period);
        let targets = TargetResolver::new(
            deps.host_resolver.clone(),
            config.default_output_fields.clone(),
            config.host_resolution_timeout(),
        );
        Self {
            deps,
            config,
            validator,
            targets,
        }
    }

    pub async fn create(&self, ctx: &RequestContext, raw: &Value) -> UptimeCheckResult<Task> {
        let span = info_span!("create_task", biz_id = ctx.biz_id, operator = %ctx.operator);
        async move {
            let payload = TaskPayload::from_json(raw)?;
            let ctx = ctx.for_biz(payload.biz_id.unwrap_or(ctx.biz_id));

            let name = validate_name(
                payload.name.as_deref().unwrap_or_default(),
                TASK_NAME_MAX_LEN,
            )?;
            let protocol = payload
                .protocol
                .ok_or_else(|| UptimeCheckError::validation("protocol", "必须指定拨测协议"))?;
            let config = payload
                .config
                .as_ref()
                .ok_or_else(|| UptimeCheckError::validation("config", "必须指定拨测配置"))?;
            let config = self.validator.validate(protocol, config)?;

            let node_ids = payload.node_ids.unwrap_or_default();
            let group_ids = payload.group_ids.unwrap_or_default();

            self.check_public_nodes(&ctx, &node_ids).await?;
            self.ensure_name_available(&ctx, &name, None).await?;

            let mut task = Task::new(&ctx.tenant_id, ctx.biz_id, &name, protocol, config);
            task.labels = payload.labels.unwrap_or_default();
            task.location = payload
                .location
                .unwrap_or_else(|| Value::Object(Map::new()));
            // 多租户模式下强制使用独立数据源
            task.independent_dataid =
                self.config.multi_tenant_mode || payload.independent_dataid.unwrap_or(false);
            task.node_ids = node_ids;
            task.group_ids = group_ids;

            let stored = self.deps.tasks.save(&task, &ctx.operator).await?;
            info!(task_id = stored.id, name = %stored.name, "拨测任务创建成功");
            Ok(stored)
        }
        .instrument(span)
        .await
    }

    pub async fn retrieve(&self, ctx: &RequestContext, id: i64) -> UptimeCheckResult<TaskDetail> {
        let span = info_span!("retrieve_task", task_id = id, biz_id = ctx.biz_id);
        async move {
            let mut task = self.load_task(ctx, id).await?;

            let nodes = self.nodes_by_ids(ctx, &task.node_ids).await?;
            let groups = if task.group_ids.is_empty() {
                Vec::new()
            } else {
                self.deps
                    .groups
                    .list(&GroupFilter {
                        ids: Some(task.group_ids.clone()),
                        ..GroupFilter::for_biz(&ctx.tenant_id, ctx.biz_id)
                    })
                    .await?
            };
            let url = self
                .targets
                .resolve(task.protocol, &task.config, task.biz_id)
                .await?;

            let lookup_ips = legacy_lookup_ips(&task.config);
            let known_hosts = if lookup_ips.is_empty() {
                Vec::new()
            } else {
                with_timeout(
                    self.config.host_resolution_timeout(),
                    "主机目录查询",
                    self.deps.host_directory.get_hosts_by_ips(task.biz_id, &lookup_ips),
                )
                .await?
            };
            task.config = upgrade_config(task.protocol, &task.config, &known_hosts);

            Ok(TaskDetail {
                task,
                nodes,
                groups,
                url,
            })
        }
        .instrument(span)
        .await
    }

    /// 局部更新：请求中缺省的字段沿用原值，状态与独立数据源标记保持不变
    pub async fn update(&self, ctx: &RequestContext, id: i64, raw: &Value) -> UptimeCheckResult<Task> {
        let span = info_span!("update_task", task_id = id, operator = %ctx.operator);
        async move {
            let existing = self.load_task(ctx, id).await?;
            let payload = TaskPayload::from_json(raw)?;
            let ctx = ctx.for_biz(payload.biz_id.unwrap_or(existing.biz_id));

            let name = match payload.name.as_deref() {
                Some(name) => validate_name(name, TASK_NAME_MAX_LEN)?,
                None => existing.name.clone(),
            };
            let protocol = payload.protocol.unwrap_or(existing.protocol);
            let config = payload.config.as_ref().unwrap_or(&existing.config);
            let config = self.validator.validate(protocol, config)?;

            let node_ids = payload
                .node_ids
                .unwrap_or_else(|| existing.node_ids.clone());
            let group_ids = payload
                .group_ids
                .unwrap_or_else(|| existing.group_ids.clone());

            self.check_public_nodes(&ctx, &node_ids).await?;
            self.ensure_name_available(&ctx, &name, Some(id)).await?;

            let mut task = existing;
            task.biz_id = ctx.biz_id;
            task.name = name;
            task.protocol = protocol;
            task.check_interval = config.period;
            task.config = config;
            if let Some(labels) = payload.labels {
                task.labels = labels;
            }
            if let Some(location) = payload.location {
                task.location = location;
            }
            task.node_ids = node_ids;
            task.group_ids = group_ids;

            let stored = self.deps.tasks.save(&task, &ctx.operator).await?;
            info!(task_id = stored.id, "拨测任务更新成功");
            Ok(stored)
        }
        .instrument(span)
        .await
    }

    pub async fn destroy(&self, ctx: &RequestContext, id: i64) -> UptimeCheckResult<()> {
        let span = info_span!("destroy_task", task_id = id, operator = %ctx.operator);
        async move {
            let task = self.load_task(ctx, id).await?;
            ensure_deletable(&task)?;
            self.deps
                .tasks
                .delete(&ctx.tenant_id, id, &ctx.operator)
                .await?;
            info!(task = %task.entity_description(), "拨测任务已删除");
            Ok(())
        }
        .instrument(span)
        .await
    }

    pub async fn list(
        &self,
        ctx: &RequestContext,
        query: &TaskQuery,
    ) -> UptimeCheckResult<Vec<TaskSummary>> {
        let span = info_span!("list_tasks", biz_id = ctx.biz_id);
        async move {
            let tasks = self.deps.tasks.list(&self.filter_for(ctx, query)?).await?;

            let node_ids: Vec<i64> = tasks
                .iter()
                .flat_map(|t| t.node_ids.iter().copied())
                .collect::<HashSet<_>>()
                .into_iter()
                .collect();
            let nodes = self.nodes_by_ids(ctx, &node_ids).await?;
            let business_ids = self.deps.business.business_ids(ctx).await?;

            let mut summaries = Vec::with_capacity(tasks.len());
            for mut task in tasks {
                let task_nodes: Vec<Node> = nodes
                    .iter()
                    .filter(|n| task.node_ids.contains(&n.id))
                    .cloned()
                    .collect();
                let url = self
                    .targets
                    .resolve(task.protocol, &task.config, task.biz_id)
                    .await?;
                let shown = display_status(&task, &task_nodes, &business_ids);
                if shown != task.status {
                    warn!(task_id = task.id, "关联节点所属业务已不存在，任务展示为启动失败");
                }
                task.status = shown;
                summaries.push(TaskSummary {
                    task,
                    nodes: task_nodes,
                    url,
                });
            }
            Ok(summaries)
        }
        .instrument(span)
        .await
    }

    /// 轻量列表；指定任务 ID 时返回紧凑的完整行
    pub async fn list_plain(
        &self,
        ctx: &RequestContext,
        query: &TaskQuery,
    ) -> UptimeCheckResult<Vec<PlainTask>> {
        let mut filter = self.filter_for(ctx, query)?;
        filter.ids = query.task_id.map(|id| vec![id]);
        let tasks = self.deps.tasks.list(&filter).await?;

        let rows = tasks
            .into_iter()
            .map(|t| {
                if query.task_id.is_some() {
                    PlainTask::Compact {
                        id: t.id,
                        name: t.name,
                        bk_biz_id: t.biz_id,
                        protocol: t.protocol,
                        config: t.config,
                        node_ids: t.node_ids,
                        group_ids: t.group_ids,
                        status: t.status,
                    }
                } else {
                    PlainTask::Brief {
                        id: t.id,
                        name: t.name,
                        bk_biz_id: t.biz_id,
                    }
                }
            })
            .collect();
        Ok(rows)
    }

    pub async fn count(&self, ctx: &RequestContext, group_id: Option<i64>) -> UptimeCheckResult<usize> {
        let filter = TaskFilter {
            group_id,
            ..TaskFilter::for_biz(&ctx.tenant_id, ctx.biz_id)
        };
        Ok(self.deps.tasks.list(&filter).await?.len())
    }

    /// 名称是否已被同业务下的其他任务占用
    pub async fn name_conflicts(
        &self,
        ctx: &RequestContext,
        name: &str,
        exclude_id: Option<i64>,
    ) -> UptimeCheckResult<bool> {
        match self.ensure_name_available(ctx, name, exclude_id).await {
            Ok(()) => Ok(false),
            Err(UptimeCheckError::DuplicateName { .. }) => Ok(true),
            Err(e) => Err(e),
        }
    }

    pub async fn clone_task(&self, ctx: &RequestContext, id: i64) -> UptimeCheckResult<Task> {
        let span = info_span!("clone_task", task_id = id, operator = %ctx.operator);
        async move {
            let source = self.load_task(ctx, id).await?;

            let taken: HashSet<String> = self
                .deps
                .tasks
                .list(&TaskFilter::for_biz(&ctx.tenant_id, ctx.biz_id))
                .await?
                .into_iter()
                .map(|t| t.name)
                .collect();
            let name = next_copy_name(&source.name, &taken);

            let mut task = Task::new(
                &ctx.tenant_id,
                ctx.biz_id,
                &name,
                source.protocol,
                source.config.clone(),
            );
            task.node_ids = source.node_ids.clone();
            task.group_ids = source.group_ids.clone();
            task.independent_dataid = self.config.multi_tenant_mode;

            let stored = self.deps.tasks.save(&task, &ctx.operator).await?;
            info!(source_id = id, task_id = stored.id, name = %stored.name, "拨测任务克隆成功");
            Ok(stored)
        }
        .instrument(span)
        .await
    }

    /// 请求状态为 running 时启动任务，其余均停止
    pub async fn change_status(
        &self,
        ctx: &RequestContext,
        id: i64,
        requested: &str,
    ) -> UptimeCheckResult<StatusChange> {
        let action = requested
            .parse::<TaskStatus>()
            .map(action_for_requested_status)
            .unwrap_or(ControlAction::Stop);
        self.control(ctx, id, action).await
    }

    /// 下发正式配置
    pub async fn deploy(&self, ctx: &RequestContext, id: i64) -> UptimeCheckResult<StatusChange> {
        let task = self.load_task(ctx, id).await?;
        ensure_deployable(&task)?;
        self.control(ctx, id, ControlAction::Deploy).await
    }

    pub async fn running_status(&self, ctx: &RequestContext, id: i64) -> UptimeCheckResult<RunningStatus> {
        let task = self.load_task(ctx, id).await?;
        if task.status == TaskStatus::StartFailed {
            let error_log = self.deps.agent.collector_logs(ctx, id).await?;
            return Ok(RunningStatus {
                status: task.status,
                error_log: Some(error_log),
            });
        }
        Ok(RunningStatus {
            status: task.status,
            error_log: None,
        })
    }

    async fn control(
        &self,
        ctx: &RequestContext,
        id: i64,
        action: ControlAction,
    ) -> UptimeCheckResult<StatusChange> {
        let span = info_span!("control_task", task_id = id, action = %action, operator = %ctx.operator);
        async move {
            let task = self.load_task(ctx, id).await?;
            let outcome = self.deps.agent.control_task(ctx, &task, action).await?;
            // 状态以节点管理回报为准，审计信息由存储层记录
            let updated = self
                .deps
                .tasks
                .update_status(&ctx.tenant_id, id, outcome.status, &ctx.operator)
                .await?;
            info!(
                task_id = id,
                from = %task.status,
                to = %updated.status,
                "拨测任务状态已更新"
            );
            Ok(StatusChange {
                id,
                status: updated.status,
            })
        }
        .instrument(span)
        .await
    }

    async fn load_task(&self, ctx: &RequestContext, id: i64) -> UptimeCheckResult<Task> {
        match self.deps.tasks.get(&ctx.tenant_id, id).await? {
            Some(task) if task.biz_id == ctx.biz_id && !task.is_deleted => Ok(task),
            _ => Err(UptimeCheckError::task_not_found(id)),
        }
    }

    async fn nodes_by_ids(&self, ctx: &RequestContext, ids: &[i64]) -> UptimeCheckResult<Vec<Node>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.deps
            .nodes
            .list(&NodeFilter {
                tenant_id: ctx.tenant_id.clone(),
                ids: Some(ids.to_vec()),
                ..NodeFilter::default()
            })
            .await
    }

    async fn check_public_nodes(&self, ctx: &RequestContext, node_ids: &[i64]) -> UptimeCheckResult<()> {
        if node_ids.is_empty() {
            return Ok(());
        }
        let nodes = self
            .deps
            .nodes
            .list(&NodeFilter {
                include_common: true,
                ids: Some(node_ids.to_vec()),
                ..NodeFilter::for_biz(&ctx.tenant_id, ctx.biz_id)
            })
            .await?;
        check_public_node_admission(
            self.deps.authorizer.as_ref(),
            ctx,
            &nodes,
            self.config.enable_public_location_auth,
        )
        .await
    }

    /// 名称冲突预检查，存储层的唯一约束兜底
    async fn ensure_name_available(
        &self,
        ctx: &RequestContext,
        name: &str,
        exclude_id: Option<i64>,
    ) -> UptimeCheckResult<()> {
        let existing = self
            .deps
            .tasks
            .list(&TaskFilter {
                name: Some(name.to_string()),
                ..TaskFilter::for_biz(&ctx.tenant_id, ctx.biz_id)
            })
            .await?;
        ensure_unique_name(
            TASK_KIND,
            name,
            existing.iter().map(|t| (t.id, t.name.as_str())),
            exclude_id,
        )
    }

    fn filter_for(&self, ctx: &RequestContext, query: &TaskQuery) -> UptimeCheckResult<TaskFilter> {
        let ordering = match query.ordering.as_deref() {
            Some(raw) if !raw.is_empty() => raw
                .parse::<TaskOrdering>()
                .map_err(|e| UptimeCheckError::validation("ordering", e))?,
            _ => TaskOrdering::default(),
        };
        Ok(TaskFilter {
            group_id: query.group_id,
            ordering,
            ..TaskFilter::for_biz(&ctx.tenant_id, ctx.biz_id)
        })
    }
}
