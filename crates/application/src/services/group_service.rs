use serde::Serialize;
use serde_json::Value;
use tracing::{info, info_span, Instrument};

use uptime_domain::entities::{Group, GroupFilter, RequestContext, TaskFilter};
use uptime_domain::relations::ensure_unique_name;
use uptime_errors::{UptimeCheckError, UptimeCheckResult};

use super::ServiceDependencies;
use crate::payload::{validate_name, GroupPayload, GROUP_NAME_MAX_LEN};

const GROUP_KIND: &str = "拨测分组";

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TaskBrief {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct GroupDetail {
    pub id: i64,
    pub bk_biz_id: i64,
    pub name: String,
    pub logo: String,
    /// 保持分组内的任务顺序，已删除的任务不返回
    pub tasks: Vec<TaskBrief>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MembershipChange {
    pub changed: bool,
    pub message: String,
}

/// 拨测分组应用服务
pub struct GroupService {
    deps: ServiceDependencies,
}

impl GroupService {
    pub fn new(deps: ServiceDependencies) -> Self {
        Self { deps }
    }

    pub async fn create(&self, ctx: &RequestContext, raw: &Value) -> UptimeCheckResult<GroupDetail> {
        let span = info_span!("create_group", biz_id = ctx.biz_id, operator = %ctx.operator);
        async move {
            let payload = GroupPayload::from_json(raw)?;
            let ctx = ctx.for_biz(payload.biz_id.unwrap_or(ctx.biz_id));
            let task_ids = payload.task_id_list.ok_or_else(|| {
                UptimeCheckError::validation("task_id_list", "创建拨测任务组时需必传参数task_id_list")
            })?;
            let name = validate_name(
                payload.name.as_deref().unwrap_or_default(),
                GROUP_NAME_MAX_LEN,
            )?;
            self.ensure_name_available(&ctx, &name, None).await?;

            let mut group = Group::new(&ctx.tenant_id, ctx.biz_id, &name);
            group.logo = payload.logo.unwrap_or_default();
            group.task_ids = task_ids;

            let stored = self.deps.groups.save(&group, &ctx.operator).await?;
            info!(group_id = stored.id, name = %stored.name, "拨测分组创建成功");
            self.detail(&ctx, stored).await
        }
        .instrument(span)
        .await
    }

    pub async fn retrieve(&self, ctx: &RequestContext, id: i64) -> UptimeCheckResult<GroupDetail> {
        let group = self.load_group(ctx, id).await?;
        self.detail(ctx, group).await
    }

    /// 未传 task_id_list 时保持原有成员
    pub async fn update(
        &self,
        ctx: &RequestContext,
        id: i64,
        raw: &Value,
    ) -> UptimeCheckResult<GroupDetail> {
        let span = info_span!("update_group", group_id = id, operator = %ctx.operator);
        async move {
            let mut group = self.load_group(ctx, id).await?;
            let payload = GroupPayload::from_json(raw)?;

            if let Some(name) = payload.name.as_deref() {
                let name = validate_name(name, GROUP_NAME_MAX_LEN)?;
                self.ensure_name_available(ctx, &name, Some(id)).await?;
                group.name = name;
            }
            if let Some(logo) = payload.logo {
                group.logo = logo;
            }
            if let Some(task_ids) = payload.task_id_list {
                group.task_ids = task_ids;
            }

            let stored = self.deps.groups.save(&group, &ctx.operator).await?;
            info!(group_id = id, "拨测分组更新成功");
            self.detail(ctx, stored).await
        }
        .instrument(span)
        .await
    }

    pub async fn destroy(&self, ctx: &RequestContext, id: i64) -> UptimeCheckResult<()> {
        self.load_group(ctx, id).await?;
        self.deps.groups.delete(&ctx.tenant_id, id).await?;
        info!(group_id = id, operator = %ctx.operator, "拨测分组已删除");
        Ok(())
    }

    pub async fn list(&self, ctx: &RequestContext) -> UptimeCheckResult<Vec<GroupDetail>> {
        let groups = self
            .deps
            .groups
            .list(&GroupFilter::for_biz(&ctx.tenant_id, ctx.biz_id))
            .await?;
        let mut details = Vec::with_capacity(groups.len());
        for group in groups {
            details.push(self.detail(ctx, group).await?);
        }
        Ok(details)
    }

    pub async fn add_task(
        &self,
        ctx: &RequestContext,
        group_id: i64,
        task_id: i64,
    ) -> UptimeCheckResult<MembershipChange> {
        let mut group = self.load_group(ctx, group_id).await?;
        self.ensure_task_exists(ctx, task_id).await?;

        if group.task_ids.contains(&task_id) {
            return Ok(MembershipChange {
                changed: false,
                message: format!("任务 {task_id} 已在分组 {} 中", group.name),
            });
        }
        group.task_ids.push(task_id);
        self.deps.groups.save(&group, &ctx.operator).await?;
        info!(group_id, task_id, "任务已加入拨测分组");
        Ok(MembershipChange {
            changed: true,
            message: format!("任务 {task_id} 已加入分组 {}", group.name),
        })
    }

    pub async fn remove_task(
        &self,
        ctx: &RequestContext,
        group_id: i64,
        task_id: i64,
    ) -> UptimeCheckResult<MembershipChange> {
        let mut group = self.load_group(ctx, group_id).await?;

        if !group.task_ids.contains(&task_id) {
            return Ok(MembershipChange {
                changed: false,
                message: format!("任务 {task_id} 不在分组 {} 中", group.name),
            });
        }
        group.task_ids.retain(|id| *id != task_id);
        self.deps.groups.save(&group, &ctx.operator).await?;
        info!(group_id, task_id, "任务已移出拨测分组");
        Ok(MembershipChange {
            changed: true,
            message: format!("任务 {task_id} 已移出分组 {}", group.name),
        })
    }

    async fn detail(&self, ctx: &RequestContext, group: Group) -> UptimeCheckResult<GroupDetail> {
        let tasks = if group.task_ids.is_empty() {
            Vec::new()
        } else {
            self.deps
                .tasks
                .list(&TaskFilter {
                    ids: Some(group.task_ids.clone()),
                    ..TaskFilter::for_biz(&ctx.tenant_id, group.biz_id)
                })
                .await?
        };
        let tasks = group
            .task_ids
            .iter()
            .filter_map(|id| tasks.iter().find(|t| t.id == *id))
            .map(|t| TaskBrief {
                id: t.id,
                name: t.name.clone(),
            })
            .collect();

        Ok(GroupDetail {
            id: group.id,
            bk_biz_id: group.biz_id,
            name: group.name,
            logo: group.logo,
            tasks,
        })
    }

    async fn ensure_task_exists(&self, ctx: &RequestContext, task_id: i64) -> UptimeCheckResult<()> {
        match self.deps.tasks.get(&ctx.tenant_id, task_id).await? {
            Some(task) if task.biz_id == ctx.biz_id && !task.is_deleted => Ok(()),
            _ => Err(UptimeCheckError::task_not_found(task_id)),
        }
    }

    async fn ensure_name_available(
        &self,
        ctx: &RequestContext,
        name: &str,
        exclude_id: Option<i64>,
    ) -> UptimeCheckResult<()> {
        let existing = self
            .deps
            .groups
            .list(&GroupFilter {
                name: Some(name.to_string()),
                ..GroupFilter::for_biz(&ctx.tenant_id, ctx.biz_id)
            })
            .await?;
        ensure_unique_name(
            GROUP_KIND,
            name,
            existing.iter().map(|g| (g.id, g.name.as_str())),
            exclude_id,
        )
    }

    async fn load_group(&self, ctx: &RequestContext, id: i64) -> UptimeCheckResult<Group> {
        match self.deps.groups.get(&ctx.tenant_id, id).await? {
            Some(group) if group.biz_id == ctx.biz_id => Ok(group),
            _ => Err(UptimeCheckError::group_not_found(id)),
        }
    }
}
