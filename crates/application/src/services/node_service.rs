use std::collections::HashMap;
use std::net::IpAddr;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, info_span, Instrument};

use uptime_config::UptimeCheckConfig;
use uptime_domain::entities::{Node, NodeFilter, RequestContext, TaskFilter};
use uptime_domain::ports::PermissionAction;
use uptime_domain::relations::deconflict_node_name;
use uptime_domain::NodeHealthGate;
use uptime_errors::{UptimeCheckError, UptimeCheckResult};

use super::{with_timeout, ServiceDependencies};
use crate::payload::{validate_name, NodePayload, NODE_NAME_MAX_LEN};

/// 节点列表项，附带租户内关联到该节点的任务数
#[derive(Debug, Clone, Serialize)]
pub struct NodeSummary {
    #[serde(flatten)]
    pub node: Node,
    pub task_num: usize,
}

/// 拨测节点应用服务
pub struct NodeService {
    deps: ServiceDependencies,
    config: UptimeCheckConfig,
    health: NodeHealthGate,
}

impl NodeService {
    pub fn new(deps: ServiceDependencies, config: UptimeCheckConfig) -> Self {
        let health = NodeHealthGate::new(
            deps.host_directory.clone(),
            deps.heartbeat.clone(),
            deps.business.clone(),
            config.heartbeat_window(),
            config.heartbeat_timeout(),
        );
        Self {
            deps,
            config,
            health,
        }
    }

    pub async fn create(&self, ctx: &RequestContext, raw: &Value) -> UptimeCheckResult<Node> {
        let span = info_span!("create_node", biz_id = ctx.biz_id, operator = %ctx.operator);
        async move {
            let payload = NodePayload::from_json(raw)?;
            let biz_id = payload.biz_id.unwrap_or(ctx.biz_id);
            let name = validate_name(
                payload.name.as_deref().unwrap_or_default(),
                NODE_NAME_MAX_LEN,
            )?;

            let mut node = Node::new(&ctx.tenant_id, biz_id, &name);
            apply_payload(&mut node, payload);
            validate_node(&node)?;

            if node.is_common {
                self.deps
                    .authorizer
                    .is_allowed(ctx, PermissionAction::ManagePublicSyntheticLocation, true)
                    .await?;
            }
            self.gate(&node).await?;

            let stored = self.deps.nodes.save(&node, &ctx.operator).await?;
            info!(node_id = stored.id, address = %stored.address_description(), "拨测节点创建成功");
            Ok(stored)
        }
        .instrument(span)
        .await
    }

    /// 仅保存了 IP 的历史节点在查询时回填主机 ID
    pub async fn retrieve(&self, ctx: &RequestContext, id: i64) -> UptimeCheckResult<Node> {
        let node = self.load_visible(ctx, id).await?;
        if node.bk_host_id.is_some() {
            return Ok(node);
        }
        let Some(ip) = node.ip.clone().filter(|ip| !ip.is_empty()) else {
            return Ok(node);
        };

        let hosts = with_timeout(
            self.config.host_resolution_timeout(),
            "主机目录查询",
            self.deps.host_directory.get_hosts_by_ips(node.biz_id, &[ip.clone()]),
        )
        .await?;
        match hosts
            .iter()
            .find(|h| h.inner_ip == ip && h.bk_cloud_id == node.plat_id)
        {
            Some(host) => {
                let mut backfilled = node;
                backfilled.bk_host_id = Some(host.bk_host_id);
                debug!(node_id = id, bk_host_id = host.bk_host_id, "回填拨测节点主机ID");
                self.deps.nodes.save(&backfilled, &ctx.operator).await
            }
            None => Ok(node),
        }
    }

    pub async fn update(&self, ctx: &RequestContext, id: i64, raw: &Value) -> UptimeCheckResult<Node> {
        let span = info_span!("update_node", node_id = id, operator = %ctx.operator);
        async move {
            let existing = self.load_visible(ctx, id).await?;
            let payload = NodePayload::from_json(raw)?;

            let mut node = existing.clone();
            if let Some(name) = payload.name.as_deref() {
                node.name = validate_name(name, NODE_NAME_MAX_LEN)?;
            }
            if let Some(biz_id) = payload.biz_id {
                node.biz_id = biz_id;
            }
            apply_payload(&mut node, payload);

            if existing.is_common && !node.is_common {
                self.deps
                    .authorizer
                    .is_allowed(ctx, PermissionAction::ManagePublicSyntheticLocation, true)
                    .await?;
                self.ensure_not_used_by_other_biz(ctx, &existing).await?;
            } else if node.is_common && !existing.is_common {
                self.deps
                    .authorizer
                    .is_allowed(ctx, PermissionAction::ManagePublicSyntheticLocation, true)
                    .await?;
            }

            validate_node(&node)?;
            self.gate(&node).await?;

            let stored = self.deps.nodes.save(&node, &ctx.operator).await?;
            info!(node_id = id, "拨测节点更新成功");
            Ok(stored)
        }
        .instrument(span)
        .await
    }

    pub async fn destroy(&self, ctx: &RequestContext, id: i64) -> UptimeCheckResult<()> {
        let node = self.load_visible(ctx, id).await?;
        if node.biz_id != ctx.biz_id {
            return Err(UptimeCheckError::Authorization(format!(
                "节点 {} 不属于业务 {}",
                node.name, ctx.biz_id
            )));
        }
        self.deps.nodes.delete(&ctx.tenant_id, id).await?;
        info!(node_id = id, operator = %ctx.operator, "拨测节点已删除");
        Ok(())
    }

    pub async fn list(&self, ctx: &RequestContext) -> UptimeCheckResult<Vec<NodeSummary>> {
        let nodes = self.visible_nodes(ctx).await?;
        let tasks = self
            .deps
            .tasks
            .list(&TaskFilter {
                tenant_id: ctx.tenant_id.clone(),
                ..TaskFilter::default()
            })
            .await?;

        let mut task_num: HashMap<i64, usize> = HashMap::new();
        for task in &tasks {
            for node_id in &task.node_ids {
                *task_num.entry(*node_id).or_default() += 1;
            }
        }

        Ok(nodes
            .into_iter()
            .map(|node| NodeSummary {
                task_num: task_num.get(&node.id).copied().unwrap_or(0),
                node,
            })
            .collect())
    }

    pub async fn count(&self, ctx: &RequestContext) -> UptimeCheckResult<usize> {
        Ok(self.visible_nodes(ctx).await?.len())
    }

    /// 当前业务下是否已有该 IP 的节点
    pub async fn is_exist(
        &self,
        ctx: &RequestContext,
        ip: &str,
        plat_id: Option<i64>,
    ) -> UptimeCheckResult<bool> {
        let nodes = self
            .deps
            .nodes
            .list(&NodeFilter {
                ip: Some(ip.trim().to_string()),
                ..NodeFilter::for_biz(&ctx.tenant_id, ctx.biz_id)
            })
            .await?;
        Ok(nodes
            .iter()
            .any(|n| plat_id.map_or(true, |plat_id| n.plat_id == plat_id)))
    }

    /// 节点重名时给出可用的名称
    pub async fn fix_name_conflict(
        &self,
        ctx: &RequestContext,
        name: &str,
        exclude_id: Option<i64>,
    ) -> UptimeCheckResult<String> {
        let names: Vec<String> = self
            .deps
            .nodes
            .list(&NodeFilter::for_biz(&ctx.tenant_id, ctx.biz_id))
            .await?
            .into_iter()
            .filter(|n| Some(n.id) != exclude_id)
            .map(|n| n.name)
            .collect();
        Ok(deconflict_node_name(name, &names))
    }

    async fn gate(&self, node: &Node) -> UptimeCheckResult<()> {
        // 多租户下心跳语义尚未定义，跳过校验
        if self.config.multi_tenant_mode {
            debug!(node = %node.name, "多租户模式，跳过节点心跳校验");
            return Ok(());
        }
        self.health.check(node).await
    }

    async fn ensure_not_used_by_other_biz(
        &self,
        ctx: &RequestContext,
        node: &Node,
    ) -> UptimeCheckResult<()> {
        let tasks = self
            .deps
            .tasks
            .list(&TaskFilter {
                tenant_id: ctx.tenant_id.clone(),
                node_id: Some(node.id),
                ..TaskFilter::default()
            })
            .await?;
        let used_by: Vec<String> = tasks
            .iter()
            .filter(|t| t.biz_id != node.biz_id)
            .map(|t| format!("{}(业务id:{})", t.name, t.biz_id))
            .collect();
        if used_by.is_empty() {
            return Ok(());
        }
        Err(UptimeCheckError::validation(
            "is_common",
            format!(
                "该节点被其他业务的拨测任务使用，无法取消公共节点: {}",
                used_by.join(",")
            ),
        ))
    }

    async fn visible_nodes(&self, ctx: &RequestContext) -> UptimeCheckResult<Vec<Node>> {
        let nodes = self
            .deps
            .nodes
            .list(&NodeFilter {
                include_common: true,
                ..NodeFilter::for_biz(&ctx.tenant_id, ctx.biz_id)
            })
            .await?;
        Ok(nodes
            .into_iter()
            .filter(|n| n.is_visible_to(ctx.biz_id))
            .collect())
    }

    async fn load_visible(&self, ctx: &RequestContext, id: i64) -> UptimeCheckResult<Node> {
        match self.deps.nodes.get(&ctx.tenant_id, id).await? {
            Some(node) if node.is_visible_to(ctx.biz_id) => Ok(node),
            _ => Err(UptimeCheckError::node_not_found(id)),
        }
    }
}

fn apply_payload(node: &mut Node, payload: NodePayload) {
    if let Some(is_common) = payload.is_common {
        node.is_common = is_common;
    }
    if let Some(biz_scope) = payload.biz_scope {
        node.biz_scope = biz_scope;
    }
    if let Some(ip_type) = payload.ip_type {
        node.ip_type = ip_type;
    }
    if payload.bk_host_id.is_some() {
        node.bk_host_id = payload.bk_host_id;
    }
    if let Some(ip) = payload.ip {
        node.ip = Some(ip.trim().to_string()).filter(|ip| !ip.is_empty());
    }
    if let Some(plat_id) = payload.plat_id {
        node.plat_id = plat_id;
    }
    if let Some(location) = payload.location {
        node.location = location;
    }
    if let Some(carrier_operator) = payload.carrier_operator {
        node.carrier_operator = carrier_operator;
    }
}

fn validate_node(node: &Node) -> UptimeCheckResult<()> {
    if node.biz_id < 0 {
        return Err(UptimeCheckError::validation("bk_biz_id", "业务ID不合法"));
    }
    match (node.bk_host_id, node.ip.as_deref()) {
        (None, None) => Err(UptimeCheckError::validation(
            "ip",
            "bk_host_id 与 ip 至少需要提供一个",
        )),
        (_, Some(ip)) if ip.parse::<IpAddr>().is_err() => Err(UptimeCheckError::validation(
            "ip",
            format!("{ip} 不是合法的 IP 地址"),
        )),
        _ => Ok(()),
    }
}
