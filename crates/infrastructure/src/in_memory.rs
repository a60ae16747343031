use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use uptime_domain::entities::{
    Group, GroupFilter, Node, NodeFilter, Task, TaskFilter, TaskOrdering, TaskStatus,
};
use uptime_domain::repositories::{GroupRepository, NodeRepository, TaskRepository};
use uptime_errors::{UptimeCheckError, UptimeCheckResult};

/// 内存存储
///
/// 三个仓储共享同一份状态。分组的 `task_ids` 是任务与分组关系的唯一来源，
/// 任务的 `group_ids` 在读取时由分组反推。名称唯一约束在这里强制执行。
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<StoreState>>,
}

#[derive(Debug, Default)]
struct StoreState {
    tasks: HashMap<i64, Task>,
    nodes: HashMap<i64, Node>,
    groups: HashMap<i64, Group>,
    next_task_id: i64,
    next_node_id: i64,
    next_group_id: i64,
}

impl StoreState {
    fn allocate(counter: &mut i64) -> i64 {
        *counter += 1;
        *counter
    }

    /// 补齐任务所属分组
    fn hydrate(&self, task: &Task) -> Task {
        let mut task = task.clone();
        let mut group_ids: Vec<i64> = self
            .groups
            .values()
            .filter(|g| g.tenant_id == task.tenant_id && g.task_ids.contains(&task.id))
            .map(|g| g.id)
            .collect();
        group_ids.sort_unstable();
        task.group_ids = group_ids;
        task
    }

    fn sync_task_groups(&mut self, task: &Task) {
        for group in self.groups.values_mut() {
            if group.tenant_id != task.tenant_id {
                continue;
            }
            let wanted = task.group_ids.contains(&group.id);
            let present = group.task_ids.contains(&task.id);
            if wanted && !present {
                group.task_ids.push(task.id);
            } else if !wanted && present {
                group.task_ids.retain(|id| *id != task.id);
            }
        }
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn task_repository(&self) -> InMemoryTaskRepository {
        InMemoryTaskRepository {
            state: self.state.clone(),
        }
    }

    pub fn node_repository(&self) -> InMemoryNodeRepository {
        InMemoryNodeRepository {
            state: self.state.clone(),
        }
    }

    pub fn group_repository(&self) -> InMemoryGroupRepository {
        InMemoryGroupRepository {
            state: self.state.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct InMemoryTaskRepository {
    state: Arc<RwLock<StoreState>>,
}

fn task_matches(state: &StoreState, task: &Task, filter: &TaskFilter) -> bool {
    if task.is_deleted || task.tenant_id != filter.tenant_id {
        return false;
    }
    if filter.biz_id.is_some_and(|biz| biz != task.biz_id) {
        return false;
    }
    if let Some(ids) = &filter.ids {
        if !ids.contains(&task.id) {
            return false;
        }
    }
    if let Some(name) = &filter.name {
        if &task.name != name {
            return false;
        }
    }
    if let Some(node_id) = filter.node_id {
        if !task.node_ids.contains(&node_id) {
            return false;
        }
    }
    if let Some(group_id) = filter.group_id {
        let in_group = state
            .groups
            .get(&group_id)
            .is_some_and(|g| g.task_ids.contains(&task.id));
        if !in_group {
            return false;
        }
    }
    true
}

fn sort_tasks(tasks: &mut [Task], ordering: TaskOrdering) {
    match ordering {
        TaskOrdering::Id => tasks.sort_by_key(|t| t.id),
        TaskOrdering::IdDesc => tasks.sort_by_key(|t| std::cmp::Reverse(t.id)),
        TaskOrdering::Name => tasks.sort_by(|a, b| a.name.cmp(&b.name)),
        TaskOrdering::NameDesc => tasks.sort_by(|a, b| b.name.cmp(&a.name)),
        TaskOrdering::UpdateTime => tasks.sort_by_key(|t| t.update_time),
        TaskOrdering::UpdateTimeDesc => tasks.sort_by_key(|t| std::cmp::Reverse(t.update_time)),
    }
}

#[async_trait]
impl TaskRepository for InMemoryTaskRepository {
    async fn list(&self, filter: &TaskFilter) -> UptimeCheckResult<Vec<Task>> {
        let state = self.state.read().await;
        let mut tasks: Vec<Task> = state
            .tasks
            .values()
            .filter(|t| task_matches(&state, t, filter))
            .map(|t| state.hydrate(t))
            .collect();
        sort_tasks(&mut tasks, filter.ordering);
        Ok(tasks)
    }

    async fn get(&self, tenant_id: &str, id: i64) -> UptimeCheckResult<Option<Task>> {
        let state = self.state.read().await;
        Ok(state
            .tasks
            .get(&id)
            .filter(|t| t.tenant_id == tenant_id && !t.is_deleted)
            .map(|t| state.hydrate(t)))
    }

    async fn save(&self, task: &Task, operator: &str) -> UptimeCheckResult<Task> {
        let mut state = self.state.write().await;

        let duplicated = state.tasks.values().any(|t| {
            !t.is_deleted
                && t.id != task.id
                && t.tenant_id == task.tenant_id
                && t.biz_id == task.biz_id
                && t.name == task.name
        });
        if duplicated {
            return Err(UptimeCheckError::duplicate_name("拨测任务", &task.name));
        }

        let now = Utc::now();
        let mut stored = task.clone();
        if task.id == 0 {
            stored.id = StoreState::allocate(&mut state.next_task_id);
            stored.create_user = operator.to_string();
            stored.create_time = now;
        } else {
            let existing = state
                .tasks
                .get(&task.id)
                .filter(|t| !t.is_deleted && t.tenant_id == task.tenant_id)
                .ok_or_else(|| UptimeCheckError::task_not_found(task.id))?;
            stored.create_user = existing.create_user.clone();
            stored.create_time = existing.create_time;
        }
        stored.update_user = operator.to_string();
        stored.update_time = now;
        stored.is_deleted = false;

        state.sync_task_groups(&stored);
        state.tasks.insert(stored.id, stored.clone());
        debug!(task_id = stored.id, "保存拨测任务");
        Ok(state.hydrate(&stored))
    }

    async fn delete(&self, tenant_id: &str, id: i64, operator: &str) -> UptimeCheckResult<bool> {
        let mut state = self.state.write().await;
        match state
            .tasks
            .get_mut(&id)
            .filter(|t| t.tenant_id == tenant_id && !t.is_deleted)
        {
            Some(task) => {
                task.is_deleted = true;
                task.update_user = operator.to_string();
                task.update_time = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn update_status(
        &self,
        tenant_id: &str,
        id: i64,
        status: TaskStatus,
        operator: &str,
    ) -> UptimeCheckResult<Task> {
        let mut state = self.state.write().await;
        let task = state
            .tasks
            .get_mut(&id)
            .filter(|t| t.tenant_id == tenant_id && !t.is_deleted)
            .ok_or_else(|| UptimeCheckError::task_not_found(id))?;
        task.status = status;
        task.update_user = operator.to_string();
        task.update_time = Utc::now();
        let task = task.clone();
        Ok(state.hydrate(&task))
    }
}

#[derive(Debug, Clone)]
pub struct InMemoryNodeRepository {
    state: Arc<RwLock<StoreState>>,
}

fn node_matches(node: &Node, filter: &NodeFilter) -> bool {
    if node.tenant_id != filter.tenant_id {
        return false;
    }
    if let Some(biz_id) = filter.biz_id {
        let visible = node.biz_id == biz_id || (filter.include_common && node.is_visible_to(biz_id));
        if !visible {
            return false;
        }
    }
    if let Some(ids) = &filter.ids {
        if !ids.contains(&node.id) {
            return false;
        }
    }
    if let Some(name) = &filter.name {
        if &node.name != name {
            return false;
        }
    }
    if let Some(ip) = &filter.ip {
        if node.ip.as_ref() != Some(ip) {
            return false;
        }
    }
    true
}

#[async_trait]
impl NodeRepository for InMemoryNodeRepository {
    async fn list(&self, filter: &NodeFilter) -> UptimeCheckResult<Vec<Node>> {
        let state = self.state.read().await;
        let mut nodes: Vec<Node> = state
            .nodes
            .values()
            .filter(|n| node_matches(n, filter))
            .cloned()
            .collect();
        nodes.sort_by_key(|n| n.id);
        Ok(nodes)
    }

    async fn get(&self, tenant_id: &str, id: i64) -> UptimeCheckResult<Option<Node>> {
        let state = self.state.read().await;
        Ok(state
            .nodes
            .get(&id)
            .filter(|n| n.tenant_id == tenant_id)
            .cloned())
    }

    async fn save(&self, node: &Node, operator: &str) -> UptimeCheckResult<Node> {
        let mut state = self.state.write().await;
        let now = Utc::now();
        let mut stored = node.clone();
        if node.id == 0 {
            stored.id = StoreState::allocate(&mut state.next_node_id);
            stored.create_user = operator.to_string();
            stored.create_time = now;
        } else {
            let existing = state
                .nodes
                .get(&node.id)
                .filter(|n| n.tenant_id == node.tenant_id)
                .ok_or_else(|| UptimeCheckError::node_not_found(node.id))?;
            stored.create_user = existing.create_user.clone();
            stored.create_time = existing.create_time;
        }
        stored.update_user = operator.to_string();
        stored.update_time = now;
        state.nodes.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn delete(&self, tenant_id: &str, id: i64) -> UptimeCheckResult<bool> {
        let mut state = self.state.write().await;
        let exists = state.nodes.get(&id).is_some_and(|n| n.tenant_id == tenant_id);
        if exists {
            state.nodes.remove(&id);
        }
        Ok(exists)
    }
}

#[derive(Debug, Clone)]
pub struct InMemoryGroupRepository {
    state: Arc<RwLock<StoreState>>,
}

fn group_matches(group: &Group, filter: &GroupFilter) -> bool {
    group.tenant_id == filter.tenant_id
        && filter.biz_id.map_or(true, |biz| biz == group.biz_id)
        && filter.ids.as_ref().map_or(true, |ids| ids.contains(&group.id))
        && filter.name.as_ref().map_or(true, |name| &group.name == name)
}

#[async_trait]
impl GroupRepository for InMemoryGroupRepository {
    async fn list(&self, filter: &GroupFilter) -> UptimeCheckResult<Vec<Group>> {
        let state = self.state.read().await;
        let mut groups: Vec<Group> = state
            .groups
            .values()
            .filter(|g| group_matches(g, filter))
            .cloned()
            .collect();
        groups.sort_by_key(|g| g.id);
        Ok(groups)
    }

    async fn get(&self, tenant_id: &str, id: i64) -> UptimeCheckResult<Option<Group>> {
        let state = self.state.read().await;
        Ok(state
            .groups
            .get(&id)
            .filter(|g| g.tenant_id == tenant_id)
            .cloned())
    }

    async fn save(&self, group: &Group, operator: &str) -> UptimeCheckResult<Group> {
        let mut state = self.state.write().await;

        let duplicated = state.groups.values().any(|g| {
            g.id != group.id
                && g.tenant_id == group.tenant_id
                && g.biz_id == group.biz_id
                && g.name == group.name
        });
        if duplicated {
            return Err(UptimeCheckError::duplicate_name("拨测分组", &group.name));
        }

        let now = Utc::now();
        let mut stored = group.clone();
        if group.id == 0 {
            stored.id = StoreState::allocate(&mut state.next_group_id);
            stored.create_user = operator.to_string();
            stored.create_time = now;
        } else {
            let existing = state
                .groups
                .get(&group.id)
                .filter(|g| g.tenant_id == group.tenant_id)
                .ok_or_else(|| UptimeCheckError::group_not_found(group.id))?;
            stored.create_user = existing.create_user.clone();
            stored.create_time = existing.create_time;
        }
        // 保持顺序去重
        let mut seen = std::collections::HashSet::new();
        stored.task_ids.retain(|id| seen.insert(*id));
        stored.update_user = operator.to_string();
        stored.update_time = now;

        state.groups.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn delete(&self, tenant_id: &str, id: i64) -> UptimeCheckResult<bool> {
        let mut state = self.state.write().await;
        let exists = state.groups.get(&id).is_some_and(|g| g.tenant_id == tenant_id);
        if exists {
            state.groups.remove(&id);
        }
        Ok(exists)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uptime_domain::entities::{Protocol, TaskConfig};

    fn task(name: &str) -> Task {
        Task::new("system", 2, name, Protocol::Icmp, TaskConfig::default())
    }

    #[tokio::test]
    async fn test_task_name_unique_per_biz() {
        let store = InMemoryStore::new();
        let repo = store.task_repository();

        let first = repo.save(&task("probe"), "admin").await.unwrap();
        assert_eq!(first.id, 1);
        assert_eq!(first.create_user, "admin");

        let err = repo.save(&task("probe"), "admin").await.unwrap_err();
        assert!(matches!(err, UptimeCheckError::DuplicateName { .. }));

        let mut other_biz = task("probe");
        other_biz.biz_id = 3;
        assert!(repo.save(&other_biz, "admin").await.is_ok());

        // 软删除后名称可复用
        repo.delete("system", first.id, "admin").await.unwrap();
        assert!(repo.save(&task("probe"), "admin").await.is_ok());
    }

    #[tokio::test]
    async fn test_group_membership_derived_from_groups() {
        let store = InMemoryStore::new();
        let tasks = store.task_repository();
        let groups = store.group_repository();

        let group = groups
            .save(&Group::new("system", 2, "core"), "admin")
            .await
            .unwrap();

        let mut t = task("probe");
        t.group_ids = vec![group.id];
        let stored = tasks.save(&t, "admin").await.unwrap();
        assert_eq!(stored.group_ids, vec![group.id]);
        assert_eq!(
            groups.get("system", group.id).await.unwrap().unwrap().task_ids,
            vec![stored.id]
        );

        let in_group = tasks
            .list(&TaskFilter {
                group_id: Some(group.id),
                ..TaskFilter::for_biz("system", 2)
            })
            .await
            .unwrap();
        assert_eq!(in_group.len(), 1);

        let mut detached = stored.clone();
        detached.group_ids.clear();
        tasks.save(&detached, "admin").await.unwrap();
        assert!(groups
            .get("system", group.id)
            .await
            .unwrap()
            .unwrap()
            .task_ids
            .is_empty());
    }

    #[tokio::test]
    async fn test_update_status_records_operator() {
        let store = InMemoryStore::new();
        let repo = store.task_repository();
        let stored = repo.save(&task("probe"), "creator").await.unwrap();

        let updated = repo
            .update_status("system", stored.id, TaskStatus::Running, "operator")
            .await
            .unwrap();
        assert_eq!(updated.status, TaskStatus::Running);
        assert_eq!(updated.update_user, "operator");
        assert_eq!(updated.create_user, "creator");
    }

    #[tokio::test]
    async fn test_node_filter_visibility() {
        let store = InMemoryStore::new();
        let repo = store.node_repository();

        let own = Node::new("system", 2, "own");
        let mut shared = Node::new("system", 5, "shared");
        shared.is_common = true;
        let mut scoped = Node::new("system", 5, "scoped");
        scoped.is_common = true;
        scoped.biz_scope = vec![9];

        for node in [own, shared, scoped] {
            repo.save(&node, "admin").await.unwrap();
        }

        let only_own = repo.list(&NodeFilter::for_biz("system", 2)).await.unwrap();
        assert_eq!(only_own.len(), 1);

        let visible = repo
            .list(&NodeFilter {
                include_common: true,
                ..NodeFilter::for_biz("system", 2)
            })
            .await
            .unwrap();
        let names: Vec<&str> = visible.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["own", "shared"]);
    }
}
