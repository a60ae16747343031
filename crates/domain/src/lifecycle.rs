//! 拨测任务生命周期
//!
//! 状态迁移由节点管理侧回报，这里只负责前置条件和展示态投影。

use uptime_errors::{UptimeCheckError, UptimeCheckResult};

use crate::entities::{Node, Task, TaskStatus};
use crate::ports::ControlAction;

/// 请求状态为 running 时启动，其余一律停止
pub fn action_for_requested_status(requested: TaskStatus) -> ControlAction {
    if requested == TaskStatus::Running {
        ControlAction::Start
    } else {
        ControlAction::Stop
    }
}

pub fn ensure_deletable(task: &Task) -> UptimeCheckResult<()> {
    if task.status.is_deletable() {
        Ok(())
    } else {
        Err(UptimeCheckError::task_busy(task.id, task.status.as_str()))
    }
}

/// 只有刚创建或克隆（尚未成功下发）的任务可以执行 deploy
pub fn ensure_deployable(task: &Task) -> UptimeCheckResult<()> {
    match task.status {
        TaskStatus::Starting | TaskStatus::StartFailed => Ok(()),
        status => Err(UptimeCheckError::InvalidStatusTransition {
            id: task.id,
            status: status.as_str().to_string(),
            action: ControlAction::Deploy.as_str().to_string(),
        }),
    }
}

/// 展示态：关联节点所属业务已不存在时强制显示为启动失败，不回写存储
pub fn display_status(task: &Task, nodes: &[Node], business_ids: &[i64]) -> TaskStatus {
    let orphaned = nodes
        .iter()
        .filter(|node| task.node_ids.contains(&node.id))
        .any(|node| !business_ids.contains(&node.biz_id));
    if orphaned {
        TaskStatus::StartFailed
    } else {
        task.status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{Protocol, TaskConfig};

    fn task(status: TaskStatus) -> Task {
        let mut task = Task::new("system", 2, "probe", Protocol::Icmp, TaskConfig::default());
        task.id = 7;
        task.status = status;
        task
    }

    #[test]
    fn test_requested_status_mapping() {
        assert_eq!(
            action_for_requested_status(TaskStatus::Running),
            ControlAction::Start
        );
        assert_eq!(
            action_for_requested_status(TaskStatus::Stopped),
            ControlAction::Stop
        );
        assert_eq!(
            action_for_requested_status(TaskStatus::StartFailed),
            ControlAction::Stop
        );
    }

    #[test]
    fn test_delete_gate() {
        for status in [
            TaskStatus::Running,
            TaskStatus::Starting,
            TaskStatus::Stopping,
            TaskStatus::StopFailed,
        ] {
            let err = ensure_deletable(&task(status)).unwrap_err();
            assert!(matches!(err, UptimeCheckError::TaskBusy { id: 7, .. }));
        }
        assert!(ensure_deletable(&task(TaskStatus::Stopped)).is_ok());
        assert!(ensure_deletable(&task(TaskStatus::StartFailed)).is_ok());
    }

    #[test]
    fn test_deploy_only_before_first_success() {
        assert!(ensure_deployable(&task(TaskStatus::Starting)).is_ok());
        assert!(ensure_deployable(&task(TaskStatus::Running)).is_err());
    }

    #[test]
    fn test_display_status_projection() {
        let mut t = task(TaskStatus::Running);
        t.node_ids = vec![1];
        let mut node = Node::new("system", 9, "gone");
        node.id = 1;

        assert_eq!(display_status(&t, &[node.clone()], &[2]), TaskStatus::StartFailed);
        assert_eq!(display_status(&t, &[node], &[2, 9]), TaskStatus::Running);
        assert_eq!(t.status, TaskStatus::Running);
    }
}
