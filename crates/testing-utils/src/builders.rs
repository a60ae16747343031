//! Test data builders for creating test entities
//!
//! 默认值对应一个业务 2、租户 system 下的 ICMP 任务 / 自有节点 / 空分组。

use serde_json::Value;
use uptime_domain::entities::{
    Group, HostSpec, IpType, Node, Protocol, Task, TaskConfig, TaskStatus,
};
use uptime_domain::ports::HostRecord;

pub const TEST_TENANT: &str = "system";
pub const TEST_BIZ_ID: i64 = 2;

/// Builder for creating test Task entities
pub struct TaskBuilder {
    task: Task,
}

impl TaskBuilder {
    pub fn new() -> Self {
        let config = TaskConfig {
            period: 60,
            ip_list: vec!["10.0.0.1".to_string()],
            ..TaskConfig::default()
        };
        Self {
            task: Task::new(TEST_TENANT, TEST_BIZ_ID, "test_task", Protocol::Icmp, config),
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.task.id = id;
        self
    }

    pub fn with_biz_id(mut self, biz_id: i64) -> Self {
        self.task.biz_id = biz_id;
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.task.name = name.to_string();
        self
    }

    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.task.protocol = protocol;
        self
    }

    /// 配置以 JSON 给出，与请求体一致
    pub fn with_config(mut self, config: Value) -> Self {
        self.task.config =
            serde_json::from_value(config).unwrap_or_else(|e| panic!("invalid task config: {e}"));
        self.task.check_interval = self.task.config.period;
        self
    }

    pub fn with_hosts(mut self, hosts: Vec<HostSpec>) -> Self {
        self.task.config.hosts = hosts;
        self
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.task.status = status;
        self
    }

    pub fn with_node_ids(mut self, node_ids: Vec<i64>) -> Self {
        self.task.node_ids = node_ids;
        self
    }

    pub fn with_group_ids(mut self, group_ids: Vec<i64>) -> Self {
        self.task.group_ids = group_ids;
        self
    }

    pub fn running(mut self) -> Self {
        self.task.status = TaskStatus::Running;
        self
    }

    pub fn build(self) -> Task {
        self.task
    }
}

impl Default for TaskBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for creating test Node entities
pub struct NodeBuilder {
    node: Node,
}

impl NodeBuilder {
    pub fn new() -> Self {
        let mut node = Node::new(TEST_TENANT, TEST_BIZ_ID, "test_node");
        node.ip = Some("10.0.0.10".to_string());
        Self { node }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.node.id = id;
        self
    }

    pub fn with_biz_id(mut self, biz_id: i64) -> Self {
        self.node.biz_id = biz_id;
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.node.name = name.to_string();
        self
    }

    pub fn with_ip(mut self, ip: &str) -> Self {
        self.node.ip = Some(ip.to_string());
        self
    }

    pub fn with_plat_id(mut self, plat_id: i64) -> Self {
        self.node.plat_id = plat_id;
        self
    }

    pub fn with_host_id(mut self, bk_host_id: i64) -> Self {
        self.node.bk_host_id = Some(bk_host_id);
        self
    }

    pub fn with_ip_type(mut self, ip_type: IpType) -> Self {
        self.node.ip_type = ip_type;
        self
    }

    /// 公共节点，`biz_scope` 为空表示对所有业务可见
    pub fn common(mut self, biz_scope: Vec<i64>) -> Self {
        self.node.is_common = true;
        self.node.biz_scope = biz_scope;
        self
    }

    pub fn build(self) -> Node {
        self.node
    }
}

impl Default for NodeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for creating test Group entities
pub struct GroupBuilder {
    group: Group,
}

impl GroupBuilder {
    pub fn new() -> Self {
        Self {
            group: Group::new(TEST_TENANT, TEST_BIZ_ID, "test_group"),
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.group.id = id;
        self
    }

    pub fn with_biz_id(mut self, biz_id: i64) -> Self {
        self.group.biz_id = biz_id;
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.group.name = name.to_string();
        self
    }

    pub fn with_logo(mut self, logo: &str) -> Self {
        self.group.logo = logo.to_string();
        self
    }

    pub fn with_task_ids(mut self, task_ids: Vec<i64>) -> Self {
        self.group.task_ids = task_ids;
        self
    }

    pub fn build(self) -> Group {
        self.group
    }
}

impl Default for GroupBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// CMDB 主机记录
pub fn host_record(bk_host_id: i64, inner_ip: &str, bk_cloud_id: i64) -> HostRecord {
    HostRecord {
        bk_host_id,
        bk_biz_id: TEST_BIZ_ID,
        inner_ip: inner_ip.to_string(),
        inner_ipv6: String::new(),
        bk_cloud_id,
        display_name: format!("host-{bk_host_id}"),
    }
}
