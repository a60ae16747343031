use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum Protocol {
    Http,
    Tcp,
    Udp,
    Icmp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Http => "HTTP",
            Protocol::Tcp => "TCP",
            Protocol::Udp => "UDP",
            Protocol::Icmp => "ICMP",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "HTTP" => Ok(Protocol::Http),
            "TCP" => Ok(Protocol::Tcp),
            "UDP" => Ok(Protocol::Udp),
            "ICMP" => Ok(Protocol::Icmp),
            _ => Err(format!("不支持的拨测协议: {s}")),
        }
    }
}

/// 拨测任务状态
///
/// 序列化值沿用采集侧的历史拼写（`stoping`、`stoped`）。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    #[serde(rename = "starting")]
    Starting,
    #[serde(rename = "running")]
    Running,
    #[serde(rename = "stoping")]
    Stopping,
    #[serde(rename = "stoped")]
    Stopped,
    #[serde(rename = "start_failed")]
    StartFailed,
    #[serde(rename = "stop_failed")]
    StopFailed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Starting => "starting",
            TaskStatus::Running => "running",
            TaskStatus::Stopping => "stoping",
            TaskStatus::Stopped => "stoped",
            TaskStatus::StartFailed => "start_failed",
            TaskStatus::StopFailed => "stop_failed",
        }
    }

    /// 只有已停止或启动失败的任务可以删除
    pub fn is_deletable(&self) -> bool {
        matches!(self, TaskStatus::Stopped | TaskStatus::StartFailed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "starting" => Ok(TaskStatus::Starting),
            "running" => Ok(TaskStatus::Running),
            "stoping" | "stopping" => Ok(TaskStatus::Stopping),
            "stoped" | "stopped" => Ok(TaskStatus::Stopped),
            "start_failed" => Ok(TaskStatus::StartFailed),
            "stop_failed" => Ok(TaskStatus::StopFailed),
            _ => Err(format!("无效的任务状态: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn requires_body(&self) -> bool {
        matches!(self, HttpMethod::Post | HttpMethod::Put | HttpMethod::Patch)
    }
}

fn default_method() -> Option<HttpMethod> {
    Some(HttpMethod::Get)
}

/// 主机或拓扑节点描述，出现在 `node_list` 与历史字段 `hosts` 中
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HostSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bk_host_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outer_ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bk_biz_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bk_inst_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bk_obj_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_path: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl HostSpec {
    pub fn with_host_id(bk_host_id: i64) -> Self {
        Self {
            bk_host_id: Some(bk_host_id),
            ..Self::default()
        }
    }

    pub fn with_ip(ip: &str) -> Self {
        Self {
            ip: Some(ip.to_string()),
            ..Self::default()
        }
    }

    /// 携带拓扑对象标识的条目需要经过动态拓扑展开
    pub fn is_dynamic(&self) -> bool {
        self.bk_inst_id.is_some() || self.bk_obj_id.as_deref().is_some_and(|obj| !obj.is_empty())
    }
}

/// 拨测任务配置
///
/// 未建模的字段（超时、响应匹配规则、请求头等）原样保存在 `extra` 中。
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TaskConfig {
    #[serde(default, deserialize_with = "deserialize_period")]
    pub period: u32,
    #[serde(default = "default_method")]
    pub method: Option<HttpMethod>,
    /// 请求体，形如 `{"data_type": .., "content": ..}`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    /// 历史单 URL 字段
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub urls: Option<String>,
    #[serde(default)]
    pub url_list: Vec<String>,
    #[serde(default)]
    pub ip_list: Vec<String>,
    #[serde(default)]
    pub node_list: Vec<HostSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hosts: Vec<HostSpec>,
    #[serde(
        default,
        deserialize_with = "deserialize_port",
        skip_serializing_if = "Option::is_none"
    )]
    pub port: Option<String>,
    /// UDP 请求内容。外层 `None` 表示字段缺失，`Some(None)` 表示显式传入空值
    #[serde(
        default,
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub request: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub output_fields: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TaskConfig {
    pub fn has_targets(&self) -> bool {
        !self.node_list.is_empty() || !self.ip_list.is_empty() || !self.url_list.is_empty()
    }

    pub fn has_legacy_hosts(&self) -> bool {
        !self.hosts.is_empty()
    }

    /// null、空字符串、空对象和空数组都视为未提供请求体
    pub fn has_body(&self) -> bool {
        match &self.body {
            None | Some(Value::Null) => false,
            Some(Value::String(s)) => !s.is_empty(),
            Some(Value::Object(map)) => !map.is_empty(),
            Some(Value::Array(items)) => !items.is_empty(),
            Some(_) => true,
        }
    }

    pub fn legacy_url(&self) -> Option<&str> {
        self.urls.as_deref().filter(|u| !u.is_empty())
    }

    pub fn port_value(&self) -> Option<&str> {
        self.port.as_deref().map(str::trim).filter(|p| !p.is_empty())
    }
}

fn deserialize_present<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

fn deserialize_port<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!("port 格式错误: {other}"))),
    }
}

fn deserialize_period<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(0),
        Some(Value::Number(n)) => n
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| serde::de::Error::custom(format!("period 必须为正整数: {n}"))),
        Some(Value::String(s)) => s
            .trim()
            .parse::<u32>()
            .map_err(|_| serde::de::Error::custom(format!("period 必须为正整数: {s}"))),
        Some(other) => Err(serde::de::Error::custom(format!(
            "period 必须为正整数: {other}"
        ))),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: i64,
    pub tenant_id: String,
    pub biz_id: i64,
    pub name: String,
    pub protocol: Protocol,
    pub config: TaskConfig,
    /// 采集周期（秒），取自 config.period
    pub check_interval: u32,
    pub labels: Map<String, Value>,
    pub location: Value,
    pub status: TaskStatus,
    pub independent_dataid: bool,
    pub node_ids: Vec<i64>,
    pub group_ids: Vec<i64>,
    pub is_deleted: bool,
    pub create_user: String,
    pub create_time: DateTime<Utc>,
    pub update_user: String,
    pub update_time: DateTime<Utc>,
}

impl Task {
    pub fn new(
        tenant_id: &str,
        biz_id: i64,
        name: &str,
        protocol: Protocol,
        config: TaskConfig,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: 0, // 将由存储层分配
            tenant_id: tenant_id.to_string(),
            biz_id,
            name: name.to_string(),
            protocol,
            check_interval: config.period,
            config,
            labels: Map::new(),
            location: Value::Object(Map::new()),
            status: TaskStatus::Starting,
            independent_dataid: false,
            node_ids: Vec::new(),
            group_ids: Vec::new(),
            is_deleted: false,
            create_user: String::new(),
            create_time: now,
            update_user: String::new(),
            update_time: now,
        }
    }

    pub fn entity_description(&self) -> String {
        format!(
            "拨测任务 '{}' (ID: {}, 协议: {})",
            self.name, self.id, self.protocol
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(try_from = "u8", into = "u8")]
pub enum IpType {
    /// 双栈
    All,
    #[default]
    V4,
    V6,
}

impl TryFrom<u8> for IpType {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(IpType::All),
            4 => Ok(IpType::V4),
            6 => Ok(IpType::V6),
            _ => Err(format!("无效的 ip_type: {value}")),
        }
    }
}

impl From<IpType> for u8 {
    fn from(value: IpType) -> Self {
        match value {
            IpType::All => 0,
            IpType::V4 => 4,
            IpType::V6 => 6,
        }
    }
}

/// 拨测节点
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Node {
    pub id: i64,
    pub tenant_id: String,
    pub biz_id: i64,
    pub name: String,
    pub is_common: bool,
    /// 公共节点可见的业务范围，为空表示不限
    pub biz_scope: Vec<i64>,
    pub ip_type: IpType,
    pub bk_host_id: Option<i64>,
    pub ip: Option<String>,
    pub plat_id: i64,
    pub location: Value,
    pub carrier_operator: String,
    pub create_user: String,
    pub create_time: DateTime<Utc>,
    pub update_user: String,
    pub update_time: DateTime<Utc>,
}

impl Node {
    pub fn new(tenant_id: &str, biz_id: i64, name: &str) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            tenant_id: tenant_id.to_string(),
            biz_id,
            name: name.to_string(),
            is_common: false,
            biz_scope: Vec::new(),
            ip_type: IpType::default(),
            bk_host_id: None,
            ip: None,
            plat_id: 0,
            location: Value::Object(Map::new()),
            carrier_operator: String::new(),
            create_user: String::new(),
            create_time: now,
            update_user: String::new(),
            update_time: now,
        }
    }

    /// 业务自有节点总是可见；公共节点在 biz_scope 为空或包含该业务时可见
    pub fn is_visible_to(&self, biz_id: i64) -> bool {
        if self.biz_id == biz_id {
            return true;
        }
        self.is_common && (self.biz_scope.is_empty() || self.biz_scope.contains(&biz_id))
    }

    pub fn address_description(&self) -> String {
        match (self.bk_host_id, self.ip.as_deref()) {
            (Some(host_id), _) => format!("bk_host_id={host_id}"),
            (None, Some(ip)) => format!("{}:{}", self.plat_id, ip),
            (None, None) => "<unaddressed>".to_string(),
        }
    }
}

/// 拨测分组
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Group {
    pub id: i64,
    pub tenant_id: String,
    pub biz_id: i64,
    pub name: String,
    pub logo: String,
    /// 分组内任务，保持展示顺序
    pub task_ids: Vec<i64>,
    pub create_user: String,
    pub create_time: DateTime<Utc>,
    pub update_user: String,
    pub update_time: DateTime<Utc>,
}

impl Group {
    pub fn new(tenant_id: &str, biz_id: i64, name: &str) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            tenant_id: tenant_id.to_string(),
            biz_id,
            name: name.to_string(),
            logo: String::new(),
            task_ids: Vec::new(),
            create_user: String::new(),
            create_time: now,
            update_user: String::new(),
            update_time: now,
        }
    }
}

/// 一次请求的调用方信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub tenant_id: String,
    pub biz_id: i64,
    pub operator: String,
}

impl RequestContext {
    pub fn new(tenant_id: &str, biz_id: i64, operator: &str) -> Self {
        Self {
            tenant_id: tenant_id.to_string(),
            biz_id,
            operator: operator.to_string(),
        }
    }

    pub fn for_biz(&self, biz_id: i64) -> Self {
        Self {
            biz_id,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskOrdering {
    #[default]
    Id,
    IdDesc,
    Name,
    NameDesc,
    UpdateTime,
    UpdateTimeDesc,
}

impl FromStr for TaskOrdering {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "id" => Ok(TaskOrdering::Id),
            "-id" => Ok(TaskOrdering::IdDesc),
            "name" => Ok(TaskOrdering::Name),
            "-name" => Ok(TaskOrdering::NameDesc),
            "update_time" => Ok(TaskOrdering::UpdateTime),
            "-update_time" => Ok(TaskOrdering::UpdateTimeDesc),
            _ => Err(format!("不支持的排序字段: {s}")),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub tenant_id: String,
    pub biz_id: Option<i64>,
    pub ids: Option<Vec<i64>>,
    pub name: Option<String>,
    pub group_id: Option<i64>,
    pub node_id: Option<i64>,
    pub ordering: TaskOrdering,
}

impl TaskFilter {
    pub fn for_biz(tenant_id: &str, biz_id: i64) -> Self {
        Self {
            tenant_id: tenant_id.to_string(),
            biz_id: Some(biz_id),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct NodeFilter {
    pub tenant_id: String,
    /// 限定业务；配合 include_common 时还返回对该业务可见的公共节点
    pub biz_id: Option<i64>,
    pub include_common: bool,
    pub ids: Option<Vec<i64>>,
    pub name: Option<String>,
    pub ip: Option<String>,
}

impl NodeFilter {
    pub fn for_biz(tenant_id: &str, biz_id: i64) -> Self {
        Self {
            tenant_id: tenant_id.to_string(),
            biz_id: Some(biz_id),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct GroupFilter {
    pub tenant_id: String,
    pub biz_id: Option<i64>,
    pub ids: Option<Vec<i64>>,
    pub name: Option<String>,
}

impl GroupFilter {
    pub fn for_biz(tenant_id: &str, biz_id: i64) -> Self {
        Self {
            tenant_id: tenant_id.to_string(),
            biz_id: Some(biz_id),
            ..Self::default()
        }
    }
}
