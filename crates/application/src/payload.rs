//! 请求体适配
//!
//! 把前端/开放接口的 JSON 请求转换为统一的内部表示，
//! 新旧字段名（`indepentent_dataid`、`node_ids`、`nodes` 等）只在这里出现。

use serde::Deserialize;
use serde_json::{Map, Value};
use uptime_domain::entities::{IpType, Protocol, TaskConfig};
use uptime_domain::relations::{
    extract_relation_ids, GROUP_OBJECT_ID_KEYS, GROUP_RELATION_KEYS, NODE_OBJECT_ID_KEYS,
    NODE_RELATION_KEYS,
};
use uptime_errors::{UptimeCheckError, UptimeCheckResult};

pub const TASK_NAME_MAX_LEN: usize = 128;
pub const GROUP_NAME_MAX_LEN: usize = 50;
pub const NODE_NAME_MAX_LEN: usize = 50;

/// 拨测任务请求。所有字段均可缺省，创建与更新各自决定哪些必填
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskPayload {
    pub biz_id: Option<i64>,
    pub name: Option<String>,
    pub protocol: Option<Protocol>,
    pub config: Option<TaskConfig>,
    pub labels: Option<Map<String, Value>>,
    pub location: Option<Value>,
    pub independent_dataid: Option<bool>,
    /// `None` 表示请求里没有任何节点关联字段
    pub node_ids: Option<Vec<i64>>,
    pub group_ids: Option<Vec<i64>>,
}

impl TaskPayload {
    pub fn from_json(raw: &Value) -> UptimeCheckResult<Self> {
        let obj = raw
            .as_object()
            .ok_or_else(|| UptimeCheckError::validation("payload", "请求体必须为 JSON 对象"))?;

        let biz_id = match obj.get("bk_biz_id").or_else(|| obj.get("biz_id")) {
            Some(value) => Some(parse_int(value, "bk_biz_id")?),
            None => None,
        };

        let name = match obj.get("name") {
            Some(Value::String(name)) => Some(name.clone()),
            Some(Value::Null) | None => None,
            Some(_) => return Err(UptimeCheckError::validation("name", "名称必须为字符串")),
        };

        let protocol = match obj.get("protocol") {
            Some(Value::String(p)) => Some(
                p.parse::<Protocol>()
                    .map_err(|e| UptimeCheckError::validation("protocol", e))?,
            ),
            Some(Value::Null) | None => None,
            Some(_) => return Err(UptimeCheckError::validation("protocol", "协议必须为字符串")),
        };

        let config = match obj.get("config") {
            Some(Value::Null) | None => None,
            Some(value) => Some(
                serde_json::from_value::<TaskConfig>(value.clone())
                    .map_err(|e| UptimeCheckError::validation("config", e.to_string()))?,
            ),
        };

        let labels = match obj.get("labels") {
            Some(Value::Object(labels)) => Some(labels.clone()),
            Some(Value::Null) | None => None,
            Some(_) => return Err(UptimeCheckError::validation("labels", "labels 必须为对象")),
        };

        let independent_dataid = match obj
            .get("indepentent_dataid")
            .or_else(|| obj.get("independent_dataid"))
        {
            Some(Value::Bool(flag)) => Some(*flag),
            Some(Value::Null) | None => None,
            Some(_) => {
                return Err(UptimeCheckError::validation(
                    "independent_dataid",
                    "必须为布尔值",
                ))
            }
        };

        Ok(Self {
            biz_id,
            name,
            protocol,
            config,
            labels,
            location: obj.get("location").cloned(),
            independent_dataid,
            node_ids: extract_relation_ids(obj, &NODE_RELATION_KEYS, &NODE_OBJECT_ID_KEYS)?,
            group_ids: extract_relation_ids(obj, &GROUP_RELATION_KEYS, &GROUP_OBJECT_ID_KEYS)?,
        })
    }
}

/// 名称不能为空白且不超过长度上限
pub fn validate_name(name: &str, max_len: usize) -> UptimeCheckResult<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(UptimeCheckError::validation("name", "名称不能为空"));
    }
    if trimmed.chars().count() > max_len {
        return Err(UptimeCheckError::validation(
            "name",
            format!("名称长度不能超过 {max_len} 个字符"),
        ));
    }
    Ok(trimmed.to_string())
}

fn parse_int(value: &Value, field: &str) -> UptimeCheckResult<i64> {
    let parsed = match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| UptimeCheckError::validation(field, "必须为整数"))
}

/// 拨测节点请求，更新时缺省字段沿用原值
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct NodePayload {
    #[serde(default, alias = "bk_biz_id")]
    pub biz_id: Option<i64>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub is_common: Option<bool>,
    #[serde(default)]
    pub biz_scope: Option<Vec<i64>>,
    #[serde(default)]
    pub ip_type: Option<IpType>,
    #[serde(default)]
    pub bk_host_id: Option<i64>,
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub plat_id: Option<i64>,
    #[serde(default)]
    pub location: Option<Value>,
    #[serde(default)]
    pub carrier_operator: Option<String>,
}

impl NodePayload {
    pub fn from_json(raw: &Value) -> UptimeCheckResult<Self> {
        serde_json::from_value(raw.clone())
            .map_err(|e| UptimeCheckError::validation("payload", e.to_string()))
    }
}

/// 拨测分组请求
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct GroupPayload {
    #[serde(default, alias = "bk_biz_id")]
    pub biz_id: Option<i64>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub logo: Option<String>,
    #[serde(default)]
    pub task_id_list: Option<Vec<i64>>,
}

impl GroupPayload {
    pub fn from_json(raw: &Value) -> UptimeCheckResult<Self> {
        serde_json::from_value(raw.clone())
            .map_err(|e| UptimeCheckError::validation("payload", e.to_string()))
    }
}
