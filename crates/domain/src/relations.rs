//! 关联关系管理：节点/分组 ID 列表解析、名称冲突检查、公共节点使用权限

use serde_json::{Map, Value};
use std::collections::HashSet;
use tracing::debug;
use uptime_errors::{UptimeCheckError, UptimeCheckResult};

use crate::entities::{Node, RequestContext};
use crate::ports::{Authorizer, PermissionAction};

/// 节点关联字段，按优先级排列
pub const NODE_RELATION_KEYS: [&str; 3] = ["node_id_list", "node_ids", "nodes"];
pub const NODE_OBJECT_ID_KEYS: [&str; 2] = ["id", "node_id"];
/// 分组关联字段，按优先级排列
pub const GROUP_RELATION_KEYS: [&str; 3] = ["group_id_list", "group_ids", "groups"];
pub const GROUP_OBJECT_ID_KEYS: [&str; 2] = ["id", "group_id"];

/// 解析 ID 列表，兼容 `[1, "2"]` 与 `[{"id": 1}]` 两种格式
///
/// 对象里找不到任何 ID 字段的元素直接跳过；重复 ID 不做处理。
pub fn parse_relation_ids(raw: &Value, object_keys: &[&str], field: &str) -> UptimeCheckResult<Vec<i64>> {
    let items = raw
        .as_array()
        .ok_or_else(|| UptimeCheckError::relation_format(field, "字段格式错误，必须为数组"))?;

    let mut ids = Vec::with_capacity(items.len());
    for item in items {
        let value = match item {
            Value::Object(obj) => {
                match object_keys
                    .iter()
                    .find_map(|key| obj.get(*key).filter(|v| !v.is_null()))
                {
                    Some(value) => value,
                    None => continue,
                }
            }
            other => other,
        };
        let id = parse_id(value)
            .ok_or_else(|| UptimeCheckError::relation_format(field, "字段格式错误，ID 必须为整数"))?;
        ids.push(id);
    }
    Ok(ids)
}

fn parse_id(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// 取第一个出现的关联字段解析；一个字段都没有时返回 `None`
pub fn extract_relation_ids(
    payload: &Map<String, Value>,
    keys: &[&str],
    object_keys: &[&str],
) -> UptimeCheckResult<Option<Vec<i64>>> {
    keys.iter()
        .find(|key| payload.contains_key(**key))
        .map(|key| parse_relation_ids(&payload[*key], object_keys, key))
        .transpose()
}

/// 同一业务下不允许与其他实体重名；更新时排除自身
pub fn ensure_unique_name<'a, I>(
    kind: &str,
    name: &str,
    existing: I,
    exclude_id: Option<i64>,
) -> UptimeCheckResult<()>
where
    I: IntoIterator<Item = (i64, &'a str)>,
{
    let conflict = existing
        .into_iter()
        .any(|(id, existing_name)| existing_name == name && Some(id) != exclude_id);
    if conflict {
        return Err(UptimeCheckError::duplicate_name(kind, name));
    }
    Ok(())
}

/// 克隆任务的名称：`<name>_copy`，冲突时依次尝试 `<name>_copy(1)`、`<name>_copy(2)`……
pub fn next_copy_name(name: &str, taken: &HashSet<String>) -> String {
    let base = format!("{name}_copy");
    if !taken.contains(&base) {
        return base;
    }
    let mut i = 1;
    loop {
        let candidate = format!("{base}({i})");
        if !taken.contains(&candidate) {
            return candidate;
        }
        i += 1;
    }
}

/// 节点重名时补全名称，如 `广东移动` 补全为 `广东移动2`
///
/// `existing` 为同业务下除自身以外的节点名称。
pub fn deconflict_node_name(name: &str, existing: &[String]) -> String {
    let name = name.trim_end();
    if !existing.iter().any(|n| n == name) {
        return name.to_string();
    }
    let max_suffix = existing
        .iter()
        .filter_map(|n| n.strip_prefix(name))
        .map(|suffix| suffix.trim().parse::<u64>().unwrap_or(0))
        .max()
        .unwrap_or(0);
    if max_suffix > 0 {
        format!("{name}{}", max_suffix + 1)
    } else {
        format!("{name}2")
    }
}

/// 关联了公共节点且开启了公共节点鉴权时，要求调用方具备公共节点使用权限
///
/// 鉴权失败的错误原样透传。
pub async fn check_public_node_admission(
    authorizer: &dyn Authorizer,
    ctx: &RequestContext,
    nodes: &[Node],
    auth_enabled: bool,
) -> UptimeCheckResult<()> {
    if !auth_enabled || !nodes.iter().any(|node| node.is_common) {
        return Ok(());
    }
    debug!(biz_id = ctx.biz_id, operator = %ctx.operator, "校验公共拨测节点使用权限");
    authorizer
        .is_allowed(ctx, PermissionAction::UsePublicSyntheticLocation, true)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_parse_mixed_id_list() {
        let raw = json!([1, "2", {"id": 3}, {"node_id": "4"}, {"foo": 1}, 1]);
        let ids = parse_relation_ids(&raw, &NODE_OBJECT_ID_KEYS, "node_id_list").unwrap();
        assert_eq!(ids, vec![1, 2, 3, 4, 1]);
    }

    #[test]
    fn test_non_list_rejected() {
        let err = parse_relation_ids(&json!({"id": 1}), &NODE_OBJECT_ID_KEYS, "node_id_list")
            .unwrap_err();
        assert!(matches!(err, UptimeCheckError::RelationFormat { .. }));
        assert_eq!(err.field(), Some("node_id_list"));
    }

    #[test]
    fn test_non_integer_rejected() {
        for raw in [json!(["abc"]), json!([true]), json!([{"id": "x"}]), json!([1.5])] {
            assert!(parse_relation_ids(&raw, &GROUP_OBJECT_ID_KEYS, "groups").is_err());
        }
    }

    #[test]
    fn test_relation_key_priority() {
        let payload = json!({"nodes": [9], "node_ids": [2], "node_id_list": [{"id": 1}]});
        let ids = extract_relation_ids(
            payload.as_object().unwrap(),
            &NODE_RELATION_KEYS,
            &NODE_OBJECT_ID_KEYS,
        )
        .unwrap();
        assert_eq!(ids, Some(vec![1]));

        let empty = json!({});
        let ids = extract_relation_ids(
            empty.as_object().unwrap(),
            &GROUP_RELATION_KEYS,
            &GROUP_OBJECT_ID_KEYS,
        )
        .unwrap();
        assert_eq!(ids, None);
    }

    #[test]
    fn test_unique_name_excludes_self() {
        let existing = vec![(1, "probe"), (2, "other")];
        assert!(ensure_unique_name("拨测任务", "probe", existing.clone(), None).is_err());
        assert!(ensure_unique_name("拨测任务", "probe", existing.clone(), Some(1)).is_ok());
        assert!(ensure_unique_name("拨测任务", "new", existing, None).is_ok());
    }

    #[test]
    fn test_copy_name_sequence() {
        let mut taken = HashSet::new();
        assert_eq!(next_copy_name("probe", &taken), "probe_copy");

        taken.insert("probe_copy".to_string());
        assert_eq!(next_copy_name("probe", &taken), "probe_copy(1)");

        taken.insert("probe_copy(1)".to_string());
        assert_eq!(next_copy_name("probe", &taken), "probe_copy(2)");
    }

    #[test]
    fn test_deconflict_node_name() {
        let none: Vec<String> = vec![];
        assert_eq!(deconflict_node_name("广东移动 ", &none), "广东移动");

        let existing = vec!["广东移动".to_string()];
        assert_eq!(deconflict_node_name("广东移动", &existing), "广东移动2");

        let existing = vec![
            "广东移动".to_string(),
            "广东移动2".to_string(),
            "广东移动5".to_string(),
        ];
        assert_eq!(deconflict_node_name("广东移动", &existing), "广东移动6");
    }

    struct CountingAuthorizer {
        calls: AtomicUsize,
        allow: bool,
    }

    #[async_trait]
    impl Authorizer for CountingAuthorizer {
        async fn is_allowed(
            &self,
            _ctx: &RequestContext,
            action: PermissionAction,
            raise_on_deny: bool,
        ) -> UptimeCheckResult<bool> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.allow && raise_on_deny {
                return Err(UptimeCheckError::Authorization(action.to_string()));
            }
            Ok(self.allow)
        }
    }

    #[tokio::test]
    async fn test_public_node_admission() {
        let ctx = RequestContext::new("system", 2, "admin");
        let mut common = Node::new("system", 0, "public");
        common.is_common = true;
        let private = Node::new("system", 2, "private");

        let denied = CountingAuthorizer {
            calls: AtomicUsize::new(0),
            allow: false,
        };
        assert!(check_public_node_admission(&denied, &ctx, &[private.clone()], true)
            .await
            .is_ok());
        assert!(check_public_node_admission(&denied, &ctx, &[common.clone()], false)
            .await
            .is_ok());
        assert_eq!(denied.calls.load(Ordering::SeqCst), 0);

        let err = check_public_node_admission(&denied, &ctx, &[private, common], true)
            .await
            .unwrap_err();
        assert!(matches!(err, UptimeCheckError::Authorization(_)));
    }
}
