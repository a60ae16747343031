use thiserror::Error;


#[derive(Debug, Error)]
pub enum UptimeCheckError {
    #[error("参数校验失败: {field} - {message}")]
    Validation { field: String, message: String },
    #[error("已存在相同名称的{kind}: {name}")]
    DuplicateName { kind: String, name: String },
    #[error("权限不足: {0}")]
    Authorization(String),
    #[error("拨测节点不可达, 近期未上报心跳: {selector}")]
    NodeUnreachable { selector: String },
    #[error("任务正在运行，请先停止任务后再删除: id={id}, status={status}")]
    TaskBusy { id: i64, status: String },
    #[error("字段格式错误: {field} - {message}")]
    RelationFormat { field: String, message: String },
    #[error("任务当前状态不允许该操作: id={id}, status={status}, action={action}")]
    InvalidStatusTransition {
        id: i64,
        status: String,
        action: String,
    },
    #[error("拨测任务不存在: {id}")]
    TaskNotFound { id: i64 },
    #[error("拨测节点不存在: {id}")]
    NodeNotFound { id: i64 },
    #[error("拨测分组不存在: {id}")]
    GroupNotFound { id: i64 },
    #[error("存储操作错误: {0}")]
    Storage(String),
    #[error("主机解析失败: {0}")]
    HostResolution(String),
    #[error("采集配置下发失败: {0}")]
    AgentControl(String),
    #[error("操作超时: {0}")]
    Timeout(String),
    #[error("配置错误: {0}")]
    Configuration(String),
    #[error("序列化错误: {0}")]
    Serialization(String),
    #[error("内部错误: {0}")]
    Internal(String),
}

pub type UptimeCheckResult<T> = Result<T, UptimeCheckError>;

impl UptimeCheckError {
    pub fn validation<F: Into<String>, S: Into<String>>(field: F, message: S) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }
    pub fn duplicate_name<K: Into<String>, S: Into<String>>(kind: K, name: S) -> Self {
        Self::DuplicateName {
            kind: kind.into(),
            name: name.into(),
        }
    }
    pub fn relation_format<F: Into<String>, S: Into<String>>(field: F, message: S) -> Self {
        Self::RelationFormat {
            field: field.into(),
            message: message.into(),
        }
    }
    pub fn node_unreachable<S: Into<String>>(selector: S) -> Self {
        Self::NodeUnreachable {
            selector: selector.into(),
        }
    }
    pub fn task_busy<S: Into<String>>(id: i64, status: S) -> Self {
        Self::TaskBusy {
            id,
            status: status.into(),
        }
    }
    pub fn task_not_found(id: i64) -> Self {
        Self::TaskNotFound { id }
    }
    pub fn node_not_found(id: i64) -> Self {
        Self::NodeNotFound { id }
    }
    pub fn group_not_found(id: i64) -> Self {
        Self::GroupNotFound { id }
    }
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        Self::Storage(msg.into())
    }
    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }

    /// 出错字段名，仅对参数类错误有意义
    pub fn field(&self) -> Option<&str> {
        match self {
            UptimeCheckError::Validation { field, .. }
            | UptimeCheckError::RelationFormat { field, .. } => Some(field),
            _ => None,
        }
    }

    /// 用户修正请求或重试后可以成功的错误
    pub fn is_user_correctable(&self) -> bool {
        matches!(
            self,
            UptimeCheckError::Validation { .. }
                | UptimeCheckError::DuplicateName { .. }
                | UptimeCheckError::NodeUnreachable { .. }
                | UptimeCheckError::TaskBusy { .. }
                | UptimeCheckError::RelationFormat { .. }
                | UptimeCheckError::InvalidStatusTransition { .. }
        )
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            UptimeCheckError::NodeUnreachable { .. }
                | UptimeCheckError::Storage(_)
                | UptimeCheckError::HostResolution(_)
                | UptimeCheckError::AgentControl(_)
                | UptimeCheckError::Timeout(_)
        )
    }

    pub fn user_message(&self) -> &str {
        match self {
            UptimeCheckError::Validation { .. } => "拨测配置校验失败",
            UptimeCheckError::DuplicateName { .. } => "名称已存在，请更换名称",
            UptimeCheckError::Authorization(_) => "您没有执行此操作的权限",
            UptimeCheckError::NodeUnreachable { .. } => "拨测节点心跳异常，请检查采集器后重试",
            UptimeCheckError::TaskBusy { .. } => "任务正在运行，请先停止任务后再删除",
            UptimeCheckError::RelationFormat { .. } => "关联ID列表格式错误",
            UptimeCheckError::InvalidStatusTransition { .. } => "任务当前状态不允许该操作",
            UptimeCheckError::TaskNotFound { .. } => "请求的拨测任务不存在",
            UptimeCheckError::NodeNotFound { .. } => "请求的拨测节点不存在",
            UptimeCheckError::GroupNotFound { .. } => "请求的拨测分组不存在",
            UptimeCheckError::Timeout(_) => "操作超时，请稍后重试",
            _ => "系统繁忙，请稍后重试",
        }
    }
}

impl From<serde_json::Error> for UptimeCheckError {
    fn from(err: serde_json::Error) -> Self {
        UptimeCheckError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for UptimeCheckError {
    fn from(err: anyhow::Error) -> Self {
        UptimeCheckError::Internal(err.to_string())
    }
}
