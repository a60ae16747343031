//! 拨测任务、节点、分组的应用服务

pub mod payload;
pub mod services;

pub use payload::{GroupPayload, NodePayload, TaskPayload};
pub use services::*;
