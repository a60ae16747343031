pub mod entities;
pub mod health;
pub mod legacy;
pub mod lifecycle;
pub mod ports;
pub mod relations;
pub mod repositories;
pub mod targets;
pub mod validation;

pub use entities::*;
pub use health::{HeartbeatSelector, NodeHealthGate};
pub use ports::*;
pub use repositories::*;
pub use targets::TargetResolver;
pub use uptime_errors::{UptimeCheckError, UptimeCheckResult};
pub use validation::TaskConfigValidator;
