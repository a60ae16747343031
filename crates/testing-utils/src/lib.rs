//! # Uptime Check Testing Utils
//!
//! 拨测管理各 crate 共用的测试工具：实体构造器与外部协作方的记录型 mock。
//!
//! ## Usage
//!
//! ```toml
//! [dev-dependencies]
//! uptime-testing-utils = { path = "../testing-utils" }
//! ```
//!
//! ```rust
//! use uptime_testing_utils::builders::TaskBuilder;
//! use uptime_testing_utils::mocks::MockAgentController;
//! ```

pub mod builders;
pub mod mocks;

pub use builders::*;
pub use mocks::*;
