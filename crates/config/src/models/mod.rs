pub mod app_config;
pub mod logging;
pub mod uptime_check;

pub use app_config::*;
pub use logging::*;
pub use uptime_check::*;
