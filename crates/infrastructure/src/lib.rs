pub mod in_memory;
pub mod static_hosts;

pub use in_memory::*;
pub use static_hosts::*;
