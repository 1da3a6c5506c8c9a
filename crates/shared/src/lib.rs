//! 共享库
//!
//! 包含会员积分引擎与宿主服务共用的配置、错误处理、可观测性与重试等基础设施代码。

pub mod config;
pub mod error;
pub mod observability;
pub mod retry;
pub mod test_utils;
