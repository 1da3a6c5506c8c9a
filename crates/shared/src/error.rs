//! 基础设施错误类型
//!
//! 启动阶段（配置加载、可观测性初始化）的错误统一收敛到 `SharedError`，
//! 业务错误和存储错误由各业务 crate 自行定义。

use thiserror::Error;

/// 基础设施错误
#[derive(Debug, Error)]
pub enum SharedError {
    #[error("配置错误: {0}")]
    Config(#[from] config::ConfigError),

    #[error("可观测性初始化失败: {0}")]
    Observability(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

/// 错误结果类型别名
pub type Result<T> = std::result::Result<T, SharedError>;

impl SharedError {
    /// 获取错误码
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => "CONFIG_ERROR",
            Self::Observability(_) => "OBSERVABILITY_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}
