//! 统一可观测性模块
//!
//! 提供 logging 与 metrics 的统一初始化。
//! 宿主服务通过单一入口点配置可观测性，确保一致的日志格式和指标命名。

pub mod metrics;
pub mod tracing;

pub use metrics::render as render_metrics;

use ::tracing::info;

use crate::config::ObservabilityConfig;
use crate::error::Result;

/// 统一初始化可观测性
///
/// 初始化顺序：
/// 1. Tracing（结构化日志）
/// 2. Metrics（Prometheus recorder，由宿主通过 [`metrics::render`] 暴露）
///
/// # Example
///
/// ```ignore
/// use loyalty_shared::config::AppConfig;
/// use loyalty_shared::observability;
///
/// let config = AppConfig::load("loyalty-engine")?;
/// observability::init(&config.service_name, &config.observability)?;
/// ```
pub fn init(service_name: &str, config: &ObservabilityConfig) -> Result<()> {
    tracing::init(config)?;

    if config.metrics_enabled {
        metrics::init()?;
    }

    info!(
        service = %service_name,
        log_format = %config.log_format,
        metrics_enabled = config.metrics_enabled,
        "Observability initialized"
    );

    Ok(())
}
