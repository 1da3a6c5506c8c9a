//! Prometheus 指标模块
//!
//! 基于 metrics crate 记录积分、等级、礼品与优惠券相关的业务指标。
//! 引擎本身不监听端口，宿主服务调用 [`render`] 获取文本格式的指标快照。

use std::sync::OnceLock;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::error::{Result, SharedError};

/// 全局 Prometheus handle，用于渲染指标
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// 安装 Prometheus recorder 并注册指标描述
pub fn init() -> Result<()> {
    if PROMETHEUS_HANDLE.get().is_some() {
        return Ok(());
    }

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| SharedError::Observability(e.to_string()))?;
    let _ = PROMETHEUS_HANDLE.set(handle);

    register_loyalty_metrics();
    Ok(())
}

/// 渲染当前指标快照，未初始化时返回 None
pub fn render() -> Option<String> {
    PROMETHEUS_HANDLE.get().map(|h| h.render())
}

fn register_loyalty_metrics() {
    metrics::describe_counter!(
        "loyalty_point_transactions_total",
        "Total number of point ledger transactions"
    );
    metrics::describe_counter!(
        "loyalty_ledger_conflicts_total",
        "Optimistic balance conflicts detected while appending to the ledger"
    );
    metrics::describe_counter!(
        "loyalty_level_transitions_total",
        "Total number of loyalty level changes"
    );
    metrics::describe_counter!("loyalty_gift_claims_total", "Total number of level gift claims");
    metrics::describe_counter!(
        "coupon_validations_total",
        "Coupon validations partitioned by result"
    );
    metrics::describe_counter!(
        "coupon_redemptions_total",
        "Coupon redemptions partitioned by result"
    );
}

// ============================================================================
// 业务指标记录
// ============================================================================

/// 记录一笔积分流水
pub fn record_point_transaction(reason: &'static str, delta: i64) {
    let direction = if delta >= 0 { "credit" } else { "debit" };
    metrics::counter!(
        "loyalty_point_transactions_total",
        "reason" => reason,
        "direction" => direction
    )
    .increment(1);
}

/// 记录一次账本事务被数据库中止（死锁或序列化失败）
pub fn record_ledger_conflict() {
    metrics::counter!("loyalty_ledger_conflicts_total").increment(1);
}

/// 记录一次等级变化
pub fn record_level_transition(old_level: i16, new_level: i16) {
    let direction = if new_level > old_level { "up" } else { "down" };
    metrics::counter!("loyalty_level_transitions_total", "direction" => direction).increment(1);
}

/// 记录一次礼品领取
pub fn record_gift_claim(level: i16) {
    metrics::counter!("loyalty_gift_claims_total", "level" => level.to_string()).increment(1);
}

/// 记录优惠券校验结果（`ok` 或拒绝码）
pub fn record_coupon_validation(result: &'static str) {
    metrics::counter!("coupon_validations_total", "result" => result).increment(1);
}

/// 记录优惠券核销结果（`ok` 或拒绝码）
pub fn record_coupon_redemption(result: &'static str) {
    metrics::counter!("coupon_redemptions_total", "result" => result).increment(1);
}
