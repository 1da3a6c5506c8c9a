//! 积分账本服务
//!
//! 每次积分变动写入一条不可变流水，并在同一原子单元内更新用户余额。
//! 余额的读取、计算和写回都在仓储持有的账户锁内完成，同一用户的并发写入按顺序执行。
//! 只有数据库中止事务（死锁、序列化失败）或获取连接超时才按重试策略重新提交。
//!
//! 账本只保证算术正确与链路连续，不限制余额为负，是否允许透支由调用方决定。

use std::sync::Arc;

use tracing::{debug, info, instrument};

use loyalty_shared::config::LoyaltyConfig;
use loyalty_shared::observability::metrics;
use loyalty_shared::retry::{retry_with_policy, RetryPolicy};

use crate::error::{LoyaltyError, Result};
use crate::models::{Money, PointEntry, PointReason, PointTransaction};
use crate::repository::{AccountRepositoryTrait, PointLedgerRepositoryTrait};

/// 流水查询的默认条数
pub const DEFAULT_HISTORY_LIMIT: i64 = 50;

/// 积分账本
pub struct PointLedger<A, L>
where
    A: AccountRepositoryTrait,
    L: PointLedgerRepositoryTrait,
{
    accounts: Arc<A>,
    ledger: Arc<L>,
    retry_policy: RetryPolicy,
    points_per_currency_unit: i64,
}

impl<A, L> PointLedger<A, L>
where
    A: AccountRepositoryTrait,
    L: PointLedgerRepositoryTrait,
{
    pub fn new(accounts: Arc<A>, ledger: Arc<L>, config: &LoyaltyConfig) -> Self {
        Self {
            accounts,
            ledger,
            retry_policy: RetryPolicy::optimistic(
                config.ledger_max_retries,
                config.ledger_retry_delay_ms,
            ),
            points_per_currency_unit: config.points_per_currency_unit,
        }
    }

    /// 当前积分余额
    pub async fn balance(&self, user_id: &str) -> Result<i64> {
        self.accounts
            .get_account(user_id)
            .await?
            .map(|account| account.loyalty_points)
            .ok_or_else(|| LoyaltyError::AccountNotFound(user_id.to_string()))
    }

    /// 记录一笔积分变动
    ///
    /// `delta` 可以为负（消费、冲正），不能为 0。账户不存在或余额溢出时不写入任何数据。
    #[instrument(skip(self), fields(user_id = %user_id, delta = delta))]
    pub async fn record_transaction(
        &self,
        user_id: &str,
        delta: i64,
        reason: PointReason,
        reference_id: Option<&str>,
    ) -> Result<PointTransaction> {
        if delta == 0 {
            return Err(LoyaltyError::Validation("积分变动不能为0".to_string()));
        }

        let entry = PointEntry::new(user_id, delta, reason, reference_id.map(str::to_string));
        let entry = &entry;
        let transaction = retry_with_policy(
            &self.retry_policy,
            "point_ledger.append",
            is_transient,
            move || self.ledger.append_entry(entry),
        )
        .await?;

        metrics::record_point_transaction(reason.as_str(), delta);
        info!(
            user_id = %user_id,
            transaction_id = %transaction.id,
            reason = reason.as_str(),
            balance_before = transaction.balance_before,
            balance_after = transaction.balance_after,
            "积分流水已记录"
        );

        Ok(transaction)
    }

    /// 按订单金额发放消费积分
    ///
    /// 积分 = 订单金额的整数货币单位 × 每单位积分，不足 1 积分的订单不记流水，返回 None。
    #[instrument(skip(self), fields(user_id = %user_id, order_reference = %order_reference))]
    pub async fn earn_for_purchase(
        &self,
        user_id: &str,
        order_total: Money,
        order_reference: &str,
    ) -> Result<Option<PointTransaction>> {
        if order_total.is_negative() {
            return Err(LoyaltyError::Validation(format!(
                "订单金额不能为负数: {}",
                order_total
            )));
        }

        let points = order_total
            .major_units()
            .checked_mul(self.points_per_currency_unit)
            .ok_or_else(|| LoyaltyError::Validation(format!("订单积分溢出: {}", order_total)))?;

        if points <= 0 {
            debug!(order_total = %order_total, "订单金额不足以获得积分");
            return Ok(None);
        }

        self.record_transaction(user_id, points, PointReason::Purchase, Some(order_reference))
            .await
            .map(Some)
    }

    /// 最近的流水（按时间倒序）
    pub async fn history(&self, user_id: &str, limit: i64) -> Result<Vec<PointTransaction>> {
        let limit = if limit <= 0 { DEFAULT_HISTORY_LIMIT } else { limit };
        self.ledger.list_by_user(user_id, limit).await
    }
}

/// 事务被整体回滚、重新提交不会重复写入的错误
fn is_transient(err: &LoyaltyError) -> bool {
    matches!(
        err,
        LoyaltyError::ConcurrencyConflict | LoyaltyError::Database(sqlx::Error::PoolTimedOut)
    )
}

/// 校验一段按时间正序排列的流水链，返回最终余额
///
/// 每条流水必须算术自洽，且 `balance_before` 等于上一条的 `balance_after`。
/// 空链返回 0。
pub fn audit_chain(transactions: &[PointTransaction]) -> Result<i64> {
    let Some(first) = transactions.first() else {
        return Ok(0);
    };

    let mut balance = first.balance_before;
    for tx in transactions {
        if tx.balance_before != balance {
            return Err(LoyaltyError::Internal(format!(
                "积分流水链断裂: transaction_id={}, expected_before={}, actual_before={}",
                tx.id, balance, tx.balance_before
            )));
        }
        if !tx.is_consistent() {
            return Err(LoyaltyError::Internal(format!(
                "积分流水算术错误: transaction_id={}",
                tx.id
            )));
        }
        balance = tx.balance_after;
    }

    Ok(balance)
}
