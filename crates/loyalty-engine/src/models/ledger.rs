//! 积分流水实体

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::PointReason;

/// 积分流水
///
/// 不可变记录，满足 `balance_after = balance_before + points`；
/// 同一用户按创建时间排序后，每条的 `balance_before` 等于上一条的 `balance_after`。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PointTransaction {
    /// UUIDv7，按时间有序
    pub id: Uuid,
    pub user_id: String,
    /// 带符号的积分变动
    pub points: i64,
    pub reason: PointReason,
    pub balance_before: i64,
    pub balance_after: i64,
    /// 关联业务单号（订单号、后台工单号等）
    #[sqlx(default)]
    pub reference_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl PointTransaction {
    /// 单条流水的算术是否自洽
    pub fn is_consistent(&self) -> bool {
        self.balance_before.checked_add(self.points) == Some(self.balance_after)
    }
}

/// 待写入的积分变动
///
/// 只携带变动本身，`balance_before` 由仓储在持有账户锁时读取。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointEntry {
    pub id: Uuid,
    pub user_id: String,
    pub points: i64,
    pub reason: PointReason,
    pub reference_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl PointEntry {
    pub fn new(
        user_id: impl Into<String>,
        points: i64,
        reason: PointReason,
        reference_id: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            user_id: user_id.into(),
            points,
            reason,
            reference_id,
            created_at: Utc::now(),
        }
    }

    /// 基于锁定时读到的余额生成流水，溢出时返回 None
    pub fn apply_to(&self, balance_before: i64) -> Option<PointTransaction> {
        let balance_after = balance_before.checked_add(self.points)?;
        Some(PointTransaction {
            id: self.id,
            user_id: self.user_id.clone(),
            points: self.points,
            reason: self.reason,
            balance_before,
            balance_after,
            reference_id: self.reference_id.clone(),
            created_at: self.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_to_uses_locked_balance() {
        let entry = PointEntry::new("u-1", -200, PointReason::Redemption, None);
        let tx = entry.apply_to(150).unwrap();
        assert_eq!(tx.balance_before, 150);
        assert_eq!(tx.balance_after, -50);
        assert_eq!(tx.id, entry.id);
        assert!(tx.is_consistent());
    }

    #[test]
    fn test_apply_to_overflow() {
        let entry = PointEntry::new("u-1", 1, PointReason::Bonus, None);
        assert!(entry.apply_to(i64::MAX).is_none());
    }
}
