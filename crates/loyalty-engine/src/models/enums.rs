//! 枚举类型定义
//!
//! 所有枚举都支持数据库（sqlx）和 JSON（serde）序列化

use serde::{Deserialize, Serialize};

/// 优惠券类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "varchar", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CouponType {
    /// 百分比折扣，`value` 为整数百分比（10 = 10%）
    Percentage,
    /// 固定金额减免，`value` 单位为分
    FixedAmount,
    /// 礼品卡，`value` 为面额（分），支付确认前处于未激活状态
    GiftCard,
}

impl CouponType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Percentage => "PERCENTAGE",
            Self::FixedAmount => "FIXED_AMOUNT",
            Self::GiftCard => "GIFT_CARD",
        }
    }
}

/// 积分变动原因
///
/// 标识积分流水的触发来源，用于追溯和审计
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "varchar", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PointReason {
    /// 购物获得（+）
    Purchase,
    /// 运营后台手动调整（±）
    AdminAdjustment,
    /// 活动奖励（+）
    Bonus,
    /// 积分消费（-）
    Redemption,
    /// 退款追回（-）
    Clawback,
}

impl PointReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Purchase => "purchase",
            Self::AdminAdjustment => "admin_adjustment",
            Self::Bonus => "bonus",
            Self::Redemption => "redemption",
            Self::Clawback => "clawback",
        }
    }
}
