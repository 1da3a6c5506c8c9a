//! 会员积分引擎错误类型
//!
//! 分为两类：
//! - 业务规则拒绝（可直接展示给终端用户），如优惠券过期、礼品已领取
//! - 基础设施故障（存储不可用、约束冲突），不会留下部分写入的账本

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// 优惠券校验拒绝原因
///
/// 按校验顺序排列，每个阶段对应一个独立的错误码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CouponRejection {
    NotFound,
    Inactive,
    NotYetValid,
    Expired,
    UsageExceeded,
    PerUserLimit,
    BelowMinimum,
}

impl CouponRejection {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound => "NOT_FOUND",
            Self::Inactive => "INACTIVE",
            Self::NotYetValid => "NOT_YET_VALID",
            Self::Expired => "EXPIRED",
            Self::UsageExceeded => "USAGE_EXCEEDED",
            Self::PerUserLimit => "PER_USER_LIMIT",
            Self::BelowMinimum => "BELOW_MINIMUM",
        }
    }

    /// 面向终端用户的提示文案
    pub fn message(&self) -> &'static str {
        match self {
            Self::NotFound => "优惠券不存在",
            Self::Inactive => "优惠券未启用",
            Self::NotYetValid => "优惠券尚未生效",
            Self::Expired => "优惠券已过期",
            Self::UsageExceeded => "优惠券已被领完",
            Self::PerUserLimit => "已达到每人使用次数上限",
            Self::BelowMinimum => "订单金额未达到最低消费",
        }
    }
}

impl fmt::Display for CouponRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// 引擎错误类型
#[derive(Debug, Error)]
pub enum LoyaltyError {
    // === 优惠券 ===
    #[error("优惠券校验失败: {0}")]
    CouponRejected(CouponRejection),

    // === 账户 ===
    #[error("会员账户不存在: {0}")]
    AccountNotFound(String),

    // === 等级礼品 ===
    #[error("等级未达到: 当前等级 {current}, 需要等级 {required}")]
    GiftLevelNotReached { current: i16, required: i16 },

    #[error("等级礼品已领取: user_id={user_id}, level={level}")]
    GiftAlreadyClaimed { user_id: String, level: i16 },

    #[error("该等级未配置礼品: {0}")]
    NoGiftsForLevel(i16),

    #[error("参数校验失败: {0}")]
    Validation(String),

    // === 系统错误 ===
    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("并发冲突，请重试")]
    ConcurrencyConflict,

    #[error("内部错误: {0}")]
    Internal(String),
}

/// 引擎 Result 类型别名
pub type Result<T> = std::result::Result<T, LoyaltyError>;

impl From<CouponRejection> for LoyaltyError {
    fn from(rejection: CouponRejection) -> Self {
        Self::CouponRejected(rejection)
    }
}

impl From<validator::ValidationErrors> for LoyaltyError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::Validation(errors.to_string())
    }
}

impl LoyaltyError {
    /// 检查是否为可重试的错误
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Database(_) | Self::ConcurrencyConflict)
    }

    /// 检查是否为业务错误（非系统错误）
    pub fn is_business_error(&self) -> bool {
        !matches!(
            self,
            Self::Configuration(_) | Self::Database(_) | Self::ConcurrencyConflict | Self::Internal(_)
        )
    }

    /// 优惠券拒绝原因（其他错误返回 None）
    pub fn coupon_rejection(&self) -> Option<CouponRejection> {
        match self {
            Self::CouponRejected(r) => Some(*r),
            _ => None,
        }
    }

    /// 获取错误码（用于 API 响应）
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::CouponRejected(r) => r.code(),
            Self::AccountNotFound(_) => "ACCOUNT_NOT_FOUND",
            Self::GiftLevelNotReached { .. } => "GIFT_LEVEL_NOT_REACHED",
            Self::GiftAlreadyClaimed { .. } => "GIFT_ALREADY_CLAIMED",
            Self::NoGiftsForLevel(_) => "NO_GIFTS_FOR_LEVEL",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::Database(_) => "DATABASE_ERROR",
            Self::ConcurrencyConflict => "CONCURRENCY_CONFLICT",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}
