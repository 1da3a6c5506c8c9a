//! 仓储 Trait 定义
//!
//! 定义仓储接口，便于服务层依赖抽象而非具体实现，支持 mock 测试

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{CouponRejection, Result};
use crate::models::{
    Coupon, CouponRedemption, GiftClaim, LevelDefinition, LevelGift, LoyaltyAccount, Money,
    PointEntry, PointTransaction,
};

/// 等级礼品有效天数的设置键
pub const GIFT_VALIDITY_DAYS_KEY: &str = "loyalty_gift_validity_days";

/// 会员账户仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AccountRepositoryTrait: Send + Sync {
    async fn get_account(&self, user_id: &str) -> Result<Option<LoyaltyAccount>>;

    /// 写入缓存等级，账户不存在时返回 false
    async fn update_level(&self, user_id: &str, level: i16) -> Result<bool>;
}

/// 积分账本仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PointLedgerRepositoryTrait: Send + Sync {
    /// 原子追加一条流水并更新用户余额
    ///
    /// 在持有账户锁期间读取当前余额、计算 `balance_after`、写入流水并更新余额，
    /// 同一用户的并发写入因此按顺序串行执行，不会丢失任何一笔。
    /// 账户不存在返回 `AccountNotFound`，余额溢出返回 `Validation`，两者都不写入数据。
    async fn append_entry(&self, entry: &PointEntry) -> Result<PointTransaction>;

    /// 按时间倒序列出最近 `limit` 条流水
    async fn list_by_user(&self, user_id: &str, limit: i64) -> Result<Vec<PointTransaction>>;
}

/// 等级目录仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LevelCatalogRepositoryTrait: Send + Sync {
    async fn list_levels(&self) -> Result<Vec<LevelDefinition>>;
}

/// 等级礼品仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GiftRepositoryTrait: Send + Sync {
    async fn list_level_gifts(&self) -> Result<Vec<LevelGift>>;
    async fn list_claims(&self, user_id: &str) -> Result<Vec<GiftClaim>>;

    /// 写入领取记录，`(user_id, level)` 已存在时返回 false
    async fn create_claim(&self, claim: &GiftClaim) -> Result<bool>;
}

/// 键值设置仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SettingsRepositoryTrait: Send + Sync {
    async fn get_setting(&self, key: &str) -> Result<Option<String>>;
}

/// 核销写入的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedeemOutcome {
    Redeemed(CouponRedemption),
    /// 提交时前置条件已不成立
    Rejected(CouponRejection),
}

/// 核销请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedemptionRequest {
    pub coupon_id: Uuid,
    pub user_id: Option<String>,
    pub order_reference: Option<String>,
    pub discount_amount: Money,
    pub redeemed_at: DateTime<Utc>,
}

/// 优惠券仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CouponRepositoryTrait: Send + Sync {
    /// 按规范化后的优惠券码查询
    async fn find_by_code(&self, code: &str) -> Result<Option<Coupon>>;

    /// 统计用户对该优惠券的成功核销次数
    async fn count_user_redemptions(&self, coupon_id: Uuid, user_id: &str) -> Result<i64>;

    /// 创建优惠券，优惠券码已存在时返回 false
    async fn create(&self, coupon: &Coupon) -> Result<bool>;

    /// 修改启用状态，优惠券不存在时返回 false
    async fn set_active(&self, code: &str, active: bool) -> Result<bool>;

    /// 原子核销
    ///
    /// 在同一个原子单元内重新检查启用状态、总次数上限和每人次数上限，
    /// 全部满足时才递增 `current_uses` 并写入核销记录。
    async fn redeem(&self, request: &RedemptionRequest) -> Result<RedeemOutcome>;
}
