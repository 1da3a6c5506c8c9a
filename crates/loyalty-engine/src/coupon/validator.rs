//! 优惠券校验与核销服务
//!
//! ## 校验流程
//!
//! 1. 查找（大小写不敏感） -> 2. 启用状态 -> 3. 生效时间 -> 4. 失效时间
//!    -> 5. 总次数 -> 6. 每人次数（仅在提供用户时） -> 7. 最低消费 -> 8. 计算折扣
//!
//! 校验本身不修改任何数据。核销在校验通过后交给仓储的原子写入，
//! 提交时重新检查次数上限，保证并发下 `current_uses` 不会超过 `max_uses`。

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use loyalty_shared::observability::metrics;

use crate::coupon::discount::compute_discount;
use crate::coupon::rules;
use crate::error::{CouponRejection, LoyaltyError, Result};
use crate::models::{normalize_code, Coupon, CouponDescriptor, CouponType, Money, NewCoupon};
use crate::repository::{CouponRepositoryTrait, RedeemOutcome, RedemptionRequest};

/// 礼品卡码前缀
const GIFT_CARD_PREFIX: &str = "GC";
/// 礼品卡码字符集（去掉易混淆的 0/O/1/I）
const GIFT_CARD_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const GIFT_CARD_CODE_ATTEMPTS: usize = 5;

/// 校验通过的结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CouponValidation {
    pub coupon: CouponDescriptor,
    pub discount_amount: Money,
}

impl CouponValidation {
    /// 订单折后应付金额
    pub fn payable(&self, order_amount: Money) -> Money {
        order_amount.saturating_sub(self.discount_amount)
    }
}

/// 核销成功的结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RedeemedCoupon {
    pub redemption_id: Uuid,
    pub coupon: CouponDescriptor,
    pub discount_amount: Money,
    pub redeemed_at: DateTime<Utc>,
}

/// 优惠券服务
pub struct CouponValidator<R>
where
    R: CouponRepositoryTrait,
{
    repo: Arc<R>,
}

impl<R> CouponValidator<R>
where
    R: CouponRepositoryTrait,
{
    pub fn new(repo: Arc<R>) -> Self {
        Self { repo }
    }

    /// 校验优惠券并计算折扣（以当前时间为准）
    pub async fn validate(
        &self,
        code: &str,
        order_amount: Money,
        user_id: Option<&str>,
    ) -> Result<CouponValidation> {
        self.validate_at(code, order_amount, user_id, Utc::now()).await
    }

    /// 在指定时刻校验优惠券
    ///
    /// 按固定顺序检查，返回第一个不满足条件对应的拒绝原因。
    #[instrument(skip(self), fields(code = %code, order_amount = %order_amount))]
    pub async fn validate_at(
        &self,
        code: &str,
        order_amount: Money,
        user_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<CouponValidation> {
        if order_amount.is_negative() {
            return Err(LoyaltyError::Validation(format!(
                "订单金额不能为负数: {}",
                order_amount
            )));
        }

        let result = self.evaluate(code, order_amount, user_id, now).await;
        record_validation(&result);

        let (coupon, discount_amount) = result?;
        debug!(code = %coupon.code, discount = %discount_amount, "优惠券校验通过");

        Ok(CouponValidation {
            coupon: coupon.descriptor(),
            discount_amount,
        })
    }

    /// 核销优惠券
    ///
    /// 先完成只读校验，再交由仓储原子写入。并发核销时由提交时的复查决定胜负，
    /// 落败方得到 `USAGE_EXCEEDED` 或 `PER_USER_LIMIT`。
    #[instrument(skip(self), fields(code = %code, order_amount = %order_amount))]
    pub async fn redeem(
        &self,
        code: &str,
        order_amount: Money,
        user_id: Option<&str>,
        order_reference: Option<&str>,
    ) -> Result<RedeemedCoupon> {
        let now = Utc::now();
        let validation = self.validate_at(code, order_amount, user_id, now).await?;

        let request = RedemptionRequest {
            coupon_id: validation.coupon.id,
            user_id: user_id.map(str::to_string),
            order_reference: order_reference.map(str::to_string),
            discount_amount: validation.discount_amount,
            redeemed_at: now,
        };

        match self.repo.redeem(&request).await? {
            RedeemOutcome::Redeemed(redemption) => {
                metrics::record_coupon_redemption("ok");
                info!(
                    code = %validation.coupon.code,
                    redemption_id = %redemption.id,
                    discount = %redemption.discount_amount,
                    "优惠券核销成功"
                );
                Ok(RedeemedCoupon {
                    redemption_id: redemption.id,
                    coupon: validation.coupon,
                    discount_amount: redemption.discount_amount,
                    redeemed_at: redemption.redeemed_at,
                })
            }
            RedeemOutcome::Rejected(rejection) => {
                metrics::record_coupon_redemption(rejection.code());
                warn!(
                    code = %validation.coupon.code,
                    reason = rejection.code(),
                    "优惠券核销提交时被拒绝"
                );
                Err(rejection.into())
            }
        }
    }

    /// 创建优惠券
    #[instrument(skip(self, request), fields(code = %request.code))]
    pub async fn create_coupon(&self, request: NewCoupon) -> Result<Coupon> {
        request.validate()?;

        let coupon = request.into_coupon(Utc::now());
        if !self.repo.create(&coupon).await? {
            return Err(LoyaltyError::Validation(format!(
                "优惠券码已存在: {}",
                coupon.code
            )));
        }

        info!(code = %coupon.code, coupon_type = coupon.coupon_type.as_str(), "优惠券已创建");
        Ok(coupon)
    }

    /// 发行礼品卡
    ///
    /// 礼品卡创建后处于未激活状态，需在付款完成后调用 [`activate`](Self::activate)。
    /// `valid_days` 为 None 时不设失效时间。
    #[instrument(skip(self), fields(amount = %amount))]
    pub async fn issue_gift_card(&self, amount: Money, valid_days: Option<u32>) -> Result<Coupon> {
        if amount.cents() <= 0 {
            return Err(LoyaltyError::Validation(format!(
                "礼品卡面值必须大于0: {}",
                amount
            )));
        }

        let now = Utc::now();
        let valid_until = valid_days.map(|days| now + Duration::days(i64::from(days)));

        for _ in 0..GIFT_CARD_CODE_ATTEMPTS {
            let coupon = Coupon {
                id: Uuid::now_v7(),
                code: generate_gift_card_code(),
                coupon_type: CouponType::GiftCard,
                value: amount.cents(),
                min_order_amount: None,
                max_discount: None,
                valid_from: now,
                valid_until,
                max_uses: Some(1),
                current_uses: 0,
                max_uses_per_user: None,
                is_active: false,
                created_at: now,
            };

            if self.repo.create(&coupon).await? {
                info!(code = %coupon.code, "礼品卡已发行，等待激活");
                return Ok(coupon);
            }
            debug!(code = %coupon.code, "礼品卡码冲突，重新生成");
        }

        Err(LoyaltyError::Internal(
            "无法生成唯一的礼品卡码".to_string(),
        ))
    }

    /// 激活优惠券（礼品卡付款完成后调用）
    pub async fn activate(&self, code: &str) -> Result<()> {
        self.set_active(code, true).await
    }

    /// 停用优惠券
    pub async fn deactivate(&self, code: &str) -> Result<()> {
        self.set_active(code, false).await
    }

    // ==================== 私有方法 ====================

    async fn set_active(&self, code: &str, active: bool) -> Result<()> {
        let code = normalize_code(code);
        if !self.repo.set_active(&code, active).await? {
            return Err(CouponRejection::NotFound.into());
        }
        info!(code = %code, active, "优惠券启用状态已更新");
        Ok(())
    }

    async fn evaluate(
        &self,
        code: &str,
        order_amount: Money,
        user_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(Coupon, Money)> {
        let coupon = self
            .repo
            .find_by_code(&normalize_code(code))
            .await?
            .ok_or(CouponRejection::NotFound)?;

        rules::check_availability(&coupon, now)?;

        if let Some(user_id) = user_id
            && coupon.max_uses_per_user.is_some()
        {
            let prior = self.repo.count_user_redemptions(coupon.id, user_id).await?;
            rules::check_per_user(&coupon, prior)?;
        }

        rules::check_minimum(&coupon, order_amount)?;

        let discount = compute_discount(&coupon, order_amount);
        Ok((coupon, discount))
    }
}

fn record_validation(result: &Result<(Coupon, Money)>) {
    match result {
        Ok(_) => metrics::record_coupon_validation("ok"),
        Err(LoyaltyError::CouponRejected(rejection)) => {
            metrics::record_coupon_validation(rejection.code())
        }
        Err(_) => metrics::record_coupon_validation("error"),
    }
}

/// 生成形如 `GC-7KQ2-XH9M` 的礼品卡码
fn generate_gift_card_code() -> String {
    let mut rng = rand::rng();
    let mut segment = || -> String {
        (0..4)
            .map(|_| GIFT_CARD_ALPHABET[rng.random_range(0..GIFT_CARD_ALPHABET.len())] as char)
            .collect()
    };
    let first = segment();
    let second = segment();
    format!("{}-{}-{}", GIFT_CARD_PREFIX, first, second)
}
