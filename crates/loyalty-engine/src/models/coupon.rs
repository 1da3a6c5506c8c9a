//! 优惠券实体
//!
//! 优惠券“不可用”是派生状态（未激活、过期、用尽），不单独存储状态字段。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use super::enums::CouponType;
use super::money::Money;

/// 百分比优惠券 `value` 的上限（100%）
pub const MAX_PERCENTAGE: i64 = 100;

/// 规范化优惠券码：去除首尾空白并转为大写，保证大小写不敏感匹配
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// 优惠券
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Coupon {
    pub id: Uuid,
    /// 规范化后的优惠券码（大写）
    pub code: String,
    pub coupon_type: CouponType,
    /// 百分比券为整数百分比（10 = 10%），其余为分
    pub value: i64,
    #[sqlx(default)]
    pub min_order_amount: Option<Money>,
    /// 百分比券的最高减免金额
    #[sqlx(default)]
    pub max_discount: Option<Money>,
    pub valid_from: DateTime<Utc>,
    #[sqlx(default)]
    pub valid_until: Option<DateTime<Utc>>,
    #[sqlx(default)]
    pub max_uses: Option<i32>,
    pub current_uses: i32,
    #[sqlx(default)]
    pub max_uses_per_user: Option<i32>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Coupon {
    /// 总使用次数是否已达上限
    pub fn is_exhausted(&self) -> bool {
        self.max_uses.is_some_and(|max| self.current_uses >= max)
    }

    pub fn descriptor(&self) -> CouponDescriptor {
        CouponDescriptor {
            id: self.id,
            code: self.code.clone(),
            coupon_type: self.coupon_type,
            value: self.value,
            max_discount: self.max_discount,
        }
    }
}

/// 返回给结算流程的优惠券摘要
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CouponDescriptor {
    pub id: Uuid,
    pub code: String,
    pub coupon_type: CouponType,
    pub value: i64,
    pub max_discount: Option<Money>,
}

/// 优惠券核销记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CouponRedemption {
    pub id: Uuid,
    pub coupon_id: Uuid,
    #[sqlx(default)]
    pub user_id: Option<String>,
    #[sqlx(default)]
    pub order_reference: Option<String>,
    pub discount_amount: Money,
    pub redeemed_at: DateTime<Utc>,
}

/// 创建优惠券请求
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "validate_new_coupon"))]
pub struct NewCoupon {
    #[validate(length(min = 3, max = 32, message = "优惠券码长度必须在3-32个字符之间"))]
    pub code: String,
    pub coupon_type: CouponType,
    #[validate(range(min = 1, message = "优惠券面值必须大于0"))]
    pub value: i64,
    pub min_order_amount: Option<Money>,
    pub max_discount: Option<Money>,
    pub valid_from: DateTime<Utc>,
    pub valid_until: Option<DateTime<Utc>>,
    #[validate(range(min = 1, message = "总使用次数上限必须大于0"))]
    pub max_uses: Option<i32>,
    #[validate(range(min = 1, message = "每人使用次数上限必须大于0"))]
    pub max_uses_per_user: Option<i32>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

fn validate_new_coupon(coupon: &NewCoupon) -> Result<(), ValidationError> {
    if coupon.coupon_type == CouponType::Percentage && coupon.value > MAX_PERCENTAGE {
        return Err(ValidationError::new("percentage_out_of_range")
            .with_message("百分比优惠不能超过100%".into()));
    }
    if coupon.coupon_type != CouponType::Percentage && coupon.max_discount.is_some() {
        return Err(ValidationError::new("max_discount_not_applicable")
            .with_message("最高减免金额只适用于百分比优惠券".into()));
    }
    if coupon
        .valid_until
        .is_some_and(|until| until <= coupon.valid_from)
    {
        return Err(ValidationError::new("invalid_validity_window")
            .with_message("失效时间必须晚于生效时间".into()));
    }
    let negative = |m: Option<Money>| m.is_some_and(|m| m.is_negative());
    if negative(coupon.min_order_amount) || negative(coupon.max_discount) {
        return Err(ValidationError::new("negative_amount").with_message("金额不能为负数".into()));
    }
    Ok(())
}

impl NewCoupon {
    /// 生成持久化用的优惠券实体
    pub fn into_coupon(self, now: DateTime<Utc>) -> Coupon {
        Coupon {
            id: Uuid::now_v7(),
            code: normalize_code(&self.code),
            coupon_type: self.coupon_type,
            value: self.value,
            min_order_amount: self.min_order_amount,
            max_discount: self.max_discount,
            valid_from: self.valid_from,
            valid_until: self.valid_until,
            max_uses: self.max_uses,
            current_uses: 0,
            max_uses_per_user: self.max_uses_per_user,
            is_active: self.is_active,
            created_at: now,
        }
    }
}
