//! 折扣计算
//!
//! 百分比券：`订单金额 × 百分比 / 100`，按分四舍五入（half-up），再受最高减免限制；
//! 固定金额券与礼品卡：`min(面值, 订单金额)`。结果始终在 `[0, 订单金额]` 区间内。

use crate::models::{Coupon, CouponType, Money};

const PERCENT_BASE: i128 = 100;

/// 计算订单可获得的折扣
pub fn compute_discount(coupon: &Coupon, order_amount: Money) -> Money {
    if order_amount.cents() <= 0 {
        return Money::ZERO;
    }

    let raw = match coupon.coupon_type {
        CouponType::Percentage => {
            let discount = percentage_of(order_amount, coupon.value);
            match coupon.max_discount {
                Some(cap) => discount.min(cap),
                None => discount,
            }
        }
        CouponType::FixedAmount | CouponType::GiftCard => Money::from_cents(coupon.value),
    };

    raw.clamp(Money::ZERO, order_amount)
}

/// 按整数百分比计算金额，half-up 舍入到分
pub fn percentage_of(amount: Money, percent: i64) -> Money {
    let product = i128::from(amount.cents()) * i128::from(percent);
    let half = PERCENT_BASE / 2;
    let rounded = if product >= 0 {
        (product + half) / PERCENT_BASE
    } else {
        (product - half) / PERCENT_BASE
    };
    Money::from_cents(i64::try_from(rounded).unwrap_or(if rounded > 0 { i64::MAX } else { i64::MIN }))
}
