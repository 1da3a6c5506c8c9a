//! 优惠券分阶段校验
//!
//! 校验顺序固定，遇到第一个不满足的条件即返回对应拒绝原因：
//! 不存在 -> 未启用 -> 未生效 -> 已过期 -> 总次数用尽 -> 每人次数用尽 -> 未达最低消费

use chrono::{DateTime, Utc};

use crate::error::CouponRejection;
use crate::models::{Coupon, Money};

type Check = std::result::Result<(), CouponRejection>;

/// 启用状态、有效期与总次数
pub fn check_availability(coupon: &Coupon, now: DateTime<Utc>) -> Check {
    if !coupon.is_active {
        return Err(CouponRejection::Inactive);
    }
    if now < coupon.valid_from {
        return Err(CouponRejection::NotYetValid);
    }
    if coupon.valid_until.is_some_and(|until| now > until) {
        return Err(CouponRejection::Expired);
    }
    if coupon.is_exhausted() {
        return Err(CouponRejection::UsageExceeded);
    }
    Ok(())
}

/// 每人使用次数
pub fn check_per_user(coupon: &Coupon, prior_redemptions: i64) -> Check {
    match coupon.max_uses_per_user {
        Some(limit) if prior_redemptions >= i64::from(limit) => Err(CouponRejection::PerUserLimit),
        _ => Ok(()),
    }
}

/// 最低消费
pub fn check_minimum(coupon: &Coupon, order_amount: Money) -> Check {
    match coupon.min_order_amount {
        Some(min) if order_amount < min => Err(CouponRejection::BelowMinimum),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CouponType;
    use chrono::Duration;
    use uuid::Uuid;

    fn coupon() -> Coupon {
        let now = Utc::now();
        Coupon {
            id: Uuid::now_v7(),
            code: "RULES".to_string(),
            coupon_type: CouponType::Percentage,
            value: 10,
            min_order_amount: Some(Money::from_major(50)),
            max_discount: None,
            valid_from: now - Duration::days(1),
            valid_until: Some(now + Duration::days(1)),
            max_uses: Some(10),
            current_uses: 0,
            max_uses_per_user: Some(2),
            is_active: true,
            created_at: now,
        }
    }

    #[test]
    fn test_available_coupon_passes() {
        assert_eq!(check_availability(&coupon(), Utc::now()), Ok(()));
    }

    #[test]
    fn test_inactive_reported_before_expiry() {
        let mut c = coupon();
        c.is_active = false;
        c.valid_until = Some(Utc::now() - Duration::days(3));
        assert_eq!(
            check_availability(&c, Utc::now()),
            Err(CouponRejection::Inactive)
        );
    }

    #[test]
    fn test_validity_window() {
        let c = coupon();
        assert_eq!(
            check_availability(&c, c.valid_from - Duration::seconds(1)),
            Err(CouponRejection::NotYetValid)
        );
        // 边界时刻仍可用
        assert_eq!(check_availability(&c, c.valid_from), Ok(()));
        assert_eq!(check_availability(&c, c.valid_until.unwrap()), Ok(()));
        assert_eq!(
            check_availability(&c, c.valid_until.unwrap() + Duration::seconds(1)),
            Err(CouponRejection::Expired)
        );
    }

    #[test]
    fn test_open_ended_coupon_never_expires() {
        let mut c = coupon();
        c.valid_until = None;
        assert_eq!(
            check_availability(&c, Utc::now() + Duration::days(10_000)),
            Ok(())
        );
    }

    #[test]
    fn test_usage_exceeded() {
        let mut c = coupon();
        c.max_uses = Some(1);
        c.current_uses = 1;
        assert_eq!(
            check_availability(&c, Utc::now()),
            Err(CouponRejection::UsageExceeded)
        );
    }

    #[test]
    fn test_per_user_limit() {
        let c = coupon();
        assert_eq!(check_per_user(&c, 1), Ok(()));
        assert_eq!(check_per_user(&c, 2), Err(CouponRejection::PerUserLimit));

        let mut unlimited = coupon();
        unlimited.max_uses_per_user = None;
        assert_eq!(check_per_user(&unlimited, 99), Ok(()));
    }

    #[test]
    fn test_minimum_order() {
        let c = coupon();
        assert_eq!(
            check_minimum(&c, Money::from_cents(4_999)),
            Err(CouponRejection::BelowMinimum)
        );
        assert_eq!(check_minimum(&c, Money::from_major(50)), Ok(()));
    }
}
