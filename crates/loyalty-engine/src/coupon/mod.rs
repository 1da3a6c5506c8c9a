//! 优惠券模块
//!
//! - `rules`: 分阶段的可用性校验（纯函数）
//! - `discount`: 折扣金额计算（纯函数，整数分运算）
//! - `validator`: 结算时的校验、核销与后台创建流程

pub mod discount;
pub mod rules;
pub mod validator;

pub use discount::compute_discount;
pub use validator::{CouponValidation, CouponValidator, RedeemedCoupon};
