//! 会员积分与促销折扣引擎
//!
//! 负责把消费行为转换为积分、按积分余额解析会员等级、追踪等级礼品的领取情况、
//! 判定行为徽章资格，以及在结算时校验优惠券并计算折扣。
//!
//! ## 模块结构
//!
//! - `catalog`: 等级目录与等级解析（`LevelCatalog::resolve_level`）
//! - `service`: 积分账本、等级对账、等级礼品
//! - `badge`: 徽章规则注册表
//! - `coupon`: 优惠券校验、折扣计算与核销
//! - `repository`: 仓储接口及 PostgreSQL / 内存实现
//! - `models`: 实体与值对象
//! - `error`: 错误类型
//!
//! 所有服务通过构造函数接收仓储（`Arc<R>`），不依赖全局状态。

pub mod badge;
pub mod catalog;
pub mod coupon;
pub mod error;
pub mod models;
pub mod repository;
pub mod service;

pub use badge::{BadgeEligibilityEngine, BadgeSignal};
pub use catalog::LevelCatalog;
pub use coupon::{CouponValidation, CouponValidator, RedeemedCoupon};
pub use error::{CouponRejection, LoyaltyError, Result};
pub use models::Money;
pub use service::{GiftEntitlementTracker, LevelTransition, LevelTransitionService, PointLedger};
