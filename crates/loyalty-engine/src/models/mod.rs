//! 领域模型
//!
//! 定义会员积分、等级、礼品与优惠券相关的实体、枚举和值对象。

mod account;
mod coupon;
mod enums;
mod gift;
mod ledger;
mod level;
mod money;

pub use account::*;
pub use coupon::*;
pub use enums::*;
pub use gift::*;
pub use ledger::*;
pub use level::*;
pub use money::*;
