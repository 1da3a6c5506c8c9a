//! 仓储层
//!
//! 提供所有实体的数据访问接口，封装存储细节。
//!
//! ## 设计原则
//!
//! - 仓储只负责数据持久化，不包含业务规则
//! - 需要原子性的写操作（账本追加、优惠券核销）由仓储在单个事务内完成
//! - 服务层只依赖 trait，通过构造函数注入具体实现
//! - `PgLoyaltyStore` 基于 SQLx/PostgreSQL，`InMemoryLoyaltyStore` 用于测试和嵌入式场景

mod memory;
mod pg;
mod traits;

pub use memory::InMemoryLoyaltyStore;
pub use pg::PgLoyaltyStore;
pub use traits::*;

use crate::error::LoyaltyError;

fn balance_overflow(balance: i64, delta: i64) -> LoyaltyError {
    LoyaltyError::Validation(format!(
        "积分余额溢出: balance={}, delta={}",
        balance, delta
    ))
}
