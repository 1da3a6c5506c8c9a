//! 用户会员状态
//!
//! 用户实体由账户系统维护，这里只映射积分余额与缓存等级两个字段。

use serde::{Deserialize, Serialize};

/// 用户会员状态
///
/// `loyalty_points` 是账本流水的权威合计；`loyalty_level` 是
/// `resolve_level(loyalty_points)` 的缓存投影，可幂等重算。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct LoyaltyAccount {
    pub user_id: String,
    pub loyalty_points: i64,
    pub loyalty_level: i16,
}

impl LoyaltyAccount {
    /// 新注册用户：0 积分，等级 1
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            loyalty_points: 0,
            loyalty_level: 1,
        }
    }
}
