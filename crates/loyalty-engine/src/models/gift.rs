//! 等级礼品与领取记录

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 等级礼品配置
///
/// 同一等级可配置多个礼品，领取时按等级整体领取
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct LevelGift {
    pub id: i64,
    pub level: i16,
    pub name: String,
    #[sqlx(default)]
    pub description: Option<String>,
}

/// 礼品领取记录
///
/// `(user_id, level)` 唯一
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct GiftClaim {
    pub user_id: String,
    pub level: i16,
    pub claimed_at: DateTime<Utc>,
}

/// 待领取的等级礼品
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnclaimedGift {
    pub level: i16,
    pub level_name: String,
    pub gifts: Vec<LevelGift>,
    /// 展示用的领取期限（天），没有持久化的起算时间，仅作提示
    pub validity_days: u32,
}
