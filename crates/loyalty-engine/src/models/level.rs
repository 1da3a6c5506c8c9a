//! 会员等级定义

use serde::{Deserialize, Serialize};

/// 等级权益
///
/// 原先以无类型 JSON 存储的权益列表，这里收敛为带标签的枚举，
/// 数据库中以 `[{"type": "freeShipping"}, ...]` 形式保存。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum LevelBenefit {
    /// 积分加成，`percent` 为额外百分比（25 = 多得 25%）
    PointMultiplier { percent: u32 },
    /// 免运费，可选最低订单金额（分）
    FreeShipping {
        #[serde(default, rename = "minOrderCents")]
        min_order_cents: Option<i64>,
    },
    /// 品鉴会等活动的优先参与资格
    EventAccess,
    /// 生日礼
    BirthdayGift,
    /// 其他文字描述的权益
    Custom { description: String },
}

impl LevelBenefit {
    pub fn custom(description: impl Into<String>) -> Self {
        Self::Custom {
            description: description.into(),
        }
    }
}

/// 等级目录条目
///
/// `max_points` 为 None 表示无上限，只允许出现在最高等级
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct LevelDefinition {
    /// 等级序号，1..=7
    pub level: i16,
    pub name: String,
    pub min_points: i64,
    #[sqlx(default)]
    pub max_points: Option<i64>,
    /// 有序权益列表
    #[sqlx(json)]
    pub benefits: Vec<LevelBenefit>,
}

impl LevelDefinition {
    pub fn new(level: i16, name: impl Into<String>, min_points: i64, max_points: Option<i64>) -> Self {
        Self {
            level,
            name: name.into(),
            min_points,
            max_points,
            benefits: Vec::new(),
        }
    }

    pub fn with_benefits(mut self, benefits: Vec<LevelBenefit>) -> Self {
        self.benefits = benefits;
        self
    }

    /// 积分是否落在本等级区间内
    pub fn contains(&self, points: i64) -> bool {
        points >= self.min_points && self.max_points.is_none_or(|max| points <= max)
    }
}
