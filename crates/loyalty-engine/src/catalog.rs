//! 会员等级目录与等级解析
//!
//! 等级目录在初始化时校验一次区间连续性（无重叠、无空洞、最高级无上限），
//! 之后只读；`resolve_level` 是纯函数，任意积分都映射到唯一等级。

use tracing::info;

use crate::error::{LoyaltyError, Result};
use crate::models::{LevelBenefit, LevelDefinition};
use crate::repository::LevelCatalogRepositoryTrait;

/// 会员等级目录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelCatalog {
    levels: Vec<LevelDefinition>,
}

impl LevelCatalog {
    /// 从等级定义构建目录
    ///
    /// 定义会按等级排序后校验，不满足区间不变量时返回 `Configuration` 错误
    pub fn new(mut levels: Vec<LevelDefinition>) -> Result<Self> {
        levels.sort_by_key(|l| l.level);
        validate_ranges(&levels)?;
        Ok(Self { levels })
    }

    /// 从等级目录表加载并校验
    pub async fn load<R: LevelCatalogRepositoryTrait + ?Sized>(repo: &R) -> Result<Self> {
        let levels = repo.list_levels().await?;
        let catalog = Self::new(levels)?;
        info!(level_count = catalog.len(), "会员等级目录已加载");
        Ok(catalog)
    }

    /// 葡萄酒俱乐部的默认七级目录
    pub fn wine_club() -> Self {
        use LevelBenefit::*;

        let free_shipping = FreeShipping {
            min_order_cents: None,
        };
        let levels = vec![
            LevelDefinition::new(1, "Novize", 0, Some(499))
                .with_benefits(vec![LevelBenefit::custom("Monatliche Weinempfehlungen")]),
            LevelDefinition::new(2, "Kellerfreund", 500, Some(1_499))
                .with_benefits(vec![PointMultiplier { percent: 5 }, BirthdayGift]),
            LevelDefinition::new(3, "Kenner", 1_500, Some(2_999)).with_benefits(vec![
                PointMultiplier { percent: 10 },
                FreeShipping {
                    min_order_cents: Some(7_500),
                },
                BirthdayGift,
            ]),
            LevelDefinition::new(4, "Connaisseur", 3_000, Some(5_999)).with_benefits(vec![
                PointMultiplier { percent: 15 },
                free_shipping.clone(),
                EventAccess,
                BirthdayGift,
            ]),
            LevelDefinition::new(5, "Sommelier", 6_000, Some(9_999)).with_benefits(vec![
                PointMultiplier { percent: 20 },
                free_shipping.clone(),
                EventAccess,
                BirthdayGift,
            ]),
            LevelDefinition::new(6, "Kellermeister", 10_000, Some(19_999)).with_benefits(vec![
                PointMultiplier { percent: 25 },
                free_shipping.clone(),
                EventAccess,
                BirthdayGift,
                LevelBenefit::custom("Zugang zu Raritäten"),
            ]),
            LevelDefinition::new(7, "Winzerlegende", 20_000, None).with_benefits(vec![
                PointMultiplier { percent: 30 },
                free_shipping,
                EventAccess,
                BirthdayGift,
                LevelBenefit::custom("Persönliche Weinberatung"),
            ]),
        ];
        Self { levels }
    }

    /// 积分 → 等级
    ///
    /// 返回 `min_points <= points` 的最高等级；负余额归入最低等级
    pub fn resolve_level(&self, points: i64) -> &LevelDefinition {
        let idx = self.levels.partition_point(|l| l.min_points <= points);
        &self.levels[idx.saturating_sub(1)]
    }

    pub fn get(&self, level: i16) -> Option<&LevelDefinition> {
        self.levels.iter().find(|l| l.level == level)
    }

    pub fn levels(&self) -> &[LevelDefinition] {
        &self.levels
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// 当前积分的下一个等级，已是最高级时返回 None
    pub fn next_level(&self, points: i64) -> Option<&LevelDefinition> {
        let current = self.resolve_level(points).level;
        self.levels.iter().find(|l| l.level > current)
    }

    /// 距离下一等级还差多少积分
    pub fn points_to_next_level(&self, points: i64) -> Option<i64> {
        self.next_level(points).map(|next| next.min_points - points)
    }

    /// 修改某一等级的权益，返回新目录
    ///
    /// 只替换权益列表，区间保持不变
    pub fn with_benefits(&self, level: i16, benefits: Vec<LevelBenefit>) -> Result<Self> {
        let mut levels = self.levels.clone();
        let entry = levels
            .iter_mut()
            .find(|l| l.level == level)
            .ok_or_else(|| LoyaltyError::Validation(format!("等级不存在: {}", level)))?;
        entry.benefits = benefits;
        Self::new(levels)
    }
}

/// 校验等级区间不变量
fn validate_ranges(levels: &[LevelDefinition]) -> Result<()> {
    let config_err = |msg: String| Err(LoyaltyError::Configuration(msg));

    let Some(first) = levels.first() else {
        return config_err("等级目录为空".to_string());
    };
    if first.min_points != 0 {
        return config_err(format!(
            "最低等级必须从 0 积分开始: level={}, min_points={}",
            first.level, first.min_points
        ));
    }

    for (idx, entry) in levels.iter().enumerate() {
        let expected_level = idx as i16 + 1;
        if entry.level != expected_level {
            return config_err(format!(
                "等级序号不连续: 期望 {}, 实际 {}",
                expected_level, entry.level
            ));
        }

        match (entry.max_points, levels.get(idx + 1)) {
            (Some(max), Some(next)) => {
                if max < entry.min_points {
                    return config_err(format!(
                        "等级区间倒置: level={}, min={}, max={}",
                        entry.level, entry.min_points, max
                    ));
                }
                if max.checked_add(1) != Some(next.min_points) {
                    return config_err(format!(
                        "等级区间不连续: level {} 上限 {}, level {} 下限 {}",
                        entry.level, max, next.level, next.min_points
                    ));
                }
            }
            (None, Some(_)) => {
                return config_err(format!("只有最高等级可以无上限: level={}", entry.level));
            }
            (Some(max), None) => {
                return config_err(format!(
                    "最高等级必须无上限: level={}, max_points={}",
                    entry.level, max
                ));
            }
            (None, None) => {}
        }
    }

    Ok(())
}
