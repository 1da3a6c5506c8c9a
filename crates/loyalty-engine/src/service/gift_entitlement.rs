//! 等级礼品服务
//!
//! 用户在当前等级及以下的每个等级各可领取一次礼品。
//! 待领取 = 已配置礼品且 `<= 当前等级` 的等级 - 已领取的等级。
//!
//! 领取期限（`loyalty_gift_validity_days`）只用于展示：
//! 用户首次达到某等级的时间没有持久化，无法据此计算真正的截止时间。

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use loyalty_shared::config::LoyaltyConfig;
use loyalty_shared::observability::metrics;

use crate::catalog::LevelCatalog;
use crate::error::{LoyaltyError, Result};
use crate::models::{GiftClaim, LevelGift, LoyaltyAccount, UnclaimedGift};
use crate::repository::{
    AccountRepositoryTrait, GiftRepositoryTrait, SettingsRepositoryTrait, GIFT_VALIDITY_DAYS_KEY,
};

/// 等级礼品服务
pub struct GiftEntitlementTracker<A, G, S>
where
    A: AccountRepositoryTrait,
    G: GiftRepositoryTrait,
    S: SettingsRepositoryTrait,
{
    accounts: Arc<A>,
    gifts: Arc<G>,
    settings: Arc<S>,
    catalog: Arc<LevelCatalog>,
    default_validity_days: u32,
}

impl<A, G, S> GiftEntitlementTracker<A, G, S>
where
    A: AccountRepositoryTrait,
    G: GiftRepositoryTrait,
    S: SettingsRepositoryTrait,
{
    pub fn new(
        accounts: Arc<A>,
        gifts: Arc<G>,
        settings: Arc<S>,
        catalog: Arc<LevelCatalog>,
        config: &LoyaltyConfig,
    ) -> Self {
        Self {
            accounts,
            gifts,
            settings,
            catalog,
            default_validity_days: config.default_gift_validity_days,
        }
    }

    /// 计算用户尚未领取的等级礼品（按等级升序）
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn compute_unclaimed(&self, user_id: &str) -> Result<Vec<UnclaimedGift>> {
        let account = self.load_account(user_id).await?;
        let gifts_by_level = self.gifts_up_to(account.loyalty_level).await?;
        if gifts_by_level.is_empty() {
            return Ok(Vec::new());
        }

        let claimed: HashSet<i16> = self
            .gifts
            .list_claims(user_id)
            .await?
            .into_iter()
            .map(|claim| claim.level)
            .collect();
        let validity_days = self.validity_days().await?;

        let unclaimed: Vec<UnclaimedGift> = gifts_by_level
            .into_iter()
            .filter(|(level, _)| !claimed.contains(level))
            .map(|(level, gifts)| UnclaimedGift {
                level,
                level_name: self
                    .catalog
                    .get(level)
                    .map(|def| def.name.clone())
                    .unwrap_or_default(),
                gifts,
                validity_days,
            })
            .collect();

        debug!(
            user_id = %user_id,
            claimed = claimed.len(),
            unclaimed = unclaimed.len(),
            "等级礼品计算完成"
        );
        Ok(unclaimed)
    }

    /// 领取某个等级的礼品
    #[instrument(skip(self), fields(user_id = %user_id, level = level))]
    pub async fn claim_gift(&self, user_id: &str, level: i16) -> Result<GiftClaim> {
        let account = self.load_account(user_id).await?;
        if level > account.loyalty_level {
            return Err(LoyaltyError::GiftLevelNotReached {
                current: account.loyalty_level,
                required: level,
            });
        }

        let has_gifts = self
            .gifts
            .list_level_gifts()
            .await?
            .iter()
            .any(|gift| gift.level == level);
        if !has_gifts {
            return Err(LoyaltyError::NoGiftsForLevel(level));
        }

        let claim = GiftClaim {
            user_id: user_id.to_string(),
            level,
            claimed_at: Utc::now(),
        };
        if !self.gifts.create_claim(&claim).await? {
            return Err(LoyaltyError::GiftAlreadyClaimed {
                user_id: user_id.to_string(),
                level,
            });
        }

        metrics::record_gift_claim(level);
        info!(user_id = %user_id, level, "等级礼品已领取");
        Ok(claim)
    }

    // ==================== 私有方法 ====================

    async fn load_account(&self, user_id: &str) -> Result<LoyaltyAccount> {
        self.accounts
            .get_account(user_id)
            .await?
            .ok_or_else(|| LoyaltyError::AccountNotFound(user_id.to_string()))
    }

    /// 按等级分组的礼品，只保留目录中存在且不高于 `max_level` 的等级
    async fn gifts_up_to(&self, max_level: i16) -> Result<BTreeMap<i16, Vec<LevelGift>>> {
        let mut grouped: BTreeMap<i16, Vec<LevelGift>> = BTreeMap::new();
        for gift in self.gifts.list_level_gifts().await? {
            if gift.level <= max_level && self.catalog.get(gift.level).is_some() {
                grouped.entry(gift.level).or_default().push(gift);
            }
        }
        Ok(grouped)
    }

    /// 读取领取期限设置，缺失或无法解析时使用默认值
    async fn validity_days(&self) -> Result<u32> {
        let Some(raw) = self.settings.get_setting(GIFT_VALIDITY_DAYS_KEY).await? else {
            return Ok(self.default_validity_days);
        };

        match raw.trim().parse::<u32>() {
            Ok(days) => Ok(days),
            Err(_) => {
                warn!(
                    key = GIFT_VALIDITY_DAYS_KEY,
                    value = %raw,
                    default = self.default_validity_days,
                    "设置值无法解析，使用默认值"
                );
                Ok(self.default_validity_days)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{
        MockAccountRepositoryTrait, MockGiftRepositoryTrait, MockSettingsRepositoryTrait,
    };

    fn accounts_at_level(level: i16) -> MockAccountRepositoryTrait {
        let mut accounts = MockAccountRepositoryTrait::new();
        accounts.expect_get_account().returning(move |user_id| {
            Ok(Some(LoyaltyAccount {
                user_id: user_id.to_string(),
                loyalty_points: 0,
                loyalty_level: level,
            }))
        });
        accounts
    }

    fn gift(id: i64, level: i16) -> LevelGift {
        LevelGift {
            id,
            level,
            name: format!("礼品-{}", id),
            description: None,
        }
    }

    fn tracker(
        accounts: MockAccountRepositoryTrait,
        gifts: MockGiftRepositoryTrait,
        settings: MockSettingsRepositoryTrait,
    ) -> GiftEntitlementTracker<
        MockAccountRepositoryTrait,
        MockGiftRepositoryTrait,
        MockSettingsRepositoryTrait,
    > {
        GiftEntitlementTracker::new(
            Arc::new(accounts),
            Arc::new(gifts),
            Arc::new(settings),
            Arc::new(LevelCatalog::wine_club()),
            &LoyaltyConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_unclaimed_excludes_claimed_and_higher_levels() {
        let mut gifts = MockGiftRepositoryTrait::new();
        gifts
            .expect_list_level_gifts()
            .returning(|| Ok(vec![gift(1, 1), gift(2, 2), gift(3, 2), gift(4, 3), gift(5, 4)]));
        gifts.expect_list_claims().returning(|user_id| {
            Ok(vec![GiftClaim {
                user_id: user_id.to_string(),
                level: 1,
                claimed_at: Utc::now(),
            }])
        });
        let mut settings = MockSettingsRepositoryTrait::new();
        settings.expect_get_setting().returning(|_| Ok(None));

        let unclaimed = tracker(accounts_at_level(3), gifts, settings)
            .compute_unclaimed("user-1")
            .await
            .unwrap();

        let levels: Vec<i16> = unclaimed.iter().map(|u| u.level).collect();
        assert_eq!(levels, vec![2, 3]);
        assert_eq!(unclaimed[0].gifts.len(), 2);
        assert_eq!(unclaimed[0].level_name, "Kellerfreund");
        assert_eq!(unclaimed[0].validity_days, 14);
    }

    #[tokio::test]
    async fn test_validity_days_from_settings() {
        let mut gifts = MockGiftRepositoryTrait::new();
        gifts
            .expect_list_level_gifts()
            .returning(|| Ok(vec![gift(1, 1)]));
        gifts.expect_list_claims().returning(|_| Ok(vec![]));
        let mut settings = MockSettingsRepositoryTrait::new();
        settings
            .expect_get_setting()
            .withf(|key| key == GIFT_VALIDITY_DAYS_KEY)
            .returning(|_| Ok(Some(" 30 ".to_string())));

        let unclaimed = tracker(accounts_at_level(1), gifts, settings)
            .compute_unclaimed("user-1")
            .await
            .unwrap();
        assert_eq!(unclaimed[0].validity_days, 30);
    }

    #[tokio::test]
    async fn test_unparsable_setting_falls_back_to_default() {
        let mut gifts = MockGiftRepositoryTrait::new();
        gifts
            .expect_list_level_gifts()
            .returning(|| Ok(vec![gift(1, 1)]));
        gifts.expect_list_claims().returning(|_| Ok(vec![]));
        let mut settings = MockSettingsRepositoryTrait::new();
        settings
            .expect_get_setting()
            .returning(|_| Ok(Some("vierzehn".to_string())));

        let unclaimed = tracker(accounts_at_level(1), gifts, settings)
            .compute_unclaimed("user-1")
            .await
            .unwrap();
        assert_eq!(unclaimed[0].validity_days, 14);
    }

    #[tokio::test]
    async fn test_no_gifts_configured_yields_empty() {
        let mut gifts = MockGiftRepositoryTrait::new();
        gifts.expect_list_level_gifts().returning(|| Ok(vec![]));
        gifts.expect_list_claims().never();

        let unclaimed = tracker(accounts_at_level(5), gifts, MockSettingsRepositoryTrait::new())
            .compute_unclaimed("user-1")
            .await
            .unwrap();
        assert!(unclaimed.is_empty());
    }

    #[tokio::test]
    async fn test_claim_above_current_level_rejected() {
        let mut gifts = MockGiftRepositoryTrait::new();
        gifts.expect_create_claim().never();

        let err = tracker(accounts_at_level(2), gifts, MockSettingsRepositoryTrait::new())
            .claim_gift("user-1", 3)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LoyaltyError::GiftLevelNotReached {
                current: 2,
                required: 3
            }
        ));
    }

    #[tokio::test]
    async fn test_claim_level_without_gifts() {
        let mut gifts = MockGiftRepositoryTrait::new();
        gifts
            .expect_list_level_gifts()
            .returning(|| Ok(vec![gift(1, 1)]));

        let err = tracker(accounts_at_level(2), gifts, MockSettingsRepositoryTrait::new())
            .claim_gift("user-1", 2)
            .await
            .unwrap_err();
        assert!(matches!(err, LoyaltyError::NoGiftsForLevel(2)));
    }

    #[tokio::test]
    async fn test_duplicate_claim() {
        let mut gifts = MockGiftRepositoryTrait::new();
        gifts
            .expect_list_level_gifts()
            .returning(|| Ok(vec![gift(1, 1)]));
        gifts.expect_create_claim().returning(|_| Ok(false));

        let err = tracker(accounts_at_level(1), gifts, MockSettingsRepositoryTrait::new())
            .claim_gift("user-1", 1)
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "GIFT_ALREADY_CLAIMED");
    }
}
